use std::collections::HashSet;

/// Insertion-ordered set of captured image sources.
///
/// Values are only ever appended. Empty values and values already present
/// are rejected, so the ordered view never holds duplicates.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `source` and returns `true` if it was new.
    pub fn insert(&mut self, source: &str) -> bool {
        if source.is_empty() || self.contains(source) {
            return false;
        }
        self.seen.insert(source.to_string());
        self.ordered.push(source.to_string());
        true
    }

    pub fn contains(&self, source: &str) -> bool {
        self.seen.contains(source)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Sources in first-seen order.
    pub fn as_slice(&self) -> &[String] {
        &self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order() {
        let mut registry = SourceRegistry::new();
        for src in ["https://x/b.jpg", "https://x/a.jpg", "https://x/b.jpg", "https://x/c.jpg"] {
            registry.insert(src);
        }
        assert_eq!(
            registry.as_slice(),
            ["https://x/b.jpg", "https://x/a.jpg", "https://x/c.jpg"]
        );
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut registry = SourceRegistry::new();
        assert!(registry.insert("https://x/1.jpg"));
        assert!(registry.insert("https://x/2.jpg"));
        let before = registry.as_slice().to_vec();

        assert!(!registry.insert("https://x/1.jpg"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.as_slice(), before.as_slice());
    }

    #[test]
    fn test_empty_source_rejected() {
        let mut registry = SourceRegistry::new();
        assert!(!registry.insert(""));
        assert!(registry.is_empty());
        assert!(!registry.contains(""));
    }
}
