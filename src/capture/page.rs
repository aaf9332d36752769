use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use url::Url;

use crate::error::CaptureError;
use crate::event::{MutationKind, MutationRecord};

/// Handle to an element owned by a [`Page`].
///
/// For a [`SnapshotPage`] this is the element's document-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The host document a capture session runs against.
pub trait Page {
    /// Elements currently matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, CaptureError>;

    /// Current value of `attribute`, resolved to an absolute URL.
    ///
    /// Missing or blank values give `None`.
    fn resolved_source(&self, element: ElementId, attribute: &str) -> Option<String>;

    /// Brings the page in line with a delivered record. Hosts that already
    /// reflect their own mutations keep the default.
    fn apply(&mut self, _record: &MutationRecord) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Short human readable description, used for listings.
    fn describe(&self, element: ElementId) -> String {
        element.to_string()
    }
}

#[derive(Debug, Clone)]
struct PageElement {
    tag: String,
    attributes: BTreeMap<String, String>,
}

/// A page parsed from saved HTML, with attribute state tracked per element so
/// recorded mutations can be replayed on top of it.
pub struct SnapshotPage {
    document: Html,
    base_url: Url,
    elements: Vec<PageElement>,
}

impl SnapshotPage {
    pub fn parse(html: &str, page_url: &str) -> Result<Self, CaptureError> {
        let base_url =
            Url::parse(page_url).map_err(|_| CaptureError::InvalidBaseUrl(page_url.to_string()))?;
        let document = Html::parse_document(html);

        let elements = Self::walk(&document)
            .map(|element| PageElement {
                tag: element.value().name().to_string(),
                attributes: element
                    .value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!("Parsed page {} with {} elements", base_url, elements.len());

        Ok(Self {
            document,
            base_url,
            elements,
        })
    }

    fn walk(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
        document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn element(&self, element: ElementId) -> Result<&PageElement, CaptureError> {
        self.elements
            .get(element.0)
            .ok_or(CaptureError::UnknownElement(element))
    }
}

impl Page for SnapshotPage {
    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, CaptureError> {
        let parsed = Selector::parse(selector).map_err(|e| CaptureError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::walk(&self.document)
            .enumerate()
            .filter(|(_, element)| parsed.matches(element))
            .map(|(idx, _)| ElementId(idx))
            .collect())
    }

    fn resolved_source(&self, element: ElementId, attribute: &str) -> Option<String> {
        let value = self.element(element).ok()?.attributes.get(attribute)?.trim();
        if value.is_empty() {
            return None;
        }

        match self.base_url.join(value) {
            Ok(url) => Some(url.to_string()),
            Err(_) => Some(value.to_string()),
        }
    }

    fn apply(&mut self, record: &MutationRecord) -> Result<(), CaptureError> {
        let target = self
            .elements
            .get_mut(record.target.0)
            .ok_or(CaptureError::UnknownElement(record.target))?;

        if record.kind != MutationKind::Attributes {
            return Ok(());
        }
        let Some(name) = &record.attribute_name else {
            return Ok(());
        };

        match &record.value {
            Some(value) => {
                target.attributes.insert(name.clone(), value.clone());
            }
            None => {
                target.attributes.remove(name);
            }
        }
        Ok(())
    }

    fn describe(&self, element: ElementId) -> String {
        match self.element(element) {
            Ok(el) => match el.attributes.get("class") {
                Some(class) => format!("{} <{} class=\"{}\">", element, el.tag, class),
                None => format!("{} <{}>", element, el.tag),
            },
            Err(_) => element.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="gallery">
    <img class="viewer" src="/media/1.jpg">
    <img class="viewer other" src="https://cdn.example.com/2.jpg">
    <img class="viewer">
    <img class="thumb" src="/media/thumb.jpg">
  </div>
</body></html>"#;

    fn page() -> SnapshotPage {
        SnapshotPage::parse(PAGE, "https://shop.example.com/products/g19").unwrap()
    }

    #[test]
    fn test_query_matches_class() {
        let page = page();
        let targets = page.query_selector_all("img.viewer").unwrap();
        assert_eq!(targets.len(), 3);
        assert!(targets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_element_count() {
        // html, head, body, div and four images
        assert_eq!(page().element_count(), 8);
    }

    #[test]
    fn test_query_no_match() {
        let page = page();
        assert!(page.query_selector_all(".missing").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_selector() {
        let page = page();
        let err = page.query_selector_all("img[").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidSelector { .. }));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SnapshotPage::parse(PAGE, "not a url"),
            Err(CaptureError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_resolved_source() {
        let page = page();
        let targets = page.query_selector_all("img.viewer").unwrap();
        assert_eq!(
            page.resolved_source(targets[0], "src").as_deref(),
            Some("https://shop.example.com/media/1.jpg")
        );
        assert_eq!(
            page.resolved_source(targets[1], "src").as_deref(),
            Some("https://cdn.example.com/2.jpg")
        );
        assert_eq!(page.resolved_source(targets[2], "src"), None);
        assert_eq!(page.resolved_source(ElementId(10_000), "src"), None);
    }

    #[test]
    fn test_apply_attribute_mutation() {
        let mut page = page();
        let targets = page.query_selector_all("img.viewer").unwrap();

        page.apply(&MutationRecord::attribute(targets[2], "src", Some("/media/3.jpg")))
            .unwrap();
        assert_eq!(
            page.resolved_source(targets[2], "src").as_deref(),
            Some("https://shop.example.com/media/3.jpg")
        );

        page.apply(&MutationRecord::attribute(targets[0], "src", None))
            .unwrap();
        assert_eq!(page.resolved_source(targets[0], "src"), None);
    }

    #[test]
    fn test_apply_unknown_element() {
        let mut page = page();
        let err = page
            .apply(&MutationRecord::attribute(ElementId(10_000), "src", Some("/x.jpg")))
            .unwrap_err();
        assert!(matches!(err, CaptureError::UnknownElement(ElementId(10_000))));
    }

    #[test]
    fn test_describe() {
        let page = page();
        let targets = page.query_selector_all("img.thumb").unwrap();
        assert!(page.describe(targets[0]).ends_with("<img class=\"thumb\">"));
    }
}
