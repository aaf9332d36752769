use chrono::{DateTime, Utc};
use std::fmt;

use crate::capture::ElementId;

/// Where a captured source was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    /// Initial scan when the session was created
    Initial,
    /// A delivered attribute mutation
    Mutation,
}

impl fmt::Display for CaptureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOrigin::Initial => write!(f, "initial"),
            CaptureOrigin::Mutation => write!(f, "mutation"),
        }
    }
}

/// A source newly added to the registry.
#[derive(Debug, Clone)]
pub struct SourceCaptured {
    pub source: String,
    pub element: ElementId,
    pub origin: CaptureOrigin,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

impl SourceCaptured {
    pub fn new(source: String, element: ElementId, origin: CaptureOrigin, total: usize) -> Self {
        Self {
            source,
            element,
            origin,
            total,
            timestamp: Utc::now(),
        }
    }
}
