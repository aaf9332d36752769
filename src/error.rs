use thiserror::Error;

use crate::capture::ElementId;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid page url `{0}`")]
    InvalidBaseUrl(String),

    #[error("Unknown element {0}")]
    UnknownElement(ElementId),
}
