use serde::{Deserialize, Serialize};

use crate::capture::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Attributes,
    ChildList,
    CharacterData,
}

/// One change notification delivered by the page host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub target: ElementId,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
    /// New attribute value; absent when the attribute was removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl MutationRecord {
    /// Whether this record reports a change of `attribute`.
    pub fn is_attribute(&self, attribute: &str) -> bool {
        self.kind == MutationKind::Attributes && self.attribute_name.as_deref() == Some(attribute)
    }
}

#[cfg(test)]
impl MutationRecord {
    pub fn attribute(target: ElementId, name: &str, value: Option<&str>) -> Self {
        Self {
            target,
            kind: MutationKind::Attributes,
            attribute_name: Some(name.to_string()),
            value: value.map(str::to_string),
        }
    }

    pub fn child_list(target: ElementId) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList,
            attribute_name: None,
            value: None,
        }
    }
}

/// Records delivered together, in delivery order.
pub type MutationBatch = Vec<MutationRecord>;
