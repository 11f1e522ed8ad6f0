use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One disagreement between the source and target representations.
///
/// For a child-collection count mismatch `source` and `target` hold the two
/// counts and `property` names the collection itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    /// Dotted path, e.g. `case.appearances[0].outcome`.
    pub property: String,
    pub source: Value,
    pub target: Value,
    /// Correlation key of the child the difference sits in, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Difference {
    pub fn new(property: impl Into<String>, source: Value, target: Value) -> Self {
        Self {
            property: property.into(),
            source,
            target,
            id: None,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// A child-collection count mismatch.
    pub fn count(property: impl Into<String>, source: usize, target: usize) -> Self {
        Self::new(property, Value::from(source), Value::from(target))
    }
}
