use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting blank input.
            pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(TypeError::InvalidId(format!("{} must not be blank", $label)));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Create an identifier without validation.
            pub fn new_unchecked(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an entity in the source (authoritative) system.
    SourceId,
    "source id"
);

string_id!(
    /// Identifier of an entity in the target (legacy) system.
    TargetId,
    "target id"
);

string_id!(
    /// Entity kind tag, used to look up the handler and diff schema for an
    /// entity (e.g. `court-case`, `contact`, `sentence-adjustment`).
    EntityType,
    "entity type"
);

impl SourceId {
    /// Numeric view of the id, if it is one. Paged sweeps key on this.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace() {
        let id = SourceId::parse("  12345 ").unwrap();
        assert_eq!(id.as_str(), "12345");
        assert_eq!(id.as_u64(), Some(12345));
    }

    #[test]
    fn parse_rejects_blank() {
        assert!(TargetId::parse("   ").is_err());
        assert!(EntityType::parse("").is_err());
    }

    #[test]
    fn from_number_and_display() {
        let id = TargetId::from(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(format!("{id:?}"), "TargetId(7)");
    }

    #[test]
    fn non_numeric_source_id() {
        assert_eq!(SourceId::from("A1234BC").as_u64(), None);
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&SourceId::from(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceId::from(42));
    }
}
