//! Per-entity comparison rules.
//!
//! A [`DiffSchema`] lists the fields worth comparing for one entity type.
//! Scalars carry a [`Normalizer`]; child collections carry the
//! [`CorrelationKey`] used to pair children across the two systems, which
//! is domain knowledge (a hearing date, a charge reference) and cannot be
//! guessed generically. Schemas deserialize from configuration.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DiffError, DiffResult};

/// Comparison rules for one entity type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSchema {
    /// Path prefix for reported properties, e.g. `case`.
    #[serde(default)]
    pub root: String,
    pub fields: Vec<FieldRule>,
}

impl DiffSchema {
    pub fn new(root: impl Into<String>, fields: Vec<FieldRule>) -> Self {
        Self {
            root: root.into(),
            fields,
        }
    }

    /// Check names are unique per level and every correlation key refers
    /// to a scalar field of the child.
    pub fn validate(&self) -> DiffResult<()> {
        validate_fields(&self.fields, if self.root.is_empty() { "<root>" } else { &self.root })
    }
}

fn validate_fields(fields: &[FieldRule], at: &str) -> DiffResult<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(DiffError::InvalidSchema(format!("blank field name under {at}")));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(DiffError::InvalidSchema(format!(
                "duplicate field {} under {at}",
                field.name
            )));
        }
        let path = format!("{at}.{}", field.name);
        match &field.kind {
            FieldKind::Scalar { normalize } => normalize.validate(&path)?,
            FieldKind::Object { fields } => validate_fields(fields, &path)?,
            FieldKind::Collection { key, fields } => {
                if key.0.is_empty() {
                    return Err(DiffError::InvalidSchema(format!(
                        "collection {path} has no correlation key"
                    )));
                }
                for key_field in &key.0 {
                    let is_scalar = fields.iter().any(|f| {
                        &f.name == key_field && matches!(f.kind, FieldKind::Scalar { .. })
                    });
                    if !is_scalar {
                        return Err(DiffError::InvalidSchema(format!(
                            "correlation key {key_field} of {path} is not a scalar field of the child"
                        )));
                    }
                }
                validate_fields(fields, &path)?;
            }
        }
    }
    Ok(())
}

/// One compared field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldRule {
    pub fn scalar(name: impl Into<String>, normalize: Normalizer) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar { normalize },
        }
    }

    pub fn object(name: impl Into<String>, fields: Vec<FieldRule>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Object { fields },
        }
    }

    pub fn collection(name: impl Into<String>, key: CorrelationKey, fields: Vec<FieldRule>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Collection { key, fields },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        #[serde(default)]
        normalize: Normalizer,
    },
    /// A nested single object compared field by field.
    Object { fields: Vec<FieldRule> },
    /// A child list paired up by `key`, never by position.
    Collection {
        key: CorrelationKey,
        fields: Vec<FieldRule>,
    },
}

/// Child fields whose normalized values identify a child across systems.
///
/// Keys need not be unique: several charges may legitimately share one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(pub Vec<String>);

impl CorrelationKey {
    pub fn on<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

/// How a scalar is normalized before comparison.
///
/// The same normalization is applied to both sides, which keeps the differ
/// reflexive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Normalizer {
    /// Compare JSON values as they are. Absent equals `null`.
    #[default]
    Exact,
    /// Boolean where absent or `null` means `false`; accepts `Y`/`N` style codes.
    Flag,
    /// Enumerated code; `aliases` map either vocabulary onto a shared one.
    Code {
        #[serde(default)]
        aliases: BTreeMap<String, String>,
    },
    /// Date or date-time, compared on the calendar date only.
    Date,
    /// Monetary amount compared at `scale` decimal places.
    Money { scale: u32 },
    /// Free text; absent equals empty.
    Text {
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default = "default_trim")]
        trim: bool,
    },
}

fn default_trim() -> bool {
    true
}

const MAX_MONEY_SCALE: u32 = 12;

impl Normalizer {
    pub fn code<I, K, V>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Code {
            aliases: aliases
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn text() -> Self {
        Self::Text {
            case_insensitive: false,
            trim: true,
        }
    }

    fn validate(&self, path: &str) -> DiffResult<()> {
        match self {
            Self::Money { scale } if *scale > MAX_MONEY_SCALE => Err(DiffError::InvalidSchema(
                format!("money scale {scale} at {path} exceeds {MAX_MONEY_SCALE}"),
            )),
            _ => Ok(()),
        }
    }

    /// Normalize a possibly absent value.
    pub fn apply(&self, value: Option<&Value>) -> Value {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Self::Exact => value.clone(),
            Self::Flag => normalize_flag(value),
            Self::Code { aliases } => match value {
                Value::String(s) => {
                    let code = s.trim();
                    Value::String(aliases.get(code).map_or(code, String::as_str).to_string())
                }
                Value::Number(n) => {
                    let code = n.to_string();
                    Value::String(aliases.get(&code).cloned().unwrap_or(code))
                }
                other => other.clone(),
            },
            Self::Date => match value {
                Value::String(s) => parse_date(s).map_or_else(
                    || value.clone(),
                    |d| Value::String(d.format("%Y-%m-%d").to_string()),
                ),
                other => other.clone(),
            },
            Self::Money { scale } => {
                let amount = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match amount {
                    Some(a) => {
                        let factor = 10f64.powi(*scale as i32);
                        Value::from((a * factor).round() as i64)
                    }
                    None => value.clone(),
                }
            }
            Self::Text {
                case_insensitive,
                trim,
            } => match value {
                Value::Null => Value::String(String::new()),
                Value::String(s) => {
                    let s = if *trim { s.trim() } else { s.as_str() };
                    if *case_insensitive {
                        Value::String(s.to_lowercase())
                    } else {
                        Value::String(s.to_string())
                    }
                }
                other => other.clone(),
            },
        }
    }
}

fn normalize_flag(value: &Value) -> Value {
    match value {
        Value::Null => Value::Bool(false),
        Value::Bool(b) => Value::Bool(*b),
        Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|x| x != 0.0)),
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "" | "N" | "NO" | "FALSE" | "0" => Value::Bool(false),
            "Y" | "YES" | "TRUE" | "1" => Value::Bool(true),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    s.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}
