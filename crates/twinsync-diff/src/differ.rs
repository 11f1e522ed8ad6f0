//! The structural diff algorithm.
//!
//! Fields are visited in schema order, so differences come out
//! first-found-first-reported. Child collections are handled in two steps:
//!
//! 1. If the two sides hold a different number of children, one count
//!    difference is reported at the collection path and nothing below it.
//! 2. Otherwise children are sorted on (correlation key, normalized content,
//!    raw content) and paired: identical children first, then children with
//!    the same key, then whatever is left in sorted order. Indices in
//!    reported paths refer to the source side's sorted position, so input
//!    order never shows up in the output.

use serde_json::{Map, Value};

use crate::difference::Difference;
use crate::error::{DiffError, DiffResult};
use crate::schema::{CorrelationKey, DiffSchema, FieldKind, FieldRule};

/// Runs a [`DiffSchema`] over pairs of documents.
#[derive(Clone, Debug)]
pub struct Differ {
    schema: DiffSchema,
}

impl Differ {
    pub fn new(schema: DiffSchema) -> DiffResult<Self> {
        schema.validate()?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &DiffSchema {
        &self.schema
    }

    /// Compare the source and target representations of one entity.
    pub fn diff(&self, source: &Value, target: &Value) -> DiffResult<Vec<Difference>> {
        let root = self.schema.root.as_str();
        let source = as_object(source, root)?;
        let target = as_object(target, root)?;
        let mut out = Vec::new();
        diff_fields(&self.schema.fields, source, target, root, None, &mut out)?;
        Ok(out)
    }
}

/// Compare two documents under `schema` without keeping a [`Differ`] around.
pub fn diff(schema: &DiffSchema, source: &Value, target: &Value) -> DiffResult<Vec<Difference>> {
    Differ::new(schema.clone())?.diff(source, target)
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> DiffResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| DiffError::UnexpectedShape {
        path: path.to_string(),
        expected: "object",
        actual: kind_of(value),
    })
}

/// Absent and `null` collections are empty.
fn as_children<'a>(value: Option<&'a Value>, path: &str) -> DiffResult<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(DiffError::UnexpectedShape {
            path: path.to_string(),
            expected: "array",
            actual: kind_of(other),
        }),
    }
}

fn diff_fields(
    fields: &[FieldRule],
    source: &Map<String, Value>,
    target: &Map<String, Value>,
    path: &str,
    id: Option<&str>,
    out: &mut Vec<Difference>,
) -> DiffResult<()> {
    for field in fields {
        let field_path = join(path, &field.name);
        let s = source.get(&field.name);
        let t = target.get(&field.name);
        match &field.kind {
            FieldKind::Scalar { normalize } => {
                if normalize.apply(s) != normalize.apply(t) {
                    out.push(
                        Difference::new(
                            field_path,
                            s.cloned().unwrap_or(Value::Null),
                            t.cloned().unwrap_or(Value::Null),
                        )
                        .with_id(id.map(str::to_string)),
                    );
                }
            }
            FieldKind::Object { fields } => match (non_null(s), non_null(t)) {
                (None, None) => {}
                (Some(sv), Some(tv)) => {
                    let so = as_object(sv, &field_path)?;
                    let to = as_object(tv, &field_path)?;
                    diff_fields(fields, so, to, &field_path, id, out)?;
                }
                _ => out.push(
                    Difference::new(
                        field_path,
                        s.cloned().unwrap_or(Value::Null),
                        t.cloned().unwrap_or(Value::Null),
                    )
                    .with_id(id.map(str::to_string)),
                ),
            },
            FieldKind::Collection { key, fields } => {
                let sc = as_children(s, &field_path)?;
                let tc = as_children(t, &field_path)?;
                if sc.len() != tc.len() {
                    out.push(
                        Difference::count(field_path, sc.len(), tc.len())
                            .with_id(id.map(str::to_string)),
                    );
                    continue;
                }
                diff_collection(key, fields, sc, tc, &field_path, out)?;
            }
        }
    }
    Ok(())
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// A child prepared for alignment.
struct Child<'a> {
    key: String,
    canonical: String,
    raw: String,
    value: &'a Map<String, Value>,
}

fn prepare<'a>(
    key: &CorrelationKey,
    fields: &[FieldRule],
    items: &'a [Value],
    path: &str,
) -> DiffResult<Vec<Child<'a>>> {
    let mut children = items
        .iter()
        .map(|item| -> DiffResult<Child<'a>> {
            let value = as_object(item, path)?;
            Ok(Child {
                key: key_of(key, fields, value),
                canonical: canonical(fields, value, path)?.to_string(),
                raw: item.to_string(),
                value,
            })
        })
        .collect::<DiffResult<Vec<_>>>()?;
    children.sort_by(|a, b| {
        (&a.key, &a.canonical, &a.raw).cmp(&(&b.key, &b.canonical, &b.raw))
    });
    Ok(children)
}

fn key_of(key: &CorrelationKey, fields: &[FieldRule], child: &Map<String, Value>) -> String {
    key.fields()
        .iter()
        .map(|name| {
            let normalized = fields
                .iter()
                .find_map(|f| match &f.kind {
                    FieldKind::Scalar { normalize } if &f.name == name => {
                        Some(normalize.apply(child.get(name)))
                    }
                    _ => None,
                })
                .unwrap_or_else(|| child.get(name).cloned().unwrap_or(Value::Null));
            match normalized {
                Value::String(s) => s,
                other => other.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Normalized projection of a document onto its schema, with child
/// collections in sorted order. Two documents with equal projections
/// produce no differences.
fn canonical(fields: &[FieldRule], value: &Map<String, Value>, path: &str) -> DiffResult<Value> {
    let mut out = Map::new();
    for field in fields {
        let field_path = join(path, &field.name);
        let v = value.get(&field.name);
        let projected = match &field.kind {
            FieldKind::Scalar { normalize } => normalize.apply(v),
            FieldKind::Object { fields } => match non_null(v) {
                None => Value::Null,
                Some(inner) => canonical(fields, as_object(inner, &field_path)?, &field_path)?,
            },
            FieldKind::Collection { key, fields } => {
                let mut children = as_children(v, &field_path)?
                    .iter()
                    .map(|c| -> DiffResult<(String, String)> {
                        let obj = as_object(c, &field_path)?;
                        Ok((key_of(key, fields, obj), canonical(fields, obj, &field_path)?.to_string()))
                    })
                    .collect::<DiffResult<Vec<(String, String)>>>()?;
                children.sort();
                Value::Array(
                    children
                        .into_iter()
                        .map(|(_, c)| Value::String(c))
                        .collect(),
                )
            }
        };
        out.insert(field.name.clone(), projected);
    }
    Ok(Value::Object(out))
}

fn diff_collection(
    key: &CorrelationKey,
    fields: &[FieldRule],
    source: &[Value],
    target: &[Value],
    path: &str,
    out: &mut Vec<Difference>,
) -> DiffResult<()> {
    let source = prepare(key, fields, source, path)?;
    let target = prepare(key, fields, target, path)?;

    let mut paired: Vec<Option<usize>> = vec![None; source.len()];
    let mut taken = vec![false; target.len()];

    // Identical children first, then children sharing a key.
    let passes: [fn(&Child<'_>, &Child<'_>) -> bool; 2] = [
        |s, t| s.key == t.key && s.canonical == t.canonical,
        |s, t| s.key == t.key,
    ];
    for matches in passes {
        for (i, s) in source.iter().enumerate() {
            if paired[i].is_some() {
                continue;
            }
            if let Some(j) = (0..target.len()).find(|&j| !taken[j] && matches(s, &target[j])) {
                paired[i] = Some(j);
                taken[j] = true;
            }
        }
    }

    // Leftovers pair up in sorted order.
    let mut leftovers = (0..target.len()).filter(|&j| !taken[j]);
    for slot in paired.iter_mut().filter(|p| p.is_none()) {
        *slot = leftovers.next();
    }

    for (i, j) in paired.into_iter().enumerate() {
        let Some(j) = j else { continue };
        let (s, t) = (&source[i], &target[j]);
        if s.canonical == t.canonical {
            continue;
        }
        let child_path = format!("{path}[{i}]");
        let id = (!s.key.is_empty()).then_some(s.key.as_str());
        diff_fields(fields, s.value, t.value, &child_path, id, out)?;
    }
    Ok(())
}
