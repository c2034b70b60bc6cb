// Request payloads and multipart flattening.
//
// `Payload` is a JSON-like tree that can also hold binary leaves. It encodes
// either as a JSON document or, on request, as a flat list of multipart
// form entries with bracket-qualified keys (`user[address][city]`,
// `tags[0]`).

use std::collections::BTreeSet;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::FetchError;

/// A binary leaf: file contents, blob, or raw byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl Binary {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn file(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: Some(name.into()),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Body of a create/replace call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Binary(Binary),
    List(Vec<Payload>),
    Map(IndexMap<String, Payload>),
}

impl Payload {
    /// Build a payload from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, FetchError> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| FetchError::Encoding {
                message: e.to_string(),
            })
    }

    /// Start an empty map payload.
    pub fn map() -> Self {
        Self::Map(IndexMap::new())
    }

    /// Insert a field into a map payload. No-op on other variants.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        if let Self::Map(ref mut fields) = self {
            fields.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Drop top-level fields whose value is null. Nested maps are untouched.
    pub fn without_nulls(self) -> Self {
        match self {
            Self::Map(fields) => Self::Map(fields.into_iter().filter(|(_, v)| !v.is_null()).collect()),
            other => other,
        }
    }

    /// JSON rendering. Binary leaves become arrays of byte values.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Binary(binary) => {
                Value::Array(binary.bytes.iter().map(|b| Value::from(*b)).collect())
            }
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Text form of a scalar leaf, as a form field would carry it.
    fn leaf_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Null | Self::Binary(_) | Self::List(_) | Self::Map(_) => String::new(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => {
                Self::Map(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Binary> for Payload {
    fn from(value: Binary) -> Self {
        Self::Binary(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

// ── Form flattening ──────────────────────────────────────────────────

/// One value in a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Text(String),
    Binary(Binary),
}

/// A named multipart entry. Names may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormEntry {
    pub name: String,
    pub field: FormField,
}

/// Knobs for [`to_form_entries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormOptions {
    /// Omit null fields instead of sending them as empty strings.
    pub remove_nulls: bool,
    /// Fields whose list elements are sent under the same repeated name
    /// (`files`, `files`, ...) instead of `files[0]`, `files[1]`.
    pub repeated_fields: BTreeSet<String>,
}

/// Flatten a map payload into multipart entries.
///
/// - null fields become `""` unless `remove_nulls` is set
/// - null list elements are always skipped
/// - lists become `key[i]` (or repeated `key` for designated fields)
/// - nested maps become `parent[child]`
/// - binary leaves stay binary; every other leaf is stringified
pub fn to_form_entries(payload: &Payload, options: &FormOptions) -> Result<Vec<FormEntry>, FetchError> {
    let Payload::Map(fields) = payload else {
        return Err(FetchError::Encoding {
            message: "multipart payload must be a map of fields".into(),
        });
    };

    let mut out = Vec::new();
    let encoder = FormEncoder { options };
    encoder.encode_fields(named(fields), None, &mut out);
    Ok(out)
}

type NamedFields<'p> = Vec<(String, &'p Payload)>;

fn named(fields: &IndexMap<String, Payload>) -> NamedFields<'_> {
    fields.iter().map(|(k, v)| (k.clone(), v)).collect()
}

fn indexed(items: &[Payload]) -> NamedFields<'_> {
    items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect()
}

struct FormEncoder<'a> {
    options: &'a FormOptions,
}

impl FormEncoder<'_> {
    fn encode_fields<'p>(
        &self,
        fields: NamedFields<'p>,
        parent: Option<&str>,
        out: &mut Vec<FormEntry>,
    ) {
        for (key, value) in fields {
            let full_key = match parent {
                Some(parent) => format!("{parent}[{key}]"),
                None => key,
            };

            match value {
                Payload::Null => {
                    if !self.options.remove_nulls {
                        push_text(out, full_key, String::new());
                    }
                }
                Payload::List(items) => self.encode_list(&full_key, items, out),
                Payload::Map(children) => {
                    self.encode_fields(named(children), Some(&full_key), out);
                }
                leaf => push_leaf(out, full_key, leaf),
            }
        }
    }

    fn encode_list(&self, key: &str, items: &[Payload], out: &mut Vec<FormEntry>) {
        let repeated = self.options.repeated_fields.contains(key);

        for (index, item) in items.iter().enumerate() {
            if item.is_null() {
                continue;
            }

            let item_key = if repeated {
                key.to_owned()
            } else {
                format!("{key}[{index}]")
            };

            match item {
                Payload::Map(children) => {
                    self.encode_fields(named(children), Some(&item_key), out);
                }
                Payload::List(inner) => self.encode_fields(indexed(inner), Some(&item_key), out),
                leaf => push_leaf(out, item_key, leaf),
            }
        }
    }
}

fn push_leaf(out: &mut Vec<FormEntry>, name: String, leaf: &Payload) {
    let field = match leaf {
        Payload::Binary(binary) => FormField::Binary(binary.clone()),
        other => FormField::Text(other.leaf_text()),
    };
    out.push(FormEntry { name, field });
}

fn push_text(out: &mut Vec<FormEntry>, name: String, text: String) {
    out.push(FormEntry {
        name,
        field: FormField::Text(text),
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn text(name: &str, value: &str) -> FormEntry {
        FormEntry {
            name: name.into(),
            field: FormField::Text(value.into()),
        }
    }

    #[test]
    fn flattens_nested_objects_and_lists() {
        let payload = Payload::from(json!({
            "name": "Shoe",
            "price": 42,
            "active": true,
            "tags": ["red", "sale"],
            "owner": { "id": 7, "address": { "city": "Oslo" } },
            "variants": [{ "size": 40 }, { "size": 41 }]
        }));

        let entries = to_form_entries(&payload, &FormOptions::default()).unwrap();

        let mut names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "active",
                "name",
                "owner[address][city]",
                "owner[id]",
                "price",
                "tags[0]",
                "tags[1]",
                "variants[0][size]",
                "variants[1][size]",
            ]
        );
        assert!(entries.contains(&text("price", "42")));
        assert!(entries.contains(&text("active", "true")));
        assert!(entries.contains(&text("owner[address][city]", "Oslo")));
    }

    #[test]
    fn mixed_nesting_keeps_bracket_paths() {
        let payload = Payload::from(json!({
            "grid": [[1, 2], [3]],
            "orders": [{ "lines": [{ "sku": "a" }, { "sku": "b", "tags": ["x"] }] }]
        }));

        let entries = to_form_entries(&payload, &FormOptions::default()).unwrap();
        assert_eq!(
            entries,
            vec![
                text("grid[0][0]", "1"),
                text("grid[0][1]", "2"),
                text("grid[1][0]", "3"),
                text("orders[0][lines][0][sku]", "a"),
                text("orders[0][lines][1][sku]", "b"),
                text("orders[0][lines][1][tags][0]", "x"),
            ]
        );
    }

    #[test]
    fn null_fields_become_empty_or_are_removed() {
        let payload = Payload::map()
            .with("keep", "x")
            .with("gone", Payload::Null)
            .with("list", vec![Some("a"), None, Some("c")]);

        let entries = to_form_entries(&payload, &FormOptions::default()).unwrap();
        assert_eq!(
            entries,
            vec![
                text("keep", "x"),
                text("gone", ""),
                text("list[0]", "a"),
                text("list[2]", "c"),
            ]
        );

        let options = FormOptions {
            remove_nulls: true,
            ..FormOptions::default()
        };
        let entries = to_form_entries(&payload, &options).unwrap();
        assert_eq!(
            entries,
            vec![text("keep", "x"), text("list[0]", "a"), text("list[2]", "c")]
        );
    }

    #[test]
    fn binary_leaves_stay_binary() {
        let avatar = Binary::file("a.png", vec![1u8, 2, 3]).with_content_type("image/png");
        let payload = Payload::map().with("avatar", avatar.clone());

        let entries = to_form_entries(&payload, &FormOptions::default()).unwrap();
        assert_eq!(
            entries,
            vec![FormEntry {
                name: "avatar".into(),
                field: FormField::Binary(avatar),
            }]
        );
    }

    #[test]
    fn repeated_fields_share_a_name() {
        let payload = Payload::map().with(
            "files",
            vec![Binary::new(vec![1u8]), Binary::new(vec![2u8])],
        );
        let options = FormOptions {
            repeated_fields: BTreeSet::from(["files".to_owned()]),
            ..FormOptions::default()
        };

        let entries = to_form_entries(&payload, &options).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.name == "files"));
    }

    #[test]
    fn non_map_payload_is_rejected() {
        let err = to_form_entries(&Payload::from("plain"), &FormOptions::default());
        assert!(matches!(err, Err(FetchError::Encoding { .. })));
    }

    #[test]
    fn shallow_null_filter_keeps_nested_nulls() {
        let payload = Payload::from(json!({ "a": null, "b": { "c": null }, "d": 1 }));
        assert_eq!(payload.without_nulls().to_json(), json!({ "b": { "c": null }, "d": 1 }));
    }
}
