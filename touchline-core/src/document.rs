//! Opaque provider response documents.
//!
//! The pipeline never interprets payloads beyond the envelope the provider
//! wraps around them: an `errors` field, a `response` field holding the
//! items, and an optional `paging` object. Everything else is passed through
//! to the sink untouched.

use std::{fmt, slice};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded JSON response from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

/// One provider-reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIssue {
    /// Field the provider attached the message to, when it used a map.
    pub field: Option<String>,
    /// Provider message.
    pub message: String,
}

impl fmt::Display for ProviderIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Pagination metadata reported alongside a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// One-based index of the page just returned.
    pub current: u32,
    /// Total number of pages available.
    pub total: u32,
}

impl Paging {
    /// Whether further pages follow this one.
    #[must_use]
    pub const fn has_more(self) -> bool {
        self.current < self.total
    }
}

impl Document {
    /// Wrap an already-decoded JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Decode a document from raw response bytes.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not valid JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Errors the provider embedded in an otherwise successful response.
    ///
    /// The provider reports errors as a list, as a map of field to message,
    /// or as a single `error` string. Empty lists and maps mean success.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use touchline_core::Document;
    ///
    /// let doc = Document::new(json!({"errors": {"token": "invalid key"}, "response": []}));
    /// let issues = doc.errors();
    /// assert_eq!(issues.len(), 1);
    /// assert_eq!(issues[0].to_string(), "token: invalid key");
    /// ```
    #[must_use]
    pub fn errors(&self) -> Vec<ProviderIssue> {
        let mut issues = Vec::new();
        match self.0.get("errors") {
            Some(Value::Array(list)) => {
                issues.extend(list.iter().map(|entry| ProviderIssue {
                    field: None,
                    message: render(entry),
                }));
            }
            Some(Value::Object(map)) => {
                issues.extend(map.iter().map(|(field, entry)| ProviderIssue {
                    field: Some(field.clone()),
                    message: render(entry),
                }));
            }
            Some(Value::Null | Value::Bool(false)) | None => {}
            Some(other) => issues.push(ProviderIssue {
                field: None,
                message: render(other),
            }),
        }
        if let Some(error) = self.0.get("error").filter(|value| is_present(value)) {
            issues.push(ProviderIssue {
                field: None,
                message: render(error),
            });
        }
        issues
    }

    /// The `response` payload, if present.
    #[must_use]
    pub fn response(&self) -> Option<&Value> {
        self.0.get("response")
    }

    /// Items carried in `response`.
    ///
    /// Arrays yield their elements, a single object yields itself, and
    /// anything else yields nothing.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        match self.response() {
            Some(Value::Array(items)) => items,
            Some(item @ Value::Object(_)) => slice::from_ref(item),
            _ => &[],
        }
    }

    /// Pagination metadata, when the provider reports it.
    #[must_use]
    pub fn paging(&self) -> Option<Paging> {
        let paging = self.0.get("paging")?;
        let current = paging.get("current").and_then(as_u32)?;
        let total = paging.get("total").and_then(as_u32)?;
        Some(Paging { current, total })
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Follow `path` through nested objects and read an integer identifier.
///
/// Identifiers encoded as numeric strings are accepted too.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use touchline_core::document::lookup_id;
///
/// let item = json!({"team": {"id": 42, "name": "Arsenal"}});
/// assert_eq!(lookup_id(&item, &["team", "id"]), Some(42));
/// assert_eq!(lookup_id(&item, &["fixture", "id"]), None);
/// ```
#[must_use]
pub fn lookup_id(value: &Value, path: &[&str]) -> Option<i64> {
    let target = path
        .iter()
        .try_fold(value, |node, segment| node.get(*segment))?;
    match target {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(list) => !list.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"errors": [], "response": []}), 0)]
    #[case(json!({"errors": {}, "response": []}), 0)]
    #[case(json!({"errors": ["rate limit"], "response": []}), 1)]
    #[case(json!({"errors": {"requests": "limit", "token": "bad"}}), 2)]
    #[case(json!({"error": "boom"}), 1)]
    #[case(json!({"error": ""}), 0)]
    #[case(json!({"response": []}), 0)]
    fn counts_embedded_errors(#[case] body: Value, #[case] expected: usize) {
        assert_eq!(Document::new(body).errors().len(), expected);
    }

    #[rstest]
    fn single_object_response_is_one_item() {
        let doc = Document::new(json!({"response": {"league": {"id": 39}}}));
        assert_eq!(doc.items().len(), 1);
    }

    #[rstest]
    fn missing_response_has_no_items() {
        let doc = Document::new(json!({"errors": []}));
        assert!(doc.items().is_empty());
    }

    #[rstest]
    fn reads_paging() {
        let doc = Document::new(json!({"paging": {"current": 1, "total": 3}}));
        let paging = doc.paging().expect("paging present");
        assert_eq!(paging, Paging { current: 1, total: 3 });
        assert!(paging.has_more());
    }

    #[rstest]
    #[case(json!({"id": "17"}), Some(17))]
    #[case(json!({"id": null}), None)]
    #[case(json!({"id": 1.5}), None)]
    fn lookup_id_handles_encodings(#[case] item: Value, #[case] expected: Option<i64>) {
        assert_eq!(lookup_id(&item, &["id"]), expected);
    }
}
