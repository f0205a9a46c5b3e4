//! Key paths: dotted property paths that locate a key inside a document

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::EngineError;
use crate::key::Key;

/// A parsed key path such as `"id"` or `"meta.owner"`.
///
/// The empty path refers to the document itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        if raw.is_empty() {
            return Ok(Self {
                raw: String::new(),
                segments: Vec::new(),
            });
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if let Some(bad) = segments.iter().find(|s| !is_identifier(s)) {
            return Err(EngineError::new(
                "SyntaxError",
                format!("invalid key path '{}': bad segment '{}'", raw, bad),
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Evaluate the path against a document. Returns `None` when a segment is
    /// missing or the value found is not a valid key.
    pub fn extract(&self, doc: &Value) -> Option<Key> {
        let mut current = doc;
        for segment in &self.segments {
            current = current.as_object()?.get(segment)?;
        }
        Key::from_value(current).ok()
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KeyPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        KeyPath::parse(&raw).map_err(|e| de::Error::custom(e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        assert!(KeyPath::parse("id").is_ok());
        assert!(KeyPath::parse("meta.owner_id").is_ok());
        assert!(KeyPath::parse("$ref").is_ok());
        assert!(KeyPath::parse("").unwrap().is_empty());

        for bad in ["a..b", ".a", "a.", "1abc", "a-b", "a b"] {
            assert!(KeyPath::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_extract() {
        let doc = json!({"id": 1, "meta": {"owner": "alice"}, "flag": true});

        assert_eq!(KeyPath::parse("id").unwrap().extract(&doc), Some(Key::from(1)));
        assert_eq!(
            KeyPath::parse("meta.owner").unwrap().extract(&doc),
            Some(Key::from("alice"))
        );
        assert_eq!(KeyPath::parse("missing").unwrap().extract(&doc), None);
        assert_eq!(KeyPath::parse("id.deeper").unwrap().extract(&doc), None);
        assert_eq!(KeyPath::parse("flag").unwrap().extract(&doc), None);
    }

    #[test]
    fn test_empty_path_is_the_value() {
        let path = KeyPath::parse("").unwrap();
        assert_eq!(path.extract(&json!("plain")), Some(Key::from("plain")));
        assert_eq!(path.extract(&json!({"id": 1})), None);
    }
}
