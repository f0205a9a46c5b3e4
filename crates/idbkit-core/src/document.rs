//! Documents and typed record conversion

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A stored record: any structured value that holds its key at the table's key path.
pub type Document = serde_json::Value;

/// Convert a typed record into a document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    Ok(serde_json::to_value(record)?)
}

/// Convert a document back into a typed record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn test_typed_conversion() {
        let item = Item {
            id: 1,
            name: "a".into(),
        };
        let doc = to_document(&item).unwrap();
        assert_eq!(doc, json!({"id": 1, "name": "a"}));
        assert_eq!(from_document::<Item>(doc).unwrap(), item);
    }

    #[test]
    fn test_shape_mismatch() {
        let result = from_document::<Item>(json!({"id": "x"}));
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
