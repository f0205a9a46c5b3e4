//! Open parameters and table schemas
//!
//! [`OpenOptions`] is the caller-facing configuration: plain strings, buildable in
//! code or parsed from JSON. [`OpenOptions::validate`] turns it into a
//! [`TableSchema`] with parsed key paths, which is what the upgrade step consumes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key_path::KeyPath;

/// Secondary index declaration.
///
/// Deserializes from the compact tuple form `["by_name", "name", false]` as well
/// as from an object `{"name": "by_name", "keyPath": "name", "unique": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexSpecRepr", rename_all = "camelCase")]
pub struct IndexSpec {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexSpecRepr {
    Triple(String, String, bool),
    Pair(String, String),
    Object {
        name: String,
        #[serde(alias = "keyPath")]
        key_path: String,
        #[serde(default)]
        unique: bool,
    },
}

impl From<IndexSpecRepr> for IndexSpec {
    fn from(repr: IndexSpecRepr) -> Self {
        match repr {
            IndexSpecRepr::Triple(name, key_path, unique) => IndexSpec::new(name, key_path, unique),
            IndexSpecRepr::Pair(name, key_path) => IndexSpec::new(name, key_path, false),
            IndexSpecRepr::Object {
                name,
                key_path,
                unique,
            } => IndexSpec::new(name, key_path, unique),
        }
    }
}

/// Parameters for [`open`](crate::facade::open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOptions {
    /// Database name
    pub name: String,
    /// Schema version; raising it triggers the upgrade step
    pub version: u32,
    /// Table created during the upgrade
    pub table: String,
    /// Primary key path of the table
    pub key_path: String,
    /// Secondary indexes, created together with the table
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl OpenOptions {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        table: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            table: table.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    /// Add a secondary index.
    pub fn index(mut self, name: impl Into<String>, key_path: impl Into<String>, unique: bool) -> Self {
        self.indexes.push(IndexSpec::new(name, key_path, unique));
        self
    }

    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    /// Check the options and produce the schema of the table they describe.
    pub fn validate(&self) -> Result<TableSchema> {
        if self.name.is_empty() {
            return Err(Error::InvalidOptions("database name is empty".into()));
        }
        if self.version == 0 {
            return Err(Error::InvalidOptions("version must be at least 1".into()));
        }
        TableSchema::new(&self.table, &self.key_path, &self.indexes)
    }
}

/// Validated index of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub key_path: KeyPath,
    pub unique: bool,
}

/// Validated table description used at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub key_path: KeyPath,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: &str, key_path: &str, indexes: &[IndexSpec]) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidOptions("table name is empty".into()));
        }

        let key_path = parse_path(key_path)?;
        if key_path.is_empty() {
            return Err(Error::InvalidOptions(format!(
                "table '{}' needs a non-empty key path",
                name
            )));
        }

        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(indexes.len());
        for spec in indexes {
            if spec.name.is_empty() {
                return Err(Error::InvalidOptions(format!(
                    "table '{}' has an index without a name",
                    name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::InvalidOptions(format!(
                    "duplicate index '{}' on table '{}'",
                    spec.name, name
                )));
            }
            parsed.push(IndexSchema {
                name: spec.name.clone(),
                key_path: parse_path(&spec.key_path)?,
                unique: spec.unique,
            });
        }

        Ok(Self {
            name: name.to_string(),
            key_path,
            indexes: parsed,
        })
    }
}

fn parse_path(raw: &str) -> Result<KeyPath> {
    KeyPath::parse(raw).map_err(|e| Error::InvalidOptions(e.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tuple_indexes() {
        let options = OpenOptions::from_json(
            r#"{"name":"t","version":1,"table":"items","keyPath":"id","indexes":[["by_name","name",false]]}"#,
        )
        .unwrap();

        assert_eq!(
            options,
            OpenOptions::new("t", 1, "items", "id").index("by_name", "name", false)
        );
    }

    #[test]
    fn test_parse_object_indexes() {
        let options = OpenOptions::from_json(
            r#"{"name":"t","version":2,"table":"items","keyPath":"id",
                "indexes":[{"name":"by_email","keyPath":"contact.email","unique":true},
                           ["by_tag","tag"]]}"#,
        )
        .unwrap();

        assert_eq!(options.indexes[0], IndexSpec::new("by_email", "contact.email", true));
        assert_eq!(options.indexes[1], IndexSpec::new("by_tag", "tag", false));
    }

    #[test]
    fn test_indexes_default_to_empty() {
        let options =
            OpenOptions::from_json(r#"{"name":"t","version":1,"table":"items","keyPath":"id"}"#)
                .unwrap();
        assert!(options.indexes.is_empty());
    }

    #[test]
    fn test_validate() {
        let schema = OpenOptions::new("t", 1, "items", "id")
            .index("by_owner", "meta.owner", false)
            .validate()
            .unwrap();

        assert_eq!(schema.name, "items");
        assert_eq!(schema.key_path.as_str(), "id");
        assert_eq!(schema.indexes[0].key_path.as_str(), "meta.owner");
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let cases = [
            OpenOptions::new("", 1, "items", "id"),
            OpenOptions::new("t", 0, "items", "id"),
            OpenOptions::new("t", 1, "", "id"),
            OpenOptions::new("t", 1, "items", ""),
            OpenOptions::new("t", 1, "items", "a..b"),
            OpenOptions::new("t", 1, "items", "id").index("", "name", false),
            OpenOptions::new("t", 1, "items", "id")
                .index("dup", "a", false)
                .index("dup", "b", false),
        ];

        for options in cases {
            assert!(
                matches!(options.validate(), Err(Error::InvalidOptions(_))),
                "accepted {options:?}"
            );
        }
    }
}
