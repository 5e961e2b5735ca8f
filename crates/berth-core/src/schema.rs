//! Named JSON schema documents shipped alongside a cluster spec.
//!
//! Schemas are loaded and kept by file name; enforcing them is left to
//! external tooling.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};

const SCHEMA_SUFFIX: &str = ".schema.json";

#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    documents: BTreeMap<String, serde_json::Value>,
}

impl SchemaSet {
    /// Load every `*.schema.json` directly inside `dir`.
    pub fn load_dir(dir: &Path) -> CoreResult<Self> {
        let mut documents = BTreeMap::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CoreError::Read {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !entry.file_type().is_file() || !name.ends_with(SCHEMA_SUFFIX) {
                continue;
            }

            let path = entry.path();
            let content = std::fs::read_to_string(path).map_err(|source| CoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let doc = serde_json::from_str(&content).map_err(|source| CoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            documents.insert(name.to_string(), doc);
        }

        Ok(Self { documents })
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.documents.get(name)
    }

    /// Schema file names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_only_schema_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("node.schema.json"), r#"{"type":"object"}"#).unwrap();
        std::fs::write(dir.path().join("cluster.schema.json"), r#"{"type":"object"}"#).unwrap();
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/extra.schema.json"), "{}").unwrap();

        let set = SchemaSet::load_dir(dir.path()).unwrap();
        assert_eq!(
            set.names().collect::<Vec<_>>(),
            vec!["cluster.schema.json", "node.schema.json"]
        );
        assert_eq!(set.get("node.schema.json").unwrap()["type"], "object");
    }

    #[test]
    fn invalid_schema_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.schema.json"), "{ nope").unwrap();
        let err = SchemaSet::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Json { .. }));
    }
}
