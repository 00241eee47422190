//! Input document model for the permission compiler.
//!
//! Only the parts of an OpenAPI document that carry authorization data are
//! modeled. Mapping order is significant (it drives table and role order), so
//! maps are read into [`OrderedMap`], which keeps document order and rejects
//! duplicate keys.

use crate::error::{Error, Result};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// Source format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Picks a format from a file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Map that preserves document order and rejects duplicate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for OrderedMapVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping with unique string keys")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = HashSet::new();
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key {key:?}")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Security requirement: scheme name -> required roles.
pub type SecurityRequirement = OrderedMap<Vec<String>>;

/// Top-level API document.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDocument {
    pub paths: OrderedMap<PathItem>,
}

/// Operations declared for a single path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    pub get: Option<Operation>,
    pub post: Option<Operation>,
    pub put: Option<Operation>,
    pub delete: Option<Operation>,
    pub patch: Option<Operation>,
}

/// A single API operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub security: Option<Vec<SecurityRequirement>>,
}

impl PathItem {
    /// Operation declared for `method`, if any.
    pub fn operation(&self, method: crate::types::HttpMethod) -> Option<&Operation> {
        use crate::types::HttpMethod;
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
        }
    }
}

impl ApiDocument {
    /// Parses a document from text.
    pub fn parse(source: &str, format: DocumentFormat) -> Result<Self> {
        let document: Self = match format {
            DocumentFormat::Yaml => serde_yaml::from_str(source)?,
            DocumentFormat::Json => serde_json::from_str(source)?,
        };
        Ok(document)
    }

    /// Reads and parses a document; the format follows the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::parse(&source, DocumentFormat::from_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;

    #[test]
    fn keeps_path_order() {
        let doc = ApiDocument::parse(
            "paths:\n  /b:\n    get: {}\n  /a:\n    get: {}\n  /c:\n    post: {}\n",
            DocumentFormat::Yaml,
        )
        .unwrap();
        let keys: Vec<&str> = doc.paths.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["/b", "/a", "/c"]);
    }

    #[test]
    fn ignores_unknown_fields() {
        let doc = ApiDocument::parse(
            r#"{"openapi":"3.0.0","paths":{"/users":{"parameters":[],"get":{"responses":{}}}}}"#,
            DocumentFormat::Json,
        )
        .unwrap();
        let (_, item) = doc.paths.iter().next().unwrap();
        assert!(item.operation(HttpMethod::Get).is_some());
        assert!(item.operation(HttpMethod::Post).is_none());
    }

    #[test]
    fn rejects_duplicate_keys() {
        let result = ApiDocument::parse(
            r#"{"paths":{"/users":{"get":{}},"/users":{"post":{}}}}"#,
            DocumentFormat::Json,
        );
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn rejects_missing_paths() {
        let result = ApiDocument::parse("openapi: 3.0.0\n", DocumentFormat::Yaml);
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn rejects_malformed_security() {
        let result = ApiDocument::parse(
            "paths:\n  /users:\n    get:\n      security: admin\n",
            DocumentFormat::Yaml,
        );
        assert!(result.is_err());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("api.JSON")),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("openapi.yaml")),
            DocumentFormat::Yaml
        );
    }
}
