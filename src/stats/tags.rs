//! Tag values and the tag context a measurement is recorded under.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of one tag dimension, as it appears in an aggregation key.
///
/// A tag key that is absent from the recording context resolves to
/// [`TagValue::UNKNOWN`], which is distinct from every real value
/// (including the empty string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagValue(Option<String>);

impl TagValue {
    /// The "no value" sentinel used for keys missing from a context
    pub const UNKNOWN: TagValue = TagValue(None);

    pub fn new(value: impl Into<String>) -> Self {
        TagValue(Some(value.into()))
    }

    /// The string value, or `None` for the sentinel
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_none()
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::new(value)
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::new(value)
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => f.write_str(value),
            None => f.write_str("<unknown>"),
        }
    }
}

/// Ordered tuple of tag values; the key of an aggregation map.
pub type TagTuple = Vec<TagValue>;

/// The set of tags (key-value pairs) active when a measurement is recorded.
/// Keys are kept sorted so iteration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagContext {
    tags: BTreeMap<String, String>,
}

impl TagContext {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        TagContext { tags }
    }

    pub fn empty() -> Self {
        TagContext {
            tags: BTreeMap::new(),
        }
    }

    /// Create a context from a slice of (key, value) tuples
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let tags = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TagContext { tags }
    }

    /// Parse tags from "key:value,key2:value2" format. Malformed pairs are skipped.
    pub fn parse(s: &str) -> Self {
        let tags = s
            .split(',')
            .filter_map(|pair| {
                let (key, value) = pair.split_once(':')?;
                let (key, value) = (key.trim(), value.trim());
                if key.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((key.to_string(), value.to_string()))
                }
            })
            .collect();
        TagContext { tags }
    }

    /// Add or replace a tag, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Project this context onto an ordered list of tag keys.
    ///
    /// Keys missing from the context become [`TagValue::UNKNOWN`]; tags not
    /// named in `keys` are dropped.
    pub fn project(&self, keys: &[String]) -> TagTuple {
        keys.iter()
            .map(|key| match self.tags.get(key) {
                Some(value) => TagValue::new(value.as_str()),
                None => TagValue::UNKNOWN,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let tags = TagContext::from_pairs(&[("method", "GET"), ("status", "200")]);
        assert_eq!(tags.get("method"), Some("GET"));
        assert_eq!(tags.get("status"), Some("200"));
        assert_eq!(tags.get("missing"), None);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_context_parsing() {
        let tags = TagContext::parse("method:GET, status:200,broken,:empty,k:");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("method"), Some("GET"));
        assert_eq!(tags.get("status"), Some("200"));
        assert!(TagContext::parse("").is_empty());
    }

    #[test]
    fn test_projection_order_and_missing_keys() {
        let tags = TagContext::empty()
            .with("status", "500")
            .with("method", "POST")
            .with("host", "web01");
        let keys = vec!["method".to_string(), "route".to_string(), "status".to_string()];
        assert_eq!(
            tags.project(&keys),
            vec![TagValue::new("POST"), TagValue::UNKNOWN, TagValue::new("500")]
        );
        assert!(tags.project(&[]).is_empty());
    }

    #[test]
    fn test_unknown_differs_from_empty_string() {
        assert_ne!(TagValue::UNKNOWN, TagValue::new(""));
        assert!(TagValue::UNKNOWN.is_unknown());
        assert_eq!(TagValue::new("x").as_str(), Some("x"));
        assert_eq!(TagValue::UNKNOWN.to_string(), "<unknown>");
    }
}
