use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Well-known key carrying the strategy names used to produce a reply.
pub const STRATEGIES_KEY: &str = "strategies";

/// One metadata value. Only these shapes are accepted from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            Self::TextList(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

/// Metadata attached to an assistant message after its content streamed in.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn strategies(&self) -> Option<&[String]> {
        self.get(STRATEGIES_KEY)
            .and_then(MetadataValue::as_text_list)
    }

    /// Merges `patch` into `self`; keys present in both take the patch value.
    pub fn merge(&mut self, patch: Metadata) {
        self.0.extend(patch.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut metadata = Metadata::new();

        for (key, value) in raw {
            match serde_json::from_value::<MetadataValue>(value) {
                Ok(value) => {
                    metadata.0.insert(key, value);
                }
                Err(_) => {
                    tracing::warn!(key = %key, "dropping metadata value with unsupported shape");
                }
            }
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_shapes_are_dropped_while_known_ones_survive() {
        let metadata: Metadata = serde_json::from_str(
            r#"{"strategies":["mentor","mirror"],"score":0.7,"nested":{"a":1},"mixed":[1,"x"]}"#,
        )
        .unwrap();

        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.strategies(),
            Some(&["mentor".to_string(), "mirror".to_string()][..])
        );
        assert_eq!(metadata.get("score"), Some(&MetadataValue::Number(0.7)));
        assert!(metadata.get("nested").is_none());
    }

    #[test]
    fn merge_overwrites_shared_keys() {
        let mut base = Metadata::new()
            .with("mode", "coach")
            .with(STRATEGIES_KEY, vec!["mentor".to_string()]);
        base.merge(Metadata::new().with("mode", "friend"));

        assert_eq!(base.get("mode").and_then(MetadataValue::as_text), Some("friend"));
        assert!(base.strategies().is_some());
    }
}
