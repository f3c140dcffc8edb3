//! Identity and lineage carried alongside an event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Identity, timestamp and lineage of one emitted event.
///
/// `correlation_id` groups every event descending from the same root;
/// `causation_id` points at the direct parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Random v4 id
    pub event_id: Uuid,

    /// When the metadata was created
    pub created_at: DateTime<Utc>,

    /// Id of the root of this event's lineage
    pub correlation_id: Option<Uuid>,

    /// Id of the direct parent
    pub causation_id: Option<Uuid>,

    /// Component that emitted the event
    pub source: Option<String>,

    /// Free-form string attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EventMetadata {
    /// Fresh metadata: new id, current time, no lineage
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            correlation_id: None,
            causation_id: None,
            source: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Fresh metadata descending from `parent`.
    ///
    /// The correlation id is inherited, or started at the parent when the
    /// parent is itself a root. The source carries over.
    pub fn caused_by(parent: &EventMetadata) -> Self {
        Self {
            correlation_id: Some(parent.correlation_id.unwrap_or(parent.event_id)),
            causation_id: Some(parent.event_id),
            source: parent.source.clone(),
            ..Self::new()
        }
    }

    /// Override the correlation id
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Set the emitting component
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Whether this event starts a lineage
    pub fn is_root(&self) -> bool {
        self.causation_id.is_none()
    }

    /// Serialize to JSON, e.g. for forwarding alongside a log record
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse metadata previously produced by [`to_json`](Self::to_json)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids() {
        let a = EventMetadata::new();
        let b = EventMetadata::default();
        assert_ne!(a.event_id, b.event_id);
        assert_ne!(a.event_id, Uuid::nil());
        assert!(a.is_root());
        assert!(a.attributes.is_empty());
    }

    #[test]
    fn test_builders() {
        let trace = Uuid::new_v4();
        let meta = EventMetadata::new()
            .with_correlation_id(trace)
            .with_source("billing")
            .with_attribute("region", "eu-west");

        assert_eq!(meta.correlation_id, Some(trace));
        assert_eq!(meta.source.as_deref(), Some("billing"));
        assert_eq!(meta.attribute("region"), Some("eu-west"));
        assert_eq!(meta.attribute("zone"), None);
    }

    #[test]
    fn test_lineage() {
        let root = EventMetadata::new().with_source("orders");
        let child = EventMetadata::caused_by(&root);
        let grandchild = EventMetadata::caused_by(&child);

        assert!(!child.is_root());
        assert_eq!(child.causation_id, Some(root.event_id));
        assert_eq!(child.correlation_id, Some(root.event_id));
        assert_eq!(child.source.as_deref(), Some("orders"));

        assert_eq!(grandchild.causation_id, Some(child.event_id));
        assert_eq!(grandchild.correlation_id, Some(root.event_id));
    }

    #[test]
    fn test_json() {
        let meta = EventMetadata::new().with_source("svc");
        let json = meta.to_json().unwrap();
        assert!(!json.contains("attributes"));
        assert_eq!(EventMetadata::from_json(&json).unwrap(), meta);

        let err = EventMetadata::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
