//! In-memory representation of checkpoint state shared by all backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, StateError};
use crate::key::CheckpointKey;

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

/// One checkpointed value together with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    #[serde(flatten)]
    pub key: CheckpointKey,
    pub value: Value,
}

/// Complete checkpoint state: completed steps plus keyed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Last time the document was modified
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Step names marked completed
    #[serde(default)]
    pub completed: BTreeSet<String>,

    /// Keyed values, stored as a list so composite keys survive JSON
    #[serde(default, with = "entries_serde")]
    pub values: BTreeMap<CheckpointKey, Value>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl StateDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Default::default()
        }
    }

    /// Decode a document, treating empty input as empty state.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let doc: StateDocument = serde_json::from_slice(bytes)?;
        if doc.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion(doc.version));
        }
        Ok(doc)
    }

    /// Encode as pretty JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Record a modification.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// All entries in key order.
    pub fn entries(&self) -> Vec<CheckpointEntry> {
        self.values
            .iter()
            .map(|(key, value)| CheckpointEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Point-in-time copy of a store's contents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateSnapshot {
    pub backend: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed: Vec<String>,
    pub values: Vec<CheckpointEntry>,
}

impl StateSnapshot {
    pub(crate) fn from_document(backend: &'static str, doc: &StateDocument) -> Self {
        Self {
            backend,
            updated_at: doc.updated_at,
            completed: doc.completed.iter().cloned().collect(),
            values: doc.entries(),
        }
    }
}

// Serde helper: BTreeMap<CheckpointKey, Value> <-> [CheckpointEntry]
mod entries_serde {
    use super::{CheckpointEntry, CheckpointKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<CheckpointKey, Value>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<CheckpointEntry> = map
            .iter()
            .map(|(key, value)| CheckpointEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<CheckpointKey, Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<CheckpointEntry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_input_is_empty_state() {
        let doc = StateDocument::from_slice(b"").unwrap();
        assert!(doc.completed.is_empty());
        assert!(doc.values.is_empty());

        let doc = StateDocument::from_slice(b"  \n").unwrap();
        assert_eq!(doc.version, STATE_VERSION);
    }

    #[test]
    fn test_json_layout() {
        let mut doc = StateDocument::new();
        doc.completed.insert("preflight".to_string());
        doc.values.insert(
            CheckpointKey::new("replica_upgrade", "r1", "stopped"),
            json!(true),
        );

        let value: Value = serde_json::from_slice(&doc.to_vec().unwrap()).unwrap();
        assert_eq!(value["completed"], json!(["preflight"]));
        assert_eq!(
            value["values"][0],
            json!({"scope": "replica_upgrade", "entity": "r1", "field": "stopped", "value": true})
        );
    }

    #[test]
    fn test_rejects_future_version() {
        let err = StateDocument::from_slice(br#"{"version": 99}"#).unwrap_err();
        assert!(matches!(err, StateError::UnsupportedVersion(99)));
    }
}
