//! Inter-view hand-off of the grading result.
//! Two tiers: a durable JSON file is preferred, with an in-memory
//! session tier as fallback when the durable tier cannot be written.
//! Consumers try the structured key first, then the legacy bare-string
//! key, and clear everything once they have rendered successfully.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::HandoffConfig;

pub const STRUCTURED_KEY: &str = "fixMyMailData";
pub const LEGACY_KEY: &str = "taggedText";

/// Structured hand-off payload stored under `fixMyMailData`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HandoffPayload {
    #[serde(rename = "fullOriginalText", skip_serializing_if = "Option::is_none", default)]
    pub full_original_text: Option<String>,
    #[serde(rename = "fullOriginalHTML", skip_serializing_if = "Option::is_none", default)]
    pub full_original_html: Option<String>,
    #[serde(rename = "taggedContent", default)]
    pub tagged_content: String,
    /// Set when the payload was parked server-side because it exceeded the
    /// local size budget.
    #[serde(rename = "storeId", skip_serializing_if = "Option::is_none", default)]
    pub store_id: Option<String>,
}

/// Two-tier key-value store for the hand-off keys.
pub struct HandoffStore {
    durable_path: PathBuf,
    session: HashMap<String, String>,
}

impl HandoffStore {
    pub fn new(config: &HandoffConfig) -> Self {
        let durable_path = config
            .durable_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mailgrader-handoff.json"));
        Self {
            durable_path,
            session: HashMap::new(),
        }
    }

    fn read_durable(&self) -> HashMap<String, String> {
        fs::read_to_string(&self.durable_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn write_durable(&self, map: &HashMap<String, String>) -> std::io::Result<()> {
        let text = serde_json::to_string(map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(&self.durable_path, text)
    }

    /// Stores a key, preferring the durable tier; a durable failure falls
    /// back to the session tier instead of erroring out.
    pub fn put(&mut self, key: &str, value: String) {
        let mut map = self.read_durable();
        map.insert(key.to_string(), value.clone());
        if let Err(error) = self.write_durable(&map) {
            tracing::warn!(%error, "durable hand-off tier unavailable, using session tier");
            self.session.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read_durable()
            .remove(key)
            .or_else(|| self.session.get(key).cloned())
    }

    pub fn remove(&mut self, key: &str) {
        let mut map = self.read_durable();
        if map.remove(key).is_some() {
            let _ = self.write_durable(&map);
        }
        self.session.remove(key);
    }

    /// Clears every hand-off key in both tiers.
    pub fn clear_all(&mut self) {
        self.remove(STRUCTURED_KEY);
        self.remove(LEGACY_KEY);
    }

    /// Saves a grading result for the fix view.
    pub fn store_payload(&mut self, payload: &HandoffPayload) -> serde_json::Result<()> {
        let json = serde_json::to_string(payload)?;
        self.put(STRUCTURED_KEY, json);
        Ok(())
    }

    /// Loads what the fix view should operate on: the structured key when
    /// present and parseable, else the legacy bare tagged string. Keys are
    /// left in place; the consumer clears them after a successful render.
    pub fn load_payload(&self) -> Option<HandoffPayload> {
        if let Some(json) = self.get(STRUCTURED_KEY) {
            if let Ok(payload) = serde_json::from_str(&json) {
                return Some(payload);
            }
        }
        self.get(LEGACY_KEY).map(|tagged| HandoffPayload {
            tagged_content: tagged,
            ..HandoffPayload::default()
        })
    }
}
