//! Device configuration access
//!
//! Two configuration trees exist side by side: the local defaults bundled
//! in the fs/ source tree, and the configuration parsed off a device after
//! a filesystem download. Reads prefer the device tree; writes go to every
//! tree that carries the key so the two stay consistent once synchronized.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::tree;
use crate::errors::AgentError;
use crate::filesys::file::File;

/// Name of the configuration document on the device filesystem
pub const DEVICE_CONFIG_FILE: &str = "config.json";

/// The resolver over the local default and on-device configuration trees
#[derive(Debug, Default)]
pub struct DeviceConfig {
    local: Option<Map<String, Value>>,
    device: Option<Map<String, Value>>,
}

impl DeviceConfig {
    /// Create an empty resolver with no trees loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver from already-parsed trees
    pub fn with_trees(
        local: Option<Map<String, Value>>,
        device: Option<Map<String, Value>>,
    ) -> Self {
        Self { local, device }
    }

    /// Load the bundled default configuration
    pub async fn load_local(file: &File) -> Result<Self, AgentError> {
        let local = read_tree(file).await?;
        Ok(Self {
            local: Some(local),
            device: None,
        })
    }

    /// Parse the configuration out of an unpacked device filesystem
    pub async fn load_device(&mut self, unpack_dir: &Path) -> Result<(), AgentError> {
        let file = File::new(unpack_dir.join(DEVICE_CONFIG_FILE));
        self.device = Some(read_tree(&file).await?);
        Ok(())
    }

    /// Whether a device configuration has been loaded
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Get a value by key: device tree first, local defaults as fallback
    pub fn get(&self, key: &str) -> Option<String> {
        for tree in [self.device.as_ref(), self.local.as_ref()].into_iter().flatten() {
            if let Some(value) = tree::get_value(key, tree) {
                return Some(tree::value_to_string(value));
            }
        }
        None
    }

    /// Get a value by key, empty string when absent
    pub fn get_str(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    /// Get a boolean value by key, false when absent or not a boolean
    pub fn get_flag(&self, key: &str) -> bool {
        for tree in [self.device.as_ref(), self.local.as_ref()].into_iter().flatten() {
            if let Some(value) = tree::get_value(key, tree) {
                return value.as_bool().unwrap_or(false);
            }
        }
        false
    }

    /// Set a value by key in every tree that carries it.
    ///
    /// A tree without the key is left untouched; a key absent from both
    /// trees is silently ignored.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut found = false;

        if let Some(tree) = self.local.as_mut() {
            found |= tree::set_value(key, value.clone(), tree);
        }
        if let Some(tree) = self.device.as_mut() {
            found |= tree::set_value(key, value, tree);
        }

        if !found {
            debug!("config key {} absent from both trees, ignoring", key);
        }
    }

    /// Serialize the configuration: the device tree when one is loaded,
    /// the local defaults otherwise. Pretty-printed; serde_json writes
    /// characters like `&` literally, so values round-trip unescaped.
    pub async fn save(&self, file: &File) -> Result<(), AgentError> {
        let tree = self
            .device
            .as_ref()
            .or(self.local.as_ref())
            .ok_or_else(|| AgentError::ConfigError("no configuration loaded".to_string()))?;

        let contents = serde_json::to_string_pretty(tree)?;
        file.write_atomic(contents.as_bytes()).await
    }

    pub fn ssid(&self) -> String {
        self.get_str("ssid")
    }

    pub fn set_ssid(&mut self, value: &str) {
        self.set("ssid", value);
    }

    pub fn passphrase(&self) -> String {
        self.get_str("passphrase")
    }

    pub fn set_passphrase(&mut self, value: &str) {
        self.set("passphrase", value);
    }

    pub fn hostname(&self) -> String {
        self.get_str("hostname")
    }

    pub fn set_hostname(&mut self, value: &str) {
        self.set("hostname", value);
    }

    pub fn id(&self) -> String {
        self.get_str("id")
    }

    pub fn set_id(&mut self, value: &str) {
        self.set("id", value);
    }
}

async fn read_tree(file: &File) -> Result<Map<String, Value>, AgentError> {
    let value: Value = file.read_json().await?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AgentError::ConfigError(format!(
            "{} is not a JSON object",
            file.path().display()
        ))),
    }
}
