//! Session configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Settings for one game session.
///
/// Every field has a default, so a JSON config only needs the keys it
/// changes:
///
/// ```
/// use teratogen_session::config::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{ "verify_checksum": false }"#).unwrap();
/// assert!(!config.verify_checksum);
/// assert!(config.check_invariants_on_load);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reject save files whose digest does not match their snapshot.
    pub verify_checksum: bool,
    /// Run the manager's invariant checks after loading a save.
    pub check_invariants_on_load: bool,
    /// Log filter used when `RUST_LOG` is unset. Applied by
    /// [`SessionConfig::init_tracing`], which sessions call on creation.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            check_invariants_on_load: true,
            log_filter: "warn".to_owned(),
        }
    }
}

impl SessionConfig {
    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid session config")
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to encode session config")
    }

    /// Install the global subscriber with [`log_filter`](Self::log_filter).
    /// Returns `false` if one was already installed.
    pub fn init_tracing(&self) -> bool {
        crate::init_tracing(&self.log_filter)
    }
}
