//! Conversations Configuration
//!
//! Configuration for the per-device conversation stores, read from
//! `~/.config/cosmic/cosmic-ext-connect/conversations.toml`.
//!
//! ```toml
//! # Give up waiting for the phone after 30 seconds (unset = wait forever)
//! fetch_timeout_secs = 30
//!
//! # Ask the phone for at most 50 messages per conversation request
//! messages_per_request = 50
//! ```

use crate::{ConversationError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conversations configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationsConfig {
    /// Upper bound on how long a conversation request waits for the phone
    ///
    /// `None` waits until the messages arrive or the store is shut down.
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    /// Number of messages to ask for per conversation request
    ///
    /// `None` leaves the amount up to the phone.
    #[serde(default)]
    pub messages_per_request: Option<i32>,
}

impl ConversationsConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConversationError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from the default location, falling back to defaults
    /// when the file does not exist
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            tracing::info!("Loading conversations config from {}", path.display());
            Self::load(&path)
        } else {
            tracing::debug!("No conversations config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("cosmic")
            .join("cosmic-ext-connect")
            .join("conversations.toml")
    }

    /// Fetch wait bound as a `Duration`
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}
