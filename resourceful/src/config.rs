//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: RESOURCEFUL_)
//! 2. A config file: `./resourceful.toml`, or an explicit path via [`Config::load_from`]
//! 3. Default values
//!
//! ```toml
//! log_level = "debug"
//! localized_messages = true
//! root_url = "/"
//!
//! [messages]
//! widget_was_successfully_created = "Widget angelegt"
//! format_not_supported = "Format wird nicht unterstützt"
//! ```

use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "resourceful.toml";

/// Catalog key for the "format not supported" message
pub const FORMAT_NOT_SUPPORTED_KEY: &str = "format_not_supported";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Pass generated notices through the message catalog
    #[serde(default)]
    pub localized_messages: bool,

    /// Redirect target after `destroy`
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Message returned for json/xml requests to form-only actions
    #[serde(default = "default_format_not_supported")]
    pub format_not_supported: String,

    /// Translation catalog keyed by normalized message
    #[serde(default)]
    pub messages: HashMap<String, String>,
}

impl Config {
    /// Load configuration from `./resourceful.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: &str) -> Result<Self> {
        tracing::debug!("Loading resourceful configuration from: {}", path);

        let config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Load from config file (if exists)
            .merge(Toml::file(path))
            // Override with environment variables
            .merge(Env::prefixed("RESOURCEFUL_"))
            .extract()?;

        Ok(config)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_root_url() -> String {
    "/".to_string()
}

fn default_format_not_supported() -> String {
    "This format is not supported.".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            localized_messages: false,
            root_url: default_root_url(),
            format_not_supported: default_format_not_supported(),
            messages: HashMap::new(),
        }
    }
}
