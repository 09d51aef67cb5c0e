//! Notice sink and message translation
//!
//! Successful mutating actions write a generated notice such as
//! `"Widget was successfully created"` under the `notice` key. When localized
//! messages are enabled the literal text is normalized into a catalog key
//! (`widget_was_successfully_created`) and translated instead.
//!
//! With the `session` feature, [`Flash::commit`] copies the notices into a
//! `tower_sessions` session so they survive the redirect that usually follows.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, FORMAT_NOT_SUPPORTED_KEY};

/// Key under which generated notices are stored
pub const NOTICE_KEY: &str = "notice";

#[cfg(feature = "session")]
const FLASH_SESSION_KEY: &str = "_flash_messages";

/// Runs of non-word characters, collapsed when building catalog keys
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("Non-word regex is valid"));

/// Flash message severity/type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    /// Generated notice (e.g., "Widget was successfully created")
    Success,
    /// Alert written by a hook
    Error,
}

/// A single flash message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashMessage {
    /// The type/severity of the message.
    pub kind: FlashKind,
    /// The message content.
    pub message: String,
}

impl FlashMessage {
    /// Create a new flash message.
    #[must_use]
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a success flash message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Success, message)
    }

    /// Create an error flash message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Error, message)
    }
}

/// Key-value notice store for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flash {
    entries: HashMap<String, FlashMessage>,
}

impl Flash {
    /// Create an empty flash
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message under `key`, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, message: FlashMessage) {
        self.entries.insert(key.into(), message);
    }

    /// Store a success notice under [`NOTICE_KEY`]
    pub fn notice(&mut self, message: impl Into<String>) {
        self.set(NOTICE_KEY, FlashMessage::success(message));
    }

    /// Message stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FlashMessage> {
        self.entries.get(key)
    }

    /// Text of the notice, if one was written
    #[must_use]
    pub fn notice_text(&self) -> Option<&str> {
        self.get(NOTICE_KEY).map(|m| m.message.as_str())
    }

    /// Check whether nothing was written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over stored messages
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlashMessage)> {
        self.entries.iter().map(|(key, message)| (key.as_str(), message))
    }

    /// Append the stored messages to the session's flash messages
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be accessed.
    #[cfg(feature = "session")]
    pub async fn commit(&self, session: &tower_sessions::Session) -> crate::error::Result<()> {
        use crate::error::Error;

        if self.is_empty() {
            return Ok(());
        }

        let mut messages: Vec<FlashMessage> = session
            .get(FLASH_SESSION_KEY)
            .await
            .map_err(|e| Error::Session(format!("Failed to read flash messages: {e}")))?
            .unwrap_or_default();

        messages.extend(self.entries.values().cloned());

        session
            .insert(FLASH_SESSION_KEY, &messages)
            .await
            .map_err(|e| Error::Session(format!("Failed to write flash messages: {e}")))
    }
}

/// Normalize a literal message into a catalog key
///
/// Lower-cases and trims the message, collapses runs of non-word characters
/// into `_`, and drops leading or trailing underscores.
#[must_use]
pub fn normalize_key(message: &str) -> String {
    let lowered = message.trim().to_lowercase();
    NON_WORD
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Generated messages, optionally translated through a catalog
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    localized: bool,
    entries: HashMap<String, String>,
    format_not_supported: String,
}

impl MessageCatalog {
    /// Build the catalog from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            localized: config.localized_messages,
            entries: config.messages.clone(),
            format_not_supported: config.format_not_supported.clone(),
        }
    }

    /// Whether messages are translated
    #[must_use]
    pub fn is_localized(&self) -> bool {
        self.localized
    }

    /// Turn translation on or off
    pub fn set_localized(&mut self, localized: bool) {
        self.localized = localized;
    }

    /// Add or replace a translation
    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(key.into(), text.into());
    }

    /// Translate a literal message, or return it unchanged when not localized
    ///
    /// A missing translation falls back to the literal message.
    #[must_use]
    pub fn translate(&self, literal: &str) -> String {
        if !self.localized {
            return literal.to_string();
        }

        let key = normalize_key(literal);
        match self.entries.get(&key) {
            Some(text) => text.clone(),
            None => {
                tracing::debug!(key = %key, "No translation for message, using literal text");
                literal.to_string()
            }
        }
    }

    /// Message for json/xml requests to form-only actions
    #[must_use]
    pub fn format_not_supported(&self) -> &str {
        if self.localized {
            if let Some(text) = self.entries.get(FORMAT_NOT_SUPPORTED_KEY) {
                return text;
            }
        }
        &self.format_not_supported
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
