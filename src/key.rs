//! API key capabilities.
//!
//! The environment decides which key is active. Callers get a [`KeyProvider`]
//! to ask whether a key is selected and to open the selection flow, and a
//! [`CredentialSource`] to read the secret itself. Both are injected; nothing
//! here is global.

use crate::error::{FrameflowError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Environment variables searched for a key, in order.
pub const KEY_ENV_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// What the caller currently believes about key selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyState {
    /// Not checked yet.
    #[default]
    Unknown,
    /// No key is selected, or the last check failed.
    Missing,
    /// Selection was triggered but never confirmed.
    Assumed,
    /// The environment reported a selected key.
    Confirmed,
}

impl KeyState {
    /// Returns true for `Assumed` and `Confirmed`.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Assumed | Self::Confirmed)
    }

    /// Returns true only when the key is known to be absent.
    pub fn is_missing(&self) -> bool {
        *self == Self::Missing
    }
}

/// Environment capability for checking and selecting an API key.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Returns false when the selection capability is absent.
    fn is_available(&self) -> bool {
        true
    }

    /// Asks whether a key is currently selected.
    async fn has_selected_api_key(&self) -> Result<bool>;

    /// Opens the key selection flow. Success does not mean a key was chosen.
    async fn open_select_key(&self) -> Result<()>;
}

/// Source of the secret attached to API calls.
pub trait CredentialSource: Send + Sync {
    /// Returns the active key, if any.
    fn api_key(&self) -> Option<String>;
}

/// Keys read from the process environment, with an optional stdin prompt
/// standing in for the selection dialog.
#[derive(Debug, Clone, Default)]
pub struct EnvKeys {
    slot: Arc<Mutex<Option<String>>>,
    interactive: bool,
}

impl EnvKeys {
    /// Reads the first non-empty variable from [`KEY_ENV_VARS`].
    pub fn from_env() -> Self {
        let key = KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty());
        Self::with_key(key)
    }

    /// Starts from an explicit key (or none).
    pub fn with_key(key: Option<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(key)),
            interactive: false,
        }
    }

    /// Enables prompting on stdin when selection is requested.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Replaces the active key.
    pub fn set_key(&self, key: impl Into<String>) {
        let key = key.into();
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(key);
    }

    fn current(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|k| !k.trim().is_empty())
    }

    async fn prompt_for_key(&self) -> Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(b"Enter a Gemini API key from a project with billing enabled: ")
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(FrameflowError::KeySelection("stdin closed".into()));
        }
        let key = line.trim().to_string();
        if key.is_empty() {
            return Err(FrameflowError::KeySelection("no key entered".into()));
        }
        Ok(key)
    }
}

#[async_trait]
impl KeyProvider for EnvKeys {
    async fn has_selected_api_key(&self) -> Result<bool> {
        Ok(self.current().is_some())
    }

    async fn open_select_key(&self) -> Result<()> {
        if !self.interactive {
            return Err(FrameflowError::KeySelection(format!(
                "set {} to select a key",
                KEY_ENV_VARS[0]
            )));
        }
        let key = self.prompt_for_key().await?;
        self.set_key(key);
        tracing::info!("API key selected from prompt");
        Ok(())
    }
}

impl CredentialSource for EnvKeys {
    fn api_key(&self) -> Option<String> {
        self.current()
    }
}

/// A fixed key that is always selected.
#[derive(Debug, Clone)]
pub struct StaticKey(String);

impl StaticKey {
    /// Wraps the given key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

#[async_trait]
impl KeyProvider for StaticKey {
    async fn has_selected_api_key(&self) -> Result<bool> {
        Ok(!self.0.is_empty())
    }

    async fn open_select_key(&self) -> Result<()> {
        Ok(())
    }
}

impl CredentialSource for StaticKey {
    fn api_key(&self) -> Option<String> {
        Some(self.0.clone()).filter(|k| !k.is_empty())
    }
}
