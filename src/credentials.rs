//! API-key provisioning.
//!
//! The host environment owns key storage and the key-selection dialog; the
//! client only asks a [`CredentialProvider`] for the current key on every
//! request.

use async_trait::async_trait;

use crate::errors::{AdGenError, Result};

/// Environment variable read when no key or provider is configured.
pub const API_KEY_ENV: &str = "API_KEY";

const SELECTION_UNAVAILABLE: &str = "API key selection is not available in this environment.";

/// Host capability that supplies and (re)selects the API key.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Whether a key has already been chosen.
    async fn has_selected_key(&self) -> bool;

    /// Ask the host to let the user pick a key.
    async fn open_key_selection(&self) -> Result<()>;

    /// The key to send with the next request, if any.
    fn api_key(&self) -> Option<String>;
}

/// A fixed key. Selection is not supported.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    key: String,
}

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn has_selected_key(&self) -> bool {
        !self.key.is_empty()
    }

    async fn open_key_selection(&self) -> Result<()> {
        Err(AdGenError::Credential(SELECTION_UNAVAILABLE.into()))
    }

    fn api_key(&self) -> Option<String> {
        Some(self.key.clone()).filter(|k| !k.is_empty())
    }
}

/// Reads the key from an environment variable each time it is needed.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    /// Read from `var` instead of [`API_KEY_ENV`].
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(API_KEY_ENV)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn has_selected_key(&self) -> bool {
        self.api_key().is_some()
    }

    async fn open_key_selection(&self) -> Result<()> {
        Err(AdGenError::Credential(SELECTION_UNAVAILABLE.into()))
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credential() {
        let cred = StaticCredential::new("k-123");
        assert!(cred.has_selected_key().await);
        assert_eq!(cred.api_key().as_deref(), Some("k-123"));
        assert!(matches!(
            cred.open_key_selection().await,
            Err(AdGenError::Credential(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_static_credential_has_no_key() {
        let cred = StaticCredential::new("");
        assert!(!cred.has_selected_key().await);
        assert!(cred.api_key().is_none());
    }

    #[tokio::test]
    async fn test_env_credential_reads_each_time() {
        let var = "ADGEN_TEST_ENV_CREDENTIAL";
        let cred = EnvCredential::new(var);

        std::env::remove_var(var);
        assert!(!cred.has_selected_key().await);

        std::env::set_var(var, "from-env");
        assert_eq!(cred.api_key().as_deref(), Some("from-env"));
        assert!(cred.has_selected_key().await);

        std::env::remove_var(var);
    }
}
