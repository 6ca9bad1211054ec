//! Azure AD bearer token acquisition.
//!
//! This module provides the [`TokenProvider`] trait used by the credential
//! resolver (ARM scope) and the blob store (Storage scope). The production
//! implementation wraps `azure_identity`'s credential chain, which picks up
//! the Function App's managed identity when running in Azure.

use crate::{BackupError, Result};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::DefaultAzureCredential;
use secrecy::SecretString;
use std::sync::Arc;

/// Scope for Azure Resource Manager.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Scope for Azure Blob Storage.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Source of bearer tokens.
///
/// All implementations must be `Send + Sync` so one provider can be shared
/// between the credential resolver and the snapshot store.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a bearer token for the given scope.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Authentication`] if no token can be obtained.
    async fn token(&self, scope: &str) -> Result<SecretString>;
}

/// Token provider backed by the managed identity of the host.
///
/// Uses `DefaultAzureCredential`, which tries environment credentials, then
/// the App Service / IMDS managed identity endpoints, then developer tools.
pub struct ManagedIdentityTokenProvider {
    credential: Arc<DefaultAzureCredential>,
}

impl ManagedIdentityTokenProvider {
    /// Builds the credential chain.
    pub fn new() -> Result<Self> {
        let credential = DefaultAzureCredential::create(Default::default()).map_err(|e| {
            BackupError::Authentication(format!("failed to create Azure credentials: {}", e))
        })?;

        Ok(Self {
            credential: Arc::new(credential),
        })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self, scope: &str) -> Result<SecretString> {
        let token = self.credential.get_token(&[scope]).await.map_err(|e| {
            BackupError::Authentication(format!("managed identity token for {}: {}", scope, e))
        })?;

        Ok(SecretString::from(token.token.secret().to_string()))
    }
}

/// Token provider that hands out fixed tokens.
///
/// Useful in tests and for runs against emulators.
#[cfg(feature = "mock")]
pub struct StaticTokenProvider {
    token: String,
    /// Error to return instead of a token
    pub fail_with: Option<String>,
}

#[cfg(feature = "mock")]
impl StaticTokenProvider {
    /// Creates a provider returning `token` for every scope.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            fail_with: None,
        }
    }

    /// Creates a provider that always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            token: String::new(),
            fail_with: Some(message.into()),
        }
    }
}

#[cfg(feature = "mock")]
#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _scope: &str) -> Result<SecretString> {
        if let Some(ref message) = self.fail_with {
            return Err(BackupError::Authentication(message.clone()));
        }
        Ok(SecretString::from(self.token.clone()))
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("tok");
        let token = provider.token(ARM_SCOPE).await.unwrap();
        assert_eq!(token.expose_secret(), "tok");
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let provider = StaticTokenProvider::failing("no identity");
        let err = provider.token(STORAGE_SCOPE).await.unwrap_err();
        assert!(matches!(err, BackupError::Authentication(_)));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SecretString::from("super-secret".to_string());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
