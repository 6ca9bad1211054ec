//! Kudu publishing credential resolution via ARM.

use crate::retry::{is_transient_status, RetryPolicy};
use crate::token::{TokenProvider, ARM_SCOPE};
use crate::{BackupError, Config, Result, SiteIdentity};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Basic-auth credentials for a site's Kudu endpoint.
///
/// Fetched fresh each run and never persisted. The password is held in a
/// [`SecretString`], so `Debug` output does not reveal it.
#[derive(Debug)]
pub struct PublishingCredentials {
    /// Publishing user name (usually `$<site>`)
    pub username: String,
    password: SecretString,
}

impl PublishingCredentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Exposes the password for building the `Authorization` header.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishingFields {
    publishing_user_name: Option<String>,
    publishing_password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishingPayload {
    #[serde(default)]
    properties: Option<PublishingFields>,
    #[serde(flatten)]
    top_level: PublishingFields,
}

/// Resolves publishing credentials for a site using a managed identity token.
pub struct CredentialResolver {
    client: reqwest::Client,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenProvider>,
    arm_endpoint: String,
    api_version: String,
}

impl CredentialResolver {
    /// Creates a resolver from configuration.
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(config.retry_max, config.retry_backoff),
            tokens,
            arm_endpoint: config.arm_endpoint.clone(),
            api_version: config.arm_api_version.clone(),
        }
    }

    /// Calls ARM `config/publishingcredentials/list` for the site.
    ///
    /// # Errors
    ///
    /// - [`BackupError::Authentication`]: no token, HTTP 401, retries
    ///   exhausted, or the response lacks a user name or password
    /// - [`BackupError::Authorization`]: HTTP 403 or 404 (the identity cannot
    ///   see the site)
    #[instrument(skip(self, site), fields(site = %site.site_name))]
    pub async fn resolve(&self, site: &SiteIdentity) -> Result<PublishingCredentials> {
        let token = self.tokens.token(ARM_SCOPE).await?;
        let url = format!(
            "{}{}/config/publishingcredentials/list?api-version={}",
            self.arm_endpoint,
            site.resource_id(),
            self.api_version
        );

        let response = self
            .retry
            .send("arm.publishingcredentials", || {
                self.client
                    .post(&url)
                    .bearer_auth(token.expose_secret())
                    .header(reqwest::header::CONTENT_LENGTH, "0")
            })
            .await
            .map_err(|e| {
                BackupError::Authentication(format!("publishing credentials request failed: {}", e))
            })?;

        let status = response.status();
        debug!(status = %status, "publishing credentials response received");

        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(BackupError::Authentication(format!(
                    "ARM rejected the managed identity token ({})",
                    status
                )));
            }
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(BackupError::Authorization(format!(
                    "identity cannot list publishing credentials for {} ({})",
                    site.resource_id(),
                    status
                )));
            }
            s if is_transient_status(s) => {
                return Err(BackupError::Authentication(format!(
                    "ARM kept failing after {} attempts ({})",
                    self.retry.max_attempts(),
                    status
                )));
            }
            _ => {
                return Err(BackupError::Authentication(format!(
                    "unexpected ARM response ({})",
                    status
                )));
            }
        }

        let payload: PublishingPayload = response.json().await.map_err(|e| {
            BackupError::Authentication(format!("unreadable publishing credentials: {}", e))
        })?;

        let props = payload.properties.unwrap_or_default();
        let username = props
            .publishing_user_name
            .or(payload.top_level.publishing_user_name)
            .filter(|u| !u.is_empty());
        let password = props
            .publishing_password
            .or(payload.top_level.publishing_password)
            .filter(|p| !p.is_empty());

        match (username, password) {
            (Some(username), Some(password)) => Ok(PublishingCredentials::new(username, password)),
            _ => Err(BackupError::Authentication(
                "publishing credentials not found in ARM response".to_string(),
            )),
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREDS_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Web/sites/la-orders/config/publishingcredentials/list";

    fn site() -> SiteIdentity {
        SiteIdentity::new("sub-1", "rg-1", "la-orders")
    }

    fn resolver(server: &MockServer, tokens: StaticTokenProvider) -> CredentialResolver {
        let config = Config::new(site(), "https://acct.blob.core.windows.net")
            .with_arm_endpoint(server.uri())
            .with_retry(3, Duration::from_millis(1));
        CredentialResolver::new(&config, reqwest::Client::new(), Arc::new(tokens))
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = PublishingCredentials::new("$la-orders", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("$la-orders"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(creds.password(), "hunter2");
    }

    #[tokio::test]
    async fn test_resolve_reads_properties() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREDS_PATH))
            .and(query_param("api-version", "2025-03-01"))
            .and(header("authorization", "Bearer arm-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "/subscriptions/sub-1/.../publishingcredentials",
                "properties": {
                    "publishingUserName": "$la-orders",
                    "publishingPassword": "pw-1"
                }
            })))
            .mount(&server)
            .await;

        let creds = resolver(&server, StaticTokenProvider::new("arm-token"))
            .resolve(&site())
            .await
            .unwrap();
        assert_eq!(creds.username, "$la-orders");
        assert_eq!(creds.password(), "pw-1");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_top_level_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREDS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "publishingUserName": "$flat",
                "publishingPassword": "pw-flat"
            })))
            .mount(&server)
            .await;

        let creds = resolver(&server, StaticTokenProvider::new("t"))
            .resolve(&site())
            .await
            .unwrap();
        assert_eq!(creds.username, "$flat");
    }

    #[tokio::test]
    async fn test_missing_password_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": { "publishingUserName": "$la-orders" }
            })))
            .mount(&server)
            .await;

        let err = resolver(&server, StaticTokenProvider::new("t"))
            .resolve(&site())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Authentication(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_forbidden_is_authorization_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = resolver(&server, StaticTokenProvider::new("t"))
            .resolve(&site())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Authorization(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_fail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = resolver(&server, StaticTokenProvider::new("t"))
            .resolve(&site())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("3 attempts"), "got: {err}");
    }

    #[tokio::test]
    async fn test_token_failure_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = resolver(&server, StaticTokenProvider::failing("no identity"))
            .resolve(&site())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Authentication(_)));
    }
}
