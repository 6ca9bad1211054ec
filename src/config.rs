//! Configuration for backup runs.
//!
//! Configuration is normally read from the process environment (the App
//! Settings of the hosting Function App) with [`Config::from_env`]. Tests and
//! embedders can build it directly with the builder methods.

use crate::validation::{validate_folder_name, validate_site_name};
use crate::{BackupError, Result};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use std::time::Duration;

/// Default ARM endpoint (public cloud).
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Default `api-version` for the `Microsoft.Web/sites` publishing credentials call.
pub const DEFAULT_ARM_API_VERSION: &str = "2025-03-01";

/// Default backup container.
pub const DEFAULT_CONTAINER_NAME: &str = "logicapps-backup";

/// Identifies the Logic App (Standard) site being backed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    /// Azure subscription ID
    pub subscription_id: String,
    /// Resource group containing the site
    pub resource_group: String,
    /// App Service site name
    pub site_name: String,
}

impl SiteIdentity {
    /// Creates a new site identity.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            site_name: site_name.into(),
        }
    }

    /// ARM resource ID of the site.
    pub fn resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
            self.subscription_id, self.resource_group, self.site_name
        )
    }
}

/// Backup configuration.
///
/// ```
/// use logicapps_backup::{Config, SiteIdentity};
/// use std::time::Duration;
///
/// let config = Config::new(
///     SiteIdentity::new("sub", "rg", "my-logicapp"),
///     "https://backupacct.blob.core.windows.net",
/// )
/// .with_private_link(false)
/// .with_retry(5, Duration::from_secs(2))
/// .with_sensitive_key("password");
///
/// assert_eq!(config.scm_base_url(), "https://my-logicapp.scm.azurewebsites.net");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Site being backed up
    pub site: SiteIdentity,

    /// Blob Storage account URL (e.g. `https://acct.blob.core.windows.net`)
    pub storage_account_url: String,

    /// Container receiving the snapshot (default: "logicapps-backup")
    pub container_name: String,

    /// ARM base URL
    pub arm_endpoint: String,

    /// ARM `api-version` for the publishing credentials call
    pub arm_api_version: String,

    /// Use the `scm.privatelink` host for Kudu (default: true)
    pub use_private_link: bool,

    /// Explicit Kudu base URL, bypassing host derivation
    pub scm_endpoint: Option<String>,

    /// Maximum attempts per HTTP call (default: 3)
    pub retry_max: u32,

    /// Exponential backoff base (default: 1.5s)
    pub retry_backoff: Duration,

    /// Per-call HTTP timeout (default: 30s)
    pub http_timeout: Duration,

    /// Keys whose values are redacted (default: `api-key`)
    pub sensitive_keys: Vec<String>,

    /// Maximum concurrent workflow.json downloads (default: 4)
    pub fetch_concurrency: usize,

    /// Local time of day the schedule fires (default: 08:00)
    pub schedule_time: NaiveTime,

    /// UTC offset the schedule is expressed in (default: +09:00)
    pub schedule_offset: FixedOffset,

    /// Fire on every Nth day of the month (default: 3)
    pub schedule_day_step: u32,

    /// Run once immediately when the scheduler starts (default: true)
    pub run_on_startup: bool,
}

impl Config {
    /// Creates a configuration with defaults for everything but the site
    /// and the storage account.
    pub fn new(site: SiteIdentity, storage_account_url: impl Into<String>) -> Self {
        Self {
            site,
            storage_account_url: trim_url(storage_account_url.into()),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            arm_endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            arm_api_version: DEFAULT_ARM_API_VERSION.to_string(),
            use_private_link: true,
            scm_endpoint: None,
            retry_max: 3,
            retry_backoff: Duration::from_millis(1500),
            http_timeout: Duration::from_secs(30),
            sensitive_keys: vec!["api-key".to_string()],
            fetch_concurrency: 4,
            schedule_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            schedule_offset: FixedOffset::east_opt(9 * 3600).unwrap_or(utc()),
            schedule_day_step: 3,
            run_on_startup: true,
        }
    }

    /// Sets the backup container name.
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    /// Sets the ARM base URL.
    pub fn with_arm_endpoint(mut self, url: impl Into<String>) -> Self {
        self.arm_endpoint = trim_url(url.into());
        self
    }

    /// Sets the ARM `api-version`.
    pub fn with_arm_api_version(mut self, version: impl Into<String>) -> Self {
        self.arm_api_version = version.into();
        self
    }

    /// Selects the private-link or public Kudu host.
    pub fn with_private_link(mut self, enabled: bool) -> Self {
        self.use_private_link = enabled;
        self
    }

    /// Overrides the Kudu base URL.
    pub fn with_scm_endpoint(mut self, url: impl Into<String>) -> Self {
        self.scm_endpoint = Some(trim_url(url.into()));
        self
    }

    /// Sets the retry budget.
    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.retry_max = max_attempts;
        self.retry_backoff = backoff_base;
        self
    }

    /// Sets the per-call HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Adds a key to the redaction set.
    pub fn with_sensitive_key(mut self, key: impl Into<String>) -> Self {
        self.sensitive_keys.push(key.into());
        self
    }

    /// Sets the fetch concurrency bound.
    pub fn with_fetch_concurrency(mut self, n: usize) -> Self {
        self.fetch_concurrency = n;
        self
    }

    /// Sets whether the scheduler runs once at startup.
    pub fn with_run_on_startup(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    /// Base URL of the Kudu (SCM) site.
    pub fn scm_base_url(&self) -> String {
        if let Some(ref url) = self.scm_endpoint {
            return url.clone();
        }
        let host = if self.use_private_link {
            format!("{}.scm.privatelink.azurewebsites.net", self.site.site_name)
        } else {
            format!("{}.scm.azurewebsites.net", self.site.site_name)
        };
        format!("https://{}", host)
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| BackupError::Config(format!("{} is not set", key)))
        };

        let site = SiteIdentity::new(
            require("SUBSCRIPTION_ID")?,
            require("RESOURCE_GROUP_NAME")?,
            require("LOGICAPP_SITE_NAME")?,
        );
        let mut config = Config::new(site, require("BACKUP_STORAGE_ACCOUNT_URL")?);

        if let Some(v) = get("BACKUP_CONTAINER_NAME") {
            config.container_name = v;
        }
        if let Some(v) = get("ARM_API_VERSION") {
            config.arm_api_version = v;
        }
        if let Some(v) = get("ARM_ENDPOINT") {
            config.arm_endpoint = trim_url(v);
        }
        if let Some(v) = get("USE_PRIVATELINK_FOR_SCM") {
            config.use_private_link = parse_bool("USE_PRIVATELINK_FOR_SCM", &v)?;
        }
        if let Some(v) = get("SCM_ENDPOINT") {
            config.scm_endpoint = Some(trim_url(v));
        }
        if let Some(v) = get("RETRY_MAX") {
            config.retry_max = parse_num("RETRY_MAX", &v)?;
        }
        if let Some(v) = get("RETRY_BACKOFF_SEC") {
            config.retry_backoff = parse_secs("RETRY_BACKOFF_SEC", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SEC") {
            config.http_timeout = parse_secs("HTTP_TIMEOUT_SEC", &v)?;
        }
        if let Some(v) = get("SENSITIVE_KEYS") {
            config.sensitive_keys = v
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("FETCH_CONCURRENCY") {
            config.fetch_concurrency = parse_num("FETCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("BACKUP_SCHEDULE_TIME") {
            config.schedule_time = NaiveTime::parse_from_str(&v, "%H:%M").map_err(|e| {
                BackupError::Config(format!("BACKUP_SCHEDULE_TIME '{}': {}", v, e))
            })?;
        }
        if let Some(v) = get("BACKUP_SCHEDULE_UTC_OFFSET") {
            config.schedule_offset = parse_offset(&v)?;
        }
        if let Some(v) = get("BACKUP_SCHEDULE_DAY_STEP") {
            config.schedule_day_step = parse_num("BACKUP_SCHEDULE_DAY_STEP", &v)?;
        }
        if let Some(v) = get("RUN_ON_STARTUP") {
            config.run_on_startup = parse_bool("RUN_ON_STARTUP", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise fail much later, mid-run.
    pub fn validate(&self) -> Result<()> {
        validate_site_name(&self.site.site_name)?;
        for (var, value) in [
            ("SUBSCRIPTION_ID", &self.site.subscription_id),
            ("RESOURCE_GROUP_NAME", &self.site.resource_group),
        ] {
            validate_folder_name(value)
                .map_err(|e| BackupError::Config(format!("{} is invalid: {}", var, e)))?;
        }

        if !self.storage_account_url.starts_with("https://")
            && !self.storage_account_url.starts_with("http://")
        {
            return Err(BackupError::Config(format!(
                "storage account URL must be absolute: '{}'",
                self.storage_account_url
            )));
        }
        if self.container_name.is_empty() {
            return Err(BackupError::Config("container name is empty".to_string()));
        }
        if self.retry_max == 0 {
            return Err(BackupError::Config("RETRY_MAX must be at least 1".to_string()));
        }
        if self.fetch_concurrency == 0 {
            return Err(BackupError::Config(
                "FETCH_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.schedule_day_step == 0 || self.schedule_day_step > 31 {
            return Err(BackupError::Config(
                "BACKUP_SCHEDULE_DAY_STEP must be between 1 and 31".to_string(),
            ));
        }
        if self.sensitive_keys.is_empty() {
            return Err(BackupError::Config(
                "at least one sensitive key is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(BackupError::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BackupError::Config(format!("{} is not a valid number: '{}'", key, value)))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_num(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| BackupError::Config(format!("{} must be non-negative: '{}'", key, value)))
}

/// Parses `+HH:MM` / `-HH:MM` (also `Z`).
fn parse_offset(value: &str) -> Result<FixedOffset> {
    let invalid = || {
        BackupError::Config(format!(
            "BACKUP_SCHEDULE_UTC_OFFSET must look like +09:00, got '{}'",
            value
        ))
    };

    if value.eq_ignore_ascii_case("z") {
        return Ok(utc());
    }

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("SUBSCRIPTION_ID", "00000000-0000-0000-0000-000000000000"),
        ("RESOURCE_GROUP_NAME", "rg-integration"),
        ("LOGICAPP_SITE_NAME", "la-orders"),
        ("BACKUP_STORAGE_ACCOUNT_URL", "https://backups.blob.core.windows.net/"),
    ];

    #[test]
    fn test_defaults_from_env() {
        let config = Config::from_lookup(env(REQUIRED)).unwrap();

        assert_eq!(config.site.site_name, "la-orders");
        assert_eq!(config.storage_account_url, "https://backups.blob.core.windows.net");
        assert_eq!(config.container_name, "logicapps-backup");
        assert_eq!(config.arm_api_version, "2025-03-01");
        assert!(config.use_private_link);
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(1500));
        assert_eq!(config.sensitive_keys, vec!["api-key".to_string()]);
        assert_eq!(config.schedule_day_step, 3);
        assert_eq!(config.schedule_offset.local_minus_utc(), 9 * 3600);
        assert!(config.run_on_startup);
    }

    #[test]
    fn test_missing_required() {
        let err = Config::from_lookup(env(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("SUBSCRIPTION_ID"));
    }

    #[test]
    fn test_blank_treated_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("LOGICAPP_SITE_NAME", "  ");
        let err = Config::from_lookup(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("LOGICAPP_SITE_NAME"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[
            ("USE_PRIVATELINK_FOR_SCM", "FALSE"),
            ("RETRY_MAX", "5"),
            ("RETRY_BACKOFF_SEC", "0.25"),
            ("SENSITIVE_KEYS", "api-key, password ,,clientSecret"),
            ("BACKUP_SCHEDULE_TIME", "23:30"),
            ("BACKUP_SCHEDULE_UTC_OFFSET", "-05:30"),
            ("RUN_ON_STARTUP", "0"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();

        assert!(!config.use_private_link);
        assert_eq!(config.retry_max, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.sensitive_keys, vec!["api-key", "password", "clientSecret"]);
        assert_eq!(config.schedule_time, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        assert_eq!(config.schedule_offset.local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(!config.run_on_startup);
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RETRY_MAX", "many"));
        assert!(Config::from_lookup(env(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("USE_PRIVATELINK_FOR_SCM", "maybe"));
        assert!(Config::from_lookup(env(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RETRY_MAX", "0"));
        assert!(Config::from_lookup(env(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BACKUP_SCHEDULE_UTC_OFFSET", "09:00"));
        assert!(Config::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn test_scm_host_selection() {
        let site = SiteIdentity::new("s", "rg", "la-orders");
        let config = Config::new(site, "https://acct.blob.core.windows.net");
        assert_eq!(
            config.scm_base_url(),
            "https://la-orders.scm.privatelink.azurewebsites.net"
        );

        let config = config.with_private_link(false);
        assert_eq!(config.scm_base_url(), "https://la-orders.scm.azurewebsites.net");

        let config = config.with_scm_endpoint("http://127.0.0.1:8080/");
        assert_eq!(config.scm_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_resource_id() {
        let site = SiteIdentity::new("sub-1", "rg-1", "la-1");
        assert_eq!(
            site.resource_id(),
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Web/sites/la-1"
        );
    }

    #[test]
    fn test_identity_segments_must_be_url_safe() {
        for (sub, rg) in [("sub/1", "rg"), ("sub", "rg?x"), ("sub", "rg#1"), ("..", "rg")] {
            let config = Config::new(
                SiteIdentity::new(sub, rg, "la-1"),
                "https://acct.blob.core.windows.net",
            );
            let err = config.validate().unwrap_err();
            assert!(matches!(err, BackupError::Config(_)), "got: {err}");
        }

        let mut pairs: Vec<(&str, &str)> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "RESOURCE_GROUP_NAME")
            .collect();
        pairs.push(("RESOURCE_GROUP_NAME", "rg/evil"));
        let err = Config::from_lookup(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("RESOURCE_GROUP_NAME"), "got: {err}");
    }
}
