//! Configuration management.
//!
//! Credentials and run settings come from a JSON credential store holding
//! named profiles:
//!
//! ```json
//! {
//!   "sandbox": {
//!     "endpoint": "na1.my.salesforce.com",
//!     "token": "00D...",
//!     "settings": { "batch_size": 200 }
//!   }
//! }
//! ```
//!
//! # Resolution
//!
//! Credential file, first match wins:
//! 1. `--creds <path>`
//! 2. `ACCTSYNC_CREDS` environment variable
//! 3. `.creds.json` in the working directory
//! 4. `~/.acctsync/creds.json`
//!
//! `ACCTSYNC_ENDPOINT` / `ACCTSYNC_TOKEN` override the profile's values; when
//! both are set no file is needed at all. CLI flags override `settings`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Profile used when none is given.
pub const DEFAULT_PROFILE: &str = "sandbox";

/// Credential file looked up in the working directory.
pub const LOCAL_CREDS_FILE: &str = ".creds.json";

pub const ENV_CREDS: &str = "ACCTSYNC_CREDS";
pub const ENV_PROFILE: &str = "ACCTSYNC_PROFILE";
pub const ENV_ENDPOINT: &str = "ACCTSYNC_ENDPOINT";
pub const ENV_TOKEN: &str = "ACCTSYNC_TOKEN";

/// Upper bound accepted for `batch_size`.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Remote endpoint and session token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Instance host or base URL.
    pub endpoint: String,
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Tunables for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// REST API version, without the leading `v`.
    pub api_version: String,
    /// sObject type to sync.
    pub object: String,
    /// Records per upsert submission.
    pub batch_size: usize,
    /// Rows per bulk query result chunk.
    pub max_records_per_chunk: usize,
    /// Field the remote store matches upserts on.
    pub external_id_field: String,
    /// Stop a create-import at the first rejected record.
    pub abort_on_first_error: bool,
    pub poll_interval_ms: u64,
    /// `None` polls until the job reaches a terminal state.
    pub max_poll_attempts: Option<u32>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_version: "59.0".to_string(),
            object: "Account".to_string(),
            batch_size: crate::sync::DEFAULT_BATCH_SIZE,
            max_records_per_chunk: 500,
            external_id_field: "Id".to_string(),
            abort_on_first_error: false,
            poll_interval_ms: 2000,
            max_poll_attempts: None,
        }
    }
}

impl SyncSettings {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an out-of-range batch or chunk size, or an empty
    /// version, object or external id field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_records_per_chunk == 0 {
            return Err(Error::Config(
                "max_records_per_chunk must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("api_version", &self.api_version),
            ("object", &self.object),
            ("external_id_field", &self.external_id_field),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProfileEntry {
    endpoint: Option<String>,
    token: Option<String>,
    #[serde(default)]
    settings: SyncSettings,
}

/// A fully resolved profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub credentials: Credentials,
    pub settings: SyncSettings,
    /// File the profile was read from, if any.
    pub source: Option<PathBuf>,
}

/// Get the global config directory, `~/.acctsync/`.
#[must_use]
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".acctsync"))
}

/// Resolve the credential file path.
///
/// An explicit or environment path is returned even if it does not exist,
/// so the caller reports it. Fallback locations are only used if present.
pub fn resolve_creds_path(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env(ENV_CREDS).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(LOCAL_CREDS_FILE);
    if local.exists() {
        return Some(local);
    }
    global_config_dir()
        .map(|dir| dir.join("creds.json"))
        .filter(|p| p.exists())
}

/// Resolve the profile name: explicit, then `ACCTSYNC_PROFILE`, then `sandbox`.
pub fn resolve_profile_name(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| env(ENV_PROFILE))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

fn read_profile(path: &Path, name: &str) -> Result<ProfileEntry> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Cannot read credential file {}: {e}",
            path.display()
        ))
    })?;
    let mut profiles: BTreeMap<String, ProfileEntry> = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("Invalid credential file {}: {e}", path.display())))?;

    profiles.remove(name).ok_or_else(|| {
        let available: Vec<&str> = profiles.keys().map(String::as_str).collect();
        Error::Config(format!(
            "Profile '{name}' not found in {} (available: {})",
            path.display(),
            if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            }
        ))
    })
}

/// Load a profile using the process environment.
///
/// # Errors
///
/// Returns `Config` if no credential source is found, the file is unreadable
/// or invalid, the profile is missing, or a required key is empty.
pub fn load_profile(creds: Option<&Path>, profile: Option<&str>) -> Result<Profile> {
    load_profile_with(creds, profile, |key| std::env::var(key).ok())
}

/// Load a profile with an injectable environment lookup.
///
/// # Errors
///
/// See [`load_profile`].
pub fn load_profile_with(
    creds: Option<&Path>,
    profile: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Profile> {
    let name = resolve_profile_name(profile, &env);
    let env_endpoint = env(ENV_ENDPOINT).filter(|v| !v.is_empty());
    let env_token = env(ENV_TOKEN).filter(|v| !v.is_empty());
    let path = resolve_creds_path(creds, &env);

    let entry = match &path {
        Some(path) => read_profile(path, &name)?,
        None if env_endpoint.is_some() && env_token.is_some() => ProfileEntry::default(),
        None => {
            return Err(Error::Config(format!(
                "No credential file found \
                 (looked for ./{LOCAL_CREDS_FILE} and ~/.acctsync/creds.json)"
            )));
        }
    };
    debug!(profile = %name, source = ?path, "resolved credential profile");

    let endpoint = env_endpoint
        .or(entry.endpoint)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("Profile '{name}' has no endpoint")))?;
    let token = env_token
        .or(entry.token)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("Profile '{name}' has no token")))?;
    entry.settings.validate()?;

    Ok(Profile {
        name,
        credentials: Credentials { endpoint, token },
        settings: entry.settings,
        source: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_creds(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("creds.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_default_profile() {
        let dir = TempDir::new().unwrap();
        let path = write_creds(
            &dir,
            r#"{"sandbox": {"endpoint": "test.my.salesforce.com", "token": "abc"}}"#,
        );

        let profile = load_profile_with(Some(&path), None, no_env).unwrap();
        assert_eq!(profile.name, "sandbox");
        assert_eq!(profile.credentials.endpoint, "test.my.salesforce.com");
        assert_eq!(profile.settings, SyncSettings::default());
        assert_eq!(profile.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_profile_settings_and_env_override() {
        let dir = TempDir::new().unwrap();
        let path = write_creds(
            &dir,
            r#"{"prod": {"endpoint": "a", "token": "t", "settings": {"batch_size": 200}}}"#,
        );
        let env = |key: &str| match key {
            ENV_PROFILE => Some("prod".to_string()),
            ENV_TOKEN => Some("from-env".to_string()),
            _ => None,
        };

        let profile = load_profile_with(Some(&path), None, env).unwrap();
        assert_eq!(profile.name, "prod");
        assert_eq!(profile.credentials.token, "from-env");
        assert_eq!(profile.settings.batch_size, 200);
        assert_eq!(profile.settings.object, "Account");
    }

    #[test]
    fn test_missing_profile_lists_available() {
        let dir = TempDir::new().unwrap();
        let path = write_creds(&dir, r#"{"prod": {"endpoint": "a", "token": "t"}}"#);

        let err = load_profile_with(Some(&path), Some("sandbox"), no_env).unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains("available: prod")));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        let err = load_profile_with(Some(&path), None, no_env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_only_credentials() {
        let env = |key: &str| match key {
            ENV_CREDS => None,
            ENV_ENDPOINT => Some("env.example.com".to_string()),
            ENV_TOKEN => Some("tok".to_string()),
            _ => None,
        };
        let dir = TempDir::new().unwrap();
        let path = write_creds(&dir, r#"{"sandbox": {}}"#);
        let profile = load_profile_with(Some(&path), None, env).unwrap();
        assert_eq!(profile.credentials.endpoint, "env.example.com");
    }

    #[test]
    fn test_invalid_batch_size() {
        let dir = TempDir::new().unwrap();
        let path = write_creds(
            &dir,
            r#"{"sandbox": {"endpoint": "a", "token": "t", "settings": {"batch_size": 0}}}"#,
        );
        let err = load_profile_with(Some(&path), None, no_env).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("batch_size")));
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_creds(
            &dir,
            r#"{"sandbox": {"endpoint": "a", "token": "t", "settings": {"batchsize": 10}}}"#,
        );
        assert!(load_profile_with(Some(&path), None, no_env).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let creds = Credentials {
            endpoint: "x".into(),
            token: "secret".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
