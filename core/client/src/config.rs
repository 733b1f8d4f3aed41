//! Client configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bwbridge_common::{Error, Result, SensitiveString};

/// Server used when none is configured.
pub const DEFAULT_SERVER: &str = "https://bitwarden.com";

/// Tool binary looked up on `PATH` when none is configured.
pub const DEFAULT_BINARY: &str = "bw";

/// Upper bound for a single tool invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Environment variable the tool reads its data directory from.
pub const APPDATA_ENV: &str = "BITWARDENCLI_APPDATA_DIR";

/// Prefix the tool puts in front of a user id to form a personal client id.
pub const CLIENT_ID_PREFIX: &str = "user.";

/// Configuration for one vault session.
///
/// Identity fields left unset are filled in from the tool's live status once
/// logged in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Path or name of the tool binary.
    pub binary: PathBuf,
    /// Server the tool must be configured for.
    pub server: String,
    /// Account email.
    pub email: Option<String>,
    /// Account user id.
    pub user_id: Option<String>,
    /// Personal API client id (`user.<user id>`).
    pub client_id: Option<String>,
    /// Master password, fed to `login` and `unlock` over stdin.
    pub master_password: Option<SensitiveString>,
    /// Session key from an earlier unlock.
    pub session_key: Option<SensitiveString>,
    /// Private data directory for the tool, isolating it from the host login.
    pub appdata_dir: Option<PathBuf>,
    /// Timeout for each tool invocation, in seconds.
    pub command_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            server: DEFAULT_SERVER.to_string(),
            email: None,
            user_id: None,
            client_id: None,
            master_password: None,
            session_key: None,
            appdata_dir: None,
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given account email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// Set the master password.
    pub fn with_master_password(mut self, password: impl Into<SensitiveString>) -> Self {
        self.master_password = Some(password.into());
        self
    }

    /// Set the server URL.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the tool binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the expected user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the expected client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Reuse a session key from an earlier unlock.
    pub fn with_session_key(mut self, key: impl Into<SensitiveString>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    /// Give the tool a private data directory.
    pub fn with_appdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.appdata_dir = Some(dir.into());
        self
    }

    /// Set the per-invocation timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs();
        self
    }

    /// Per-invocation timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Extra environment for the tool process.
    pub fn tool_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(dir) = &self.appdata_dir {
            env.insert(APPDATA_ENV.to_string(), dir.to_string_lossy().into_owned());
        }
        env
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    /// - Empty binary or server
    /// - Zero timeout
    /// - Empty identity fields or secrets
    pub fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(Error::InvalidInput("binary cannot be empty".to_string()));
        }
        if self.server.is_empty() {
            return Err(Error::InvalidInput("server cannot be empty".to_string()));
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "command_timeout_secs must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("email", &self.email),
            ("user_id", &self.user_id),
            ("client_id", &self.client_id),
        ] {
            if value.as_deref() == Some("") {
                return Err(Error::InvalidInput(format!("{} cannot be empty", name)));
            }
        }
        if self.master_password.as_ref().is_some_and(|p| p.is_empty()) {
            return Err(Error::InvalidInput(
                "master_password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Default configuration file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bwbridge").join(CONFIG_FILENAME))
    }
}

/// User id implied by a personal client id.
pub fn user_id_from_client_id(client_id: &str) -> &str {
    client_id.strip_prefix(CLIENT_ID_PREFIX).unwrap_or(client_id)
}
