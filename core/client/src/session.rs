//! Vault session lifecycle.
//!
//! The tool persists its own login state, so every transition first asks the
//! tool where it stands and only then acts. Transitions are idempotent:
//! calling `ensure_unlocked` on an unlocked vault runs no unlock.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::command::Tool;
use crate::config::{user_id_from_client_id, ClientConfig, CLIENT_ID_PREFIX};
use crate::response::{decode, decode_data_on_success};
use crate::runner::{isolate_json, Executor, ProcessExecutor, Runner};
use crate::status::{SessionData, SessionState, Status, StatusOuter};
use bwbridge_common::{Error, Result, SensitiveString};
use bwbridge_transform::Conversion;

const VERSION: &str = "--version";
const LOGIN_CHECK: &str = "login --check";
const UNLOCK_CHECK: &str = "unlock --check";
const STATUS: &str = "status";
const LOGIN: &str = "login";
const LOGOUT: &str = "logout";
const UNLOCK: &str = "unlock";
const LOCK: &str = "lock";
const SYNC: &str = "sync";

/// Exit code the tool uses when a check answers "no".
const NEGATIVE_EXIT_CODE: i32 = 1;

/// Account identity the session is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
}

enum IdentityCheck {
    Match,
    Mismatch(String),
}

/// Drives the tool between logged out, locked and unlocked.
pub struct SessionManager {
    runner: Runner,
    tool: Tool,
    server: String,
    master_password: Option<SensitiveString>,
    identity: RwLock<Identity>,
    session_key: RwLock<Option<SensitiveString>>,
    /// Held across a status check and the login, logout, lock or unlock it guards.
    auth_lock: Mutex<()>,
    /// Held across sync and listing.
    data_lock: Mutex<()>,
}

impl SessionManager {
    /// Create a manager that runs the real tool binary.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let executor = Arc::new(ProcessExecutor::new(config.command_timeout()));
        Self::with_executor(config, executor)
    }

    /// Create a manager over a custom executor.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_executor(config: ClientConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;

        let tool = Tool::new(config.binary.clone(), config.tool_env());
        Ok(Self {
            runner: Runner::new(executor),
            tool,
            server: config.server,
            master_password: config.master_password,
            identity: RwLock::new(Identity {
                email: config.email,
                user_id: config.user_id,
                client_id: config.client_id,
            }),
            session_key: RwLock::new(config.session_key),
            auth_lock: Mutex::new(()),
            data_lock: Mutex::new(()),
        })
    }

    /// Create a manager and bring the vault to a synced, unlocked state.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - The tool is missing or fails
    /// - Login, unlock or sync fails
    pub async fn connect(config: ClientConfig) -> Result<Arc<Self>> {
        let manager = Arc::new(Self::new(config)?);
        manager.open().await?;
        Ok(manager)
    }

    /// Check the tool is present, then unlock and sync.
    pub async fn open(&self) -> Result<()> {
        let version = self.version().await?;
        info!(%version, server = %self.server, "opening vault session");

        self.ensure_unlocked().await?;
        self.sync().await
    }

    /// Server the session is bound to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Identity as currently known, including fields filled in from status.
    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Session key currently held.
    pub async fn session_key(&self) -> Option<SensitiveString> {
        self.session_key.read().await.clone()
    }

    /// Version string reported by the tool.
    pub async fn version(&self) -> Result<String> {
        let invocation = self.tool.invocation(VERSION, &["--version"]);
        let raw = self.runner.run(&invocation, None).await?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }

    /// Live status of the tool.
    ///
    /// # Errors
    /// - The tool fails or reports failure
    /// - The payload is not a status template
    pub async fn status(&self) -> Result<Status> {
        let key = self.session_key().await;
        let invocation = self
            .tool
            .invocation(STATUS, &["status", "--response"])
            .session(key.as_ref());
        let raw = self.runner.run(&invocation, None).await?;
        let data = decode_data_on_success(STATUS, &raw, None)?;

        StatusOuter::deserialize(&data)
            .map(|outer| outer.template)
            .map_err(|e| Error::UnexpectedOutput {
                command: STATUS.to_string(),
                output: format!("{}: {}", e, data),
            })
    }

    /// Where the session stands right now.
    pub async fn state(&self) -> Result<SessionState> {
        if !self.login_check().await? {
            return Ok(SessionState::LoggedOut);
        }
        if self.unlock_check().await? {
            Ok(SessionState::LoggedInUnlocked)
        } else {
            Ok(SessionState::LoggedInLocked)
        }
    }

    async fn login_check(&self) -> Result<bool> {
        let invocation = self
            .tool
            .invocation(LOGIN_CHECK, &["login", "--check", "--response"]);
        let raw = self.runner.run(&invocation, Some(NEGATIVE_EXIT_CODE)).await?;
        Ok(decode(LOGIN_CHECK, &raw, None)?.success)
    }

    async fn unlock_check(&self) -> Result<bool> {
        let key = self.session_key().await;
        let invocation = self
            .tool
            .invocation(UNLOCK_CHECK, &["unlock", "--check", "--response"])
            .session(key.as_ref());
        let raw = self.runner.run(&invocation, Some(NEGATIVE_EXIT_CODE)).await?;
        Ok(decode(UNLOCK_CHECK, &raw, None)?.success)
    }

    /// Compare live status with the configured identity.
    ///
    /// A server mismatch is an error. Fields left unconfigured are filled in
    /// from status.
    async fn check_identity(&self) -> Result<IdentityCheck> {
        let status = self.status().await?;

        let live_server = status.server_url.as_deref().unwrap_or_default();
        if live_server != self.server {
            return Err(Error::IdentityMismatch(format!(
                "mismatching serverUrl ({}) and server ({})",
                live_server, self.server
            )));
        }

        let live_email = status.user_email.unwrap_or_default();
        let live_user_id = status.user_id.unwrap_or_default();
        let mut identity = self.identity.write().await;

        if let Some(email) = identity.email.as_deref().filter(|e| *e != live_email) {
            return Ok(IdentityCheck::Mismatch(format!(
                "mismatching userEmail ({}) and email ({})",
                live_email, email
            )));
        }
        if let Some(client_id) = identity
            .client_id
            .as_deref()
            .filter(|c| user_id_from_client_id(c) != live_user_id)
        {
            return Ok(IdentityCheck::Mismatch(format!(
                "mismatching userId ({}) and client_id ({})",
                live_user_id, client_id
            )));
        }
        if let Some(user_id) = identity.user_id.as_deref().filter(|u| *u != live_user_id) {
            return Ok(IdentityCheck::Mismatch(format!(
                "mismatching userId ({}) and user_id ({})",
                live_user_id, user_id
            )));
        }

        if !live_email.is_empty() && identity.email.is_none() {
            debug!(email = %live_email, "adopting email from status");
            identity.email = Some(live_email);
        }
        if !live_user_id.is_empty() {
            if identity.client_id.is_none() {
                identity.client_id = Some(format!("{}{}", CLIENT_ID_PREFIX, live_user_id));
            }
            if identity.user_id.is_none() {
                debug!(user_id = %live_user_id, "adopting user id from status");
                identity.user_id = Some(live_user_id);
            }
        }

        Ok(IdentityCheck::Match)
    }

    /// Make sure the tool is logged in to the configured account.
    ///
    /// A login to another account on the same server is logged out and
    /// replaced.
    ///
    /// # Errors
    /// - The tool is configured for another server
    /// - Login fails, or still yields the wrong account
    pub async fn ensure_logged_in(&self) -> Result<()> {
        if self.login_check().await? {
            match self.check_identity().await? {
                IdentityCheck::Match => return Ok(()),
                IdentityCheck::Mismatch(reason) => {
                    warn!(%reason, "logged in as another account, logging out");
                    self.ensure_logged_out().await?;
                }
            }
        }

        self.login().await?;

        match self.check_identity().await? {
            IdentityCheck::Match => Ok(()),
            IdentityCheck::Mismatch(reason) => Err(Error::IdentityMismatch(reason)),
        }
    }

    async fn login(&self) -> Result<()> {
        let password = self.require_password("log in")?;
        let email = self.identity.read().await.email.clone().ok_or_else(|| {
            Error::InvalidInput("an email is required to log in".to_string())
        })?;

        let _auth = self.auth_lock.lock().await;
        info!(%email, server = %self.server, "logging in");

        let invocation = self
            .tool
            .invocation(LOGIN, &["login", "--response", email.as_str()]);
        let raw = self.runner.run_with_secret(&invocation, password).await?;
        self.adopt_session_key(LOGIN, &raw).await
    }

    /// Make sure the tool holds no login.
    pub async fn ensure_logged_out(&self) -> Result<()> {
        if !self.login_check().await? {
            debug!("already logged out");
            return Ok(());
        }

        let _auth = self.auth_lock.lock().await;
        let invocation = self.tool.invocation(LOGOUT, &["logout", "--response"]);
        let raw = self.runner.run(&invocation, Some(NEGATIVE_EXIT_CODE)).await?;
        if !decode(LOGOUT, &raw, None)?.success {
            debug!("logout found no active login");
        }

        self.session_key.write().await.take();
        info!("logged out");
        Ok(())
    }

    /// Make sure the vault is unlocked and a session key is held.
    ///
    /// # Errors
    /// - Any `ensure_logged_in` error
    /// - No master password configured
    /// - The tool rejects the password
    pub async fn ensure_unlocked(&self) -> Result<()> {
        self.ensure_logged_in().await?;

        let _auth = self.auth_lock.lock().await;
        if self.unlock_check().await? {
            debug!("vault already unlocked");
            return Ok(());
        }

        let password = self.require_password("unlock")?;
        let invocation = self.tool.invocation(UNLOCK, &["unlock", "--response"]);
        let raw = self.runner.run_with_secret(&invocation, password).await?;
        self.adopt_session_key(UNLOCK, &raw).await?;

        info!("vault unlocked");
        Ok(())
    }

    /// Make sure the vault is locked, logging in first if needed.
    pub async fn ensure_locked(&self) -> Result<()> {
        self.ensure_logged_in().await?;

        let _auth = self.auth_lock.lock().await;
        if !self.unlock_check().await? {
            debug!("vault already locked");
            return Ok(());
        }

        let invocation = self.tool.invocation(LOCK, &["lock", "--response"]);
        let raw = self.runner.run(&invocation, Some(NEGATIVE_EXIT_CODE)).await?;
        decode_data_on_success(LOCK, &raw, None)?;

        self.session_key.write().await.take();
        info!("vault locked");
        Ok(())
    }

    /// Pull the latest vault contents from the server.
    pub async fn sync(&self) -> Result<()> {
        self.ensure_unlocked().await?;
        self.fetch(SYNC, &["sync", "--response"], None).await?;
        info!("vault synced");
        Ok(())
    }

    /// Run a data command under the session key and return its `data`.
    ///
    /// The master password is fed on stdin when configured so a stray prompt
    /// cannot stall the call; prompt text is dropped either way.
    pub(crate) async fn fetch(
        &self,
        command: &str,
        args: &[&str],
        conversion: Option<&Conversion>,
    ) -> Result<Value> {
        let _data = self.data_lock.lock().await;
        let key = self.session_key().await;
        let invocation = self.tool.invocation(command, args).session(key.as_ref());

        let raw = match &self.master_password {
            Some(password) => self.runner.run_with_secret(&invocation, password).await?,
            None => {
                let raw = self.runner.run(&invocation, None).await?;
                isolate_json(&raw)?.to_vec()
            }
        };
        decode_data_on_success(command, &raw, conversion)
    }

    async fn adopt_session_key(&self, command: &str, raw: &[u8]) -> Result<()> {
        let data = decode_data_on_success(command, raw, None)?;
        let session = SessionData::deserialize(&data).map_err(|e| Error::UnexpectedOutput {
            command: command.to_string(),
            output: format!("{}: {}", e, data),
        })?;

        match session.raw.filter(|key| !key.is_empty()) {
            Some(key) => {
                *self.session_key.write().await = Some(SensitiveString::new(key));
                debug!(command, "stored new session key");
                Ok(())
            }
            None => Err(Error::UnexpectedOutput {
                command: command.to_string(),
                output: "response carries no session key".to_string(),
            }),
        }
    }

    fn require_password(&self, action: &str) -> Result<&SensitiveString> {
        self.master_password.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!("a master password is required to {}", action))
        })
    }
}
