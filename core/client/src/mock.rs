//! In-memory stand-in for the vault tool.
//!
//! `MockVault` answers the same verbs as `bw` with the same envelopes and
//! exit codes, keeps the tool's persisted login state in memory and records
//! every call. Useful for testing and development.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::command::Invocation;
use crate::runner::{Executor, RawOutput};
use bwbridge_common::Result;

/// Text the tool prints before reading the master password.
pub const PASSWORD_PROMPT: &str = "? Master password: [hidden]\n";

/// Version string reported by `--version`.
pub const MOCK_VERSION: &str = "2024.2.0";

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
}

#[derive(Debug, Default)]
struct MockState {
    server: String,
    accounts: BTreeMap<String, Account>,
    /// Email of the account the tool is logged in as.
    active: Option<String>,
    unlocked: bool,
    session_key: Option<String>,
    issued_keys: u32,
    items: Vec<Value>,
    calls: Vec<String>,
    canned: HashMap<String, VecDeque<RawOutput>>,
}

impl MockState {
    fn session_valid(&self, presented: Option<&str>) -> bool {
        self.unlocked && presented.is_some() && presented == self.session_key.as_deref()
    }

    fn password_matches(&self, email: &str, input: Option<&[u8]>) -> bool {
        match (self.accounts.get(email), input) {
            (Some(account), Some(input)) => {
                input == format!("{}\n", account.password).as_bytes()
            }
            _ => false,
        }
    }

    fn issue_key(&mut self) -> String {
        let key = format!("mock-session-{}", self.issued_keys);
        self.issued_keys += 1;
        self.session_key = Some(key.clone());
        self.unlocked = true;
        key
    }

    fn status(&self, presented: Option<&str>) -> Value {
        let (email, user_id, status) = match &self.active {
            Some(email) => {
                let user_id = self.accounts.get(email).map(|a| a.user_id.clone());
                let status = if self.session_valid(presented) {
                    "unlocked"
                } else {
                    "locked"
                };
                (Some(email.clone()), user_id, status)
            }
            None => (None, None, "unauthenticated"),
        };
        json!({
            "object": "template",
            "template": {
                "serverUrl": self.server,
                "lastSync": "2024-03-01T10:00:00.000Z",
                "userEmail": email,
                "userId": user_id,
                "status": status
            }
        })
    }

    fn respond(&mut self, args: &[&str], presented: Option<&str>, input: Option<&[u8]>) -> RawOutput {
        match args {
            ["--version"] => RawOutput::new(0, format!("{}\n", MOCK_VERSION)),
            ["login", "--check", ..] => match &self.active {
                Some(_) => success(message("You are logged in!")),
                None => failure("You are not logged in."),
            },
            ["unlock", "--check", ..] => {
                if self.session_valid(presented) {
                    success(message("Vault is unlocked!"))
                } else {
                    failure("Vault is locked.")
                }
            }
            ["status", ..] => success(self.status(presented)),
            ["login", "--response", email, ..] => {
                if let Some(active) = &self.active {
                    return failure(&format!("You are already logged in as {}.", active));
                }
                if !self.password_matches(email, input) {
                    return failure("Username or password is incorrect. Try again.");
                }
                self.active = Some(email.to_string());
                let key = self.issue_key();
                prompted(success(session_data("You are logged in!", &key)))
            }
            ["unlock", "--response", ..] => {
                let Some(active) = self.active.clone() else {
                    return failure("You are not logged in.");
                };
                if !self.password_matches(&active, input) {
                    return failure("Invalid master password.");
                }
                let key = self.issue_key();
                prompted(success(session_data("Your vault is now unlocked!", &key)))
            }
            ["logout", ..] => {
                if self.active.take().is_none() {
                    return failure("You are not logged in.");
                }
                self.unlocked = false;
                self.session_key = None;
                success(message("You have logged out."))
            }
            ["lock", ..] => {
                self.unlocked = false;
                self.session_key = None;
                success(message("Your vault is locked."))
            }
            ["sync", ..] => {
                if self.session_valid(presented) {
                    success(message("Syncing complete."))
                } else {
                    failure("Vault is locked.")
                }
            }
            ["list", "items", ..] => {
                if self.session_valid(presented) {
                    success(json!({ "object": "list", "data": self.items }))
                } else {
                    failure("Vault is locked.")
                }
            }
            _ => failure("Invalid command."),
        }
    }
}

fn success(data: Value) -> RawOutput {
    RawOutput::new(0, json!({ "success": true, "data": data }).to_string())
}

fn failure(text: &str) -> RawOutput {
    RawOutput::new(1, json!({ "success": false, "message": text }).to_string())
}

fn message(title: &str) -> Value {
    json!({ "noColor": false, "object": "message", "title": title, "message": null })
}

fn session_data(title: &str, key: &str) -> Value {
    json!({
        "noColor": false,
        "object": "message",
        "title": title,
        "message": "To unlock your vault, set your session key to the `BW_SESSION` environment variable.",
        "raw": key
    })
}

fn prompted(output: RawOutput) -> RawOutput {
    let mut combined = PASSWORD_PROMPT.as_bytes().to_vec();
    combined.extend_from_slice(&output.combined);
    RawOutput {
        exit_code: output.exit_code,
        combined,
    }
}

/// Scriptable in-memory vault tool.
pub struct MockVault {
    state: Mutex<MockState>,
}

impl MockVault {
    /// Create a tool configured for `server` with no accounts and no login.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                server: server.into(),
                ..MockState::default()
            }),
        }
    }

    /// Register an account the tool can log in to.
    pub fn with_account(
        mut self,
        email: impl Into<String>,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.state.get_mut().accounts.insert(
            email.into(),
            Account {
                user_id: user_id.into(),
                password: password.into(),
            },
        );
        self
    }

    /// Start logged in (and locked) as `email`.
    pub fn logged_in_as(mut self, email: impl Into<String>) -> Self {
        self.state.get_mut().active = Some(email.into());
        self
    }

    /// Items returned by `list items`, in the tool's own vocabulary.
    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.state.get_mut().items = items;
        self
    }

    /// Answer the next call named `command` with `output` instead of simulating it.
    pub async fn respond_once(&self, command: &str, output: RawOutput) {
        self.state
            .lock()
            .await
            .canned
            .entry(command.to_string())
            .or_default()
            .push_back(output);
    }

    /// Point the tool at a different server.
    pub async fn set_server(&self, server: impl Into<String>) {
        self.state.lock().await.server = server.into();
    }

    /// Lock the vault behind the caller's back, as another process would.
    pub async fn lock_externally(&self) {
        let mut state = self.state.lock().await;
        state.unlocked = false;
        state.session_key = None;
    }

    /// Names of all calls made so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// How many times `command` was called.
    pub async fn count(&self, command: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| *call == command)
            .count()
    }

    /// Session key currently accepted by the tool.
    pub async fn current_session_key(&self) -> Option<String> {
        self.state.lock().await.session_key.clone()
    }

    /// Email of the account the tool is logged in as.
    pub async fn active_account(&self) -> Option<String> {
        self.state.lock().await.active.clone()
    }
}

#[async_trait]
impl Executor for MockVault {
    async fn execute(&self, invocation: &Invocation, input: Option<&[u8]>) -> Result<RawOutput> {
        let mut state = self.state.lock().await;
        state.calls.push(invocation.name().to_string());

        if let Some(output) = state
            .canned
            .get_mut(invocation.name())
            .and_then(VecDeque::pop_front)
        {
            return Ok(output);
        }

        let args: Vec<&str> = invocation.arg_list().iter().map(String::as_str).collect();
        Ok(state.respond(&args, invocation.session_key(), input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_login_check_reflects_state() {
        let vault = Arc::new(MockVault::new("https://vault.example.com").logged_in_as("ada@example.com"));
        let runner = Runner::new(vault.clone());
        let check = Invocation::new("login --check", "bw").args(["login", "--check", "--response"]);

        let raw = runner.run(&check, Some(1)).await.unwrap();
        assert!(String::from_utf8(raw).unwrap().contains("\"success\":true"));
        assert_eq!(vault.count("login --check").await, 1);
    }

    #[tokio::test]
    async fn test_unlock_issues_prompted_session_key() {
        let vault = MockVault::new("https://vault.example.com")
            .with_account("ada@example.com", "ada-id", "pw")
            .logged_in_as("ada@example.com");
        let unlock = Invocation::new("unlock", "bw").args(["unlock", "--response"]);

        let output = vault.execute(&unlock, Some(b"pw\n")).await.unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert!(output.combined.starts_with(PASSWORD_PROMPT.as_bytes()));
        assert_eq!(
            vault.current_session_key().await.as_deref(),
            Some("mock-session-0")
        );
    }

    #[tokio::test]
    async fn test_canned_response_wins_once() {
        let vault = MockVault::new("https://vault.example.com");
        vault.respond_once("--version", RawOutput::new(0, "1.0.0")).await;
        let version = Invocation::new("--version", "bw").arg("--version");

        assert_eq!(vault.execute(&version, None).await.unwrap().combined, b"1.0.0");
        assert_eq!(
            vault.execute(&version, None).await.unwrap().combined,
            format!("{}\n", MOCK_VERSION).as_bytes()
        );
    }
}
