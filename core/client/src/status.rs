//! Payloads the tool returns for status, login and unlock.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication status as reported by `bw status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Unauthenticated,
    Locked,
    Unlocked,
    #[serde(other)]
    Unknown,
}

/// The `template` object of `bw status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: AuthStatus,
}

/// The `data` payload of `bw status`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusOuter {
    pub template: Status,
}

/// The `data` payload of `login` and `unlock`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionData {
    pub no_color: bool,
    pub object: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    /// The new session key.
    pub raw: Option<String>,
}

/// Where a vault session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedInLocked,
    LoggedInUnlocked,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LoggedOut => "logged out",
            Self::LoggedInLocked => "logged in, locked",
            Self::LoggedInUnlocked => "logged in, unlocked",
        };
        f.write_str(text)
    }
}
