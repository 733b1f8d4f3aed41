//! Vault tool invocations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use bwbridge_common::SensitiveString;

/// Flag whose following argument is a session key.
pub const SESSION_FLAG: &str = "--session";

/// One invocation of the vault tool.
///
/// `Debug` renders the value following `--session` as `[REDACTED]`, so an
/// invocation can be logged as-is.
#[derive(Clone)]
pub struct Invocation {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    envs: BTreeMap<String, String>,
}

impl Invocation {
    /// Create an invocation with a human-readable name used in errors and logs.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            envs: BTreeMap::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `--session <key>` when a key is held.
    pub fn session(self, key: Option<&SensitiveString>) -> Self {
        match key {
            Some(key) => self.arg(SESSION_FLAG).arg(key.expose()),
            None => self,
        }
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// Human-readable name, e.g. `login --check`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program to execute.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, unredacted.
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Extra environment for the child.
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.envs
    }

    /// Arguments with session keys replaced by `[REDACTED]`.
    pub fn redacted_args(&self) -> Vec<&str> {
        let mut redacted = Vec::with_capacity(self.args.len());
        let mut hide_next = false;
        for arg in &self.args {
            if hide_next {
                redacted.push("[REDACTED]");
                hide_next = false;
            } else {
                hide_next = arg == SESSION_FLAG;
                redacted.push(arg.as_str());
            }
        }
        redacted
    }

    /// Whether the invocation carries a session key.
    pub fn has_session(&self) -> bool {
        self.args.iter().any(|arg| arg == SESSION_FLAG)
    }

    /// Session key passed with this invocation, if any.
    pub fn session_key(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == SESSION_FLAG)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("args", &self.redacted_args())
            .field("envs", &self.envs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The vault tool binary together with the environment every call gets.
#[derive(Debug, Clone)]
pub struct Tool {
    binary: PathBuf,
    envs: BTreeMap<String, String>,
}

impl Tool {
    /// Create a tool handle.
    pub fn new(binary: impl Into<PathBuf>, envs: BTreeMap<String, String>) -> Self {
        Self {
            binary: binary.into(),
            envs,
        }
    }

    /// Binary path.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Build an invocation of `args` named `name`.
    pub fn invocation(&self, name: &str, args: &[&str]) -> Invocation {
        let mut invocation = Invocation::new(name, self.binary.clone()).args(args.iter().copied());
        for (key, value) in &self.envs {
            invocation = invocation.env(key.clone(), value.clone());
        }
        invocation
    }
}
