//! Running the vault tool.
//!
//! `Executor` is the OS-facing seam: it starts one process and returns its
//! exit code and combined output. `Runner` layers exit-code classification,
//! secret delivery and JSON isolation on top of any executor.

use async_trait::async_trait;
use std::io::{self, Read};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use zeroize::Zeroizing;

use crate::command::Invocation;
use bwbridge_common::{Error, Result, SensitiveString};

/// Largest secret accepted for delivery over stdin.
pub const MAX_SECRET_LEN: usize = 64 * 1024;

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub combined: Vec<u8>,
}

impl RawOutput {
    /// Output of a process that exited with `code`.
    pub fn new(exit_code: i32, combined: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            combined: combined.into(),
        }
    }
}

/// Starts vault tool processes.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// When `input` is given it is written to the child's stdin while output
    /// is drained, then stdin is closed.
    ///
    /// # Errors
    /// - The program cannot be started
    /// - The invocation exceeds its time budget
    /// - `input` cannot be written for a reason other than the child exiting
    async fn execute(&self, invocation: &Invocation, input: Option<&[u8]>) -> Result<RawOutput>;
}

/// Executor backed by real child processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    /// Create an executor that kills children running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation, input: Option<&[u8]>) -> Result<RawOutput> {
        // stdout and stderr share one pipe so prompt text and JSON keep their order.
        let (mut reader, writer) = io::pipe()?;

        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arg_list())
            .envs(invocation.env_vars())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(writer.try_clone()?)
            .stderr(writer)
            .kill_on_drop(true);

        debug!(
            command = invocation.name(),
            program = %invocation.program().display(),
            args = ?invocation.redacted_args(),
            "executing vault command"
        );

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: invocation.name().to_string(),
            source,
        })?;
        // The write ends held by `cmd` must close or the drain never sees EOF.
        drop(cmd);

        let drain = tokio::task::spawn_blocking(move || {
            let mut combined = Vec::new();
            reader.read_to_end(&mut combined).map(|_| combined)
        });

        let stdin = child.stdin.take();
        let feed = async move {
            match (stdin, input) {
                (Some(mut stdin), Some(bytes)) => {
                    let written = stdin.write_all(bytes).await;
                    drop(stdin);
                    written
                }
                _ => Ok(()),
            }
        };

        let run = async {
            let (fed, status) = tokio::join!(feed, child.wait());
            let combined = drain.await;
            (fed, status, combined)
        };

        let (fed, status, combined) = timeout(self.timeout, run).await.map_err(|_| Error::Timeout {
            command: invocation.name().to_string(),
            timeout_secs: self.timeout.as_secs(),
        })?;

        let status = status?;
        check_delivery(invocation, fed)?;
        let combined = combined.map_err(io::Error::other)??;

        Ok(RawOutput {
            exit_code: status.code(),
            combined,
        })
    }
}

/// Runs invocations and classifies their outcome.
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn Executor>,
}

impl Runner {
    /// Create a runner over the given executor.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Run `invocation` and return its combined output.
    ///
    /// Exit code 0 always succeeds. `acceptable_exit_code` names one more code
    /// that still yields the output, for tools that answer "no" with a
    /// non-zero exit.
    ///
    /// # Errors
    /// - Any other exit code, or termination by signal
    /// - Executor failures
    pub async fn run(
        &self,
        invocation: &Invocation,
        acceptable_exit_code: Option<i32>,
    ) -> Result<Vec<u8>> {
        let output = self.executor.execute(invocation, None).await?;
        classify(invocation, output, acceptable_exit_code)
    }

    /// Run `invocation` feeding `secret` and a newline on stdin, then strip
    /// any prompt text in front of the JSON payload.
    ///
    /// # Errors
    /// - Secret larger than `MAX_SECRET_LEN`
    /// - Non-zero exit
    /// - No JSON object in the output
    pub async fn run_with_secret(
        &self,
        invocation: &Invocation,
        secret: &SensitiveString,
    ) -> Result<Vec<u8>> {
        if secret.len() > MAX_SECRET_LEN {
            return Err(Error::InvalidInput(format!(
                "secret exceeds {} bytes",
                MAX_SECRET_LEN
            )));
        }

        let mut input = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
        input.extend_from_slice(secret.expose().as_bytes());
        input.push(b'\n');

        let output = self.executor.execute(invocation, Some(input.as_slice())).await?;
        let combined = classify(invocation, output, None)?;
        isolate_json(&combined).map(<[u8]>::to_vec)
    }
}

/// A broken pipe means the tool exited without reading its input; its own
/// output then decides the outcome. Any other write failure is fatal.
fn check_delivery(invocation: &Invocation, fed: io::Result<()>) -> Result<()> {
    match fed {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::BrokenPipe => {
            debug!(
                command = invocation.name(),
                "tool exited before reading its input"
            );
            Ok(())
        }
        Err(source) => Err(Error::SecretDelivery {
            command: invocation.name().to_string(),
            source,
        }),
    }
}

fn classify(
    invocation: &Invocation,
    output: RawOutput,
    acceptable_exit_code: Option<i32>,
) -> Result<Vec<u8>> {
    match output.exit_code {
        Some(0) => Ok(output.combined),
        Some(code) if Some(code) == acceptable_exit_code => {
            debug!(command = invocation.name(), code, "accepted non-zero exit");
            Ok(output.combined)
        }
        code => Err(Error::ProcessFailed {
            command: invocation.name().to_string(),
            output: String::from_utf8_lossy(&output.combined).into_owned(),
            status: match code {
                Some(code) => format!("exit status: {}", code),
                None => "terminated by signal".to_string(),
            },
        }),
    }
}

/// Slice `raw` from its first `{`, dropping interactive prompt text.
///
/// # Errors
/// - `raw` contains no `{`
pub fn isolate_json(raw: &[u8]) -> Result<&[u8]> {
    match raw.iter().position(|&b| b == b'{') {
        Some(start) => Ok(&raw[start..]),
        None => Err(Error::PromptNotStripped {
            raw: String::from_utf8_lossy(raw).into_owned(),
            processed: String::from_utf8_lossy(raw).into_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Replays canned outputs and records what it was given.
    #[derive(Default)]
    struct Canned {
        output: Option<RawOutput>,
        seen_input: Mutex<Option<Vec<u8>>>,
    }

    #[async_trait]
    impl Executor for Canned {
        async fn execute(&self, _: &Invocation, input: Option<&[u8]>) -> Result<RawOutput> {
            *self.seen_input.lock().await = input.map(<[u8]>::to_vec);
            Ok(self.output.clone().unwrap_or_else(|| RawOutput::new(0, "")))
        }
    }

    fn runner_with(output: RawOutput) -> (Runner, Arc<Canned>) {
        let canned = Arc::new(Canned {
            output: Some(output),
            ..Canned::default()
        });
        (Runner::new(canned.clone()), canned)
    }

    fn invocation() -> Invocation {
        Invocation::new("login --check", "bw").args(["login", "--check", "--response"])
    }

    #[test]
    fn test_isolate_json_strips_prompt() {
        let raw = b"Some prompt text\n{\"success\":true,\"data\":{}}\n";
        assert_eq!(isolate_json(raw).unwrap(), b"{\"success\":true,\"data\":{}}\n");
    }

    #[test]
    fn test_isolate_json_keeps_clean_output() {
        let raw = b"{\"success\":true}";
        assert_eq!(isolate_json(raw).unwrap(), raw);
    }

    #[test]
    fn test_isolate_json_without_brace_fails() {
        assert!(matches!(
            isolate_json(b"? Master password: [hidden]"),
            Err(Error::PromptNotStripped { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_accepts_zero() {
        let (runner, _) = runner_with(RawOutput::new(0, "{}"));
        assert_eq!(runner.run(&invocation(), None).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_run_accepts_designated_code() {
        let (runner, _) = runner_with(RawOutput::new(1, r#"{"success":false}"#));
        let output = runner.run(&invocation(), Some(1)).await.unwrap();
        assert_eq!(output, br#"{"success":false}"#);
    }

    #[tokio::test]
    async fn test_run_rejects_other_codes() {
        let (runner, _) = runner_with(RawOutput::new(2, "boom"));
        let err = runner.run(&invocation(), Some(1)).await.unwrap_err();
        match err {
            Error::ProcessFailed { command, output, status } => {
                assert_eq!(command, "login --check");
                assert_eq!(output, "boom");
                assert_eq!(status, "exit status: 2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_rejects_signal() {
        let (runner, _) = runner_with(RawOutput {
            exit_code: None,
            combined: Vec::new(),
        });
        assert!(matches!(
            runner.run(&invocation(), Some(1)).await,
            Err(Error::ProcessFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_with_secret_feeds_line_and_strips_prompt() {
        let (runner, canned) = runner_with(RawOutput::new(
            0,
            "Some prompt text\n{\"success\":true,\"data\":{}}\n",
        ));
        let secret = SensitiveString::new("hunter2");

        let output = runner.run_with_secret(&invocation(), &secret).await.unwrap();
        assert_eq!(output, b"{\"success\":true,\"data\":{}}\n");
        assert_eq!(
            canned.seen_input.lock().await.as_deref(),
            Some(&b"hunter2\n"[..])
        );
    }

    #[tokio::test]
    async fn test_run_with_secret_rejects_nonzero_even_if_json() {
        let (runner, _) = runner_with(RawOutput::new(1, r#"{"success":false}"#));
        let secret = SensitiveString::new("pw");
        assert!(matches!(
            runner.run_with_secret(&invocation(), &secret).await,
            Err(Error::ProcessFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_with_secret_rejects_oversized_secret() {
        let (runner, canned) = runner_with(RawOutput::new(0, "{}"));
        let secret = SensitiveString::new("x".repeat(MAX_SECRET_LEN + 1));
        assert!(matches!(
            runner.run_with_secret(&invocation(), &secret).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(canned.seen_input.lock().await.is_none());
    }

    #[test]
    fn test_broken_pipe_on_delivery_is_tolerated() {
        let fed = Err(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(check_delivery(&invocation(), fed).is_ok());
    }

    #[test]
    fn test_other_delivery_failure_is_fatal() {
        let fed = Err(io::Error::new(io::ErrorKind::PermissionDenied, "stdin closed"));
        match check_delivery(&invocation(), fed) {
            Err(Error::SecretDelivery { command, source }) => {
                assert_eq!(command, "login --check");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn sh(script: &str) -> Invocation {
            Invocation::new("sh", "sh").args(["-c", script])
        }

        #[tokio::test]
        async fn test_combines_stdout_and_stderr() {
            let executor = ProcessExecutor::new(Duration::from_secs(10));
            let output = executor
                .execute(&sh("printf 'prompt '; printf '{}' >&2; exit 3"), None)
                .await
                .unwrap();
            assert_eq!(output.exit_code, Some(3));
            assert_eq!(output.combined, b"prompt {}");
        }

        #[tokio::test]
        async fn test_feeds_stdin() {
            let executor = ProcessExecutor::new(Duration::from_secs(10));
            let output = executor
                .execute(
                    &sh("read pw; printf '? Master password: [hidden]\\n{\"pw\":\"%s\"}' \"$pw\""),
                    Some(b"hunter2\n"),
                )
                .await
                .unwrap();
            assert_eq!(output.exit_code, Some(0));
            assert_eq!(
                isolate_json(&output.combined).unwrap(),
                br#"{"pw":"hunter2"}"#
            );
        }

        #[tokio::test]
        async fn test_child_ignoring_stdin_is_not_an_error() {
            let executor = ProcessExecutor::new(Duration::from_secs(10));
            let output = executor
                .execute(&sh("exec 0<&-; printf '{}'"), Some(b"unused\n"))
                .await
                .unwrap();
            assert_eq!(output.combined, b"{}");
        }

        #[tokio::test]
        async fn test_missing_binary_is_spawn_error() {
            let executor = ProcessExecutor::new(Duration::from_secs(10));
            let invocation = Invocation::new("--version", "/nonexistent/bw").arg("--version");
            assert!(matches!(
                executor.execute(&invocation, None).await,
                Err(Error::Spawn { .. })
            ));
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let executor = ProcessExecutor::new(Duration::from_millis(200));
            let err = executor.execute(&sh("exec sleep 5"), None).await.unwrap_err();
            assert!(matches!(err, Error::Timeout { .. }));
        }
    }
}
