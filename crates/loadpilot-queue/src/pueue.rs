//! `pueue` CLI adapter.
//!
//! Each port operation is one invocation of the `pueue` binary. The child
//! is killed if the call outlives its timeout, so a wedged daemon can
//! never stall the control loop.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use loadpilot_state::{QueueStatus, TaskId};

use crate::error::{QueueError, QueueResult};
use crate::port::QueueCommandPort;
use crate::status::decode_status;

/// Default per-call timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest log output kept from `pueue log`, in bytes.
const MAX_LOG_BYTES: usize = 512 * 1024;

/// [`QueueCommandPort`] backed by the `pueue` command line client.
#[derive(Debug, Clone)]
pub struct PueueCli {
    bin: PathBuf,
    timeout: Duration,
}

impl PueueCli {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `pueue <args>` and return its stdout.
    async fn run(&self, args: &[&str]) -> QueueResult<String> {
        let command = format!("{} {}", self.bin.display(), args.join(" "));
        debug!(%command, "running queue command");

        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(QueueError::Spawn {
                    bin: self.bin.display().to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(QueueError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(QueueError::Exit {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for PueueCli {
    fn default() -> Self {
        Self::new("pueue")
    }
}

impl QueueCommandPort for PueueCli {
    async fn status(&self) -> QueueResult<QueueStatus> {
        let stdout = self.run(&["status", "--json"]).await?;
        decode_status(&stdout)
    }

    async fn set_concurrency(&self, parallel: u32) -> QueueResult<()> {
        self.run(&["parallel", &parallel.to_string()]).await.map(drop)
    }

    async fn pause(&self, task_id: TaskId) -> QueueResult<()> {
        self.run(&["pause", &task_id.to_string()]).await.map(drop)
    }

    async fn resume(&self, task_id: TaskId) -> QueueResult<()> {
        self.run(&["start", &task_id.to_string()]).await.map(drop)
    }

    async fn clean_finished(&self) -> QueueResult<()> {
        self.run(&["clean"]).await.map(drop)
    }

    async fn task_log(&self, task_id: TaskId, lines: usize) -> QueueResult<String> {
        let mut log = self
            .run(&["log", &task_id.to_string(), "--lines", &lines.to_string()])
            .await?;
        if log.len() > MAX_LOG_BYTES {
            let mut cut = log.len() - MAX_LOG_BYTES;
            while !log.is_char_boundary(cut) {
                cut += 1;
            }
            log.drain(..cut);
        }
        Ok(log)
    }
}
