//! External computation invoked once per work item.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chkpt_core::EngineConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::InvocationError;

/// Bytes of stderr kept when an engine run fails.
const STDERR_TAIL: usize = 2048;

/// Runs the external computation for one checkpoint.
///
/// Implementations must block until the run is over and report any failure;
/// the caller only parses the sample log after `Ok(())`.
pub trait Engine: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run to completion with `checkpoint` as initializer and `config` as the
    /// derived job configuration.
    fn invoke(&self, checkpoint: &Path, config: &Path) -> Result<(), InvocationError>;
}

/// Engine backed by a command-line program:
/// `<program> <args...> -c <checkpoint> <config>`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run(&self, checkpoint: &Path, config: &Path) -> Result<(), InvocationError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("-c")
            .arg(checkpoint)
            .arg(config)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(program = %self.program, timeout = ?limit, "engine timed out");
                    return Err(InvocationError::Timeout(limit));
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| InvocationError::Runtime(format!("wait failed: {e}")))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_tail(&output.stderr);
        match output.status.code() {
            Some(code) => {
                debug!(code, "engine returned non-zero exit code");
                Err(InvocationError::ExitStatus { code, stderr })
            }
            None => Err(InvocationError::Killed),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_TAIL) {
        Some((cut, _)) => format!("...{}", &text[cut..]),
        None => text.to_string(),
    }
}

impl Engine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    /// Drives the child on a single-threaded runtime owned by the calling
    /// worker thread; dropping the child on timeout kills it.
    fn invoke(&self, checkpoint: &Path, config: &Path) -> Result<(), InvocationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| InvocationError::Runtime(e.to_string()))?;
        runtime.block_on(self.run(checkpoint, config))
    }
}
