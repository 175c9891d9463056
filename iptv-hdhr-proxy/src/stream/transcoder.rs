//! Transcoder process wrapper.
//!
//! [`Launcher`] is the seam between the stream core and the operating system:
//! [`CommandLauncher`] spawns a real process, tests substitute an in-memory
//! pipe. Either way the caller receives the output byte stream, an optional
//! diagnostics stream and a [`ProcessHandle`] that can kill the process and
//! observe its termination.

use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::stream::channel_key::ChannelKey;

/// Number of stderr lines retained for the post-mortem log.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Boxed byte stream produced by a transcoder.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A fully resolved transcoder command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable path or name.
    pub program: String,
    /// Argument vector, passed to the process without a shell.
    pub args: Vec<String>,
    /// Name of the profile the arguments were rendered from.
    pub profile: String,
}

impl Invocation {
    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Error type for transcoder startup.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("No transcoder executable configured")]
    EmptyProgram,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Transcoder {0} pipe was not captured")]
    MissingPipe(&'static str),
}

/// How a transcoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    /// Exited on its own with the given status code (None if signalled).
    Exited(Option<i32>),
    /// Killed on request.
    Killed,
    /// Waiting on the process failed.
    Failed(String),
}

#[derive(Debug)]
struct ProcessShared {
    pid: Option<u32>,
    kill_tx: watch::Sender<bool>,
    exit_tx: watch::Sender<Option<ExitState>>,
}

/// Caller-side handle to a running transcoder.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    shared: Arc<ProcessShared>,
}

impl ProcessHandle {
    /// OS process id, if known.
    pub fn id(&self) -> Option<u32> {
        self.shared.pid
    }

    /// Request termination. Killing a dead process is a no-op.
    pub fn kill(&self) {
        self.shared.kill_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.shared.exit_tx.borrow().is_none()
    }

    /// Wait until the process has terminated.
    pub async fn wait(&self) -> ExitState {
        let mut rx = self.shared.exit_tx.subscribe();
        // The sender lives in `shared`, so the channel cannot close under us.
        let state = match rx.wait_for(Option::is_some).await {
            Ok(state) => state
                .clone()
                .unwrap_or_else(|| ExitState::Failed("exit state missing".to_string())),
            Err(_) => ExitState::Failed("process supervisor gone".to_string()),
        };
        state
    }
}

/// Supervisor-side half of a [`ProcessHandle`].
///
/// Dropping it without calling [`ProcessControl::mark_exited`] records a
/// failed exit, so a handle never reports a vanished supervisor as running.
#[derive(Debug)]
pub struct ProcessControl {
    shared: Arc<ProcessShared>,
}

impl ProcessControl {
    /// Resolves once [`ProcessHandle::kill`] has been called.
    pub async fn kill_requested(&self) {
        let mut rx = self.shared.kill_tx.subscribe();
        let _ = rx.wait_for(|killed| *killed).await;
    }

    /// Record termination. Only the first call has an effect.
    pub fn mark_exited(&self, state: ExitState) {
        self.shared.exit_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(state);
            true
        });
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        self.mark_exited(ExitState::Failed("process supervisor dropped".to_string()));
    }
}

/// Create a connected handle/control pair for a process.
pub fn process_pair(pid: Option<u32>) -> (ProcessHandle, ProcessControl) {
    let (kill_tx, _) = watch::channel(false);
    let (exit_tx, _) = watch::channel(None);
    let shared = Arc::new(ProcessShared {
        pid,
        kill_tx,
        exit_tx,
    });
    (
        ProcessHandle {
            shared: Arc::clone(&shared),
        },
        ProcessControl { shared },
    )
}

/// A started transcoder.
pub struct TranscoderProcess {
    /// MPEG-TS output.
    pub output: BoxedReader,
    /// Error/diagnostic output.
    pub diagnostics: Option<BoxedReader>,
    pub handle: ProcessHandle,
}

/// Starts transcoder processes.
pub trait Launcher: Send + Sync + 'static {
    /// Start `invocation`. Must not block on the process's output.
    fn launch(&self, invocation: &Invocation) -> Result<TranscoderProcess, LaunchError>;
}

/// Launcher backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<TranscoderProcess, LaunchError> {
        if invocation.program.trim().is_empty() {
            return Err(LaunchError::EmptyProgram);
        }

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take();

        let (handle, control) = process_pair(child.id());
        debug!("Spawned transcoder pid={:?}: {}", child.id(), invocation.command_line());
        tokio::spawn(supervise(child, control));

        Ok(TranscoderProcess {
            output: Box::new(stdout),
            diagnostics: stderr.map(|s| Box::new(s) as BoxedReader),
            handle,
        })
    }
}

/// Reap the child, or kill it when asked.
async fn supervise(mut child: Child, control: ProcessControl) {
    let pid = child.id();
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                debug!("Transcoder pid={:?} exited: {}", pid, status);
                control.mark_exited(ExitState::Exited(status.code()));
            }
            Err(e) => {
                warn!("Failed to wait for transcoder pid={:?}: {}", pid, e);
                control.mark_exited(ExitState::Failed(e.to_string()));
            }
        },
        _ = control.kill_requested() => {
            if let Err(e) = child.kill().await {
                // Already reaped or never started; nothing left to kill.
                debug!("Kill of transcoder pid={:?} returned: {}", pid, e);
            }
            debug!("Transcoder pid={:?} killed", pid);
            control.mark_exited(ExitState::Killed);
        }
    }
}

/// Forward diagnostic lines to the log and return the last few of them.
pub async fn collect_diagnostics(reader: BoxedReader, key: ChannelKey) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                if text.is_empty() {
                    continue;
                }
                debug!("[ch {}] transcoder: {}", key, text);
                if tail.len() == DIAGNOSTIC_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
            Err(e) => {
                debug!("[ch {}] diagnostics stream error: {}", key, e);
                break;
            }
        }
    }

    tail.into()
}
