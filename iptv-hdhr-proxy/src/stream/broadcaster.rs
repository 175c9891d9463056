//! Fan-out reader task.
//!
//! One task per session reads the transcoder output and pushes every chunk
//! to all subscriber queues. No lock is held while waiting on the read.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::stream::registry::EndReason;
use crate::stream::session::StreamSession;
use crate::stream::transcoder::{collect_diagnostics, BoxedReader, ExitState};

/// Read size: 64 MPEG-TS packets.
pub const CHUNK_SIZE: usize = 188 * 64;

/// How long to wait for the process to report its exit status after EOF.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Pump `output` into the session until EOF, error, or no viewers remain.
pub async fn run<R>(session: &StreamSession, mut output: R) -> EndReason
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match output.read(&mut buf).await {
            Ok(0) => return exit_reason(session).await,
            Ok(n) => {
                let result = session.distribute(Bytes::copy_from_slice(&buf[..n]));
                if result.drained {
                    return EndReason::NoSubscribers;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return EndReason::ProcessError(format!("read failed: {}", e)),
        }
    }
}

/// Classify an EOF by the process exit status.
async fn exit_reason(session: &StreamSession) -> EndReason {
    match tokio::time::timeout(EXIT_GRACE, session.process().wait()).await {
        Ok(ExitState::Exited(Some(code))) if code != 0 => {
            EndReason::ProcessError(format!("transcoder exited with status {}", code))
        }
        Ok(ExitState::Failed(msg)) => EndReason::ProcessError(msg),
        _ => EndReason::UpstreamEof,
    }
}

/// Start the reader task for `session`.
///
/// When the loop stops the session is ended (subscribers get the end
/// marker), the diagnostics tail is logged for failures, and the session is
/// removed from its manager's table.
pub fn spawn(
    session: Arc<StreamSession>,
    output: BoxedReader,
    diagnostics: Option<BoxedReader>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let key = session.key();
        let diagnostics = diagnostics.map(|reader| tokio::spawn(collect_diagnostics(reader, key)));

        let reason = run(&session, output).await;
        session.end(reason.clone());
        // A teardown or last-leave may have ended the session first.
        let reason = session.end_reason().unwrap_or(reason);

        let tail = match diagnostics {
            Some(task) => match tokio::time::timeout(EXIT_GRACE, task).await {
                Ok(Ok(tail)) => tail,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        if let EndReason::ProcessError(msg) = &reason {
            warn!("[ch {}] transcoder failed: {}", key, msg);
            for line in &tail {
                warn!("[ch {}]   {}", key, line);
            }
        }

        let status = session.status();
        info!(
            "[ch {}] reader stopped ({}): {} bytes in {} chunks, {} evicted",
            key, reason, status.bytes_read, status.chunks, status.evicted
        );

        if let Some(manager) = session.manager() {
            manager.forget(&session).await;
        }
    })
}
