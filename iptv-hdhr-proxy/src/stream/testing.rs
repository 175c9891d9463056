//! In-memory launcher for stream tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use crate::stream::registry::{StreamItem, Subscription};
use crate::stream::transcoder::{
    process_pair, ExitState, Invocation, LaunchError, Launcher, TranscoderProcess,
};

struct FakeProcess {
    invocation: Invocation,
    writer: Arc<tokio::sync::Mutex<Option<DuplexStream>>>,
    exit_tx: Option<oneshot::Sender<i32>>,
}

/// Launcher whose processes are duplex pipes driven by the test.
///
/// Killing a fake process closes its output, like a real transcoder.
pub(crate) struct FakeLauncher {
    processes: Mutex<Vec<FakeProcess>>,
    next_pid: AtomicU32,
    fail: AtomicBool,
}

impl FakeLauncher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            processes: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(1000),
            fail: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.processes.lock().unwrap().len()
    }

    pub(crate) fn invocation(&self, index: usize) -> Invocation {
        self.processes.lock().unwrap()[index].invocation.clone()
    }

    /// Write to the stdout of process `index`.
    pub(crate) async fn write(&self, index: usize, data: &[u8]) {
        let writer = Arc::clone(&self.processes.lock().unwrap()[index].writer);
        let mut writer = writer.lock().await;
        if let Some(w) = writer.as_mut() {
            w.write_all(data).await.unwrap();
        }
    }

    /// Close the output of process `index` and exit with `code`.
    pub(crate) async fn exit(&self, index: usize, code: i32) {
        let tx = self.processes.lock().unwrap()[index].exit_tx.take();
        if let Some(tx) = tx {
            let _ = tx.send(code);
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<TranscoderProcess, LaunchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LaunchError::Spawn {
                program: invocation.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(tokio::sync::Mutex::new(Some(writer)));
        let (exit_tx, exit_rx) = oneshot::channel();
        let (handle, control) = process_pair(Some(pid));

        let pipe = Arc::clone(&writer);
        tokio::spawn(async move {
            tokio::select! {
                _ = control.kill_requested() => {
                    pipe.lock().await.take();
                    control.mark_exited(ExitState::Killed);
                }
                code = exit_rx => {
                    pipe.lock().await.take();
                    control.mark_exited(ExitState::Exited(code.ok()));
                }
            }
        });

        self.processes.lock().unwrap().push(FakeProcess {
            invocation: invocation.clone(),
            writer,
            exit_tx: Some(exit_tx),
        });

        Ok(TranscoderProcess {
            output: Box::new(reader),
            diagnostics: None,
            handle,
        })
    }
}

/// Receive chunks until `len` bytes have arrived.
pub(crate) async fn collect(sub: &mut Subscription, len: usize) -> Vec<u8> {
    let mut data = Vec::new();
    while data.len() < len {
        match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await {
            Ok(Some(StreamItem::Chunk(chunk))) => data.extend_from_slice(&chunk),
            other => panic!("expected data, got {:?}", other),
        }
    }
    data
}
