//! Stream table: at most one live session per channel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::stream::broadcaster;
use crate::stream::channel_key::ChannelKey;
use crate::stream::profile::ProfileRegistry;
use crate::stream::registry::{EndReason, Subscription};
use crate::stream::session::{SessionStatus, StreamSession};
use crate::stream::transcoder::{BoxedReader, LaunchError, Launcher};

/// How long teardown waits for the transcoder to confirm it exited.
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for stream manager operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The channel has no upstream URL.
    #[error("Channel {0} not found")]
    ChannelNotFound(ChannelKey),

    /// The transcoder could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Every tuner is in use by another channel.
    #[error("All {0} tuners are busy")]
    AllTunersBusy(usize),

    /// The channel lookup itself failed.
    #[error("Channel lookup failed: {0}")]
    Lookup(String),

    /// The session ended before the viewer could attach.
    #[error("Stream for channel {0} ended while attaching")]
    Ended(ChannelKey),
}

/// Stream manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct StreamManagerConfig {
    /// Maximum concurrently live sessions (0 = unlimited).
    pub max_sessions: usize,
    /// Chunks buffered per viewer before it is evicted.
    pub queue_capacity: usize,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            queue_capacity: 256,
        }
    }
}

/// Output of a freshly launched transcoder whose reader task is not running yet.
struct PendingReader {
    output: BoxedReader,
    diagnostics: Option<BoxedReader>,
}

impl PendingReader {
    fn start(self, session: &Arc<StreamSession>) {
        broadcaster::spawn(Arc::clone(session), self.output, self.diagnostics);
    }
}

/// Maps channels to their live stream sessions.
pub struct StreamManager {
    sessions: RwLock<HashMap<ChannelKey, Arc<StreamSession>>>,
    launcher: Arc<dyn Launcher>,
    profiles: Arc<ProfileRegistry>,
    max_sessions: AtomicUsize,
    queue_capacity: usize,
    next_session_id: AtomicU64,
    weak_self: Weak<StreamManager>,
}

impl StreamManager {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        profiles: Arc<ProfileRegistry>,
        config: StreamManagerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            sessions: RwLock::new(HashMap::new()),
            launcher,
            profiles,
            max_sessions: AtomicUsize::new(config.max_sessions),
            queue_capacity: config.queue_capacity,
            next_session_id: AtomicU64::new(1),
            weak_self: weak_self.clone(),
        })
    }

    pub fn profiles(&self) -> &Arc<ProfileRegistry> {
        &self.profiles
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions.load(Ordering::SeqCst)
    }

    /// Change the tuner count. Running sessions are not affected.
    pub fn set_max_sessions(&self, max: usize) {
        self.max_sessions.store(max, Ordering::SeqCst);
    }

    /// Current table entry for `key`, live or not.
    pub async fn get(&self, key: ChannelKey) -> Option<Arc<StreamSession>> {
        self.sessions.read().await.get(&key).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn get_or_create_locked<F, Fut>(
        &self,
        sessions: &mut HashMap<ChannelKey, Arc<StreamSession>>,
        key: ChannelKey,
        resolve: &mut F,
    ) -> Result<(Arc<StreamSession>, Option<PendingReader>), StreamError>
    where
        F: FnMut(ChannelKey) -> Fut,
        Fut: Future<Output = Result<Option<String>, StreamError>>,
    {
        // Double-check after acquiring the write lock
        if let Some(session) = sessions.get(&key).filter(|s| s.is_joinable()) {
            debug!("Reusing stream session {} for channel {} (after lock)", session.id(), key);
            return Ok((Arc::clone(session), None));
        }

        let url = resolve(key)
            .await?
            .filter(|url| !url.trim().is_empty())
            .ok_or(StreamError::ChannelNotFound(key))?;

        let max = self.max_sessions();
        if max > 0 {
            sessions.retain(|k, s| {
                if s.is_live() {
                    true
                } else {
                    debug!("Discarding dead stream session for channel {}", k);
                    false
                }
            });
            let in_use = sessions.keys().filter(|k| **k != key).count();
            if in_use >= max {
                warn!(
                    "All tuners busy ({}/{}), cannot start channel {}",
                    in_use, max, key
                );
                return Err(StreamError::AllTunersBusy(max));
            }
        }

        let invocation = self.profiles.resolve_active(&url);
        let process = self.launcher.launch(&invocation)?;

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = StreamSession::new(
            id,
            key,
            url,
            invocation,
            process.handle,
            self.queue_capacity,
            self.weak_self.clone(),
        );
        info!(
            "Started stream session {} for channel {} (profile '{}', pid={:?})",
            id,
            key,
            session.invocation().profile,
            session.process().id()
        );

        if let Some(stale) = sessions.insert(key, Arc::clone(&session)) {
            stale.end(EndReason::Teardown);
        }
        let pending = PendingReader {
            output: process.output,
            diagnostics: process.diagnostics,
        };
        Ok((session, Some(pending)))
    }

    /// Attach a viewer to the channel, starting the stream if needed.
    ///
    /// `resolve` looks up the upstream URL and is only called when a new
    /// process is needed. The table lock is held from the existence check to
    /// the first attach, so concurrent callers for the same channel share a
    /// single process and no session is ever started without a viewer.
    pub async fn subscribe<F, Fut>(
        &self,
        key: ChannelKey,
        mut resolve: F,
    ) -> Result<Subscription, StreamError>
    where
        F: FnMut(ChannelKey) -> Fut,
        Fut: Future<Output = Result<Option<String>, StreamError>>,
    {
        // Fast path: join a live session
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&key).filter(|s| s.is_joinable()) {
                if let Some(subscription) = session.add_subscriber() {
                    debug!("Joined stream session {} for channel {}", session.id(), key);
                    return Ok(subscription);
                }
            }
        }

        // A reused session can drain between the liveness check and the
        // attach; the second attempt then starts a fresh one.
        for _ in 0..2 {
            let mut sessions = self.sessions.write().await;
            let (session, pending) = self.get_or_create_locked(&mut sessions, key, &mut resolve).await?;
            // The first viewer attaches before the reader starts, so it sees
            // the stream from its first byte.
            let subscription = session.add_subscriber();
            if let Some(pending) = pending {
                pending.start(&session);
            }
            if let Some(subscription) = subscription {
                return Ok(subscription);
            }
        }
        Err(StreamError::Ended(key))
    }

    /// Remove `session` from the table if it is still the current entry for
    /// its channel, then wait for its process to exit.
    pub async fn forget(&self, session: &Arc<StreamSession>) {
        let key = session.key();
        {
            let mut sessions = self.sessions.write().await;
            if sessions.get(&key).is_some_and(|current| Arc::ptr_eq(current, session)) {
                sessions.remove(&key);
                debug!("Removed stream session {} for channel {}", session.id(), key);
            }
        }
        self.await_exit(session).await;
    }

    /// Administrative teardown: end the channel's session, if any.
    pub async fn teardown(&self, key: ChannelKey) -> bool {
        let removed = self.sessions.write().await.remove(&key);
        match removed {
            Some(session) => {
                info!("Tearing down stream for channel {}", key);
                session.end(EndReason::Teardown);
                self.await_exit(&session).await;
                true
            }
            None => false,
        }
    }

    /// End every session (shutdown).
    pub async fn teardown_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.end(EndReason::Teardown);
        }
        for session in &drained {
            self.await_exit(session).await;
        }
    }

    async fn await_exit(&self, session: &StreamSession) {
        if tokio::time::timeout(EXIT_TIMEOUT, session.process().wait())
            .await
            .is_err()
        {
            warn!(
                "Transcoder pid={:?} for channel {} did not exit within {:?}",
                session.process().id(),
                session.key(),
                EXIT_TIMEOUT
            );
        }
    }

    /// Status of every session in the table, ordered by channel.
    pub async fn status(&self) -> Vec<SessionStatus> {
        let sessions = self.sessions.read().await;
        let mut status: Vec<_> = sessions.values().map(|s| s.status()).collect();
        status.sort_by_key(|s| s.channel);
        status
    }
}
