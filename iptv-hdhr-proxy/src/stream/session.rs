//! Stream session: one transcoder shared by the viewers of a channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Local};
use log::{debug, info};
use serde::Serialize;

use crate::stream::channel_key::ChannelKey;
use crate::stream::manager::StreamManager;
use crate::stream::registry::{
    Distribution, EndReason, SubscriberId, SubscriberRegistry, Subscription,
};
use crate::stream::transcoder::{Invocation, ProcessHandle};

/// Snapshot of a session for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: u64,
    pub channel: ChannelKey,
    pub upstream_url: String,
    pub profile: String,
    pub pid: Option<u32>,
    pub live: bool,
    pub subscribers: usize,
    pub bytes_read: u64,
    pub chunks: u64,
    pub evicted: u64,
    pub created_at: String,
    pub uptime_secs: u64,
    pub end_reason: Option<EndReason>,
}

/// A live (or draining) stream for one channel.
pub struct StreamSession {
    id: u64,
    key: ChannelKey,
    upstream_url: String,
    invocation: Invocation,
    process: ProcessHandle,
    registry: SubscriberRegistry,
    live: AtomicBool,
    end_reason: Mutex<Option<EndReason>>,
    created_at: DateTime<Local>,
    started: Instant,
    bytes_read: AtomicU64,
    chunks: AtomicU64,
    evicted: AtomicU64,
    manager: Weak<StreamManager>,
}

impl StreamSession {
    pub(crate) fn new(
        id: u64,
        key: ChannelKey,
        upstream_url: String,
        invocation: Invocation,
        process: ProcessHandle,
        queue_capacity: usize,
        manager: Weak<StreamManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            key,
            upstream_url,
            invocation,
            process,
            registry: SubscriberRegistry::new(queue_capacity),
            live: AtomicBool::new(true),
            end_reason: Mutex::new(None),
            created_at: Local::now(),
            started: Instant::now(),
            bytes_read: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            manager,
        })
    }

    /// Unique id of this session, distinct across restarts of a channel.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    pub(crate) fn manager(&self) -> Option<Arc<StreamManager>> {
        self.manager.upgrade()
    }

    /// Live iff the liveness flag is set and the process is still running.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.process.is_running()
    }

    /// Whether a new viewer may attach.
    pub fn is_joinable(&self) -> bool {
        self.is_live() && !self.registry.is_closed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach a viewer. Returns `None` if the session is already draining.
    pub fn add_subscriber(self: &Arc<Self>) -> Option<Subscription> {
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        let (id, rx) = self.registry.add()?;
        debug!(
            "[ch {}] subscriber {} attached to session {} ({} total)",
            self.key,
            id,
            self.id,
            self.registry.len()
        );
        Some(Subscription::new(id, rx, Arc::clone(self)))
    }

    /// Detach a viewer. Returns true if this emptied the session and ended it.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        match self.registry.remove(id) {
            Some(0) => {
                debug!("[ch {}] last subscriber {} left", self.key, id);
                self.end(EndReason::NoSubscribers);
                true
            }
            Some(remaining) => {
                debug!(
                    "[ch {}] subscriber {} left, {} remaining",
                    self.key, id, remaining
                );
                false
            }
            None => false,
        }
    }

    /// Push a chunk to every subscriber and update the counters.
    pub(crate) fn distribute(&self, chunk: Bytes) -> Distribution {
        let len = chunk.len() as u64;
        let result = self.registry.distribute(&chunk);
        self.bytes_read.fetch_add(len, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed);
        if result.evicted > 0 {
            self.evicted.fetch_add(result.evicted as u64, Ordering::Relaxed);
        }
        result
    }

    /// End the session: clear the liveness flag, kill the process and send
    /// the end marker to every subscriber. Only the first reason is kept.
    pub fn end(&self, reason: EndReason) -> bool {
        let first = self.live.swap(false, Ordering::SeqCst);
        if first {
            *self.end_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
            info!(
                "[ch {}] session {} ending: {} (pid={:?}, {} bytes)",
                self.key,
                self.id,
                reason,
                self.process.id(),
                self.bytes_read.load(Ordering::Relaxed)
            );
        }
        self.process.kill();
        let notified = self.registry.close(&reason);
        if notified > 0 {
            debug!("[ch {}] end marker sent to {} subscribers", self.key, notified);
        }
        first
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            channel: self.key,
            upstream_url: self.upstream_url.clone(),
            profile: self.invocation.profile.clone(),
            pid: self.process.id(),
            live: self.is_live(),
            subscribers: self.registry.len(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            created_at: self.created_at.to_rfc3339(),
            uptime_secs: self.started.elapsed().as_secs(),
            end_reason: self.end_reason(),
        }
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("live", &self.is_live())
            .field("subscribers", &self.registry.len())
            .finish()
    }
}
