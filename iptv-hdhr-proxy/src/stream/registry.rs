//! Per-session subscriber queues.
//!
//! Every viewer owns a bounded queue. The broadcaster pushes each chunk into
//! all queues under the registry lock, so add/remove is linearizable with
//! respect to distribution: a queue either sees a chunk or was not registered
//! when it was pushed.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use log::{debug, warn};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::stream::session::StreamSession;

/// Identifier of a subscriber within one session.
pub type SubscriberId = u64;

/// Item delivered to a subscriber queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Chunk(Bytes),
    /// Terminal marker; always the last item a queue receives.
    End(EndReason),
}

/// Why a stream session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// The transcoder closed its output.
    UpstreamEof,
    /// The transcoder failed or exited with an error status.
    ProcessError(String),
    /// The last viewer left.
    NoSubscribers,
    /// Administrative teardown.
    Teardown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::UpstreamEof => write!(f, "upstream EOF"),
            EndReason::ProcessError(msg) => write!(f, "process error: {}", msg),
            EndReason::NoSubscribers => write!(f, "no subscribers"),
            EndReason::Teardown => write!(f, "teardown"),
        }
    }
}

/// Result of pushing one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Distribution {
    pub delivered: usize,
    pub evicted: usize,
    /// The registry is closed; no subscriber will ever see another chunk.
    pub drained: bool,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: SubscriberId,
    queues: Vec<(SubscriberId, mpsc::Sender<StreamItem>)>,
    closed: bool,
}

/// Registered subscriber queues of one stream session.
#[derive(Debug)]
pub struct SubscriberRegistry {
    /// Chunks a queue may hold before its viewer is evicted.
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                queues: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new queue. Returns `None` once the registry is closed.
    pub fn add(&self) -> Option<(SubscriberId, mpsc::Receiver<StreamItem>)> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        // One extra slot so the terminal marker always fits.
        let (tx, rx) = mpsc::channel(self.capacity + 1);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.queues.push((id, tx));
        Some((id, rx))
    }

    /// Deregister a queue. Returns the remaining count, or `None` if `id` was
    /// not registered. Reaching zero closes the registry.
    pub fn remove(&self, id: SubscriberId) -> Option<usize> {
        let mut inner = self.lock();
        let pos = inner.queues.iter().position(|(qid, _)| *qid == id)?;
        inner.queues.swap_remove(pos);
        let remaining = inner.queues.len();
        if remaining == 0 {
            inner.closed = true;
        }
        Some(remaining)
    }

    pub fn len(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Push `chunk` to every registered queue.
    ///
    /// A queue without room (or whose receiver is gone) is dropped from the
    /// registry; its viewer then sees the queue end without a marker.
    pub fn distribute(&self, chunk: &Bytes) -> Distribution {
        let mut inner = self.lock();
        if inner.closed {
            return Distribution {
                drained: true,
                ..Default::default()
            };
        }

        let mut result = Distribution::default();
        inner.queues.retain(|(id, tx)| {
            if tx.capacity() <= 1 {
                warn!("Evicting subscriber {}: queue full", id);
                result.evicted += 1;
                return false;
            }
            match tx.try_send(StreamItem::Chunk(chunk.clone())) {
                Ok(()) => {
                    result.delivered += 1;
                    true
                }
                Err(_) => {
                    debug!("Dropping subscriber {}: receiver gone", id);
                    result.evicted += 1;
                    false
                }
            }
        });

        if result.evicted > 0 && inner.queues.is_empty() {
            inner.closed = true;
        }
        result.drained = inner.closed;
        result
    }

    /// Close the registry and deliver the terminal marker to every queue.
    /// Returns the number of queues that were notified.
    pub fn close(&self, reason: &EndReason) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let queues = std::mem::take(&mut inner.queues);
        for (id, tx) in &queues {
            if tx.try_send(StreamItem::End(reason.clone())).is_err() {
                debug!("Subscriber {} gone before end marker", id);
            }
        }
        queues.len()
    }
}

/// A viewer's attachment to a stream session.
///
/// Dropping a subscription deregisters it; [`Subscription::unsubscribe`] does
/// the same and additionally waits for the session to be released when this
/// was the last viewer.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<StreamItem>,
    session: Arc<StreamSession>,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<StreamItem>,
        session: Arc<StreamSession>,
    ) -> Self {
        Self {
            id,
            rx,
            session,
            released: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// Next item, or `None` if the queue was abandoned without an end marker
    /// (eviction) or the marker was already received.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Deregister and, if this was the last viewer, release the session.
    pub async fn unsubscribe(mut self) {
        self.released = true;
        if self.session.remove_subscriber(self.id) {
            if let Some(manager) = self.session.manager() {
                manager.forget(&self.session).await;
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.session.key())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.session.remove_subscriber(self.id) {
            if let (Some(manager), Ok(runtime)) = (self.session.manager(), Handle::try_current()) {
                let session = Arc::clone(&self.session);
                runtime.spawn(async move { manager.forget(&session).await });
            }
        }
    }
}
