//! Forwarding a subscription to a viewer connection.

use std::future::Future;
use std::io;

use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc;

use crate::stream::registry::{EndReason, StreamItem, Subscription};

/// The viewer's connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("viewer connection closed")]
pub struct SubscriberWriteError;

/// Outbound side of a viewer connection.
pub trait ChunkSink: Send {
    /// Write one chunk. An error means the viewer disconnected.
    fn send(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), SubscriberWriteError>> + Send;

    /// Resolves when the viewer has disconnected.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Sink feeding a streamed HTTP response body.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, io::Error>>) -> Self {
        Self { tx }
    }
}

impl ChunkSink for ChannelSink {
    fn send(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), SubscriberWriteError>> + Send {
        async move { self.tx.send(Ok(chunk)).await.map_err(|_| SubscriberWriteError) }
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        self.tx.closed()
    }
}

/// How a viewer's stream finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The session ended and sent its end marker.
    Ended(EndReason),
    /// The viewer disconnected or a write failed.
    ViewerGone,
    /// The viewer was evicted for falling behind.
    Abandoned,
}

/// Forward `subscription` into `sink` until either side ends.
///
/// The subscription is always explicitly released before returning, so a
/// failed write counts as an unsubscribe.
pub async fn pump<S: ChunkSink>(mut subscription: Subscription, mut sink: S) -> PumpOutcome {
    let key = subscription.session().key();
    let outcome = loop {
        let item = tokio::select! {
            item = subscription.recv() => item,
            _ = sink.closed() => break PumpOutcome::ViewerGone,
        };
        match item {
            Some(StreamItem::Chunk(chunk)) => {
                if sink.send(chunk).await.is_err() {
                    break PumpOutcome::ViewerGone;
                }
            }
            Some(StreamItem::End(reason)) => break PumpOutcome::Ended(reason),
            None => break PumpOutcome::Abandoned,
        }
    };

    debug!(
        "[ch {}] viewer {} finished: {:?}",
        key,
        subscription.id(),
        outcome
    );
    subscription.unsubscribe().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::stream::channel_key::ChannelKey;
    use crate::stream::manager::{StreamError, StreamManager, StreamManagerConfig};
    use crate::stream::profile::ProfileRegistry;
    use crate::stream::testing::FakeLauncher;
    use crate::stream::transcoder::Launcher;

    /// Sink that fails after a fixed number of writes.
    struct FlakySink {
        remaining: usize,
        written: Arc<AtomicUsize>,
    }

    impl ChunkSink for FlakySink {
        fn send(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), SubscriberWriteError>> + Send {
            let result = if self.remaining == 0 {
                Err(SubscriberWriteError)
            } else {
                self.remaining -= 1;
                self.written.fetch_add(chunk.len(), Ordering::SeqCst);
                Ok(())
            };
            std::future::ready(result)
        }

        fn closed(&self) -> impl Future<Output = ()> + Send {
            std::future::pending()
        }
    }

    async fn lookup(_: ChannelKey) -> Result<Option<String>, StreamError> {
        Ok(Some("http://src/5.ts".to_string()))
    }

    fn manager(launcher: &Arc<FakeLauncher>) -> Arc<StreamManager> {
        StreamManager::new(
            Arc::clone(launcher) as Arc<dyn Launcher>,
            Arc::new(ProfileRegistry::new("ffmpeg")),
            StreamManagerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_write_failure_unsubscribes() {
        let launcher = FakeLauncher::new();
        let manager = manager(&launcher);
        let key = ChannelKey::new(5);

        let sub = manager.subscribe(key, lookup).await.unwrap();
        let session = Arc::clone(sub.session());
        let written = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            remaining: 0,
            written: Arc::clone(&written),
        };
        let pump_task = tokio::spawn(pump(sub, sink));

        launcher.write(0, b"payload").await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), pump_task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, PumpOutcome::ViewerGone);
        assert_eq!(written.load(Ordering::SeqCst), 0);
        assert!(!session.is_live());
        assert!(manager.get(key).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_body_unsubscribes() {
        let launcher = FakeLauncher::new();
        let manager = manager(&launcher);
        let key = ChannelKey::new(5);

        let sub = manager.subscribe(key, lookup).await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        let pump_task = tokio::spawn(pump(sub, ChannelSink::new(tx)));
        drop(rx);

        let outcome = tokio::time::timeout(Duration::from_secs(5), pump_task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PumpOutcome::ViewerGone);
        assert!(manager.get(key).await.is_none());
    }

    #[tokio::test]
    async fn test_forwards_until_end_marker() {
        let launcher = FakeLauncher::new();
        let manager = manager(&launcher);

        let sub = manager.subscribe(ChannelKey::new(5), lookup).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let pump_task = tokio::spawn(pump(sub, ChannelSink::new(tx)));

        launcher.write(0, b"0123456789").await;
        let mut body = Vec::new();
        while body.len() < 10 {
            let chunk = rx.recv().await.unwrap().unwrap();
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"0123456789");

        launcher.exit(0, 0).await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), pump_task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PumpOutcome::Ended(EndReason::UpstreamEof));
        // The body stream ends once the sink is dropped.
        assert!(rx.recv().await.is_none());
    }
}
