//! Shared stream multiplexer.
//!
//! This module provides:
//! - [`StreamManager`]: channel -> session table, one transcoder per channel
//! - [`StreamSession`]: a running transcoder and its viewers
//! - [`SubscriberRegistry`]: per-session viewer queues
//! - [`broadcaster`]: the reader task fanning output out to every queue
//! - [`ProfileRegistry`]: transcode argument templates
//! - [`Launcher`]: process startup seam ([`CommandLauncher`] for real processes)
//! - [`viewer`]: forwarding a subscription to a viewer connection

pub mod broadcaster;
pub mod channel_key;
pub mod manager;
pub mod profile;
pub mod registry;
pub mod session;
pub mod transcoder;
pub mod viewer;

#[cfg(test)]
pub(crate) mod testing;

pub use channel_key::{ChannelKey, InvalidChannelKey};
pub use manager::{StreamError, StreamManager, StreamManagerConfig};
pub use profile::{Profile, ProfileError, ProfileInfo, ProfileRegistry};
pub use registry::{EndReason, StreamItem, SubscriberRegistry, Subscription};
pub use session::{SessionStatus, StreamSession};
pub use transcoder::{CommandLauncher, Invocation, LaunchError, Launcher};
pub use viewer::{pump, ChannelSink, ChunkSink, PumpOutcome};
