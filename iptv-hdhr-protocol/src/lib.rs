//! Wire-facing definitions for the iptv-hdhr tuner emulator.
//!
//! This crate holds the pieces that HDHomeRun clients and IPTV providers
//! see directly:
//!
//! - [`DiscoverResponse`], [`LineupEntry`], [`LineupStatus`]: the JSON
//!   documents served on `/discover.json`, `/lineup.json` and
//!   `/lineup_status.json`
//! - [`m3u`]: the M3U/M3U8 playlist parser used to ingest IPTV channels
//! - [`xmltv`]: the XMLTV program guide reader and writer
//!
//! # Example
//!
//! ```rust
//! use iptv_hdhr_protocol::m3u::Playlist;
//!
//! let text = "#EXTM3U\n\
//!             #EXTINF:-1 tvg-name=\"News\" group-title=\"Info\",News HD\n\
//!             http://src/5.ts\n";
//! let playlist = Playlist::parse(text);
//! assert_eq!(playlist.entries.len(), 1);
//! assert_eq!(playlist.entries[0].name, "News HD");
//! assert_eq!(playlist.entries[0].url, "http://src/5.ts");
//! ```

pub mod error;
pub mod m3u;
pub mod types;
pub mod xmltv;

pub use error::ProtocolError;
pub use m3u::{parse_playlist, Playlist, PlaylistEntry};
pub use types::{DeviceIdentity, DiscoverResponse, LineupEntry, LineupStatus};
pub use xmltv::{Guide, GuideChannel, GuideProgramme};
