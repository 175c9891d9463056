//! Error types for playlist and guide ingestion.

use thiserror::Error;

/// Errors raised while decoding provider-supplied documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The playlist bytes are not valid UTF-8.
    #[error("Playlist is not valid UTF-8 (first invalid byte at offset {0})")]
    InvalidEncoding(usize),

    /// The content is neither headed by `#EXTM3U` nor contains any entry.
    #[error("Not an M3U playlist: {0}")]
    NotAPlaylist(String),

    /// The guide is not well-formed XML.
    #[error("Malformed XMLTV guide: {0}")]
    Xml(String),

    /// Well-formed XML, but not an XMLTV `<tv>` document.
    #[error("Not an XMLTV guide: {0}")]
    NotAGuide(String),
}
