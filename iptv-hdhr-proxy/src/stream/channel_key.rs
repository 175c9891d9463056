//! Channel identification key for stream sharing.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Guide number of a channel, the key under which viewers share a stream.
///
/// When multiple viewers tune to the same guide number they are served by
/// the same transcoder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelKey(u32);

/// Error returned when a path segment is not a guide number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid channel number: {0:?}")]
pub struct InvalidChannelKey(pub String);

impl ChannelKey {
    /// Create a key from a guide number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// The guide number.
    pub const fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelKey {
    type Err = InvalidChannelKey;

    /// Accepts `5` as well as the `v5` form HDHomeRun clients use on `/auto/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| InvalidChannelKey(s.to_string()))
    }
}
