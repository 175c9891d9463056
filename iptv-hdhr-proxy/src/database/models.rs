//! Database model definitions.

use serde::Serialize;

/// Channel record from database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub channel_number: u32,
    pub name: String,
    pub url: String,
    pub tvg_name: Option<String>,
    pub original_tvg_name: String,
    pub logo_url: Option<String>,
    pub group_title: Option<String>,
    pub active: bool,
    // Metadata
    pub created_at: i64,
    pub updated_at: i64,
}

/// Settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsRecord {
    /// Concurrent channels (0 = unlimited).
    pub tuner_count: u32,
    /// Selected transcode profile name.
    pub transcode_profile: String,
    /// Guide re-parse interval in minutes (0 = off).
    pub guide_refresh_minutes: u32,
    pub updated_at: i64,
}

/// Stored custom transcode profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomProfileRecord {
    pub name: String,
    pub args: Vec<String>,
    pub created_at: i64,
}

/// Result of merging a playlist into the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    /// Existing channels whose URL changed.
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn merge(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// Programme from the combined guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramRecord {
    /// Guide number of the channel it airs on.
    pub channel_number: u32,
    pub title: String,
    /// XMLTV timestamps as published.
    pub start: String,
    pub stop: String,
    pub description: String,
}

/// Result of loading guide files into the raw tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RawGuideSummary {
    pub files: usize,
    pub channels: usize,
    pub programmes: usize,
}
