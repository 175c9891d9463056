//! Database schema definitions.

/// SQL schema for the channel database.
pub const SCHEMA_SQL: &str = r#"
-- Channel catalog built from M3U playlists
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,                    -- Display name from #EXTINF
    url TEXT NOT NULL DEFAULT '',          -- Upstream stream URL (refreshed on reload)
    tvg_name TEXT,                         -- Guide id, editable
    original_tvg_name TEXT UNIQUE NOT NULL,-- Identity across playlist reloads
    logo_url TEXT,
    group_title TEXT,
    active INTEGER DEFAULT 1,              -- Listed in the lineup and streamable
    -- Metadata
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Runtime settings
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),  -- Only one settings row allowed
    tuner_count INTEGER DEFAULT 1,          -- Concurrent channels (0 = unlimited)
    transcode_profile TEXT DEFAULT 'software',
    guide_refresh_minutes INTEGER DEFAULT 360, -- Guide re-parse interval (0 = off)
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- User-defined transcode profiles
CREATE TABLE IF NOT EXISTS custom_profiles (
    name TEXT PRIMARY KEY,
    args_json TEXT NOT NULL,                -- JSON array of argument tokens
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- XMLTV guide data as read from the guide directory, replaced on each parse
CREATE TABLE IF NOT EXISTS raw_guide_channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_id TEXT NOT NULL,                  -- <channel id>
    display_name TEXT NOT NULL DEFAULT '', -- One row per <display-name>
    source_file TEXT
);

CREATE TABLE IF NOT EXISTS raw_guide_programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_channel_id TEXT NOT NULL,          -- <programme channel>
    start TEXT NOT NULL,                   -- XMLTV timestamp as published
    stop TEXT NOT NULL,
    start_ts INTEGER,                      -- Unix seconds, NULL if unparseable
    stop_ts INTEGER,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    source_file TEXT
);

-- Combined guide: raw programmes matched to catalog channels
CREATE TABLE IF NOT EXISTS guide_programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER NOT NULL REFERENCES channels(id),
    start TEXT NOT NULL,
    stop TEXT NOT NULL,
    start_ts INTEGER,
    stop_ts INTEGER,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_channels_active ON channels(active);
CREATE INDEX IF NOT EXISTS idx_raw_guide_channels_raw_id ON raw_guide_channels(raw_id);
CREATE INDEX IF NOT EXISTS idx_raw_guide_channels_name ON raw_guide_channels(display_name);
CREATE INDEX IF NOT EXISTS idx_raw_guide_programs_channel ON raw_guide_programs(raw_channel_id);
CREATE INDEX IF NOT EXISTS idx_guide_programs_channel ON guide_programs(channel_id, start_ts);
"#;
