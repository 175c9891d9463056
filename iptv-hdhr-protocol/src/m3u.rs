//! M3U / M3U8 playlist parsing.
//!
//! Only the subset IPTV providers actually emit is understood:
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-name="News" tvg-logo="http://logo/news.png" group-title="Info",News HD
//! #EXTGRP:Info
//! http://provider/live/5.ts
//! ```
//!
//! Each `#EXTINF` line is paired with the next line that is neither empty nor
//! a comment. Entries whose URL is missing are dropped.

use crate::error::ProtocolError;

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF";

/// A single channel entry from a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Display name (text after the attribute list).
    pub name: String,
    /// Upstream stream URL.
    pub url: String,
    /// `tvg-name` attribute, used as the stable identity of the channel.
    pub tvg_name: Option<String>,
    /// `tvg-logo` attribute.
    pub tvg_logo: Option<String>,
    /// `group-title` attribute.
    pub group_title: Option<String>,
}

impl PlaylistEntry {
    /// Key that identifies the channel across playlist reloads.
    ///
    /// Providers rotate URLs, but keep `tvg-name` stable; entries without it
    /// fall back to the display name.
    pub fn identity(&self) -> &str {
        self.tvg_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }
}

/// A parsed playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    /// Parse playlist text. Never fails; unrecognised lines are ignored.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut pending: Option<PlaylistEntry> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if starts_with_ignore_case(line, EXTINF) {
                // A previous entry still waiting for its URL is dropped.
                pending = Some(parse_extinf(line));
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if let Some(mut entry) = pending.take() {
                entry.url = line.to_string();
                entries.push(entry);
            }
        }

        Self { entries }
    }

    /// Decode and parse raw playlist file contents.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidEncoding(e.valid_up_to()))?;
        let text = text.trim_start_matches('\u{feff}');

        let playlist = Self::parse(text);
        let has_header = starts_with_ignore_case(text.trim_start(), HEADER);
        if playlist.entries.is_empty() && !has_header && !text.trim().is_empty() {
            let preview: String = text.trim().chars().take(32).collect();
            return Err(ProtocolError::NotAPlaylist(preview));
        }

        Ok(playlist)
    }
}

/// Parse playlist text into its entries.
pub fn parse_playlist(text: &str) -> Vec<PlaylistEntry> {
    Playlist::parse(text).entries
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Parse an `#EXTINF:<duration> key="value" ...,<name>` line.
fn parse_extinf(line: &str) -> PlaylistEntry {
    PlaylistEntry {
        name: display_name(line),
        url: String::new(),
        tvg_name: attribute(line, "tvg-name"),
        tvg_logo: attribute(line, "tvg-logo"),
        group_title: attribute(line, "group-title"),
    }
}

/// Text after the first comma that is not inside a quoted attribute value.
fn display_name(line: &str) -> String {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return unescape_entities(line[i + 1..].trim()),
            _ => {}
        }
    }
    String::new()
}

/// Case-insensitive lookup of `name="value"`.
fn attribute(line: &str, name: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `line`.
    let lower = line.to_ascii_lowercase();
    let key = format!("{}=\"", name.to_ascii_lowercase());

    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find(&key) {
        let start = search_from + pos;
        // Reject matches that are the tail of a longer attribute name.
        let boundary = start == 0 || lower.as_bytes()[start - 1].is_ascii_whitespace();
        let value_start = start + key.len();
        if boundary {
            let end = lower[value_start..].find('"')? + value_start;
            let value = unescape_entities(&line[value_start..end]);
            return if value.is_empty() { None } else { Some(value) };
        }
        search_from = value_start;
    }
    None
}

/// Decode the HTML entities providers put into attribute values.
fn unescape_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => {
                let entity = &tail[1..semi];
                match decode_entity(entity) {
                    Some(c) => out.push(c),
                    None => out.push_str(&tail[..=semi]),
                }
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
