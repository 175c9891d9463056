//! Channel CRUD operations.

use super::{ChannelRecord, Database, DatabaseError, Result, UpsertSummary};
use iptv_hdhr_protocol::PlaylistEntry;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};

impl Database {
    /// Merge playlist entries into the catalog.
    ///
    /// Channels are matched by their original `tvg-name` (or display name).
    /// A known channel only gets its URL refreshed, so renames, guide ids and
    /// numbering done by the operator survive reloads. New channels get the
    /// guide number equal to their row id, or the next free number.
    pub fn upsert_playlist_entries(&mut self, entries: &[PlaylistEntry]) -> Result<UpsertSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = UpsertSummary::default();

        for entry in entries {
            let identity = entry.identity();
            if identity.is_empty() || entry.url.is_empty() {
                debug!("Skipping playlist entry without identity or URL: {:?}", entry.name);
                continue;
            }

            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, url FROM channels WHERE original_tvg_name = ?1",
                    [identity],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((_, url)) if url == entry.url => summary.unchanged += 1,
                Some((id, _)) => {
                    tx.execute(
                        "UPDATE channels SET url = ?1, updated_at = strftime('%s', 'now') WHERE id = ?2",
                        params![entry.url, id],
                    )?;
                    summary.updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO channels (name, url, tvg_name, original_tvg_name, logo_url, group_title)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            entry.name,
                            entry.url,
                            entry.tvg_name.as_deref().unwrap_or(identity),
                            identity,
                            entry.tvg_logo,
                            entry.group_title,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();

                    let taken: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM channels WHERE channel_number = ?1)",
                        [id],
                        |row| row.get(0),
                    )?;
                    let number: i64 = if taken {
                        tx.query_row(
                            "SELECT COALESCE(MAX(channel_number), 0) + 1 FROM channels",
                            [],
                            |row| row.get(0),
                        )?
                    } else {
                        id
                    };
                    tx.execute(
                        "UPDATE channels SET channel_number = ?1 WHERE id = ?2",
                        params![number, id],
                    )?;
                    summary.inserted += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            "Playlist merged: {} new, {} updated, {} unchanged",
            summary.inserted, summary.updated, summary.unchanged
        );
        Ok(summary)
    }

    /// Upstream URL of an active channel.
    pub fn get_stream_url(&self, channel_number: u32) -> Result<Option<String>> {
        let url: Option<String> = self
            .conn
            .query_row(
                "SELECT url FROM channels WHERE channel_number = ?1 AND active = 1",
                [channel_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(url.filter(|u| !u.trim().is_empty()))
    }

    /// All channels ordered by guide number.
    pub fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM channels ORDER BY channel_number")?;

        let records = stmt
            .query_map([], Self::row_to_channel_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Active channels ordered by guide number.
    pub fn list_active_channels(&self) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM channels WHERE active = 1 ORDER BY channel_number")?;

        let records = stmt
            .query_map([], Self::row_to_channel_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get channel by guide number.
    pub fn get_channel(&self, channel_number: u32) -> Result<Option<ChannelRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT * FROM channels WHERE channel_number = ?1",
                [channel_number],
                Self::row_to_channel_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Move the channel at `current` to `new`, swapping with any occupant.
    ///
    /// Returns true if another channel was displaced to `current`.
    pub fn swap_channel_numbers(&mut self, current: u32, new: u32) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let source: Option<i64> = tx
            .query_row(
                "SELECT id FROM channels WHERE channel_number = ?1",
                [current],
                |row| row.get(0),
            )
            .optional()?;
        if source.is_none() {
            return Err(DatabaseError::ChannelNotFound(current));
        }
        if current == new {
            return Ok(false);
        }

        let occupant: Option<i64> = tx
            .query_row(
                "SELECT id FROM channels WHERE channel_number = ?1",
                [new],
                |row| row.get(0),
            )
            .optional()?;

        let swapped = occupant.is_some();
        if swapped {
            // Park the occupant on a number no channel can hold.
            let temp: i64 = tx.query_row(
                "SELECT MIN(-1, COALESCE(MIN(channel_number), 0) - 1) FROM channels",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE channels SET channel_number = ?1 WHERE channel_number = ?2",
                params![temp, new],
            )?;
            tx.execute(
                "UPDATE channels SET channel_number = ?1, updated_at = strftime('%s', 'now') WHERE channel_number = ?2",
                params![new, current],
            )?;
            tx.execute(
                "UPDATE channels SET channel_number = ?1, updated_at = strftime('%s', 'now') WHERE channel_number = ?2",
                params![current, temp],
            )?;
        } else {
            tx.execute(
                "UPDATE channels SET channel_number = ?1, updated_at = strftime('%s', 'now') WHERE channel_number = ?2",
                params![new, current],
            )?;
        }

        tx.commit()?;
        info!(
            "Channel {} moved to {}{}",
            current,
            new,
            if swapped { " (swapped)" } else { "" }
        );
        Ok(swapped)
    }

    /// Enable or disable a channel.
    pub fn set_channel_active(&self, channel_number: u32, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE channels SET active = ?1, updated_at = strftime('%s', 'now') WHERE channel_number = ?2",
            params![active as i32, channel_number],
        )?;
        if changed == 0 {
            return Err(DatabaseError::ChannelNotFound(channel_number));
        }
        Ok(())
    }

    /// Rename a channel and/or replace its logo. An empty logo clears it.
    pub fn update_channel_metadata(
        &self,
        channel_number: u32,
        name: Option<&str>,
        logo_url: Option<&str>,
    ) -> Result<ChannelRecord> {
        let current = self
            .get_channel(channel_number)?
            .ok_or(DatabaseError::ChannelNotFound(channel_number))?;

        let name = name.map(str::trim).unwrap_or(&current.name);
        if name.is_empty() {
            return Err(DatabaseError::InvalidData("channel name cannot be empty".to_string()));
        }
        let logo_url = match logo_url {
            Some(logo) => Some(logo.trim()).filter(|l| !l.is_empty()),
            None => current.logo_url.as_deref(),
        };

        self.conn.execute(
            "UPDATE channels SET name = ?1, logo_url = ?2, updated_at = strftime('%s', 'now') WHERE id = ?3",
            params![name, logo_url, current.id],
        )?;
        info!("Channel {} metadata updated: name={:?}", channel_number, name);

        self.get_channel(channel_number)?
            .ok_or(DatabaseError::ChannelNotFound(channel_number))
    }

    fn row_to_channel_record(row: &rusqlite::Row) -> rusqlite::Result<ChannelRecord> {
        Ok(ChannelRecord {
            id: row.get("id")?,
            channel_number: row.get::<_, i64>("channel_number")?.max(0) as u32,
            name: row.get("name")?,
            url: row.get("url")?,
            tvg_name: row.get("tvg_name")?,
            original_tvg_name: row.get("original_tvg_name")?,
            logo_url: row.get("logo_url")?,
            group_title: row.get("group_title")?,
            active: row.get::<_, i32>("active")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
