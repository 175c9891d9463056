//! Program guide storage.
//!
//! Raw XMLTV data is kept as published. The combined guide copies matching
//! programmes onto catalog channels by row id, so renumbering or renaming a
//! channel never invalidates it.

use super::{Database, DatabaseError, ProgramRecord, RawGuideSummary, Result};
use chrono::{DateTime, NaiveDateTime};
use iptv_hdhr_protocol::Guide;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

/// XMLTV timestamp as Unix seconds.
///
/// Accepts `YYYYMMDDhhmmss +zzzz` and the offset-less form, read as UTC.
pub fn parse_xmltv_time(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_str(value, "%Y%m%d%H%M%S %z") {
        return Some(time.timestamp());
    }
    let digits = value.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|time| time.and_utc().timestamp())
}

impl Database {
    /// Replace the raw guide tables with the given parsed files.
    pub fn replace_raw_guide(&mut self, files: &[(String, Guide)]) -> Result<RawGuideSummary> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM raw_guide_channels", [])?;
        tx.execute("DELETE FROM raw_guide_programs", [])?;

        let mut summary = RawGuideSummary::default();
        {
            let mut insert_channel = tx.prepare(
                "INSERT INTO raw_guide_channels (raw_id, display_name, source_file) VALUES (?1, ?2, ?3)",
            )?;
            let mut insert_program = tx.prepare(
                "INSERT INTO raw_guide_programs
                    (raw_channel_id, start, stop, start_ts, stop_ts, title, description, source_file)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for (source, guide) in files {
                for channel in &guide.channels {
                    if channel.display_names.is_empty() {
                        insert_channel.execute(params![channel.id, "", source])?;
                    }
                    for name in &channel.display_names {
                        insert_channel.execute(params![channel.id, name, source])?;
                    }
                }
                for programme in &guide.programmes {
                    insert_program.execute(params![
                        programme.channel,
                        programme.start,
                        programme.stop,
                        parse_xmltv_time(&programme.start),
                        parse_xmltv_time(&programme.stop),
                        programme.title,
                        programme.description,
                        source,
                    ])?;
                }
                summary.files += 1;
                summary.channels += guide.channels.len();
                summary.programmes += guide.programmes.len();
            }
        }

        tx.commit()?;
        info!(
            "Raw guide replaced: {} files, {} channels, {} programmes",
            summary.files, summary.channels, summary.programmes
        );
        Ok(summary)
    }

    /// Rebuild the combined guide for every channel.
    ///
    /// Returns the number of programmes matched.
    pub fn build_combined_guide(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM guide_programs", [])?;

        let channels: Vec<(i64, Option<String>, String)> = {
            let mut stmt = tx.prepare("SELECT id, tvg_name, name FROM channels")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut total = 0;
        for (id, tvg_name, name) in &channels {
            total += copy_channel_programs(&tx, *id, tvg_name.as_deref(), name)?;
        }

        tx.commit()?;
        info!("Combined guide built: {} programmes for {} channels", total, channels.len());
        Ok(total)
    }

    /// Rebuild the combined guide of one channel.
    pub fn rebuild_channel_guide(&mut self, channel_number: u32) -> Result<usize> {
        let tx = self.conn.transaction()?;

        let channel: Option<(i64, Option<String>, String)> = tx
            .query_row(
                "SELECT id, tvg_name, name FROM channels WHERE channel_number = ?1",
                [channel_number],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (id, tvg_name, name) = channel.ok_or(DatabaseError::ChannelNotFound(channel_number))?;

        tx.execute("DELETE FROM guide_programs WHERE channel_id = ?1", [id])?;
        let count = copy_channel_programs(&tx, id, tvg_name.as_deref(), &name)?;

        tx.commit()?;
        debug!("Guide for channel {} rebuilt: {} programmes", channel_number, count);
        Ok(count)
    }

    /// Point a channel at a different guide entry and rebuild its programmes.
    ///
    /// An empty entry clears it, so the channel matches by display name.
    pub fn set_channel_guide_entry(&mut self, channel_number: u32, tvg_name: &str) -> Result<usize> {
        let tvg_name = Some(tvg_name.trim()).filter(|t| !t.is_empty());
        let changed = self.conn.execute(
            "UPDATE channels SET tvg_name = ?1, updated_at = strftime('%s', 'now') WHERE channel_number = ?2",
            params![tvg_name, channel_number],
        )?;
        if changed == 0 {
            return Err(DatabaseError::ChannelNotFound(channel_number));
        }
        self.rebuild_channel_guide(channel_number)
    }

    /// Distinct display names offered by the loaded guides.
    pub fn list_guide_entries(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT display_name FROM raw_guide_channels
             WHERE display_name != '' ORDER BY display_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Programme airing on a channel at `now` (Unix seconds).
    pub fn current_program(&self, channel_number: u32, now: i64) -> Result<Option<ProgramRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT c.channel_number, g.title, g.start, g.stop, g.description
                   FROM guide_programs g
                   JOIN channels c ON c.id = g.channel_id
                  WHERE c.channel_number = ?1 AND g.start_ts <= ?2 AND g.stop_ts > ?2
                  ORDER BY g.start_ts DESC
                  LIMIT 1",
                params![channel_number, now],
                Self::row_to_program_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Combined guide programmes of active channels, by guide number then start.
    pub fn list_active_guide_programs(&self) -> Result<Vec<ProgramRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.channel_number, g.title, g.start, g.stop, g.description
               FROM guide_programs g
               JOIN channels c ON c.id = g.channel_id
              WHERE c.active = 1
              ORDER BY c.channel_number, g.start_ts, g.id",
        )?;
        let records = stmt
            .query_map([], Self::row_to_program_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn row_to_program_record(row: &rusqlite::Row) -> rusqlite::Result<ProgramRecord> {
        Ok(ProgramRecord {
            channel_number: row.get::<_, i64>(0)?.max(0) as u32,
            title: row.get(1)?,
            start: row.get(2)?,
            stop: row.get(3)?,
            description: row.get(4)?,
        })
    }
}

/// Copy the raw programmes matching a channel into the combined guide.
///
/// A guide entry matches a raw channel id or display name; without one the
/// channel's own name is matched against display names.
fn copy_channel_programs(
    conn: &Connection,
    channel_id: i64,
    tvg_name: Option<&str>,
    name: &str,
) -> rusqlite::Result<usize> {
    const COPY: &str = "INSERT INTO guide_programs
            (channel_id, start, stop, start_ts, stop_ts, title, description)
         SELECT ?1, start, stop, start_ts, stop_ts, title, description
           FROM raw_guide_programs
          WHERE raw_channel_id IN (";

    match tvg_name.filter(|t| !t.is_empty()) {
        Some(tvg_name) => conn.execute(
            &format!(
                "{}SELECT raw_id FROM raw_guide_channels WHERE raw_id = ?2 OR display_name = ?2)
                 ORDER BY start_ts",
                COPY
            ),
            params![channel_id, tvg_name],
        ),
        None => conn.execute(
            &format!(
                "{}SELECT raw_id FROM raw_guide_channels WHERE display_name = ?2)
                 ORDER BY start_ts",
                COPY
            ),
            params![channel_id, name],
        ),
    }
}
