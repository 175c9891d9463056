//! Settings and custom profile storage.

use super::{CustomProfileRecord, Database, DatabaseError, Result, SettingsRecord};
use rusqlite::params;

const DEFAULT_TUNER_COUNT: u32 = 1;
const DEFAULT_PROFILE: &str = "software";
const DEFAULT_GUIDE_REFRESH_MINUTES: u32 = 360;

/// Runtime settings storage.
impl Database {
    /// Get settings, creating the row with defaults if missing.
    pub fn get_settings(&self) -> Result<SettingsRecord> {
        let result = self.conn.query_row(
            "SELECT tuner_count, transcode_profile, guide_refresh_minutes, updated_at FROM settings WHERE id = 1",
            [],
            |row| {
                Ok(SettingsRecord {
                    tuner_count: row.get::<_, i64>(0)?.max(0) as u32,
                    transcode_profile: row.get(1)?,
                    guide_refresh_minutes: row
                        .get::<_, Option<i64>>(2)?
                        .map_or(DEFAULT_GUIDE_REFRESH_MINUTES, |m| m.max(0) as u32),
                    updated_at: row.get(3)?,
                })
            },
        );

        match result {
            Ok(settings) => Ok(settings),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                self.conn.execute(
                    "INSERT OR IGNORE INTO settings (id, tuner_count, transcode_profile, guide_refresh_minutes)
                     VALUES (1, ?1, ?2, ?3)",
                    params![DEFAULT_TUNER_COUNT, DEFAULT_PROFILE, DEFAULT_GUIDE_REFRESH_MINUTES],
                )?;
                let updated_at = self
                    .conn
                    .query_row("SELECT updated_at FROM settings WHERE id = 1", [], |row| row.get(0))?;
                Ok(SettingsRecord {
                    tuner_count: DEFAULT_TUNER_COUNT,
                    transcode_profile: DEFAULT_PROFILE.to_string(),
                    guide_refresh_minutes: DEFAULT_GUIDE_REFRESH_MINUTES,
                    updated_at,
                })
            }
            Err(e) => Err(DatabaseError::Sqlite(e)),
        }
    }

    /// Update any subset of the settings.
    pub fn update_settings(
        &self,
        tuner_count: Option<u32>,
        transcode_profile: Option<&str>,
        guide_refresh_minutes: Option<u32>,
    ) -> Result<SettingsRecord> {
        let current = self.get_settings()?;
        let tuner_count = tuner_count.unwrap_or(current.tuner_count);
        let profile = transcode_profile.unwrap_or(&current.transcode_profile);
        let refresh = guide_refresh_minutes.unwrap_or(current.guide_refresh_minutes);

        self.conn.execute(
            "INSERT OR REPLACE INTO settings (id, tuner_count, transcode_profile, guide_refresh_minutes, updated_at)
             VALUES (1, ?1, ?2, ?3, strftime('%s', 'now'))",
            params![tuner_count, profile, refresh],
        )?;
        self.get_settings()
    }
}

/// Custom transcode profile storage.
impl Database {
    pub fn list_custom_profiles(&self) -> Result<Vec<CustomProfileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, args_json, created_at FROM custom_profiles ORDER BY name")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, args_json, created_at)| {
                let args: Vec<String> = serde_json::from_str(&args_json).map_err(|e| {
                    DatabaseError::InvalidData(format!("profile '{}': {}", name, e))
                })?;
                Ok(CustomProfileRecord {
                    name,
                    args,
                    created_at,
                })
            })
            .collect()
    }

    /// Insert or replace a custom profile.
    pub fn save_custom_profile(&self, name: &str, args: &[String]) -> Result<()> {
        let args_json = serde_json::to_string(args)
            .map_err(|e| DatabaseError::InvalidData(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO custom_profiles (name, args_json) VALUES (?1, ?2)",
            params![name, args_json],
        )?;
        Ok(())
    }

    /// Delete a custom profile. Returns whether it existed.
    pub fn delete_custom_profile(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM custom_profiles WHERE name = ?1", [name])?;
        Ok(deleted > 0)
    }
}
