//! XMLTV program guide: loading the guide directory, matching it to the
//! catalog, and rendering the combined guide served on `/epg.xml`.
//!
//! The combined guide is rendered from the database on every request, with
//! channel ids set to guide numbers. Renumbering, renaming or a new logo is
//! therefore visible on the next fetch without rewriting any file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use iptv_hdhr_protocol::{Guide, GuideChannel, GuideProgramme, ProtocolError};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::database::{DatabaseError, DatabaseHandle, RawGuideSummary};
use crate::playlist::files_with_extensions;

const EXTENSIONS: &[&str] = &["xml", "xmltv"];

/// How often the refresher re-reads its interval setting.
const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Error type for guide operations.
#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to render guide: {0}")]
    Render(#[from] ProtocolError),
}

/// Result of a full guide refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuideSummary {
    #[serde(flatten)]
    pub raw: RawGuideSummary,
    /// Programmes matched to catalog channels.
    pub matched: usize,
}

/// Parse every guide file in `dir` into the raw guide tables.
///
/// Unreadable or malformed files are logged and skipped. An empty or missing
/// directory clears the raw guide.
pub async fn parse_guide_dir(db: &DatabaseHandle, dir: &Path) -> Result<RawGuideSummary, GuideError> {
    let mut files = Vec::new();

    for path in files_with_extensions(dir, EXTENSIONS).await {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };

        // Provider guides run to tens of megabytes.
        let parsed = tokio::task::spawn_blocking(move || Guide::from_bytes(&bytes)).await;
        match parsed {
            Ok(Ok(guide)) => {
                debug!(
                    "Read guide {} ({} channels, {} programmes)",
                    path.display(),
                    guide.channels.len(),
                    guide.programmes.len()
                );
                files.push((source_name(&path), guide));
            }
            Ok(Err(e)) => warn!("Skipping {}: {}", path.display(), e),
            Err(e) => warn!("Guide parser for {} failed: {}", path.display(), e),
        }
    }

    Ok(db.lock().await.replace_raw_guide(&files)?)
}

/// Rebuild the combined guide from the raw tables.
pub async fn rebuild_guide(db: &DatabaseHandle) -> Result<usize, GuideError> {
    Ok(db.lock().await.build_combined_guide()?)
}

/// Re-parse `dir` and rebuild the combined guide.
pub async fn refresh_guide(db: &DatabaseHandle, dir: &Path) -> Result<GuideSummary, GuideError> {
    let raw = parse_guide_dir(db, dir).await?;
    let matched = rebuild_guide(db).await?;
    Ok(GuideSummary { raw, matched })
}

/// Render the combined guide of active channels.
///
/// Relative logo paths are made absolute with `base_url`.
pub async fn render_guide(db: &DatabaseHandle, base_url: &str) -> Result<String, GuideError> {
    let (channels, programs) = {
        let db = db.lock().await;
        (db.list_active_channels()?, db.list_active_guide_programs()?)
    };

    let guide = Guide {
        channels: channels
            .into_iter()
            .map(|c| GuideChannel {
                id: c.channel_number.to_string(),
                display_names: vec![c.name],
                icon: c.logo_url.filter(|l| !l.is_empty()).map(|logo| {
                    if logo.starts_with('/') {
                        format!("{}{}", base_url, logo)
                    } else {
                        logo
                    }
                }),
            })
            .collect(),
        programmes: programs
            .into_iter()
            .map(|p| GuideProgramme {
                channel: p.channel_number.to_string(),
                start: p.start,
                stop: p.stop,
                title: p.title,
                description: p.description,
            })
            .collect(),
    };

    Ok(guide.to_xml()?)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A refresh is due once `minutes` have passed; 0 turns refreshing off.
fn is_due(minutes: u32, elapsed: Duration) -> bool {
    minutes > 0 && elapsed >= Duration::from_secs(u64::from(minutes) * 60)
}

/// Background task that periodically re-parses the guide directory.
///
/// The interval is read from the settings on every check, so changes through
/// the settings API apply without a restart.
pub struct GuideRefresher {
    database: DatabaseHandle,
    guide_dir: PathBuf,
}

impl GuideRefresher {
    pub fn new(database: DatabaseHandle, guide_dir: PathBuf) -> Self {
        Self {
            database,
            guide_dir,
        }
    }

    /// Start the refresher background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            "GuideRefresher: watching {} (check every {}s)",
            self.guide_dir.display(),
            CHECK_INTERVAL.as_secs()
        );

        let mut ticker = interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The guide was loaded at startup.
        let mut last_refresh = Instant::now();

        loop {
            ticker.tick().await;
            match self.check_and_refresh(last_refresh.elapsed()).await {
                Ok(true) => last_refresh = Instant::now(),
                Ok(false) => {}
                Err(e) => {
                    error!("GuideRefresher: refresh failed: {}", e);
                    last_refresh = Instant::now();
                }
            }
        }
    }

    /// Refresh if the configured interval has passed. Returns whether it ran.
    async fn check_and_refresh(&self, elapsed: Duration) -> Result<bool, GuideError> {
        let minutes = self.database.lock().await.get_settings()?.guide_refresh_minutes;
        if !is_due(minutes, elapsed) {
            return Ok(false);
        }

        let summary = refresh_guide(&self.database, &self.guide_dir).await?;
        info!(
            "GuideRefresher: {} files, {} programmes, {} matched",
            summary.raw.files, summary.raw.programmes, summary.matched
        );
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{temp_dir, SAMPLE_GUIDE};
    use super::*;
    use crate::database::Database;
    use iptv_hdhr_protocol::PlaylistEntry;

    fn catalog() -> DatabaseHandle {
        let mut db = Database::open_in_memory().unwrap();
        let entries: Vec<_> = [("One", "/logos/1.png"), ("Two", "http://logo/2.png")]
            .iter()
            .enumerate()
            .map(|(i, (name, logo))| PlaylistEntry {
                name: name.to_string(),
                url: format!("http://src/{}.ts", i + 1),
                tvg_name: Some(name.to_lowercase()),
                tvg_logo: Some(logo.to_string()),
                group_title: None,
            })
            .collect();
        db.upsert_playlist_entries(&entries).unwrap();
        db.into_handle()
    }

    #[tokio::test]
    async fn test_refresh_guide_dir() {
        let dir = temp_dir("guide-refresh");
        std::fs::write(dir.join("provider.xml"), SAMPLE_GUIDE).unwrap();
        std::fs::write(dir.join("broken.xmltv"), "<tv><channel></tv>").unwrap();
        std::fs::write(dir.join("notes.txt"), "<tv/>").unwrap();

        let db = catalog();
        let summary = refresh_guide(&db, &dir).await.unwrap();
        assert_eq!(summary.raw.files, 1);
        assert_eq!(summary.raw.channels, 3);
        assert_eq!(summary.raw.programmes, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(
            db.lock().await.list_guide_entries().unwrap(),
            vec!["Other", "Two Channel", "one", "two"]
        );

        // Files removed: the next refresh empties the guide.
        std::fs::remove_dir_all(&dir).unwrap();
        let summary = refresh_guide(&db, &dir).await.unwrap();
        assert_eq!(summary, GuideSummary::default());
    }

    #[tokio::test]
    async fn test_render_uses_guide_numbers() {
        let dir = temp_dir("guide-render");
        std::fs::write(dir.join("provider.xml"), SAMPLE_GUIDE).unwrap();
        let db = catalog();
        refresh_guide(&db, &dir).await.unwrap();

        db.lock().await.swap_channel_numbers(1, 7).unwrap();
        db.lock()
            .await
            .update_channel_metadata(2, Some("Two HD"), None)
            .unwrap();

        let xml = render_guide(&db, "http://tuner.lan:5004").await.unwrap();
        let guide = Guide::from_bytes(xml.as_bytes()).unwrap();

        let channels: Vec<_> = guide
            .channels
            .iter()
            .map(|c| (c.id.as_str(), c.display_names[0].as_str(), c.icon.as_deref()))
            .collect();
        assert_eq!(
            channels,
            vec![
                ("2", "Two HD", Some("http://logo/2.png")),
                ("7", "One", Some("http://tuner.lan:5004/logos/1.png")),
            ]
        );

        let programmes: Vec<_> = guide
            .programmes
            .iter()
            .map(|p| (p.channel.as_str(), p.title.as_str()))
            .collect();
        assert_eq!(programmes, vec![("2", "Noon Two"), ("7", "Noon One")]);
        assert_eq!(guide.programmes[0].description, "Second");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_is_due() {
        assert!(!is_due(0, Duration::from_secs(u64::MAX / 2)));
        assert!(!is_due(5, Duration::from_secs(299)));
        assert!(is_due(5, Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_refresher_follows_settings() {
        let dir = temp_dir("guide-refresher");
        std::fs::write(dir.join("provider.xml"), SAMPLE_GUIDE).unwrap();
        let db = catalog();
        let refresher = GuideRefresher::new(db.clone(), dir.clone());

        db.lock().await.update_settings(None, None, Some(0)).unwrap();
        assert!(!refresher.check_and_refresh(Duration::from_secs(86_400)).await.unwrap());
        assert!(db.lock().await.list_guide_entries().unwrap().is_empty());

        db.lock().await.update_settings(None, None, Some(1)).unwrap();
        assert!(!refresher.check_and_refresh(Duration::from_secs(59)).await.unwrap());
        assert!(refresher.check_and_refresh(Duration::from_secs(60)).await.unwrap());
        assert_eq!(db.lock().await.list_active_guide_programs().unwrap().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
