//! Loading M3U playlists from the config directory into the catalog.

use std::path::{Path, PathBuf};

use iptv_hdhr_protocol::Playlist;
use log::{info, warn};

use crate::database::{DatabaseHandle, Result, UpsertSummary};

const EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Files in `dir` with one of `extensions` (case-insensitive), sorted by name.
pub(crate) async fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read directory {}: {}", dir.display(), e);
            return files;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let matches = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)));
                if matches && path.is_file() {
                    files.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error listing {}: {}", dir.display(), e);
                break;
            }
        }
    }

    files.sort();
    files
}

/// Parse every playlist in `dir` and merge it into the catalog.
///
/// Unreadable or malformed files are logged and skipped; only database
/// failures are returned as errors.
pub async fn load_playlist_dir(db: &DatabaseHandle, dir: &Path) -> Result<UpsertSummary> {
    let mut total = UpsertSummary::default();

    for path in files_with_extensions(dir, EXTENSIONS).await {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };

        let playlist = match Playlist::from_bytes(&bytes) {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let summary = db.lock().await.upsert_playlist_entries(&playlist.entries)?;
        info!(
            "Loaded {} ({} entries, {} new)",
            path.display(),
            playlist.entries.len(),
            summary.inserted
        );
        total.merge(summary);
    }

    Ok(total)
}
