//! Web server shared state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header::HOST, HeaderMap};
use iptv_hdhr_protocol::DeviceIdentity;

use crate::database::DatabaseHandle;
use crate::stream::{ChannelKey, StreamError, StreamManager, Subscription};

/// State shared by all handlers.
pub struct WebState {
    pub database: DatabaseHandle,
    pub streams: Arc<StreamManager>,
    pub identity: DeviceIdentity,
    /// Directory scanned for `*.m3u` / `*.m3u8` files.
    pub playlist_dir: PathBuf,
    /// Directory scanned for `*.xml` / `*.xmltv` guides.
    pub guide_dir: PathBuf,
    /// Address advertised to clients (`HOST_IP`), if set.
    pub public_host: Option<String>,
    pub listen_addr: SocketAddr,
}

impl WebState {
    pub fn new(database: DatabaseHandle, streams: Arc<StreamManager>, listen_addr: SocketAddr) -> Self {
        Self {
            database,
            streams,
            identity: DeviceIdentity::default(),
            playlist_dir: PathBuf::from("config/m3u"),
            guide_dir: PathBuf::from("config/epg"),
            public_host: std::env::var("HOST_IP").ok().filter(|h| !h.trim().is_empty()),
            listen_addr,
        }
    }

    /// Base URL clients should use to reach this server.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(host) = &self.public_host {
            let host = host.trim();
            if host.parse::<SocketAddr>().is_ok() || host.rsplit_once(':').is_some_and(|(_, p)| p.parse::<u16>().is_ok()) {
                return format!("http://{}", host);
            }
            return format!("http://{}:{}", host, self.listen_addr.port());
        }

        match headers.get(HOST).and_then(|h| h.to_str().ok()) {
            Some(host) if !host.is_empty() => format!("http://{}", host),
            _ => format!("http://{}", self.listen_addr),
        }
    }

    /// Attach a viewer to `key`, resolving its URL from the catalog.
    pub async fn subscribe(&self, key: ChannelKey) -> Result<Subscription, StreamError> {
        let database = Arc::clone(&self.database);
        self.streams
            .subscribe(key, move |key| {
                let database = Arc::clone(&database);
                async move {
                    database
                        .lock()
                        .await
                        .get_stream_url(key.number())
                        .map_err(|e| StreamError::Lookup(e.to_string()))
                }
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use iptv_hdhr_protocol::PlaylistEntry;

    use crate::database::Database;
    use crate::stream::testing::FakeLauncher;
    use crate::stream::{Launcher, ProfileRegistry, StreamManagerConfig};

    /// State over an in-memory catalog with channels 1 ("One") and 2 ("Two").
    pub(crate) fn test_state(launcher: &Arc<FakeLauncher>) -> Arc<WebState> {
        let mut db = Database::open_in_memory().unwrap();
        let entries: Vec<_> = ["One", "Two"]
            .iter()
            .enumerate()
            .map(|(i, name)| PlaylistEntry {
                name: name.to_string(),
                url: format!("http://src/{}.ts", i + 1),
                tvg_name: Some(name.to_lowercase()),
                tvg_logo: Some(format!("http://logo/{}.png", i + 1)),
                group_title: None,
            })
            .collect();
        db.upsert_playlist_entries(&entries).unwrap();

        let streams = crate::stream::StreamManager::new(
            Arc::clone(launcher) as Arc<dyn Launcher>,
            Arc::new(ProfileRegistry::new("ffmpeg")),
            StreamManagerConfig {
                max_sessions: 2,
                queue_capacity: 64,
            },
        );

        let mut state = WebState::new(db.into_handle(), streams, "127.0.0.1:5004".parse().unwrap());
        state.public_host = None;
        Arc::new(state)
    }
}
