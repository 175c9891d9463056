//! iptv-hdhr-proxy: HDHomeRun tuner emulator for IPTV playlists.
//!
//! DVR clients discover this server as a network tuner. Each channel is
//! transcoded by one ffmpeg process, shared by every viewer of that channel.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

mod database;
mod guide;
mod logging;
mod playlist;
mod stream;
mod web;

use guide::GuideRefresher;
use stream::{CommandLauncher, Launcher, ProfileRegistry, StreamManager, StreamManagerConfig};
use web::WebState;

const DEFAULT_LISTEN: &str = "0.0.0.0:5004";
const DEFAULT_DATABASE: &str = "iptv-hdhr.db";
const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;
const CONFIG_FILE_NAME: &str = "iptv-hdhr.toml";

/// iptv-hdhr-proxy - HDHomeRun emulator for IPTV
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on [default: 0.0.0.0:5004]
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Path to the database file [default: iptv-hdhr.db]
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Directory holding `m3u/` playlists and `epg/` guides [default: config]
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Transcoder executable [default: ffmpeg]
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored [default: logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files [default: 7]
    #[arg(long)]
    log_retention_days: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    transcode: TranscodeSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ServerSection {
    listen: Option<String>,
    config_dir: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct DatabaseSection {
    path: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct TranscodeSection {
    ffmpeg: Option<String>,
}

/// Effective configuration: command line over file over defaults.
#[derive(Debug, PartialEq)]
struct Config {
    listen: SocketAddr,
    database: PathBuf,
    config_dir: PathBuf,
    ffmpeg: String,
    log_dir: PathBuf,
    log_retention_days: u64,
    log_level: Option<String>,
}

impl Config {
    fn resolve(args: &Args, file: ConfigFile) -> Result<Self, Box<dyn std::error::Error>> {
        let listen = match (args.listen, file.server.listen) {
            (Some(addr), _) => addr,
            (None, Some(addr)) => addr
                .parse()
                .map_err(|e| format!("Invalid [server] listen address '{}': {}", addr, e))?,
            (None, None) => DEFAULT_LISTEN.parse()?,
        };

        Ok(Self {
            listen,
            database: args
                .database
                .clone()
                .or_else(|| file.database.path.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            config_dir: args
                .config_dir
                .clone()
                .or_else(|| file.server.config_dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            ffmpeg: args
                .ffmpeg
                .clone()
                .or(file.transcode.ffmpeg)
                .unwrap_or_else(|| DEFAULT_FFMPEG.to_string()),
            log_dir: args
                .log_dir
                .clone()
                .or_else(|| file.logging.log_dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            log_retention_days: args
                .log_retention_days
                .or(file.logging.retention_days)
                .unwrap_or(DEFAULT_LOG_RETENTION_DAYS),
            log_level: file.logging.level,
        })
    }
}

fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(CONFIG_FILE_NAME);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", path.display(), e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };
    let config = Config::resolve(&args, file_config)?;

    logging::init_logging(
        &config.log_dir,
        config.log_retention_days,
        args.verbose,
        config.log_level.as_deref(),
    )?;

    info!("Opening database: {:?}", config.database);
    let db = match database::Database::open(&config.database) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    // Runtime settings and custom profiles live in the database.
    let profiles = Arc::new(ProfileRegistry::new(config.ffmpeg.clone()));
    let settings = db.get_settings()?;
    match db.list_custom_profiles() {
        Ok(custom) => {
            for record in custom {
                if let Err(e) = profiles.register(&record.name, record.args) {
                    warn!("Ignoring stored profile '{}': {}", record.name, e);
                }
            }
        }
        Err(e) => warn!("Failed to load custom profiles: {}", e),
    }
    profiles.set_selected_unchecked(&settings.transcode_profile);

    let database = db.into_handle();

    let streams = StreamManager::new(
        Arc::new(CommandLauncher) as Arc<dyn Launcher>,
        profiles,
        StreamManagerConfig {
            max_sessions: settings.tuner_count as usize,
            ..StreamManagerConfig::default()
        },
    );

    let mut web_state = WebState::new(database, Arc::clone(&streams), config.listen);
    web_state.playlist_dir = config.config_dir.join("m3u");
    web_state.guide_dir = config.config_dir.join("epg");

    match playlist::load_playlist_dir(&web_state.database, &web_state.playlist_dir).await {
        Ok(summary) => info!(
            "Playlists loaded: {} new, {} updated, {} unchanged",
            summary.inserted, summary.updated, summary.unchanged
        ),
        Err(e) => error!("Failed to load playlists: {}", e),
    }

    match guide::refresh_guide(&web_state.database, &web_state.guide_dir).await {
        Ok(summary) => info!(
            "Guide loaded: {} files, {} programmes, {} matched to channels",
            summary.raw.files, summary.raw.programmes, summary.matched
        ),
        Err(e) => error!("Failed to load guide: {}", e),
    }
    GuideRefresher::new(Arc::clone(&web_state.database), web_state.guide_dir.clone()).start();

    info!("iptv-hdhr-proxy starting...");
    info!("  Listen address: {}", config.listen);
    info!("  Database: {:?}", config.database);
    info!("  Transcoder: {}", config.ffmpeg);
    info!("  Tuner count: {}", settings.tuner_count);
    info!("  Transcode profile: {}", settings.transcode_profile);
    info!("  Guide refresh: every {} minutes (0 = off)", settings.guide_refresh_minutes);
    if let Some(host) = &web_state.public_host {
        info!("  Advertised host: {}", host);
    }

    let shutdown_streams = Arc::clone(&streams);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down, stopping {} streams", shutdown_streams.count().await);
        shutdown_streams.teardown_all().await;
    };

    web::start_web_server(config.listen, Arc::new(web_state), shutdown).await?;

    // Listener failure also ends every transcoder.
    streams.teardown_all().await;
    info!("iptv-hdhr-proxy stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_sections() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:6077"
            config_dir = "/srv/iptv"

            [database]
            path = "/var/lib/iptv/hdhr.db"

            [logging]
            level = "iptv_hdhr_proxy=debug"
            retention_days = 3

            [transcode]
            ffmpeg = "/usr/bin/ffmpeg"
            "#,
        )
        .unwrap();

        let config = Config::resolve(&Args::default(), file).unwrap();
        assert_eq!(config.listen, "127.0.0.1:6077".parse::<SocketAddr>().unwrap());
        assert_eq!(config.config_dir, PathBuf::from("/srv/iptv"));
        assert_eq!(config.database, PathBuf::from("/var/lib/iptv/hdhr.db"));
        assert_eq!(config.log_level.as_deref(), Some("iptv_hdhr_proxy=debug"));
        assert_eq!(config.log_retention_days, 3);
        assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(config.ffmpeg, "/usr/bin/ffmpeg");
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:6077"
            [transcode]
            ffmpeg = "/usr/bin/ffmpeg"
            "#,
        )
        .unwrap();
        let args = Args::parse_from(["iptv-hdhr-proxy", "--listen", "0.0.0.0:7000", "--ffmpeg", "ffmpeg7"]);

        let config = Config::resolve(&args, file).unwrap();
        assert_eq!(config.listen, "0.0.0.0:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.ffmpeg, "ffmpeg7");
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn test_defaults_and_invalid_listen() {
        let config = Config::resolve(&Args::default(), ConfigFile::default()).unwrap();
        assert_eq!(config.listen, DEFAULT_LISTEN.parse::<SocketAddr>().unwrap());
        assert_eq!(config.config_dir, PathBuf::from(DEFAULT_CONFIG_DIR));
        assert_eq!(config.log_retention_days, DEFAULT_LOG_RETENTION_DAYS);

        let mut file = ConfigFile::default();
        file.server.listen = Some("not-an-address".into());
        assert!(Config::resolve(&Args::default(), file).is_err());
    }
}
