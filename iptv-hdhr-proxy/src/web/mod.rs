//! HTTP server: the HDHomeRun surface plus the management API.

pub mod api;
pub mod error;
pub mod hdhr;
pub mod state;
pub mod tuner;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::ApiError;
pub use state::WebState;

/// Build the application router.
pub fn router(web_state: Arc<WebState>) -> Router {
    Router::new()
        // HDHomeRun emulation
        .route("/discover.json", get(hdhr::discover))
        .route("/lineup.json", get(hdhr::lineup))
        .route("/lineup_status.json", get(hdhr::lineup_status))
        .route("/lineup.post", post(hdhr::lineup_post))
        .route("/epg.xml", get(hdhr::epg))
        // Streaming
        .route("/tuner/:channel", get(tuner::tuner_stream))
        .route("/auto/:vchannel", get(tuner::auto_stream))
        // Stream API
        .route("/api/stream_status", get(api::get_stream_status))
        .route("/api/stream/:channel/teardown", post(api::teardown_stream))
        // Channel API
        .route("/api/channels", get(api::get_channels))
        .route("/api/channel_number", post(api::update_channel_number))
        .route("/api/channel/:channel/active", post(api::set_channel_active))
        .route("/api/channel/:channel/metadata", post(api::update_channel_metadata))
        .route("/api/channel/:channel/guide_entry", post(api::set_channel_guide_entry))
        .route("/api/playlist/reload", post(api::reload_playlists))
        // Guide API
        .route("/api/current_program", get(api::get_current_program))
        .route("/api/epg_entries", get(api::get_guide_entries))
        .route("/api/guide/reload", post(api::reload_guide))
        // Settings API
        .route("/api/settings", get(api::get_settings))
        .route("/api/settings", post(api::update_settings))
        .route("/api/profiles", get(api::get_profiles))
        .route("/api/profiles", post(api::create_profile))
        .route("/api/profiles/:name", delete(api::delete_profile))
        .with_state(web_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server and serve until `shutdown` completes.
pub async fn start_web_server<F>(
    listen_addr: SocketAddr,
    web_state: Arc<WebState>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(web_state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("HDHomeRun emulator listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
