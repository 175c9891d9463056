//! HDHomeRun-compatible endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use iptv_hdhr_protocol::{DiscoverResponse, LineupEntry, LineupStatus};
use log::warn;

use crate::guide::render_guide;
use crate::web::error::ApiError;
use crate::web::state::WebState;

const EMPTY_GUIDE: &str = "<tv></tv>";

/// `GET /discover.json`
pub async fn discover(
    State(web_state): State<Arc<WebState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let tuner_count = match web_state.database.lock().await.get_settings() {
        Ok(settings) => settings.tuner_count,
        Err(e) => {
            warn!("Failed to read settings for discovery: {}", e);
            web_state.streams.max_sessions() as u32
        }
    };
    let base_url = web_state.base_url(&headers);
    Json(DiscoverResponse::new(&web_state.identity, &base_url, tuner_count))
}

/// `GET /lineup.json`
pub async fn lineup(
    State(web_state): State<Arc<WebState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<LineupEntry>>, ApiError> {
    let channels = web_state.database.lock().await.list_active_channels()?;
    let base_url = web_state.base_url(&headers);

    let entries = channels
        .iter()
        .map(|c| LineupEntry::new(&base_url, c.channel_number, &c.name, c.logo_url.as_deref()))
        .collect();
    Ok(Json(entries))
}

/// `GET /lineup_status.json`
pub async fn lineup_status() -> Json<LineupStatus> {
    Json(LineupStatus::default())
}

/// `POST /lineup.post`: scan requests are accepted and ignored.
pub async fn lineup_post() -> StatusCode {
    StatusCode::OK
}

/// `GET /epg.xml`: the combined guide, with channel ids set to guide numbers.
pub async fn epg(State(web_state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    let base_url = web_state.base_url(&headers);
    match render_guide(&web_state.database, &base_url).await {
        Ok(xml) => ([(CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(e) => {
            warn!("Failed to render guide: {}", e);
            ([(CONTENT_TYPE, "application/xml")], EMPTY_GUIDE).into_response()
        }
    }
}
