//! Management API endpoints.
//!
//! Handlers that touch both the catalog and running streams release the
//! database lock before calling into the stream manager.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::database::ProgramRecord;
use crate::guide::{rebuild_guide, refresh_guide};
use crate::playlist::load_playlist_dir;
use crate::stream::profile::SOFTWARE;
use crate::stream::{ChannelKey, InvalidChannelKey, Profile, ProfileError, SessionStatus};
use crate::web::error::ApiError;
use crate::web::state::WebState;

type ApiResult = Result<Json<Value>, ApiError>;

fn parse_key(raw: &str) -> Result<ChannelKey, ApiError> {
    raw.parse()
        .map_err(|e: InvalidChannelKey| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Stream endpoints
// ============================================================================

/// Live session as reported by `/api/stream_status`.
#[derive(Debug, Serialize)]
pub struct StreamStatusInfo {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub channel_name: Option<String>,
    /// Programme airing now, from the combined guide.
    pub current_program: Option<ProgramRecord>,
}

/// Get status of every running stream.
pub async fn get_stream_status(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let sessions = web_state.streams.status().await;
    let now = chrono::Utc::now().timestamp();

    let streams = {
        let db = web_state.database.lock().await;
        let names: HashMap<u32, String> = db
            .list_channels()?
            .into_iter()
            .map(|c| (c.channel_number, c.name))
            .collect();

        let mut streams = Vec::with_capacity(sessions.len());
        for status in sessions {
            let number = status.channel.number();
            streams.push(StreamStatusInfo {
                channel_name: names.get(&number).cloned(),
                current_program: db.current_program(number, now)?,
                status,
            });
        }
        streams
    };

    Ok(Json(json!({
        "success": true,
        "tuner_count": web_state.streams.max_sessions(),
        "streams": streams
    })))
}

/// Administrative teardown of one channel's stream.
pub async fn teardown_stream(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
) -> ApiResult {
    let key = parse_key(&channel)?;
    let stopped = web_state.streams.teardown(key).await;
    Ok(Json(json!({
        "success": true,
        "stopped": stopped
    })))
}

// ============================================================================
// Channel endpoints
// ============================================================================

/// List all channels, active or not.
pub async fn get_channels(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let channels = web_state.database.lock().await.list_channels()?;
    Ok(Json(json!({
        "success": true,
        "channels": channels
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChannelNumberRequest {
    pub current: u32,
    pub new: u32,
}

/// Move a channel to a new guide number, swapping with any occupant.
pub async fn update_channel_number(
    State(web_state): State<Arc<WebState>>,
    Json(payload): Json<ChannelNumberRequest>,
) -> ApiResult {
    if payload.new == 0 {
        return Err(ApiError::BadRequest("Channel number must be positive".into()));
    }

    let swapped = web_state
        .database
        .lock()
        .await
        .swap_channel_numbers(payload.current, payload.new)?;

    // Viewers on either number are now watching the wrong URL.
    if payload.current != payload.new {
        web_state.streams.teardown(ChannelKey::new(payload.current)).await;
        web_state.streams.teardown(ChannelKey::new(payload.new)).await;
    }

    Ok(Json(json!({
        "success": true,
        "swapped": swapped,
        "message": format!("Channel {} moved to {}", payload.current, payload.new)
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChannelActiveRequest {
    pub active: bool,
}

/// Enable/disable a channel.
pub async fn set_channel_active(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
    Json(payload): Json<ChannelActiveRequest>,
) -> ApiResult {
    let key = parse_key(&channel)?;
    web_state
        .database
        .lock()
        .await
        .set_channel_active(key.number(), payload.active)?;

    web_state.streams.teardown(key).await;

    Ok(Json(json!({
        "success": true,
        "message": if payload.active { "Channel enabled" } else { "Channel disabled" }
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChannelMetadataRequest {
    pub name: Option<String>,
    /// Empty string clears the logo.
    pub logo_url: Option<String>,
}

/// Rename a channel and/or change its logo.
pub async fn update_channel_metadata(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
    Json(payload): Json<ChannelMetadataRequest>,
) -> ApiResult {
    let key = parse_key(&channel)?;
    if payload.name.is_none() && payload.logo_url.is_none() {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("Channel name cannot be empty".into()));
    }

    let record = web_state.database.lock().await.update_channel_metadata(
        key.number(),
        payload.name.as_deref(),
        payload.logo_url.as_deref(),
    )?;

    Ok(Json(json!({
        "success": true,
        "channel": record
    })))
}

/// Re-read the playlist directory into the catalog.
///
/// New channels are matched against the loaded guide straight away.
pub async fn reload_playlists(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let summary = load_playlist_dir(&web_state.database, &web_state.playlist_dir).await?;
    let guide_programs = rebuild_guide(&web_state.database).await?;
    Ok(Json(json!({
        "success": true,
        "summary": summary,
        "guide_programs": guide_programs
    })))
}

// ============================================================================
// Guide endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CurrentProgramQuery {
    pub channel: String,
}

/// Programme airing now on a channel.
pub async fn get_current_program(
    State(web_state): State<Arc<WebState>>,
    Query(query): Query<CurrentProgramQuery>,
) -> ApiResult {
    let key = parse_key(&query.channel)?;
    let now = chrono::Utc::now().timestamp();

    let db = web_state.database.lock().await;
    if db.get_channel(key.number())?.is_none() {
        return Err(ApiError::NotFound(format!("Channel not found: {}", key)));
    }
    let program = db.current_program(key.number(), now)?;
    drop(db);

    let (title, start, stop, description) = match program {
        Some(p) => (p.title, p.start, p.stop, p.description),
        None => ("No Program".to_string(), String::new(), String::new(), String::new()),
    };
    Ok(Json(json!({
        "success": true,
        "channel": key,
        "title": title,
        "start": start,
        "stop": stop,
        "description": description
    })))
}

/// Display names offered by the loaded guides, for picking a guide entry.
pub async fn get_guide_entries(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let entries = web_state.database.lock().await.list_guide_entries()?;
    Ok(Json(json!({
        "success": true,
        "entries": entries
    })))
}

#[derive(Debug, Deserialize)]
pub struct GuideEntryRequest {
    /// Raw guide channel id or display name; empty to match by channel name.
    pub tvg_name: String,
}

/// Point a channel at a guide entry and rebuild its programmes.
pub async fn set_channel_guide_entry(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
    Json(payload): Json<GuideEntryRequest>,
) -> ApiResult {
    let key = parse_key(&channel)?;
    let matched = web_state
        .database
        .lock()
        .await
        .set_channel_guide_entry(key.number(), &payload.tvg_name)?;

    Ok(Json(json!({
        "success": true,
        "matched": matched
    })))
}

/// Re-parse the guide directory and rebuild the combined guide.
pub async fn reload_guide(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let summary = refresh_guide(&web_state.database, &web_state.guide_dir).await?;
    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}

// ============================================================================
// Settings endpoints
// ============================================================================

/// Get runtime settings.
pub async fn get_settings(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let settings = web_state.database.lock().await.get_settings()?;
    Ok(Json(json!({
        "success": true,
        "settings": settings
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub tuner_count: Option<u32>,
    pub transcode_profile: Option<String>,
    pub guide_refresh_minutes: Option<u32>,
}

/// Update tuner count, the selected profile and/or the guide refresh interval.
///
/// Tuner count and profile apply to sessions created afterwards; running
/// streams keep their process.
pub async fn update_settings(
    State(web_state): State<Arc<WebState>>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> ApiResult {
    if payload.tuner_count.is_none()
        && payload.transcode_profile.is_none()
        && payload.guide_refresh_minutes.is_none()
    {
        return Err(ApiError::BadRequest("No fields to update".into()));
    }

    let profiles = web_state.streams.profiles();
    if let Some(name) = &payload.transcode_profile {
        if profiles.get(name).is_none() {
            return Err(ProfileError::UnknownProfile(name.clone()).into());
        }
    }

    let settings = web_state
        .database
        .lock()
        .await
        .update_settings(
            payload.tuner_count,
            payload.transcode_profile.as_deref(),
            payload.guide_refresh_minutes,
        )?;

    profiles.set_selected_unchecked(&settings.transcode_profile);
    web_state.streams.set_max_sessions(settings.tuner_count as usize);
    log::info!(
        "Settings updated: tuner_count={}, transcode_profile={}, guide_refresh_minutes={}",
        settings.tuner_count,
        settings.transcode_profile,
        settings.guide_refresh_minutes
    );

    Ok(Json(json!({
        "success": true,
        "settings": settings
    })))
}

// ============================================================================
// Profile endpoints
// ============================================================================

/// List built-in and custom profiles.
pub async fn get_profiles(State(web_state): State<Arc<WebState>>) -> ApiResult {
    let profiles = web_state.streams.profiles();
    Ok(Json(json!({
        "success": true,
        "selected": profiles.selected(),
        "profiles": profiles.list()
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    pub args: Vec<String>,
}

/// Create or replace a custom profile.
pub async fn create_profile(
    State(web_state): State<Arc<WebState>>,
    Json(payload): Json<CreateProfileRequest>,
) -> ApiResult {
    let profile = Profile::custom(&payload.name, payload.args)?;
    let name = profile.name().to_string();
    let args = profile.template();

    web_state.database.lock().await.save_custom_profile(&name, &args)?;
    web_state.streams.profiles().register(&name, args)?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Profile '{}' saved", name)
    })))
}

/// Delete a custom profile. Deleting the selected one reselects software.
pub async fn delete_profile(
    State(web_state): State<Arc<WebState>>,
    Path(name): Path<String>,
) -> ApiResult {
    let profiles = web_state.streams.profiles();
    if matches!(profiles.get(&name), Some(p) if !matches!(p, Profile::Custom { .. })) {
        return Err(ProfileError::ReservedName(name).into());
    }

    let db = web_state.database.lock().await;
    let stored = db.delete_custom_profile(&name)?;
    let registered = profiles.remove(&name);
    if !stored && !registered {
        return Err(ApiError::NotFound(format!("Profile not found: {}", name)));
    }

    if profiles.selected() == name {
        let settings = db.update_settings(None, Some(SOFTWARE), None)?;
        profiles.set_selected_unchecked(&settings.transcode_profile);
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Profile '{}' deleted", name)
    })))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::guide::test_support::temp_dir;
    use crate::stream::testing::FakeLauncher;
    use crate::stream::ChannelKey;
    use crate::web::router;
    use crate::web::state::test_support::test_state;
    use crate::web::state::WebState;
    use std::sync::Arc;

    async fn call(state: &Arc<WebState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_stream_status_reports_live_sessions() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let _sub = state.subscribe(ChannelKey::new(1)).await.unwrap();

        let (status, value) = call(&state, get("/api/stream_status")).await;
        assert_eq!(status, StatusCode::OK);
        let streams = value["streams"].as_array().unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0]["channel"], 1);
        assert_eq!(streams[0]["channel_name"], "One");
        assert_eq!(streams[0]["subscribers"], 1);
        assert_eq!(streams[0]["upstream_url"], "http://src/1.ts");
        assert_eq!(streams[0]["profile"], "software");
        assert_eq!(streams[0]["pid"], 1000);
        assert!(streams[0]["current_program"].is_null());
    }

    #[tokio::test]
    async fn test_teardown_endpoint() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let mut sub = state.subscribe(ChannelKey::new(1)).await.unwrap();

        let (status, value) = call(&state, post("/api/stream/1/teardown", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["stopped"], true);
        assert!(state.streams.get(ChannelKey::new(1)).await.is_none());
        assert!(matches!(
            sub.recv().await,
            Some(crate::stream::StreamItem::End(crate::stream::EndReason::Teardown))
        ));

        let (_, value) = call(&state, post("/api/stream/1/teardown", json!({}))).await;
        assert_eq!(value["stopped"], false);
    }

    #[tokio::test]
    async fn test_channel_number_swap_tears_down_both() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let _one = state.subscribe(ChannelKey::new(1)).await.unwrap();
        let _two = state.subscribe(ChannelKey::new(2)).await.unwrap();

        let (status, value) = call(&state, post("/api/channel_number", json!({"current": 1, "new": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["swapped"], true);
        assert_eq!(state.streams.count().await, 0);

        let db = state.database.lock().await;
        assert_eq!(db.get_stream_url(1).unwrap().as_deref(), Some("http://src/2.ts"));
        assert_eq!(db.get_stream_url(2).unwrap().as_deref(), Some("http://src/1.ts"));
        drop(db);

        let (status, value) = call(&state, post("/api/channel_number", json!({"current": 42, "new": 3}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_deactivate_channel() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let _sub = state.subscribe(ChannelKey::new(2)).await.unwrap();

        let (status, _) = call(&state, post("/api/channel/2/active", json!({"active": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.streams.count().await, 0);

        let (status, _) = call(&state, get("/api/channels")).await;
        assert_eq!(status, StatusCode::OK);
        let response = router(state.clone()).oneshot(get("/tuner/2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let (status, _) = call(&state, post("/api/channel/9/active", json!({"active": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_update() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let (status, value) = call(
            &state,
            post("/api/settings", json!({"tuner_count": 6, "transcode_profile": "hardware"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["settings"]["tuner_count"], 6);
        assert_eq!(state.streams.max_sessions(), 6);
        assert_eq!(state.streams.profiles().selected(), "hardware");

        let (status, _) = call(&state, post("/api/settings", json!({"transcode_profile": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.streams.profiles().selected(), "hardware");

        let (_, value) = call(&state, get("/api/settings")).await;
        assert_eq!(value["settings"]["transcode_profile"], "hardware");
    }

    #[tokio::test]
    async fn test_profile_lifecycle() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let (status, _) = call(
            &state,
            post("/api/profiles", json!({"name": "copy", "args": ["-i", "{input}", "-c", "copy", "-f", "mpegts", "pipe:1"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, post("/api/profiles", json!({"name": "bad", "args": ["-i", "x"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, post("/api/profiles", json!({"name": "software", "args": ["{input}"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, value) = call(&state, get("/api/profiles")).await;
        let names: Vec<_> = value["profiles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["software", "hardware", "copy"]);
        assert_eq!(state.database.lock().await.list_custom_profiles().unwrap().len(), 1);

        // New sessions pick up the selection.
        call(&state, post("/api/settings", json!({"transcode_profile": "copy"}))).await;
        let _sub = state.subscribe(ChannelKey::new(1)).await.unwrap();
        assert_eq!(launcher.invocation(0).args[1], "http://src/1.ts");
        assert_eq!(launcher.invocation(0).profile, "copy");

        let delete = |uri: &str| Request::delete(uri).body(Body::empty()).unwrap();
        let (status, _) = call(&state, delete("/api/profiles/software")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, delete("/api/profiles/copy")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.streams.profiles().selected(), "software");
        let (status, _) = call(&state, delete("/api/profiles/copy")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_playlist_reload() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let dir = std::env::temp_dir().join(format!("iptv-hdhr-reload-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("extra.m3u"),
            "#EXTM3U\n#EXTINF:-1 tvg-name=\"three\",Three\nhttp://src/3.ts\n#EXTINF:-1 tvg-name=\"one\",One\nhttp://src/1b.ts\n",
        )
        .unwrap();

        let mut state = Arc::try_unwrap(state).ok().unwrap();
        state.playlist_dir = dir.clone();
        let state = Arc::new(state);

        let (status, value) = call(&state, post("/api/playlist/reload", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["summary"]["inserted"], 1);
        assert_eq!(value["summary"]["updated"], 1);
        assert_eq!(
            state.database.lock().await.get_stream_url(1).unwrap().as_deref(),
            Some("http://src/1b.ts")
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// Guide with a programme on "one" spanning the current time.
    fn live_guide() -> String {
        let now = chrono::Utc::now();
        let stamp = |t: chrono::DateTime<chrono::Utc>| t.format("%Y%m%d%H%M%S +0000").to_string();
        format!(
            r#"<tv>
  <channel id="one.tv"><display-name>one</display-name></channel>
  <channel id="extra.tv"><display-name>Extra</display-name></channel>
  <programme channel="one.tv" start="{}" stop="{}"><title>Live Now</title><desc>On air</desc></programme>
  <programme channel="extra.tv" start="{}" stop="{}"><title>Extra Show</title></programme>
</tv>"#,
            stamp(now - chrono::Duration::hours(1)),
            stamp(now + chrono::Duration::hours(1)),
            stamp(now - chrono::Duration::hours(1)),
            stamp(now + chrono::Duration::hours(1)),
        )
    }

    /// Test state whose guide directory holds `live_guide()`, already loaded.
    async fn state_with_guide(launcher: &Arc<FakeLauncher>, name: &str) -> (Arc<WebState>, std::path::PathBuf) {
        let dir = temp_dir(name);
        std::fs::write(dir.join("live.xml"), live_guide()).unwrap();

        let mut state = Arc::try_unwrap(test_state(launcher)).ok().unwrap();
        state.guide_dir = dir.clone();
        let state = Arc::new(state);

        let (status, value) = call(&state, post("/api/guide/reload", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["summary"]["files"], 1);
        assert_eq!(value["summary"]["programmes"], 2);
        assert_eq!(value["summary"]["matched"], 1);
        (state, dir)
    }

    #[tokio::test]
    async fn test_stream_status_reports_current_program() {
        let launcher = FakeLauncher::new();
        let (state, dir) = state_with_guide(&launcher, "status-program").await;
        let _one = state.subscribe(ChannelKey::new(1)).await.unwrap();
        let _two = state.subscribe(ChannelKey::new(2)).await.unwrap();

        let (_, value) = call(&state, get("/api/stream_status")).await;
        let streams = value["streams"].as_array().unwrap();
        assert_eq!(streams.len(), 2);
        let by_channel = |n: u64| streams.iter().find(|s| s["channel"] == n).unwrap();
        assert_eq!(by_channel(1)["current_program"]["title"], "Live Now");
        assert_eq!(by_channel(1)["current_program"]["channel_number"], 1);
        assert!(by_channel(2)["current_program"].is_null());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_current_program_endpoint() {
        let launcher = FakeLauncher::new();
        let (state, dir) = state_with_guide(&launcher, "current-program").await;

        let (status, value) = call(&state, get("/api/current_program?channel=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["channel"], 1);
        assert_eq!(value["title"], "Live Now");
        assert_eq!(value["description"], "On air");
        assert!(!value["start"].as_str().unwrap().is_empty());

        let (status, value) = call(&state, get("/api/current_program?channel=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["title"], "No Program");
        assert_eq!(value["start"], "");
        assert_eq!(value["stop"], "");
        assert_eq!(value["description"], "");

        let (status, _) = call(&state, get("/api/current_program?channel=9")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&state, get("/api/current_program?channel=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_guide_entry_assignment() {
        let launcher = FakeLauncher::new();
        let (state, dir) = state_with_guide(&launcher, "guide-entry").await;

        let (status, value) = call(&state, get("/api/epg_entries")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["entries"], json!(["Extra", "one"]));

        let (status, value) = call(&state, post("/api/channel/2/guide_entry", json!({"tvg_name": "Extra"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["matched"], 1);
        let (_, value) = call(&state, get("/api/current_program?channel=2")).await;
        assert_eq!(value["title"], "Extra Show");

        // The assignment survives a full rebuild.
        let (status, _) = call(&state, post("/api/guide/reload", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, value) = call(&state, get("/api/current_program?channel=2")).await;
        assert_eq!(value["title"], "Extra Show");

        let (status, _) = call(&state, post("/api/channel/9/guide_entry", json!({"tvg_name": "Extra"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_channel_metadata_update() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let (status, value) = call(
            &state,
            post("/api/channel/1/metadata", json!({"name": "One HD", "logo_url": "/logos/one.png"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["channel"]["name"], "One HD");
        assert_eq!(value["channel"]["logo_url"], "/logos/one.png");

        let (status, _) = call(&state, post("/api/channel/1/metadata", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, post("/api/channel/1/metadata", json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, post("/api/channel/9/metadata", json!({"name": "Nine"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guide_refresh_setting() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let (_, value) = call(&state, get("/api/settings")).await;
        assert_eq!(value["settings"]["guide_refresh_minutes"], 360);

        let (status, value) = call(&state, post("/api/settings", json!({"guide_refresh_minutes": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["settings"]["guide_refresh_minutes"], 0);
        assert_eq!(value["settings"]["tuner_count"], 1);
    }
}
