//! Streaming endpoints (`/tuner/:channel`, `/auto/:vchannel`).

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use log::{debug, info};
use tokio::sync::mpsc;

use crate::stream::{pump, ChannelKey, ChannelSink, InvalidChannelKey};
use crate::web::error::ApiError;
use crate::web::state::WebState;

/// Chunks buffered between the pump and the HTTP body.
const BODY_BUFFER: usize = 16;

/// `GET /tuner/:channel`
pub async fn tuner_stream(
    State(web_state): State<Arc<WebState>>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    stream_channel(&web_state, parse_key(&channel)?).await
}

/// `GET /auto/:vchannel` (`v5` form used by some clients)
pub async fn auto_stream(
    State(web_state): State<Arc<WebState>>,
    Path(vchannel): Path<String>,
) -> Result<Response, ApiError> {
    stream_channel(&web_state, parse_key(&vchannel)?).await
}

fn parse_key(raw: &str) -> Result<ChannelKey, ApiError> {
    raw.parse()
        .map_err(|e: InvalidChannelKey| ApiError::BadRequest(e.to_string()))
}

async fn stream_channel(web_state: &WebState, key: ChannelKey) -> Result<Response, ApiError> {
    let subscription = web_state.subscribe(key).await?;
    info!(
        "[ch {}] viewer {} attached ({} watching)",
        key,
        subscription.id(),
        subscription.session().subscriber_count()
    );

    let (tx, rx) = mpsc::channel(BODY_BUFFER);
    tokio::spawn(async move {
        let viewer = subscription.id();
        let outcome = pump(subscription, ChannelSink::new(tx)).await;
        debug!("[ch {}] viewer {} detached: {:?}", key, viewer, outcome);
    });

    // Dropping the body (client disconnect) closes `rx`, which ends the pump.
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Ok((
        [(CONTENT_TYPE, "video/mp2t"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::stream::testing::FakeLauncher;
    use crate::stream::ChannelKey;
    use crate::web::router;
    use crate::web::state::test_support::test_state;

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_body_until_upstream_ends() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        let app = router(state.clone());

        let response = app.oneshot(get("/tuner/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "video/mp2t");
        assert_eq!(launcher.invocation(0).args.iter().filter(|a| *a == "http://src/1.ts").count(), 1);

        launcher.write(0, b"\x47mpegts").await;
        launcher.exit(0, 0).await;

        let body = tokio::time::timeout(Duration::from_secs(5), to_bytes(response.into_body(), usize::MAX))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&body[..], b"\x47mpegts");
    }

    #[tokio::test]
    async fn test_auto_route_shares_session() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let first = router(state.clone()).oneshot(get("/tuner/2")).await.unwrap();
        let second = router(state.clone()).oneshot(get("/auto/v2")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(launcher.launch_count(), 1);

        let session = state.streams.get(ChannelKey::new(2)).await.unwrap();
        assert_eq!(session.subscriber_count(), 2);

        // Client disconnects: both bodies dropped, session released.
        drop(first);
        drop(second);
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.streams.get(ChannelKey::new(2)).await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(!session.process().is_running());
    }

    #[tokio::test]
    async fn test_stream_errors() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);

        let missing = router(state.clone()).oneshot(get("/tuner/99")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = router(state.clone()).oneshot(get("/tuner/abc")).await.unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        launcher.fail_launches(true);
        let failed = router(state.clone()).oneshot(get("/tuner/1")).await.unwrap();
        assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(failed.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(state.streams.count().await, 0);
    }

    #[tokio::test]
    async fn test_all_tuners_busy() {
        let launcher = FakeLauncher::new();
        let state = test_state(&launcher);
        state.streams.set_max_sessions(1);

        let _one = router(state.clone()).oneshot(get("/tuner/1")).await.unwrap();
        let two = router(state.clone()).oneshot(get("/tuner/2")).await.unwrap();
        assert_eq!(two.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
