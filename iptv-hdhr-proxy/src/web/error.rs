//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::database::DatabaseError;
use crate::guide::GuideError;
use crate::stream::{ProfileError, StreamError};

/// Error returned by web handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Guide(#[from] GuideError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Stream(StreamError::ChannelNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Stream(StreamError::Launch(_))
            | ApiError::Stream(StreamError::AllTunersBusy(_))
            | ApiError::Stream(StreamError::Ended(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Stream(StreamError::Lookup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(DatabaseError::ChannelNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Guide(GuideError::Database(DatabaseError::ChannelNotFound(_))) => StatusCode::NOT_FOUND,
            ApiError::Guide(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Profile(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {}", self);
        }
        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string()
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChannelKey, LaunchError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(StreamError::ChannelNotFound(ChannelKey::new(5))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StreamError::Launch(LaunchError::EmptyProgram)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StreamError::AllTunersBusy(2)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(ProfileError::EmptyName).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DatabaseError::InvalidData("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(GuideError::from(DatabaseError::ChannelNotFound(9))).status(),
            StatusCode::NOT_FOUND
        );
    }
}
