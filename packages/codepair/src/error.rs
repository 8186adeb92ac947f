use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failure kinds surfaced by the session hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("Session not found")]
    SessionNotFound(String),
    #[error("invalid message: {0}")]
    Validation(String),
    #[error("session hub is not running")]
    HubUnavailable,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            HubError::Validation(_) => StatusCode::BAD_REQUEST,
            HubError::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let resp = HubError::SessionNotFound("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let resp = HubError::Validation("empty session_id".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_message_is_user_facing() {
        assert_eq!(
            HubError::SessionNotFound("abc".into()).to_string(),
            "Session not found"
        );
    }
}
