use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AppState;
use crate::error::HubError;
use crate::hub::SessionSnapshot;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: SessionSnapshot,
}

/// Create a fresh session with the configured default content and mode
pub async fn create_session(State(state): State<AppState>) -> Result<Response, HubError> {
    let session = state.hub.create_session().await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id.clone(),
            session,
        }),
    )
        .into_response())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, HubError> {
    match state.hub.get_session(&id).await {
        Ok(session) => Ok(Json(SessionResponse { session })),
        Err(e) => {
            if matches!(e, HubError::SessionNotFound(_)) {
                state.metrics.not_found_error();
                debug!(session = %id, "Lookup for unknown session");
            }
            Err(e)
        }
    }
}
