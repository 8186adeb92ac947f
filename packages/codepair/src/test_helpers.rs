use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::config::{SessionConfig, SessionFileConfig};
use crate::metrics::ServerMetrics;

/// Build a fully-wired `AppState` around a freshly spawned hub actor with
/// default session settings. Must be called inside a tokio runtime.
pub fn test_app_state() -> AppState {
    test_app_state_with(SessionFileConfig::default())
}

/// Like `test_app_state`, but with custom session tunables.
pub fn test_app_state_with(session: SessionFileConfig) -> AppState {
    let session_config = SessionConfig::from_file(&session);
    let metrics = Arc::new(ServerMetrics::new());
    let hub = crate::hub::spawn_hub(
        session_config.hub.clone(),
        session_config.command_capacity,
        metrics.clone(),
    );

    AppState {
        hub,
        metrics,
        session_config: Arc::new(session_config),
        shutdown: CancellationToken::new(),
    }
}
