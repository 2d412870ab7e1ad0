use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::realtime::connection;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AdmissionParams {
    pub token: Option<String>,
}

/// Admission: the credential is verified before the upgrade, so a rejected
/// client never gets a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdmissionParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Unauthenticated("missing credential".to_string()))?;

    let session = state
        .authenticator
        .verify(&state.store, token)
        .inspect_err(|err| warn!(error = %err, "websocket admission rejected"))?;

    Ok(ws.on_upgrade(move |socket| connection::serve(socket, state, session)))
}
