use axum::{
    Json, Router,
    extract::{Path, State},
    routing::put,
};
use dbprov_api::{ServerBinding, ServerBindingSpec};
use tracing::info;

use crate::controller::enqueue_dependents;
use crate::error::{ApiError, StoreError};
use crate::server::router::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/servers/{name}", put(apply_server).get(get_server))
}

/// Store a server binding and re-enqueue every intent that references it.
async fn apply_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(spec): Json<ServerBindingSpec>,
) -> Result<Json<ServerBinding>, ApiError> {
    if spec.host.trim().is_empty() {
        return Err(ApiError::BadRequest("host must not be empty".to_string()));
    }
    if spec.port == 0 {
        return Err(ApiError::BadRequest("port must be set".to_string()));
    }

    let server = ServerBinding { name, spec };
    state.store.put_server(server.clone()).await?;
    let dependents = enqueue_dependents(&state.store, &state.controller, &server.name).await?;
    info!(server = %server.name, host = %server.spec.host, dependents, "server binding applied");
    Ok(Json(server.redacted()))
}

async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServerBinding>, ApiError> {
    let server = state
        .store
        .get_server(&name)
        .await?
        .ok_or(StoreError::NotFound {
            kind: "ServerBinding",
            key: name,
        })?;
    Ok(Json(server.redacted()))
}
