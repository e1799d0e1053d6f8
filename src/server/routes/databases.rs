use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::put,
};
use dbprov_api::{DatabaseIntent, DatabaseIntentSpec, ObjectKey};
use tracing::info;

use crate::error::{ApiError, StoreError};
use crate::server::router::AppState;
use crate::store::DeletionRequest;
use crate::utils::logging::debug_pretty_json;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/namespaces/{namespace}/databases/{name}",
        put(apply_database).get(get_database).delete(delete_database),
    )
}

/// Create or replace an intent's spec (defaults applied), then trigger reconciliation.
async fn apply_database(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(spec): Json<DatabaseIntentSpec>,
) -> Result<Json<DatabaseIntent>, ApiError> {
    let mut intent = DatabaseIntent::new(namespace, name, spec);
    intent.apply_defaults();
    debug_pretty_json("applying database intent", &intent);

    let stored = state.store.put_intent(intent).await?;
    state.controller.enqueue(stored.key())?;
    info!(intent = %stored.key(), server = %stored.spec.server_name, "database intent applied");
    Ok(Json(stored))
}

async fn get_database(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<DatabaseIntent>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    let intent = state
        .store
        .get_intent(&key)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "DatabaseIntent",
            key: key.to_string(),
        })?;
    Ok(Json(intent))
}

/// `204` when the intent was erased outright, `202` while its finalizer still runs.
async fn delete_database(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = ObjectKey::new(namespace, name);
    match state.store.request_intent_deletion(&key).await? {
        DeletionRequest::Erased => Ok(StatusCode::NO_CONTENT),
        DeletionRequest::Pending => {
            state.controller.enqueue(key.clone())?;
            info!(intent = %key, "database intent deletion requested");
            Ok(StatusCode::ACCEPTED)
        }
    }
}
