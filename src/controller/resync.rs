use std::time::Duration;
use tracing::{debug, info, warn};

use super::ControllerHandle;
use crate::error::ApiError;
use crate::store::StoreHandle;

/// Enqueue every stored intent. Returns how many were enqueued.
pub async fn enqueue_all(
    store: &StoreHandle,
    controller: &ControllerHandle,
) -> Result<usize, ApiError> {
    let intents = store.list_intents().await?;
    for intent in &intents {
        controller.enqueue(intent.key())?;
    }
    Ok(intents.len())
}

/// Enqueue every intent bound to `server_name`, after the binding changed.
pub async fn enqueue_dependents(
    store: &StoreHandle,
    controller: &ControllerHandle,
    server_name: &str,
) -> Result<usize, ApiError> {
    let intents = store.list_intents_for_server(server_name).await?;
    for intent in &intents {
        controller.enqueue(intent.key())?;
    }
    debug!(server = server_name, count = intents.len(), "enqueued dependent intents");
    Ok(intents.len())
}

/// Level-triggered safety net: periodically re-enqueue everything.
pub async fn run_resync(store: StoreHandle, controller: ControllerHandle, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match enqueue_all(&store, &controller).await {
            Ok(count) => info!(count, "resync enqueued intents"),
            Err(ApiError::Controller(e)) => {
                warn!(error = %e, "controller gone; resync stopping");
                return;
            }
            Err(e) => warn!(error = %e, "resync failed to list intents"),
        }
    }
}
