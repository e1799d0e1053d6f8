use dbprov_api::DatabaseIntent;
use std::sync::Arc;

use crate::error::{ProvisionError, StoreError};
use crate::store::IntentStore;

/// Writes reconciliation outcomes onto the intent's status subresource.
#[derive(Clone)]
pub struct StatusReporter {
    intents: Arc<dyn IntentStore>,
}

impl StatusReporter {
    pub fn new(intents: Arc<dyn IntentStore>) -> Self {
        Self { intents }
    }

    /// `None` marks success (`created = true`, error cleared); `Some` records the
    /// message and leaves `created` untouched.
    pub async fn report(
        &self,
        intent: &mut DatabaseIntent,
        error: Option<&ProvisionError>,
    ) -> Result<(), StoreError> {
        match error {
            None => {
                intent.status.created = true;
                intent.status.error.clear();
            }
            Some(err) => {
                intent.status.error = err.status_message();
            }
        }
        self.intents.update_status(intent).await
    }
}
