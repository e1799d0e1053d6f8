mod api;
mod controller;
mod gateway;
mod provision;
mod store;

pub use api::{ApiError, ApiErrorBody, ApiErrorObject};
pub use controller::ControllerError;
pub use gateway::GatewayError;
pub use provision::{ProvisionError, ValidationError};
pub use store::StoreError;
