use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ControllerError {
    #[error("Ractor error: {0}")]
    Ractor(String),
}
