use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeasurementError>;

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Collector error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Hit rejected: {0}")]
    InvalidHit(String),
}

impl From<reqwest::Error> for MeasurementError {
    fn from(err: reqwest::Error) -> Self {
        MeasurementError::Network(err.to_string())
    }
}
