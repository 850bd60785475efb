use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShoptraceError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
