pub mod config;
pub mod error;
pub mod types;

pub use config::{EventNames, TrackingConfig};
pub use error::ShoptraceError;
pub use types::*;
