//! Shared domain types for the progression engine.
//!
//! The `UserProgression` aggregate, the typed metric/action vocabulary, the
//! static catalog definitions, the error taxonomy and configuration loading.

pub mod config;
pub mod error;
pub mod file_config;
pub mod progression;
pub mod types;

pub use config::AppConfig;
pub use error::{CatalogError, MetricError, ProgressionError, StoreError};
pub use progression::UserProgression;
pub use types::*;
