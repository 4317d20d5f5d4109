// imgbatch - Batch image conversion with per-image progress and archive export
//
// This is the library crate containing the conversion pipeline and its state.
// The binary crate (main.rs) provides a headless command-line front end.

pub mod config;
pub mod controller;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use controller::BatchController;
pub use metrics::Metrics;
pub use models::{
    AppState, ConversionSettings, ConversionStatus, ImageRecord, OutputFormat, RecordId,
    SettingsPatch, UserConfig,
};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
