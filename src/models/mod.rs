//! Data models for imgbatch.
//!
//! - [`AppState`]: the image collection, selection, shared settings, and export status
//! - [`ImageRecord`]: one dropped image and its conversion lifecycle
//! - [`ConversionSettings`]: the process-wide conversion profile, plus [`SettingsPatch`] for partial updates
//! - [`UserConfig`]: persisted preferences loaded from `imgbatch.yaml`
//!
//! Record state only changes through [`ImageRecord`]'s transition methods, and
//! [`AppState`] only through [`StateManager`](crate::state::StateManager).

pub mod app_state;
pub mod config;
pub mod record;
pub mod settings;

pub use app_state::{AppState, PreviewRegistry, ProgressBar, ProgressView};
pub use config::{DEFAULT_ARCHIVE_NAME, UserConfig};
pub use record::{
    ConversionStatus, ConvertedImage, ImageRecord, PreviewHandle, RecordId, Transition, file_stem,
};
pub use settings::{
    ConversionSettings, FormatParseError, OutputFormat, SettingsError, SettingsPatch,
};
