use super::settings::{
    ConversionSettings, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY, OutputFormat,
};
use serde::{Deserialize, Serialize};

/// Default file name for the bulk-export archive
pub const DEFAULT_ARCHIVE_NAME: &str = "converted-images.zip";

/// User configuration from imgbatch.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Converter", default)]
    pub converter: ConverterSection,

    #[serde(rename = "Export", default)]
    pub export: ExportSection,

    #[serde(rename = "Logging", default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterSection {
    #[serde(rename = "Output Format", default)]
    pub format: OutputFormat,

    #[serde(rename = "Quality", default = "default_quality")]
    pub quality: u8,

    #[serde(rename = "Max Width", default = "default_max_width")]
    pub max_width: u32,

    #[serde(rename = "Max Height", default = "default_max_height")]
    pub max_height: u32,
}

impl Default for ConverterSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(rename = "Archive Name", default = "default_archive_name")]
    pub archive_name: String,

    #[serde(rename = "Compress Archive", default)]
    pub compress_archive: bool,

    #[serde(rename = "Output Directory", default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            archive_name: default_archive_name(),
            compress_archive: false,
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,

    #[serde(rename = "Log Directory", default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_dir: default_log_dir(),
        }
    }
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_max_height() -> u32 {
    DEFAULT_MAX_HEIGHT
}

fn default_archive_name() -> String {
    DEFAULT_ARCHIVE_NAME.to_string()
}

fn default_output_dir() -> String {
    "converted".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl UserConfig {
    /// Conversion profile described by the `Converter` section.
    ///
    /// Invalid values (quality 0, zero dimensions) fall back to defaults
    /// rather than refusing to start.
    pub fn conversion_settings(&self) -> ConversionSettings {
        let settings = ConversionSettings {
            format: self.converter.format,
            quality: self.converter.quality,
            max_width: self.converter.max_width,
            max_height: self.converter.max_height,
        };

        match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                tracing::warn!("Invalid converter settings in config ({}), using defaults", e);
                ConversionSettings::default()
            }
        }
    }

    /// Store a conversion profile back into the `Converter` section
    pub fn set_conversion_settings(&mut self, settings: &ConversionSettings) {
        self.converter.format = settings.format;
        self.converter.quality = settings.quality;
        self.converter.max_width = settings.max_width;
        self.converter.max_height = settings.max_height;
    }
}
