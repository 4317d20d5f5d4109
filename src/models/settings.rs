use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default output quality, matching the converter's initial UI state.
pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

/// Output encodings the converter can produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Avif,
    ];

    /// MIME type for this encoding
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// File extension used for downloads and archive entries (the MIME subtype)
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    /// Whether the `quality` setting has any effect on this encoding.
    /// PNG is always lossless.
    pub fn honors_quality(self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown output format '{0}' (expected jpeg, png, webp or avif)")]
pub struct FormatParseError(pub String);

impl FromStr for OutputFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let subtype = normalized.strip_prefix("image/").unwrap_or(&normalized);
        match subtype {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            _ => Err(FormatParseError(s.to_string())),
        }
    }
}

/// Invalid settings values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(u8),

    #[error("{0} must be a positive number of pixels")]
    ZeroDimension(&'static str),
}

/// The process-wide conversion profile.
///
/// Every conversion captures a copy of this value when it starts, so later
/// changes never leak into a conversion that is already in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub format: OutputFormat,
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

impl ConversionSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=100).contains(&self.quality) {
            return Err(SettingsError::QualityOutOfRange(self.quality));
        }
        if self.max_width == 0 {
            return Err(SettingsError::ZeroDimension("Max width"));
        }
        if self.max_height == 0 {
            return Err(SettingsError::ZeroDimension("Max height"));
        }
        Ok(())
    }

    /// Longest edge allowed in the output
    pub fn longest_edge(&self) -> u32 {
        self.max_width.max(self.max_height)
    }

    /// Merge a partial update into a copy of these settings and validate the result.
    pub fn merged(&self, patch: &SettingsPatch) -> Result<Self, SettingsError> {
        let merged = Self {
            format: patch.format.unwrap_or(self.format),
            quality: patch.quality.unwrap_or(self.quality),
            max_width: patch.max_width.unwrap_or(self.max_width),
            max_height: patch.max_height.unwrap_or(self.max_height),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// A partial settings update; `None` fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub format: Option<OutputFormat>,
    pub quality: Option<u8>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl SettingsPatch {
    pub fn format(format: OutputFormat) -> Self {
        Self {
            format: Some(format),
            ..Self::default()
        }
    }

    pub fn quality(quality: u8) -> Self {
        Self {
            quality: Some(quality),
            ..Self::default()
        }
    }

    pub fn dimensions(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: Some(max_width),
            max_height: Some(max_height),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ConversionSettings::default();
        assert_eq!(settings.format, OutputFormat::Jpeg);
        assert_eq!(settings.quality, 80);
        assert_eq!(settings.longest_edge(), 1920);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_quality_applies_to_lossy_formats() {
        assert!(OutputFormat::Jpeg.honors_quality());
        assert!(OutputFormat::Webp.honors_quality());
        assert!(OutputFormat::Avif.honors_quality());
        assert!(!OutputFormat::Png.honors_quality());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("image/webp".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert_eq!(" AVIF ".parse::<OutputFormat>().unwrap(), OutputFormat::Avif);
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_format_extensions_follow_mime_subtype() {
        for format in OutputFormat::ALL {
            let subtype = format.mime_type().split('/').nth(1).unwrap();
            assert_eq!(format.extension(), subtype);
        }
    }

    #[test]
    fn test_merge_patch() {
        let settings = ConversionSettings::default();
        let merged = settings.merged(&SettingsPatch::quality(50)).unwrap();

        assert_eq!(merged.quality, 50);
        assert_eq!(merged.format, settings.format);
        assert_eq!(merged.max_width, settings.max_width);
    }

    #[test]
    fn test_merge_rejects_invalid_values() {
        let settings = ConversionSettings::default();

        assert_eq!(
            settings.merged(&SettingsPatch::quality(0)),
            Err(SettingsError::QualityOutOfRange(0))
        );
        assert_eq!(
            settings.merged(&SettingsPatch::quality(101)),
            Err(SettingsError::QualityOutOfRange(101))
        );
        assert!(matches!(
            settings.merged(&SettingsPatch::dimensions(0, 100)),
            Err(SettingsError::ZeroDimension(_))
        ));
    }

    #[test]
    fn test_empty_patch() {
        assert!(SettingsPatch::default().is_empty());
        assert!(!SettingsPatch::format(OutputFormat::Png).is_empty());
    }
}
