//! Configuration management for FastConvert

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConvertError, Result};

pub mod request;
pub use request::*;

/// Persisted settings: last-used conversion choices plus runtime knobs.
///
/// None of it is required. Missing or malformed fields fall back to their
/// defaults one by one, see [`Settings::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Conversion choices
    pub conversion: ConversionSettings,

    /// Worker pool settings
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conversion: ConversionSettings::default(),
            processing: ProcessingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Conversion choices remembered between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Target format
    pub format: TargetFormat,

    /// Unified quality (None = per-format default)
    pub quality: Option<u8>,

    /// Output directory (None = next to each source)
    pub output_dir: Option<PathBuf>,

    /// Height bound in pixels
    pub max_height: u32,

    /// Width bound in pixels
    pub max_width: u32,

    /// Whether the height bound takes part in resizing
    pub enforce_height: bool,

    /// Whether the width bound takes part in resizing
    pub enforce_width: bool,

    /// Sharpness factor (1.0 = unchanged)
    pub sharpness: f32,

    /// Copy access/modification times onto outputs
    pub keep_timestamps: bool,

    /// Move sources to the trash after conversion
    pub delete_source: bool,

    /// WebP method (0-6)
    pub webp_method: u8,

    /// AVIF encoder speed (0-10)
    pub avif_speed: u8,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: TargetFormat::Avif,
            quality: None,
            output_dir: None,
            max_height: 768,
            max_width: 1500,
            enforce_height: true,
            enforce_width: false,
            sharpness: 1.0,
            keep_timestamps: false,
            delete_source: false,
            webp_method: EncoderTuning::DEFAULT_WEBP_METHOD,
            avif_speed: EncoderTuning::DEFAULT_AVIF_SPEED,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of workers (None = auto-detect)
    pub threads: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { threads: None }
    }
}

impl ProcessingConfig {
    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    #[serde(rename = "webp")]
    WebP,
    Avif,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [Self::Jpeg, Self::Png, Self::WebP, Self::Avif];

    /// Get file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Quality used when none is given
    pub fn default_quality(self) -> u8 {
        match self {
            Self::Jpeg => 90,
            Self::Png => 6,
            Self::WebP => 80,
            Self::Avif => 63,
        }
    }

    /// Whether the format can carry an alpha channel
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A settings field that was present but unusable
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsIssue {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for SettingsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

enum SettingsFormat {
    Toml,
    Yaml,
}

fn settings_format(path: &Path) -> Result<SettingsFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "toml" => Ok(SettingsFormat::Toml),
        "yaml" | "yml" => Ok(SettingsFormat::Yaml),
        _ => Err(ConvertError::config(
            "Unsupported settings file format. Use .toml or .yaml",
        )),
    }
}

impl Settings {
    /// Load settings, never failing.
    ///
    /// An unreadable or unparsable file yields the defaults; a malformed
    /// field yields that field's default. Each fallback comes back as a
    /// warning message, so callers can log it once logging is set up.
    pub fn load<P: AsRef<Path>>(path: P) -> (Self, Vec<String>) {
        let path = path.as_ref();
        match Self::load_with_report(path) {
            Ok((settings, issues)) => {
                let warnings = issues
                    .iter()
                    .map(|issue| format!("Settings {}: {}, using default", path.display(), issue))
                    .collect();
                (settings, warnings)
            }
            Err(e) => (
                Self::default(),
                vec![format!("Ignoring settings file {}: {}", path.display(), e)],
            ),
        }
    }

    /// Load settings and report every field that fell back to its default.
    ///
    /// Fails only when the file cannot be read or parsed at all.
    pub fn load_with_report<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<SettingsIssue>)> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;

        let value: Value = match settings_format(path)? {
            SettingsFormat::Toml => toml::from_str(&content)?,
            SettingsFormat::Yaml => serde_yaml::from_str(&content)?,
        };

        Ok(Self::from_value(&value))
    }

    /// Build settings from a parsed document, field by field
    pub fn from_value(value: &Value) -> (Self, Vec<SettingsIssue>) {
        let mut reader = FieldReader::default();
        let defaults = Self::default();
        let root = value.as_object();

        let conversion = {
            let section = reader.section(root, "conversion");
            let d = &defaults.conversion;
            ConversionSettings {
                format: reader.field(section, "conversion.format", d.format, |_| true),
                quality: reader.field(section, "conversion.quality", d.quality, |q| {
                    q.map_or(true, |q| (1..=100).contains(&q))
                }),
                output_dir: reader.field(section, "conversion.output_dir", d.output_dir.clone(), |_| true),
                max_height: reader.field(section, "conversion.max_height", d.max_height, |v| *v > 0),
                max_width: reader.field(section, "conversion.max_width", d.max_width, |v| *v > 0),
                enforce_height: reader.field(section, "conversion.enforce_height", d.enforce_height, |_| true),
                enforce_width: reader.field(section, "conversion.enforce_width", d.enforce_width, |_| true),
                sharpness: reader.field(section, "conversion.sharpness", d.sharpness, |s| {
                    s.is_finite() && *s >= 0.0
                }),
                keep_timestamps: reader.field(section, "conversion.keep_timestamps", d.keep_timestamps, |_| true),
                delete_source: reader.field(section, "conversion.delete_source", d.delete_source, |_| true),
                webp_method: reader.field(section, "conversion.webp_method", d.webp_method, |m| {
                    *m <= EncoderTuning::MAX_WEBP_METHOD
                }),
                avif_speed: reader.field(section, "conversion.avif_speed", d.avif_speed, |s| {
                    *s <= EncoderTuning::MAX_AVIF_SPEED
                }),
            }
        };

        let processing = {
            let section = reader.section(root, "processing");
            ProcessingConfig {
                threads: reader.field(section, "processing.threads", defaults.processing.threads, |t| {
                    t.map_or(true, |t| t > 0)
                }),
            }
        };

        let logging = {
            let section = reader.section(root, "logging");
            let d = &defaults.logging;
            LoggingConfig {
                level: reader.field(section, "logging.level", d.level.clone(), |l| !l.trim().is_empty()),
                json_format: reader.field(section, "logging.json_format", d.json_format, |_| true),
            }
        };

        (
            Self {
                conversion,
                processing,
                logging,
            },
            reader.issues,
        )
    }

    /// Save settings to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match settings_format(path)? {
            SettingsFormat::Toml => toml::to_string_pretty(self)?,
            SettingsFormat::Yaml => serde_yaml::to_string(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| {
            ConvertError::config(format!("Failed to write settings file {:?}: {}", path, e))
        })?;

        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        let c = &self.conversion;

        if let Some(quality) = c.quality {
            if !(1..=100).contains(&quality) {
                return Err(ConvertError::config(format!(
                    "Quality must be between 1-100, got {quality}"
                )));
            }
        }

        if c.max_height == 0 || c.max_width == 0 {
            return Err(ConvertError::config("Resize bounds must be greater than 0"));
        }

        if !c.sharpness.is_finite() || c.sharpness < 0.0 {
            return Err(ConvertError::config(format!(
                "Sharpness must be a non-negative number, got {}",
                c.sharpness
            )));
        }

        if c.webp_method > EncoderTuning::MAX_WEBP_METHOD {
            return Err(ConvertError::config(format!(
                "WebP method must be between 0-{}, got {}",
                EncoderTuning::MAX_WEBP_METHOD,
                c.webp_method
            )));
        }

        if c.avif_speed > EncoderTuning::MAX_AVIF_SPEED {
            return Err(ConvertError::config(format!(
                "AVIF speed must be between 0-{}, got {}",
                EncoderTuning::MAX_AVIF_SPEED,
                c.avif_speed
            )));
        }

        if self.processing.threads == Some(0) {
            return Err(ConvertError::config("Thread count must be greater than 0"));
        }

        Ok(())
    }
}

#[derive(Default)]
struct FieldReader {
    issues: Vec<SettingsIssue>,
}

impl FieldReader {
    fn section<'a>(
        &mut self,
        root: Option<&'a Map<String, Value>>,
        name: &str,
    ) -> Option<&'a Map<String, Value>> {
        let value = root?.get(name)?;
        if value.is_object() {
            value.as_object()
        } else {
            self.issues.push(SettingsIssue {
                field: name.to_string(),
                reason: "expected a table".to_string(),
            });
            None
        }
    }

    fn field<T, F>(&mut self, section: Option<&Map<String, Value>>, name: &str, default: T, accept: F) -> T
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let key = name.rsplit('.').next().unwrap_or(name);
        let Some(raw) = section.and_then(|s| s.get(key)) else {
            return default;
        };

        match T::deserialize(raw) {
            Ok(value) if accept(&value) => value,
            Ok(_) => {
                self.issues.push(SettingsIssue {
                    field: name.to_string(),
                    reason: format!("value {raw} is out of range"),
                });
                default
            }
            Err(e) => {
                self.issues.push(SettingsIssue {
                    field: name.to_string(),
                    reason: e.to_string(),
                });
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.conversion.format, TargetFormat::Avif);
        assert_eq!(settings.conversion.max_height, 768);
        assert!(settings.conversion.enforce_height);
        assert!(!settings.conversion.enforce_width);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_file_io() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.conversion.format = TargetFormat::WebP;
        settings.conversion.quality = Some(75);
        settings.processing.threads = Some(3);

        let toml_path = dir.path().join("fastconvert.toml");
        settings.save(&toml_path).unwrap();
        let (loaded, issues) = Settings::load_with_report(&toml_path).unwrap();
        assert!(issues.is_empty());
        assert_eq!(loaded, settings);

        let yaml_path = dir.path().join("nested/fastconvert.yaml");
        settings.save(&yaml_path).unwrap();
        assert_eq!(Settings::load(&yaml_path), (settings, Vec::new()));
    }

    #[test]
    fn test_malformed_fields_fall_back_individually() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
[conversion]
format = "webp"
quality = "high"
max_height = 0
sharpness = 1.5
webp_method = 9

[processing]
threads = 4
"#,
        )
        .unwrap();

        let (settings, issues) = Settings::load_with_report(&path).unwrap();
        assert_eq!(settings.conversion.format, TargetFormat::WebP);
        assert_eq!(settings.conversion.quality, None);
        assert_eq!(settings.conversion.max_height, 768);
        assert_eq!(settings.conversion.sharpness, 1.5);
        assert_eq!(settings.conversion.webp_method, 6);
        assert_eq!(settings.processing.threads, Some(4));

        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            ["conversion.quality", "conversion.max_height", "conversion.webp_method"]
        );
    }

    #[test]
    fn test_unparsable_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "conversion: [unclosed").unwrap();

        assert!(Settings::load_with_report(&path).is_err());
        let (settings, warnings) = Settings::load(&path);
        assert_eq!(settings, Settings::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Ignoring settings file"));

        let (settings, warnings) = Settings::load(dir.path().join("missing.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_section_of_wrong_type_is_reported() {
        let value = serde_json::json!({ "conversion": 5, "logging": { "level": "debug" } });
        let (settings, issues) = Settings::from_value(&value);
        assert_eq!(settings.conversion, ConversionSettings::default());
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "conversion");
    }

    #[test]
    fn test_target_format_properties() {
        assert_eq!(TargetFormat::Jpeg.extension(), "jpg");
        assert_eq!(TargetFormat::Avif.mime_type(), "image/avif");
        assert!(!TargetFormat::Jpeg.supports_alpha());
        assert!(TargetFormat::Png.supports_alpha());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let mut settings = Settings::default();
        settings.processing.threads = Some(0);
        assert!(settings.validate().is_err());
        assert_eq!(settings.processing.worker_count(), 1);
    }
}
