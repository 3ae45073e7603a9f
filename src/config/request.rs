//! Per-batch conversion options and per-file requests

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ConversionSettings, TargetFormat};
use crate::error::{ConvertError, Result};

/// Resize bounds. A bound only takes part in scaling when enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub max_height: u32,
    pub max_width: u32,
    pub enforce_height: bool,
    pub enforce_width: bool,
}

impl ResizeSpec {
    /// Bound only the height
    pub fn height(max_height: u32) -> Self {
        Self {
            max_height,
            max_width: 0,
            enforce_height: true,
            enforce_width: false,
        }
    }

    /// Bound only the width
    pub fn width(max_width: u32) -> Self {
        Self {
            max_height: 0,
            max_width,
            enforce_height: false,
            enforce_width: true,
        }
    }

    /// Bound both dimensions
    pub fn both(max_width: u32, max_height: u32) -> Self {
        Self {
            max_height,
            max_width,
            enforce_height: true,
            enforce_width: true,
        }
    }

    /// True when at least one bound is enforced
    pub fn is_active(&self) -> bool {
        self.enforce_height || self.enforce_width
    }

    pub fn validate(&self) -> Result<()> {
        if self.enforce_height && self.max_height == 0 {
            return Err(ConvertError::invalid_parameters("Height bound must be greater than 0"));
        }
        if self.enforce_width && self.max_width == 0 {
            return Err(ConvertError::invalid_parameters("Width bound must be greater than 0"));
        }
        Ok(())
    }
}

/// Encoder speed/effort knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderTuning {
    /// WebP method, 0 = fastest, 6 = slowest/best
    pub webp_method: u8,
    /// AVIF speed, 0 = slowest/best, 10 = fastest
    pub avif_speed: u8,
}

impl EncoderTuning {
    pub const DEFAULT_WEBP_METHOD: u8 = 6;
    pub const DEFAULT_AVIF_SPEED: u8 = 4;
    pub const MAX_WEBP_METHOD: u8 = 6;
    pub const MAX_AVIF_SPEED: u8 = 10;
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            webp_method: Self::DEFAULT_WEBP_METHOD,
            avif_speed: Self::DEFAULT_AVIF_SPEED,
        }
    }
}

/// Everything a batch applies to each of its files.
///
/// Built once per batch and shared by every [`ConversionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub target_format: TargetFormat,
    /// Unified quality; None picks the format default
    pub quality: Option<u8>,
    pub output_dir: Option<PathBuf>,
    pub resize: Option<ResizeSpec>,
    pub sharpness_factor: f32,
    pub preserve_timestamps: bool,
    pub delete_source: bool,
    pub encoder_tuning: EncoderTuning,
}

impl ConversionOptions {
    /// Options with defaults for the given format
    pub fn new(target_format: TargetFormat) -> Self {
        Self {
            target_format,
            quality: None,
            output_dir: None,
            resize: None,
            sharpness_factor: 1.0,
            preserve_timestamps: false,
            delete_source: false,
            encoder_tuning: EncoderTuning::default(),
        }
    }

    /// Options from persisted settings
    pub fn from_settings(settings: &ConversionSettings) -> Self {
        let resize = ResizeSpec {
            max_height: settings.max_height,
            max_width: settings.max_width,
            enforce_height: settings.enforce_height,
            enforce_width: settings.enforce_width,
        };

        Self {
            target_format: settings.format,
            quality: settings.quality,
            output_dir: settings.output_dir.clone(),
            resize: resize.is_active().then_some(resize),
            sharpness_factor: settings.sharpness,
            preserve_timestamps: settings.keep_timestamps,
            delete_source: settings.delete_source,
            encoder_tuning: EncoderTuning {
                webp_method: settings.webp_method,
                avif_speed: settings.avif_speed,
            },
        }
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn resize(mut self, spec: ResizeSpec) -> Self {
        self.resize = Some(spec);
        self
    }

    pub fn sharpness(mut self, factor: f32) -> Self {
        self.sharpness_factor = factor;
        self
    }

    pub fn preserve_timestamps(mut self, enabled: bool) -> Self {
        self.preserve_timestamps = enabled;
        self
    }

    pub fn delete_source(mut self, enabled: bool) -> Self {
        self.delete_source = enabled;
        self
    }

    pub fn encoder_tuning(mut self, tuning: EncoderTuning) -> Self {
        self.encoder_tuning = tuning;
        self
    }

    /// Quality after applying the format default
    pub fn effective_quality(&self) -> u8 {
        self.quality
            .unwrap_or_else(|| self.target_format.default_quality())
    }

    /// Whether the sharpness step runs at all
    #[allow(clippy::float_cmp)]
    pub fn needs_sharpening(&self) -> bool {
        self.sharpness_factor != 1.0
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if let Some(quality) = self.quality {
            if !(1..=100).contains(&quality) {
                return Err(ConvertError::invalid_parameters(format!(
                    "Quality must be between 1-100, got {quality}"
                )));
            }
        }

        if let Some(resize) = &self.resize {
            resize.validate()?;
        }

        if !self.sharpness_factor.is_finite() || self.sharpness_factor < 0.0 {
            return Err(ConvertError::invalid_parameters(format!(
                "Sharpness must be a non-negative number, got {}",
                self.sharpness_factor
            )));
        }

        if self.encoder_tuning.webp_method > EncoderTuning::MAX_WEBP_METHOD {
            return Err(ConvertError::invalid_parameters(format!(
                "WebP method must be between 0-{}, got {}",
                EncoderTuning::MAX_WEBP_METHOD,
                self.encoder_tuning.webp_method
            )));
        }

        if self.encoder_tuning.avif_speed > EncoderTuning::MAX_AVIF_SPEED {
            return Err(ConvertError::invalid_parameters(format!(
                "AVIF speed must be between 0-{}, got {}",
                EncoderTuning::MAX_AVIF_SPEED,
                self.encoder_tuning.avif_speed
            )));
        }

        Ok(())
    }
}

/// One file's conversion: a source path plus the batch options
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source_path: PathBuf,
    pub options: Arc<ConversionOptions>,
}

impl ConversionRequest {
    pub fn new<P: Into<PathBuf>>(source_path: P, options: Arc<ConversionOptions>) -> Self {
        Self {
            source_path: source_path.into(),
            options,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_defaults() {
        let options = ConversionOptions::new(TargetFormat::WebP)
            .resize(ResizeSpec::height(768))
            .sharpness(1.2)
            .delete_source(true);

        assert_eq!(options.effective_quality(), 80);
        assert!(options.needs_sharpening());
        assert!(options.delete_source);
        assert!(options.validate().is_ok());

        let options = options.quality(55).sharpness(1.0);
        assert_eq!(options.effective_quality(), 55);
        assert!(!options.needs_sharpening());
    }

    #[test]
    fn test_invalid_options() {
        assert!(ConversionOptions::new(TargetFormat::Jpeg).quality(0).validate().is_err());
        assert!(ConversionOptions::new(TargetFormat::Jpeg).quality(101).validate().is_err());
        assert!(ConversionOptions::new(TargetFormat::Png).sharpness(f32::NAN).validate().is_err());
        assert!(ConversionOptions::new(TargetFormat::Png)
            .resize(ResizeSpec::width(0))
            .validate()
            .is_err());

        let tuning = EncoderTuning {
            webp_method: 7,
            ..EncoderTuning::default()
        };
        assert!(ConversionOptions::new(TargetFormat::WebP)
            .encoder_tuning(tuning)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_settings() {
        let mut settings = ConversionSettings::default();
        let options = ConversionOptions::from_settings(&settings);
        assert_eq!(options.target_format, TargetFormat::Avif);
        assert_eq!(options.effective_quality(), 63);
        let resize = options.resize.unwrap();
        assert!(resize.enforce_height && !resize.enforce_width);
        assert_eq!(resize.max_height, 768);

        settings.enforce_height = false;
        let options = ConversionOptions::from_settings(&settings);
        assert!(options.resize.is_none());
    }

    #[test]
    fn test_requests_share_options() {
        let options = Arc::new(ConversionOptions::new(TargetFormat::Png));
        let a = ConversionRequest::new("a.jpg", Arc::clone(&options));
        let b = ConversionRequest::new("b.jpg", Arc::clone(&options));
        assert!(Arc::ptr_eq(&a.options, &b.options));
        assert_eq!(a.source_path(), Path::new("a.jpg"));
    }
}
