//! Supported formats and per-format encoder parameters

use std::path::Path;

use crate::config::{ConversionOptions, TargetFormat};

/// Extensions accepted on input; `.avif` only when this build can decode it
pub fn supported_input_formats() -> &'static [&'static str] {
    if cfg!(feature = "avif-decode") {
        &["png", "jpg", "jpeg", "webp", "avif"]
    } else {
        &["png", "jpg", "jpeg", "webp"]
    }
}

/// Check if a file extension is supported for input
pub fn is_supported_input_format(extension: &str) -> bool {
    supported_input_formats()
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}

/// Check a path's extension against the supported input set
pub fn has_supported_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(is_supported_input_format)
}

pub const MAX_PNG_LEVEL: u8 = 9;
pub const MAX_AVIF_QUALITY: u8 = 63;

/// Format-specific encoder parameters derived from the unified quality control
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodeParams {
    Jpeg { quality: u8 },
    Png { level: u8 },
    WebP { quality: u8, method: u8 },
    Avif { quality: u8, speed: u8 },
}

impl EncodeParams {
    /// Clamp the unified quality into the target format's range
    pub fn from_options(options: &ConversionOptions) -> Self {
        let quality = options.effective_quality();
        let tuning = options.encoder_tuning;

        match options.target_format {
            TargetFormat::Jpeg => Self::Jpeg {
                quality: quality.clamp(1, 100),
            },
            TargetFormat::Png => Self::Png {
                level: quality.min(MAX_PNG_LEVEL),
            },
            TargetFormat::WebP => Self::WebP {
                quality: quality.clamp(1, 100),
                method: tuning.webp_method.min(6),
            },
            TargetFormat::Avif => Self::Avif {
                quality: quality.clamp(1, MAX_AVIF_QUALITY),
                speed: tuning.avif_speed.min(10),
            },
        }
    }
}

/// Best-effort content sniffing, used to explain decode failures
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}
