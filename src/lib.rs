//! FastConvert - Batch Image Format Converter
//!
//! Converts batches of images to JPEG, PNG, WebP or AVIF with optional
//! bounded resizing, sharpening, timestamp preservation and moving of the
//! originals to the trash. Files run on a bounded worker pool, each with a
//! few retries, and outcomes are reported in input order.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fastconvert::{
//!     BatchScheduler, ConversionEngine, ConversionOptions, PathExpander, ResizeSpec,
//!     TargetFormat,
//! };
//!
//! # fn main() -> fastconvert::Result<()> {
//! let files = PathExpander::new().expand(["photos/", "@more.txt"])?;
//! let options = ConversionOptions::new(TargetFormat::WebP)
//!     .quality(80)
//!     .resize(ResizeSpec::height(768))
//!     .output_dir("converted");
//!
//! let handle = BatchScheduler::new(ConversionEngine::new())
//!     .workers(4)
//!     .start(files, options)?;
//! let report = handle.wait()?;
//!
//! println!("{}", report.summary.summary_line());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod input;
pub mod parallel;
pub mod processing;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConversionOptions, ConversionRequest, ResizeSpec, Settings, TargetFormat};
pub use error::{ConvertError, Result};
pub use input::PathExpander;
pub use parallel::{BatchControl, BatchHandle, BatchReport, BatchScheduler, RetryPolicy, RunState};
pub use processing::ConversionEngine;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize FastConvert with default settings
///
/// Sets up logging from `RUST_LOG` and checks the host. Calling it again is
/// harmless.
pub fn init() -> Result<()> {
    init_with_config(&Settings::default())
}

/// Initialize with custom settings
///
/// `RUST_LOG` wins over `logging.level` when set. Logs go to stderr so that
/// stdout stays free for per-file lines and JSON output.
pub fn init_with_config(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if settings.logging.json_format {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    };

    if installed {
        info!("FastConvert v{} initialized", VERSION);
    }

    validate_system_requirements()?;

    Ok(())
}

fn validate_system_requirements() -> Result<()> {
    use sysinfo::{System, SystemExt};

    let mut system = System::new();
    system.refresh_memory();

    // Available memory
    let available_memory = system.available_memory();
    const MIN_MEMORY_MB: u64 = 256;

    if available_memory < MIN_MEMORY_MB * 1024 * 1024 {
        warn!(
            "Low available memory: {}MB (recommended: >{}MB)",
            available_memory / (1024 * 1024),
            MIN_MEMORY_MB
        );
    }

    info!("Detected {} logical CPUs", num_cpus::get());

    for format in TargetFormat::ALL {
        info!("  {}: decode {}", format, can_decode(format));
    }

    Ok(())
}

/// Whether this build can read `format` as an input.
///
/// `image` reports AVIF as readable with only its encoder compiled in, so
/// AVIF is keyed on the dav1d-backed `avif-decode` feature instead.
pub fn can_decode(format: TargetFormat) -> bool {
    match format {
        TargetFormat::Avif => cfg!(feature = "avif-decode"),
        other => image::ImageFormat::from_extension(other.extension())
            .is_some_and(|f| f.reading_enabled()),
    }
}
