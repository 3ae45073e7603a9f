//! Per-file conversion: decode, normalize, resize, sharpen, encode, finish

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, warn};

use crate::config::{ConversionRequest, TargetFormat};
use crate::error::{ConvertError, Result};

pub mod codec;
pub mod formats;
pub mod fs;
pub mod output;
pub mod resize;

pub use codec::{CodecError, ImageCodec, ImageRsCodec};
pub use formats::{EncodeParams, is_supported_input_format, supported_input_formats};
pub use fs::{Filesystem, LocalFs};
pub use output::OutputResolver;
pub use resize::compute_target_dimensions;

/// Runs the conversion sequence for one file against pluggable codec and
/// filesystem capabilities. Holds no per-file state, so one engine serves a
/// whole worker pool.
#[derive(Clone)]
pub struct ConversionEngine {
    codec: Arc<dyn ImageCodec>,
    fs: Arc<dyn Filesystem>,
}

impl ConversionEngine {
    /// Engine backed by the `image` crate and the local filesystem
    pub fn new() -> Self {
        Self::with_capabilities(Arc::new(ImageRsCodec::new()), Arc::new(LocalFs))
    }

    pub fn with_capabilities(codec: Arc<dyn ImageCodec>, fs: Arc<dyn Filesystem>) -> Self {
        Self { codec, fs }
    }

    /// Where `request` will be written, without creating anything
    pub fn destination(&self, request: &ConversionRequest) -> PathBuf {
        resolver_for(request).destination(&request.source_path)
    }

    /// Convert one file.
    ///
    /// Each call runs the whole sequence from the start; nothing is kept
    /// from a previous failed call.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConvertedFile> {
        let start_time = Instant::now();
        let options = &request.options;
        let source = request.source_path.as_path();

        let output_path = resolver_for(request).resolve(self.fs.as_ref(), source)?;

        let image = self.load(source)?;
        let original_size = (image.width(), image.height());
        debug!("Decoded {:?}: {}x{} {:?}", source, original_size.0, original_size.1, image.color());

        let image = normalize_color(image, options.target_format);

        let image = match options
            .resize
            .as_ref()
            .and_then(|spec| compute_target_dimensions(image.width(), image.height(), spec))
        {
            Some((width, height)) => {
                debug!("Resizing {}x{} -> {}x{}", image.width(), image.height(), width, height);
                self.codec.resize(image, width, height)
            }
            None => image,
        };

        let image = if options.needs_sharpening() {
            debug!("Applying sharpness {}", options.sharpness_factor);
            self.codec.enhance_sharpness(image, options.sharpness_factor)
        } else {
            image
        };

        let params = EncodeParams::from_options(options);
        let encoded = self
            .codec
            .encode(&image, &params)
            .map_err(|e| ConvertError::encode(&output_path, e))?;
        self.fs
            .write(&output_path, &encoded)
            .map_err(|e| ConvertError::encode(&output_path, e))?;
        debug!("Wrote {} bytes to {:?} with {:?}", encoded.len(), output_path, params);

        if options.preserve_timestamps {
            self.fs
                .copy_timestamps(source, &output_path)
                .map_err(|source| ConvertError::Timestamps {
                    path: output_path.clone(),
                    source,
                })?;
        }

        let mut source_trashed = false;
        if options.delete_source {
            source_trashed = self.trash_source(source, &output_path)?;
        }

        Ok(ConvertedFile {
            output_path,
            original_size,
            output_size: (image.width(), image.height()),
            bytes_written: encoded.len() as u64,
            source_trashed,
            processing_time: start_time.elapsed(),
        })
    }

    fn load(&self, source: &Path) -> Result<DynamicImage> {
        let data = self
            .fs
            .read(source)
            .map_err(|e| ConvertError::decode(source, e))?;

        self.codec.decode(&data).map_err(|e| match formats::sniff_mime(&data) {
            Some(mime) => ConvertError::decode(source, format!("{e} (content looks like {mime})")),
            None => ConvertError::decode(source, e),
        })
    }

    /// Trash the source by absolute path. Returns false when the output
    /// replaced the source in place, since trashing would remove the result.
    fn trash_source(&self, source: &Path, output_path: &Path) -> Result<bool> {
        let removal_error = |e: std::io::Error| ConvertError::SourceRemoval {
            path: source.to_path_buf(),
            message: e.to_string(),
        };

        let absolute_source = self.fs.absolute(source).map_err(removal_error)?;
        let absolute_output = self.fs.absolute(output_path).map_err(removal_error)?;
        if absolute_source == absolute_output {
            warn!("Not trashing {:?}: it was overwritten by its own conversion", source);
            return Ok(false);
        }

        self.fs.move_to_trash(&absolute_source).map_err(removal_error)?;
        debug!("Moved {:?} to trash", absolute_source);
        Ok(true)
    }
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn resolver_for(request: &ConversionRequest) -> OutputResolver {
    OutputResolver::new(request.options.output_dir.clone(), request.options.target_format)
}

/// JPEG has no alpha and only 8-bit samples: drop alpha (no compositing)
/// and narrow everything else to 8-bit RGB.
fn normalize_color(image: DynamicImage, format: TargetFormat) -> DynamicImage {
    if format.supports_alpha() {
        return image;
    }
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// What a successful conversion produced
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub output_path: PathBuf,
    pub original_size: (u32, u32),
    pub output_size: (u32, u32),
    pub bytes_written: u64,
    pub source_trashed: bool,
    pub processing_time: Duration,
}
