//! Destination path resolution

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::TargetFormat;
use crate::error::{ConvertError, Result};
use crate::processing::fs::Filesystem;

/// Maps a source path to its output path for one batch
#[derive(Debug, Clone)]
pub struct OutputResolver {
    output_dir: Option<PathBuf>,
    format: TargetFormat,
}

impl OutputResolver {
    pub fn new(output_dir: Option<PathBuf>, format: TargetFormat) -> Self {
        Self { output_dir, format }
    }

    /// Destination path, without touching the filesystem.
    ///
    /// With an output directory: `output_dir/<stem>.<ext>`. Without one the
    /// output sits next to the source, which overwrites it when the source
    /// already has the target extension.
    pub fn destination(&self, source: &Path) -> PathBuf {
        let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
        let mut destination = match &self.output_dir {
            Some(dir) => dir.join(file_name),
            None => source.to_path_buf(),
        };
        destination.set_extension(self.format.extension());
        destination
    }

    /// Destination path whose parent directory exists
    pub fn resolve(&self, fs: &dyn Filesystem, source: &Path) -> Result<PathBuf> {
        let destination = self.destination(source);

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_dir_all(parent)
                .map_err(|e| ConvertError::output_path(&destination, e))?;
        }

        debug!("Output for {:?}: {:?}", source, destination);
        Ok(destination)
    }
}
