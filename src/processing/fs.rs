//! Filesystem capability used by the conversion engine

use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::debug;

/// File operations the conversion engine performs
pub trait Filesystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// `mkdir -p`
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy access and modification times from `from` onto `to`
    fn copy_timestamps(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Move a file to the platform's recoverable trash
    fn move_to_trash(&self, path: &Path) -> io::Result<()>;

    /// Absolute form of `path` without touching the filesystem
    fn absolute(&self, path: &Path) -> io::Result<PathBuf>;
}

/// The real local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn copy_timestamps(&self, from: &Path, to: &Path) -> io::Result<()> {
        let metadata = std::fs::metadata(from)?;
        let atime = FileTime::from_last_access_time(&metadata);
        let mtime = FileTime::from_last_modification_time(&metadata);
        debug!("Copying timestamps {:?} -> {:?}", from, to);
        filetime::set_file_times(to, atime, mtime)
    }

    fn move_to_trash(&self, path: &Path) -> io::Result<()> {
        trash::delete(path).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        std::path::absolute(path)
    }
}
