//! Stub collaborators shared by unit tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::parallel::progress::{BatchSummary, FileOutcome, ProgressReporter, ProgressSnapshot};
use crate::processing::codec::{CodecError, ImageCodec};
use crate::processing::formats::EncodeParams;
use crate::processing::fs::{Filesystem, LocalFs};

/// Codec whose "images" are text files like `640x480`, `640x480 alpha` or
/// `640x480 sleep=50`. Nothing is really decoded or encoded.
#[derive(Default)]
pub struct StubCodec {
    sharpen_calls: AtomicUsize,
    decode_calls: AtomicUsize,
    pending_decode_failures: AtomicUsize,
    fail_encodes: AtomicBool,
    encoded: Mutex<Vec<EncodeParams>>,
}

impl StubCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` decodes fail
    pub fn fail_next_decodes(&self, n: usize) {
        self.pending_decode_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_encodes(&self, fail: bool) {
        self.fail_encodes.store(fail, Ordering::SeqCst);
    }

    pub fn sharpen_calls(&self) -> usize {
        self.sharpen_calls.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn encoded_params(&self) -> Vec<EncodeParams> {
        self.encoded.lock().unwrap().clone()
    }
}

fn parse_stub(data: &[u8]) -> Option<(u32, u32, bool, Option<Duration>)> {
    let text = std::str::from_utf8(data).ok()?;
    let mut parts = text.split_whitespace();
    let (w, h) = parts.next()?.split_once('x')?;
    let (width, height) = (w.parse().ok()?, h.parse().ok()?);

    let mut alpha = false;
    let mut sleep = None;
    for part in parts {
        if part == "alpha" {
            alpha = true;
        } else if let Some(ms) = part.strip_prefix("sleep=") {
            sleep = Some(Duration::from_millis(ms.parse().ok()?));
        } else {
            return None;
        }
    }
    Some((width, height, alpha, sleep))
}

impl ImageCodec for StubCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);

        let (width, height, alpha, sleep) =
            parse_stub(data).ok_or_else(|| CodecError::Decode("not a stub image".to_string()))?;
        if let Some(sleep) = sleep {
            std::thread::sleep(sleep);
        }

        if let Ok(failures) = self
            .pending_decode_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            return Err(CodecError::Decode(format!("injected failure ({failures} left)")));
        }

        Ok(if alpha {
            DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        } else {
            DynamicImage::ImageRgb8(RgbImage::new(width, height))
        })
    }

    fn resize(&self, image: DynamicImage, width: u32, height: u32) -> DynamicImage {
        if image.color().has_alpha() {
            DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        } else {
            DynamicImage::ImageRgb8(RgbImage::new(width, height))
        }
    }

    fn enhance_sharpness(&self, image: DynamicImage, _factor: f32) -> DynamicImage {
        self.sharpen_calls.fetch_add(1, Ordering::SeqCst);
        image
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        if self.fail_encodes.load(Ordering::SeqCst) {
            return Err(CodecError::Encode("injected encode failure".to_string()));
        }
        self.encoded.lock().unwrap().push(*params);
        Ok(format!("{}x{}", image.width(), image.height()).into_bytes())
    }
}

/// Local filesystem that records trash requests and deletes instead of trashing
#[derive(Default)]
pub struct RecordingFs {
    trashed: Mutex<Vec<PathBuf>>,
}

impl RecordingFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trashed(&self) -> Vec<PathBuf> {
        self.trashed.lock().unwrap().clone()
    }
}

impl Filesystem for RecordingFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        LocalFs.read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        LocalFs.write(path, data)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFs.create_dir_all(path)
    }

    fn copy_timestamps(&self, from: &Path, to: &Path) -> io::Result<()> {
        LocalFs.copy_timestamps(from, to)
    }

    fn move_to_trash(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)?;
        self.trashed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        LocalFs.absolute(path)
    }
}

/// Reporter that keeps everything it is told
#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
    pub indices: Mutex<Vec<usize>>,
    pub snapshots: Mutex<Vec<ProgressSnapshot>>,
    pub finished: Mutex<Option<BatchSummary>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.indices.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_outcome(&self, index: usize, outcome: &FileOutcome) {
        self.indices.lock().unwrap().push(index);
        for line in &outcome.log_lines {
            self.on_log_line(line);
        }
    }

    fn on_log_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.snapshots.lock().unwrap().push(*snapshot);
    }

    fn on_finished(&self, summary: &BatchSummary) {
        *self.finished.lock().unwrap() = Some(summary.clone());
    }
}
