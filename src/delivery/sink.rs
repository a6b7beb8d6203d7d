//! Recording sinks

use super::recording::Recording;
use crate::capture::VideoFrame;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// How long [`ChannelSink`] keeps its copy of the last recording
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

/// Numbered variants tried before giving up on a taken file name
const MAX_NAME_SUFFIX: u32 = 999;

/// Delivery errors
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("Recording consumer is gone")]
    Closed,
}

/// Where a delivered recording ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveredRecording {
    File {
        path: PathBuf,
        poster: Option<PathBuf>,
    },
    Handed {
        filename: String,
    },
}

/// Receives finished recordings
pub trait OutputSink: Send + Sync {
    fn deliver(&self, recording: Recording) -> Result<DeliveredRecording, DeliveryError>;
}

/// Writes recordings (and a PNG poster frame) into a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for DirectorySink {
    fn deliver(&self, recording: Recording) -> Result<DeliveredRecording, DeliveryError> {
        fs::create_dir_all(&self.dir)?;

        let (path, file) = create_unique(&self.dir, &recording.suggested_filename)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&recording.bytes)?;
        writer.flush()?;

        let poster = match &recording.poster {
            Some(frame) => {
                let poster_path = path.with_extension("png");
                write_png(&poster_path, frame)?;
                Some(poster_path)
            }
            None => None,
        };

        tracing::info!(
            "Saved recording to {:?} ({} bytes, {}ms)",
            path,
            recording.len(),
            recording.duration_ms
        );
        Ok(DeliveredRecording::File { path, poster })
    }
}

/// Create `filename` in `dir` without replacing an existing file; a taken
/// name gets a `-1`, `-2`, ... suffix on its stem.
fn create_unique(dir: &Path, filename: &str) -> io::Result<(PathBuf, File)> {
    let name = Path::new(filename);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    let extension = name.extension().and_then(|e| e.to_str());

    for suffix in 0..=MAX_NAME_SUFFIX {
        let candidate = match (suffix, extension) {
            (0, _) => filename.to_string(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {} in {:?}", filename, dir),
    ))
}

/// Encode an RGBA frame as PNG
pub fn write_png(path: &Path, frame: &VideoFrame) -> Result<(), DeliveryError> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width(), frame.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(frame.data())?;
    writer.finish()?;
    Ok(())
}

/// Hands recordings to an in-process consumer.
///
/// The sink keeps the last recording so late readers can fetch it, and
/// drops it once the retention window has passed.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Recording>,
    retained: Arc<Mutex<Option<Recording>>>,
    retention: Duration,
}

impl ChannelSink {
    pub fn new(retention: Duration) -> (Self, mpsc::UnboundedReceiver<Recording>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            retained: Arc::new(Mutex::new(None)),
            retention,
        };
        (sink, rx)
    }

    /// The last delivered recording, until its retention window expires
    pub fn last(&self) -> Option<Recording> {
        self.retained.lock().clone()
    }
}

impl OutputSink for ChannelSink {
    fn deliver(&self, recording: Recording) -> Result<DeliveredRecording, DeliveryError> {
        let filename = recording.suggested_filename.clone();
        let created_at = recording.created_at;
        *self.retained.lock() = Some(recording.clone());

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let retained = self.retained.clone();
            let retention = self.retention;
            handle.spawn(async move {
                tokio::time::sleep(retention).await;
                let mut slot = retained.lock();
                if slot.as_ref().map(|r| r.created_at) == Some(created_at) {
                    slot.take();
                    tracing::debug!("Released retained recording");
                }
            });
        }

        self.tx.send(recording).map_err(|_| DeliveryError::Closed)?;
        Ok(DeliveredRecording::Handed { filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn recording() -> Recording {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        Recording::assemble(&[vec![0x1a, 0x45, 0xdf, 0xa3], vec![1, 2, 3]], 1500, at)
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));

        let delivered = sink.deliver(recording()).unwrap();
        let DeliveredRecording::File { path, poster } = delivered else {
            panic!("expected a file");
        };
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "screen-recording-2024-05-01T12-30-00.webm"
        );
        assert_eq!(fs::read(&path).unwrap(), vec![0x1a, 0x45, 0xdf, 0xa3, 1, 2, 3]);
        assert!(poster.is_none());
    }

    #[test]
    fn test_directory_sink_keeps_earlier_recording() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let mut first = recording();
        first.poster = Some(VideoFrame::solid(4, 3, [9, 9, 9, 255]));
        let mut second = Recording::assemble(&[vec![7, 7]], 500, first.created_at);
        second.poster = Some(VideoFrame::solid(4, 3, [1, 1, 1, 255]));
        assert_eq!(first.suggested_filename, second.suggested_filename);

        let DeliveredRecording::File { path: first_path, poster: first_poster } =
            sink.deliver(first).unwrap()
        else {
            panic!("expected a file");
        };
        let DeliveredRecording::File { path: second_path, poster: second_poster } =
            sink.deliver(second).unwrap()
        else {
            panic!("expected a file");
        };

        assert_eq!(
            second_path.file_name().unwrap().to_str().unwrap(),
            "screen-recording-2024-05-01T12-30-00-1.webm"
        );
        assert_eq!(fs::read(&first_path).unwrap(), vec![0x1a, 0x45, 0xdf, 0xa3, 1, 2, 3]);
        assert_eq!(fs::read(&second_path).unwrap(), vec![7, 7]);
        assert_ne!(first_poster.unwrap(), second_poster.unwrap());
    }

    #[test]
    fn test_create_unique_numbers_taken_names() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("clip.webm"), b"a").unwrap();
        fs::write(dir.path().join("clip-1.webm"), b"b").unwrap();

        let (path, _) = create_unique(dir.path(), "clip.webm").unwrap();
        assert_eq!(path, dir.path().join("clip-2.webm"));

        let (path, _) = create_unique(dir.path(), "noext").unwrap();
        assert_eq!(path, dir.path().join("noext"));
        let (path, _) = create_unique(dir.path(), "noext").unwrap();
        assert_eq!(path, dir.path().join("noext-1"));
    }

    #[test]
    fn test_directory_sink_writes_poster() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let mut rec = recording();
        rec.poster = Some(VideoFrame::solid(4, 3, [9, 9, 9, 255]));
        let DeliveredRecording::File { poster, .. } = sink.deliver(rec).unwrap() else {
            panic!("expected a file");
        };

        let poster = poster.unwrap();
        let bytes = fs::read(&poster).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_sink_releases_after_retention() {
        let (sink, mut rx) = ChannelSink::new(Duration::from_secs(60));
        let delivered = sink.deliver(recording()).unwrap();
        assert_eq!(
            delivered,
            DeliveredRecording::Handed {
                filename: "screen-recording-2024-05-01T12-30-00.webm".to_string()
            }
        );

        assert_eq!(rx.recv().await.unwrap().len(), 7);
        assert!(sink.last().is_some());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(sink.last().is_none());
    }

    #[test]
    fn test_channel_sink_closed() {
        let (sink, rx) = ChannelSink::new(DEFAULT_RETENTION);
        drop(rx);
        assert!(matches!(sink.deliver(recording()), Err(DeliveryError::Closed)));
    }
}
