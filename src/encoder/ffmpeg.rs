//! FFmpeg-backed stream encoder
//!
//! Raw RGBA composite frames go to an `ffmpeg` subprocess on stdin; the
//! WebM it writes to stdout is sliced into fragments and delivered as
//! encoder events.

use super::options::EncoderOptions;
use super::traits::{
    EncoderError, EncoderEvents, EncoderFactory, EncoderState, OutputStream, StreamEncoder,
};
use crate::capture::VideoFrame;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Frames buffered between the compositor and the writer thread
const FRAME_QUEUE_DEPTH: usize = 2;

/// Read size for encoded output
const READ_CHUNK: usize = 64 * 1024;

/// Lines of stderr kept in a failure message
const STDERR_TAIL_LINES: usize = 4;

/// Map a codec token from a MIME type to the FFmpeg encoder that provides it
fn ffmpeg_codec(token: &str) -> Option<&'static str> {
    match token.trim() {
        "vp9" => Some("libvpx-vp9"),
        "vp8" => Some("libvpx"),
        "opus" => Some("libopus"),
        _ => None,
    }
}

/// Parse `video/webm; codecs=vp9,opus` into its container and codec tokens
fn parse_mime(mime_type: &str) -> (String, Vec<String>) {
    let mut parts = mime_type.split(';');
    let container = parts.next().unwrap_or_default().trim().to_lowercase();
    let codecs = parts
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(|codec| codec.trim().to_lowercase())
        .filter(|codec| !codec.is_empty())
        .collect();
    (container, codecs)
}

/// Build the FFmpeg argument list for one encoding session
pub fn build_args(stream: &OutputStream, options: &EncoderOptions) -> Vec<String> {
    let video = stream.video;
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgba",
        "-video_size",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", video.width, video.height));
    args.push("-framerate".to_string());
    args.push(video.frame_rate.to_string());
    args.push("-i".to_string());
    args.push("-".to_string());

    let codecs = options
        .mime_type
        .as_deref()
        .map(|mime| parse_mime(mime).1)
        .unwrap_or_default();

    let video_codec = codecs
        .iter()
        .filter_map(|codec| ffmpeg_codec(codec))
        .find(|codec| codec.starts_with("libvpx"));

    if let Some(codec) = video_codec {
        args.extend(["-c:v".to_string(), codec.to_string()]);
        // Realtime settings keep libvpx ahead of the capture rate
        args.extend(
            ["-deadline", "realtime", "-cpu-used", "8"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        options.video_bits_per_second.to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "webm".to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

/// Creates [`FfmpegEncoder`]s using an `ffmpeg` binary
pub struct FfmpegEncoderFactory {
    binary: PathBuf,
    encoders: OnceLock<String>,
}

impl FfmpegEncoderFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    /// Output of `ffmpeg -encoders`, probed once
    fn encoder_list(&self) -> &str {
        self.encoders.get_or_init(|| {
            match Command::new(&self.binary)
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .output()
            {
                Ok(output) if output.status.success() => {
                    String::from_utf8_lossy(&output.stdout).to_string()
                }
                Ok(output) => {
                    tracing::warn!(
                        "ffmpeg -encoders failed: {}",
                        String::from_utf8_lossy(&output.stderr)
                    );
                    String::new()
                }
                Err(e) => {
                    tracing::warn!("Failed to run {:?}: {}", self.binary, e);
                    String::new()
                }
            }
        })
    }

    fn has_encoder(&self, name: &str) -> bool {
        self.encoder_list()
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(name))
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        let (container, codecs) = parse_mime(mime_type);
        if container != "video/webm" || self.encoder_list().is_empty() {
            return false;
        }
        codecs.iter().all(|codec| {
            ffmpeg_codec(codec)
                .map(|name| self.has_encoder(name))
                .unwrap_or(false)
        })
    }

    fn create(
        &self,
        stream: OutputStream,
        options: EncoderOptions,
        events: EncoderEvents,
    ) -> Result<Box<dyn StreamEncoder>, EncoderError> {
        if stream.video.width == 0 || stream.video.height == 0 {
            return Err(EncoderError::Unsupported(format!(
                "empty video track {}x{}",
                stream.video.width, stream.video.height
            )));
        }
        if !stream.audio.is_empty() {
            tracing::warn!(
                "FFmpeg encoder does not mux live audio, ignoring {} track(s)",
                stream.audio.len()
            );
        }

        Ok(Box::new(FfmpegEncoder {
            binary: self.binary.clone(),
            stream,
            options,
            events,
            state: EncoderState::Inactive,
            queue: None,
            started: false,
        }))
    }
}

/// One FFmpeg encoding session
pub struct FfmpegEncoder {
    binary: PathBuf,
    stream: OutputStream,
    options: EncoderOptions,
    events: EncoderEvents,
    state: EncoderState,
    queue: Option<FrameQueue>,
    started: bool,
}

/// Frames waiting for the writer thread, each standing for a number of
/// frame periods.
type QueuedFrame = (VideoFrame, u32);

/// Non-blocking hand-off to the writer thread.
///
/// Periods that find the queue full are owed to the next frame that fits,
/// so the constant-rate input keeps its length when frames are dropped.
struct FrameQueue {
    tx: SyncSender<QueuedFrame>,
    owed: u32,
}

impl FrameQueue {
    fn new(tx: SyncSender<QueuedFrame>) -> Self {
        Self { tx, owed: 0 }
    }

    /// Queue `frame` for `periods` frame periods plus any owed ones.
    /// Returns false once the writer has gone.
    fn push(&mut self, frame: &VideoFrame, periods: u32) -> bool {
        let periods = self.owed.saturating_add(periods);
        match self.tx.try_send((frame.clone(), periods)) {
            Ok(()) => {
                self.owed = 0;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Encoder busy, {} frame periods owed", periods);
                self.owed = periods;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl StreamEncoder for FfmpegEncoder {
    fn start(&mut self, timeslice: Duration) -> Result<(), EncoderError> {
        if self.started {
            return Err(EncoderError::Runtime("encoder already started".to_string()));
        }

        let args = build_args(&self.stream, &self.options);
        tracing::debug!("Spawning {:?} {}", self.binary, args.join(" "));

        let mut process = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Runtime(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Runtime("Failed to capture FFmpeg stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EncoderError::Runtime("Failed to capture FFmpeg stdout".to_string()))?;
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| EncoderError::Runtime("Failed to capture FFmpeg stderr".to_string()))?;

        let errors = thread::Builder::new()
            .name("ffmpeg-stderr".to_string())
            .spawn(move || drain_stderr(stderr))?;

        let (tx, rx) = mpsc::sync_channel::<QueuedFrame>(FRAME_QUEUE_DEPTH);
        thread::Builder::new()
            .name("ffmpeg-writer".to_string())
            .spawn(move || write_frames(stdin, rx))?;

        let events = self.events.clone();
        thread::Builder::new()
            .name("ffmpeg-reader".to_string())
            .spawn(move || read_output(process, stdout, errors, timeslice, events))?;

        self.queue = Some(FrameQueue::new(tx));
        self.started = true;
        self.state = EncoderState::Recording;
        tracing::info!(
            "FFmpeg encoder started ({}x{} @ {}fps, {} bps)",
            self.stream.video.width,
            self.stream.video.height,
            self.stream.video.frame_rate,
            self.options.video_bits_per_second
        );
        Ok(())
    }

    fn write_frame(&mut self, frame: &VideoFrame) {
        self.write_repeated(frame, 1);
    }

    fn write_repeated(&mut self, frame: &VideoFrame, periods: u32) {
        if self.state != EncoderState::Recording || periods == 0 {
            return;
        }
        if frame.width() != self.stream.video.width || frame.height() != self.stream.video.height {
            tracing::warn!(
                "Dropping {}x{} frame, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.stream.video.width,
                self.stream.video.height
            );
            return;
        }

        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        if !queue.push(frame, periods) {
            tracing::warn!("FFmpeg writer has exited, dropping frames");
            self.queue = None;
        }
    }

    fn pause(&mut self) {
        if self.state == EncoderState::Recording {
            self.state = EncoderState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == EncoderState::Paused {
            self.state = EncoderState::Recording;
        }
    }

    fn stop(&mut self) {
        if self.state == EncoderState::Inactive {
            tracing::warn!("stop() on inactive FFmpeg encoder");
            return;
        }
        self.state = EncoderState::Inactive;
        // Closing the queue closes stdin; FFmpeg then finalizes the container
        self.queue = None;
    }

    fn state(&self) -> EncoderState {
        self.state
    }

    fn mime_type(&self) -> Option<String> {
        self.options.mime_type.clone()
    }
}

fn write_frames(mut stdin: ChildStdin, frames: mpsc::Receiver<QueuedFrame>) {
    let mut written: u64 = 0;
    for (frame, periods) in frames {
        for _ in 0..periods {
            if let Err(e) = stdin.write_all(frame.data()) {
                tracing::warn!("FFmpeg stdin closed after {} frames: {}", written, e);
                return;
            }
            written += 1;
        }
    }
    tracing::debug!("FFmpeg writer finished after {} frames", written);
}

/// Read stderr to the end so FFmpeg never blocks on a full pipe
fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut text = String::new();
    if let Err(e) = stderr.read_to_string(&mut text) {
        tracing::debug!("FFmpeg stderr unreadable: {}", e);
    }
    text
}

/// Last few non-empty lines of `text`
fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

fn read_output(
    mut process: Child,
    mut stdout: ChildStdout,
    errors: JoinHandle<String>,
    timeslice: Duration,
    events: EncoderEvents,
) {
    let mut pending = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut last_flush = Instant::now();

    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                if last_flush.elapsed() >= timeslice {
                    events.fragment(std::mem::take(&mut pending));
                    last_flush = Instant::now();
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                events.failed(format!("Failed to read FFmpeg output: {}", e));
                let _ = process.kill();
                return;
            }
        }
    }

    if !pending.is_empty() {
        events.fragment(pending);
    }

    let status = process.wait();
    let stderr_text = errors.join().unwrap_or_default();

    match status {
        Ok(status) if status.success() => events.stopped(),
        Ok(status) => events.failed(format!(
            "FFmpeg exited with {}: {}",
            status,
            tail_lines(&stderr_text, STDERR_TAIL_LINES)
        )),
        Err(e) => events.failed(format!("Failed to wait for FFmpeg: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::AudioTrack;
    use crate::encoder::traits::VideoTrack;
    use crate::encoder::DEFAULT_VIDEO_BITRATE;

    fn stream() -> OutputStream {
        OutputStream {
            video: VideoTrack {
                width: 1920,
                height: 1080,
                frame_rate: 30,
            },
            audio: Vec::new(),
        }
    }

    fn options(mime: Option<&str>) -> EncoderOptions {
        EncoderOptions {
            mime_type: mime.map(str::to_string),
            video_bits_per_second: DEFAULT_VIDEO_BITRATE,
        }
    }

    #[test]
    fn test_parse_mime() {
        let (container, codecs) = parse_mime("video/webm; codecs=vp9,opus");
        assert_eq!(container, "video/webm");
        assert_eq!(codecs, vec!["vp9", "opus"]);

        let (container, codecs) = parse_mime("video/webm");
        assert_eq!(container, "video/webm");
        assert!(codecs.is_empty());
    }

    #[test]
    fn test_args_for_vp9() {
        let args = build_args(&stream(), &options(Some("video/webm; codecs=vp9,opus")));
        let joined = args.join(" ");
        assert!(joined.contains("-video_size 1920x1080"));
        assert!(joined.contains("-framerate 30"));
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.contains("-b:v 2000000"));
        assert!(joined.ends_with("-f webm pipe:1"));
    }

    #[test]
    fn test_args_for_defaults() {
        let args = build_args(&stream(), &options(None));
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"webm".to_string()));

        let args = build_args(&stream(), &options(Some("video/webm; codecs=vp8,opus")));
        assert!(args.join(" ").contains("-c:v libvpx "));
    }

    #[test]
    fn test_missing_binary_supports_nothing() {
        let factory = FfmpegEncoderFactory::new("/nonexistent/ffmpeg-binary");
        assert!(!factory.is_type_supported("video/webm"));
        assert!(!factory.is_type_supported("video/webm; codecs=vp9,opus"));
    }

    #[test]
    fn test_create_rejects_empty_track() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events = EncoderEvents::new(uuid::Uuid::new_v4(), tx);
        let factory = FfmpegEncoderFactory::new("/nonexistent/ffmpeg-binary");

        let mut empty = stream();
        empty.video.width = 0;
        assert!(factory.create(empty, options(None), events.clone()).is_err());

        let mut with_audio = stream();
        with_audio.audio.push(AudioTrack::new("mic"));
        let encoder = factory.create(with_audio, options(None), events).unwrap();
        assert_eq!(encoder.state(), EncoderState::Inactive);
    }

    #[test]
    fn test_start_fails_without_binary() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events = EncoderEvents::new(uuid::Uuid::new_v4(), tx);
        let factory = FfmpegEncoderFactory::new("/nonexistent/ffmpeg-binary");
        let mut encoder = factory.create(stream(), options(None), events).unwrap();
        assert!(encoder.start(Duration::from_millis(1000)).is_err());
        assert_eq!(encoder.state(), EncoderState::Inactive);
    }

    #[test]
    fn test_full_queue_owes_periods_to_next_frame() {
        let (tx, rx) = mpsc::sync_channel::<QueuedFrame>(1);
        let mut queue = FrameQueue::new(tx);
        let first = VideoFrame::solid(2, 2, [1, 1, 1, 255]);
        let second = VideoFrame::solid(2, 2, [2, 2, 2, 255]);
        let third = VideoFrame::solid(2, 2, [3, 3, 3, 255]);

        assert!(queue.push(&first, 1));
        // Writer still busy with the first frame
        assert!(queue.push(&second, 2));
        assert_eq!(queue.owed, 2);

        let (frame, periods) = rx.recv().unwrap();
        assert_eq!((frame.pixel(0, 0), periods), ([1, 1, 1, 255], 1));

        assert!(queue.push(&third, 1));
        let (frame, periods) = rx.recv().unwrap();
        assert_eq!((frame.pixel(0, 0), periods), ([3, 3, 3, 255], 3));
        assert_eq!(queue.owed, 0);

        drop(rx);
        assert!(!queue.push(&third, 1));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\n\nc\nd\ne\n", 3), "c\nd\ne");
        assert_eq!(tail_lines("only", 4), "only");
        assert_eq!(tail_lines("", 4), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_flood_does_not_stall_encoder() {
        use std::os::unix::fs::PermissionsExt;

        // Writes far more than a pipe buffer to stderr before consuming stdin
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nhead -c 262144 /dev/zero | tr '\\000' 'e' >&2\necho 'Conversion failed!' >&2\ncat > /dev/null\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let events = EncoderEvents::new(uuid::Uuid::new_v4(), tx);
        let factory = FfmpegEncoderFactory::new(&script);
        let mut encoder = factory.create(stream(), options(None), events).unwrap();
        encoder.start(Duration::from_millis(100)).unwrap();
        encoder.stop();

        let message = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await.map(|tagged| tagged.event) {
                    Some(crate::encoder::EncoderEvent::Failed(message)) => return Some(message),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("encoder reported nothing")
        .expect("event channel closed");

        assert!(message.starts_with("FFmpeg exited with"), "{}", message);
        assert!(message.ends_with("Conversion failed!"), "{}", message);
    }
}
