//! Finished recording artifact

use crate::capture::VideoFrame;
use chrono::{DateTime, Utc};

/// MIME type of assembled recordings
pub const RECORDING_MIME_TYPE: &str = "video/webm";

/// Filename offered for a recording finished at `at`:
/// `screen-recording-YYYY-MM-DDThh-mm-ss.webm`
pub fn suggested_filename(at: DateTime<Utc>) -> String {
    format!("screen-recording-{}.webm", at.format("%Y-%m-%dT%H-%M-%S"))
}

/// Encoded output of one session
#[derive(Debug, Clone)]
pub struct Recording {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub suggested_filename: String,
    /// Recorded time, pauses excluded
    pub duration_ms: u64,
    pub fragment_count: usize,
    pub created_at: DateTime<Utc>,
    /// Last composited frame, for previews
    pub poster: Option<VideoFrame>,
}

impl Recording {
    /// Concatenate encoded fragments into one artifact
    pub fn assemble(fragments: &[Vec<u8>], duration_ms: u64, created_at: DateTime<Utc>) -> Self {
        let bytes = fragments.concat();
        Self {
            bytes,
            mime_type: RECORDING_MIME_TYPE.to_string(),
            suggested_filename: suggested_filename(created_at),
            duration_ms,
            fragment_count: fragments.len(),
            created_at,
            poster: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_suggested_filename_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 42).unwrap();
        assert_eq!(suggested_filename(at), "screen-recording-2024-03-09T07-05-42.webm");
    }

    #[test]
    fn test_assemble_preserves_order() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let recording = Recording::assemble(&[vec![1, 2], vec![3], vec![4, 5, 6]], 3000, at);
        assert_eq!(recording.bytes, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(recording.fragment_count, 3);
        assert_eq!(recording.mime_type, "video/webm");
        assert_eq!(recording.duration_ms, 3000);
    }
}
