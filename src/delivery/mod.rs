//! Output delivery
//!
//! Hands a finished recording to whatever saves it: a directory on disk or
//! an in-process consumer.

pub mod recording;
pub mod sink;

pub use recording::{suggested_filename, Recording, RECORDING_MIME_TYPE};
pub use sink::{write_png, ChannelSink, DeliveredRecording, DeliveryError, DirectorySink, OutputSink, DEFAULT_RETENTION};
