//! Wire protocol for the operator/rover link
//!
//! Two layers, mirroring the two halves of a frame:
//! - [`messages`]: per-type binary payload layout ((de)serialization)
//! - [`framing`]: marker + tag + length wrapping and stream resynchronization

pub mod framing;
pub mod messages;

pub use framing::{FrameReader, write_frame, FRAME_MARKER, MAX_PAYLOAD_LEN};
pub use messages::Message;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Message timestamps are informational (they are never used for ordering or
/// deduplication), so a clock readout failure degrades to 0 rather than an error.
pub fn timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
