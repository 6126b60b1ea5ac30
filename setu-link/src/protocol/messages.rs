//! Message types and their binary payload layout.
//!
//! Every message payload is an 8-byte big-endian `i64` send timestamp followed
//! by a type-specific body, also big-endian. Fixed-width bodies decode strictly
//! (trailing bytes are rejected); the two frame types ([`VideoFrame`],
//! [`AudioFrame`]) carry no inner length field - their size is implied by the
//! frame length, so the decoder takes whatever remains after the timestamp.
//!
//! Tags are one byte, unique across the protocol, and are the dispatch key on
//! the receiving side.

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Tag for [`VideoFrame`]
pub const TAG_VIDEO_FRAME: u8 = 5;
/// Tag for [`MotorState`]
pub const TAG_MOTOR_STATE: u8 = 10;
/// Tag for [`AudioFrame`]
pub const TAG_AUDIO_FRAME: u8 = 44;
/// Tag for [`ArmPosition`]
pub const TAG_ARM_POSITION: u8 = 49;
/// Tag for [`RobotStatus`]
pub const TAG_ROBOT_STATUS: u8 = 87;
/// Tag for [`SettingsUpdate`]
pub const TAG_SETTINGS: u8 = 112;

/// Drive motor duty values from the operator console.
///
/// Each field is 0-255 in practice (duty cycle per motor direction); the wire
/// type stays `i32` to match the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorState {
    pub timestamp_ms: i64,
    pub left_forward: i32,
    pub left_backward: i32,
    pub right_forward: i32,
    pub right_backward: i32,
}

/// Cartesian target for the arm end effector, in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmPosition {
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Full copy of the server-authoritative settings.
///
/// Sent by the robot on connect and on change; sent by the operator to request
/// a change (always the complete edited copy, never a delta).
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsUpdate {
    pub timestamp_ms: i64,
    pub settings: Settings,
}

/// Robot-side telemetry: battery percentages for the companion device mounted
/// on the rover and the rover's primary pack.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotStatus {
    pub timestamp_ms: i64,
    pub companion_battery: i32,
    pub primary_battery: i32,
}

/// One compressed camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub timestamp_ms: i64,
    pub jpeg: Vec<u8>,
}

/// One frame of 16-bit signed PCM audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub timestamp_ms: i64,
    pub samples: Vec<i16>,
}

/// Any message that can travel over the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Motor(MotorState),
    Arm(ArmPosition),
    Settings(SettingsUpdate),
    Status(RobotStatus),
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl Message {
    /// Wire tag for this message type
    pub fn tag(&self) -> u8 {
        match self {
            Message::Motor(_) => TAG_MOTOR_STATE,
            Message::Arm(_) => TAG_ARM_POSITION,
            Message::Settings(_) => TAG_SETTINGS,
            Message::Status(_) => TAG_ROBOT_STATUS,
            Message::Video(_) => TAG_VIDEO_FRAME,
            Message::Audio(_) => TAG_AUDIO_FRAME,
        }
    }

    /// Producer send timestamp (informational only)
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Message::Motor(m) => m.timestamp_ms,
            Message::Arm(m) => m.timestamp_ms,
            Message::Settings(m) => m.timestamp_ms,
            Message::Status(m) => m.timestamp_ms,
            Message::Video(m) => m.timestamp_ms,
            Message::Audio(m) => m.timestamp_ms,
        }
    }

    /// Serialize the frame payload: 8-byte timestamp followed by the body.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.body_len());
        buf.extend_from_slice(&self.timestamp_ms().to_be_bytes());
        match self {
            Message::Motor(m) => {
                buf.extend_from_slice(&m.left_forward.to_be_bytes());
                buf.extend_from_slice(&m.left_backward.to_be_bytes());
                buf.extend_from_slice(&m.right_forward.to_be_bytes());
                buf.extend_from_slice(&m.right_backward.to_be_bytes());
            }
            Message::Arm(m) => {
                buf.extend_from_slice(&m.x.to_be_bytes());
                buf.extend_from_slice(&m.y.to_be_bytes());
                buf.extend_from_slice(&m.z.to_be_bytes());
            }
            Message::Settings(m) => {
                buf.push(u8::from(m.settings.headlight_on));
                buf.extend_from_slice(&m.settings.servo_rotation.to_be_bytes());
                buf.extend_from_slice(&m.settings.jpeg_quality.to_be_bytes());
            }
            Message::Status(m) => {
                buf.extend_from_slice(&m.companion_battery.to_be_bytes());
                buf.extend_from_slice(&m.primary_battery.to_be_bytes());
            }
            Message::Video(m) => buf.extend_from_slice(&m.jpeg),
            Message::Audio(m) => {
                for sample in &m.samples {
                    buf.extend_from_slice(&sample.to_be_bytes());
                }
            }
        }
        buf
    }

    /// Deserialize a frame payload received under `tag`.
    ///
    /// Reads only the bytes of `payload`; a payload that is too short (or, for
    /// fixed-width types, too long) fails with [`Error::MalformedPayload`].
    pub fn decode_payload(tag: u8, payload: &[u8]) -> Result<Message> {
        let mut body = BodyReader::new(payload);
        let timestamp_ms = body
            .read_i64()
            .ok_or_else(|| malformed(tag, "payload shorter than timestamp"))?;

        let message = match tag {
            TAG_MOTOR_STATE => Message::Motor(MotorState {
                timestamp_ms,
                left_forward: body.read_i32().ok_or_else(|| malformed(tag, "truncated body"))?,
                left_backward: body.read_i32().ok_or_else(|| malformed(tag, "truncated body"))?,
                right_forward: body.read_i32().ok_or_else(|| malformed(tag, "truncated body"))?,
                right_backward: body.read_i32().ok_or_else(|| malformed(tag, "truncated body"))?,
            }),
            TAG_ARM_POSITION => Message::Arm(ArmPosition {
                timestamp_ms,
                x: body.read_f64().ok_or_else(|| malformed(tag, "truncated body"))?,
                y: body.read_f64().ok_or_else(|| malformed(tag, "truncated body"))?,
                z: body.read_f64().ok_or_else(|| malformed(tag, "truncated body"))?,
            }),
            TAG_SETTINGS => Message::Settings(SettingsUpdate {
                timestamp_ms,
                settings: Settings {
                    headlight_on: body.read_u8().ok_or_else(|| malformed(tag, "truncated body"))?
                        == 1,
                    servo_rotation: body
                        .read_i32()
                        .ok_or_else(|| malformed(tag, "truncated body"))?,
                    jpeg_quality: body
                        .read_i32()
                        .ok_or_else(|| malformed(tag, "truncated body"))?,
                },
            }),
            TAG_ROBOT_STATUS => Message::Status(RobotStatus {
                timestamp_ms,
                companion_battery: body
                    .read_i32()
                    .ok_or_else(|| malformed(tag, "truncated body"))?,
                primary_battery: body
                    .read_i32()
                    .ok_or_else(|| malformed(tag, "truncated body"))?,
            }),
            TAG_VIDEO_FRAME => Message::Video(VideoFrame {
                timestamp_ms,
                jpeg: body.take_rest().to_vec(),
            }),
            TAG_AUDIO_FRAME => {
                let rest = body.take_rest();
                if rest.len() % 2 != 0 {
                    return Err(malformed(tag, "odd sample byte count"));
                }
                Message::Audio(AudioFrame {
                    timestamp_ms,
                    samples: rest
                        .chunks_exact(2)
                        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                })
            }
            other => return Err(Error::UnknownTag(other)),
        };

        if !body.is_empty() {
            return Err(malformed(tag, "trailing bytes after body"));
        }
        Ok(message)
    }

    /// Body size in bytes, excluding the timestamp (used for pre-allocation)
    fn body_len(&self) -> usize {
        match self {
            Message::Motor(_) => 16,
            Message::Arm(_) => 24,
            Message::Settings(_) => 9,
            Message::Status(_) => 8,
            Message::Video(m) => m.jpeg.len(),
            Message::Audio(m) => m.samples.len() * 2,
        }
    }
}

fn malformed(tag: u8, detail: &str) -> Error {
    Error::MalformedPayload {
        tag,
        detail: detail.to_string(),
    }
}

/// Bounds-checked big-endian reader over a payload slice.
///
/// Every read is checked against the remaining slice, so decoding can never
/// consult bytes beyond what the frame length declared.
struct BodyReader<'a> {
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.buf.len() < N {
            return None;
        }
        let (head, rest) = self.buf.split_at(N);
        self.buf = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Some(out)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.take::<8>().map(i64::from_be_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    fn take_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
