//! Server-authoritative rover settings.
//!
//! The robot owns the ground truth; the operator console holds a *perceived*
//! copy that is only ever updated from a received [`SettingsUpdate`] message.
//! An operator edit mutates the perceived copy and sends the full updated copy
//! to the robot - it is never applied optimistically. The robot applies every
//! received copy to its [`SharedSettings`] before anything else sees it, then
//! broadcasts the new ground truth back.
//!
//! [`SettingsUpdate`]: crate::protocol::messages::SettingsUpdate

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Plain copy of the three settings fields.
///
/// Used as the wire body of a settings message and as the initial
/// configuration value loaded from TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Headlight on/off
    pub headlight_on: bool,
    /// Camera servo rotation amount
    pub servo_rotation: i32,
    /// JPEG compression quality for outgoing video frames (0-100)
    pub jpeg_quality: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            headlight_on: false,
            servo_rotation: 0,
            jpeg_quality: 30,
        }
    }
}

/// Settings shared between the network dispatch thread and local readers.
///
/// Each field is individually atomic, so a reader can never observe a torn
/// value; `snapshot`/`apply` move whole copies in and out for the wire.
#[derive(Debug)]
pub struct SharedSettings {
    headlight_on: AtomicBool,
    servo_rotation: AtomicI32,
    jpeg_quality: AtomicI32,
}

impl SharedSettings {
    /// Create shared settings seeded from an initial copy
    pub fn new(initial: Settings) -> Self {
        Self {
            headlight_on: AtomicBool::new(initial.headlight_on),
            servo_rotation: AtomicI32::new(initial.servo_rotation),
            jpeg_quality: AtomicI32::new(initial.jpeg_quality),
        }
    }

    /// Copy out the current values
    pub fn snapshot(&self) -> Settings {
        Settings {
            headlight_on: self.headlight_on.load(Ordering::Relaxed),
            servo_rotation: self.servo_rotation.load(Ordering::Relaxed),
            jpeg_quality: self.jpeg_quality.load(Ordering::Relaxed),
        }
    }

    /// Overwrite all fields from a received copy
    pub fn apply(&self, settings: &Settings) {
        self.headlight_on.store(settings.headlight_on, Ordering::Relaxed);
        self.servo_rotation
            .store(settings.servo_rotation, Ordering::Relaxed);
        self.jpeg_quality
            .store(settings.jpeg_quality, Ordering::Relaxed);
    }

    pub fn headlight_on(&self) -> bool {
        self.headlight_on.load(Ordering::Relaxed)
    }

    pub fn set_headlight_on(&self, on: bool) {
        self.headlight_on.store(on, Ordering::Relaxed);
    }

    pub fn servo_rotation(&self) -> i32 {
        self.servo_rotation.load(Ordering::Relaxed)
    }

    pub fn set_servo_rotation(&self, amount: i32) {
        self.servo_rotation.store(amount, Ordering::Relaxed);
    }

    pub fn jpeg_quality(&self) -> i32 {
        self.jpeg_quality.load(Ordering::Relaxed)
    }

    pub fn set_jpeg_quality(&self, quality: i32) {
        self.jpeg_quality.store(quality, Ordering::Relaxed);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.headlight_on);
        assert_eq!(settings.servo_rotation, 0);
        assert_eq!(settings.jpeg_quality, 30);
    }

    #[test]
    fn test_apply_then_snapshot() {
        let shared = SharedSettings::default();
        let edited = Settings {
            headlight_on: true,
            servo_rotation: 45,
            jpeg_quality: 70,
        };
        shared.apply(&edited);
        assert_eq!(shared.snapshot(), edited);
        assert!(shared.headlight_on());
        assert_eq!(shared.servo_rotation(), 45);
        assert_eq!(shared.jpeg_quality(), 70);
    }
}
