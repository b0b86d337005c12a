//! Angle units: degrees in memory, 1/256-circle bytes on the wire.

use serde::{Deserialize, Serialize};

const DEGREES_TO_BYTES: f32 = 256.0 / 360.0;

/// An angle where a full circle is 256 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AngleBytes(pub u8);

/// An angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AngleDegrees(pub f32);

impl AngleDegrees {
    /// Normalize into [0, 360) and quantize to the byte representation.
    pub fn to_angle_bytes(self) -> AngleBytes {
        let mut norm = self.0 % 360.0;
        if norm < 0.0 {
            norm += 360.0;
        }
        AngleBytes((norm * DEGREES_TO_BYTES) as u8)
    }
}

/// A look direction in degrees. Pitch is negative when looking above the
/// horizontal, positive below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LookDegrees {
    pub yaw: AngleDegrees,
    pub pitch: AngleDegrees,
}

impl LookDegrees {
    /// Build from raw degree values.
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self {
            yaw: AngleDegrees(yaw),
            pitch: AngleDegrees(pitch),
        }
    }

    /// Quantize to the wire representation.
    pub fn to_look_bytes(&self) -> LookBytes {
        LookBytes {
            yaw: self.yaw.to_angle_bytes(),
            pitch: self.pitch.to_angle_bytes(),
        }
    }
}

/// A look direction quantized for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LookBytes {
    pub yaw: AngleBytes,
    pub pitch: AngleBytes,
}

/// A full orientation (item spawns carry a roll as well).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrientationBytes {
    pub yaw: AngleBytes,
    pub pitch: AngleBytes,
    pub roll: AngleBytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_quantize() {
        assert_eq!(AngleDegrees(0.0).to_angle_bytes(), AngleBytes(0));
        assert_eq!(AngleDegrees(90.0).to_angle_bytes(), AngleBytes(64));
        assert_eq!(AngleDegrees(360.0).to_angle_bytes(), AngleBytes(0));
        assert_eq!(AngleDegrees(-90.0).to_angle_bytes(), AngleBytes(192));
        assert_eq!(AngleDegrees(720.0 + 45.0).to_angle_bytes(), AngleBytes(32));
    }
}
