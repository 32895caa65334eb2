// Differential-drive inverse kinematics for the two-wheel UGV
// Converts (linear, angular) body velocities into two wheel set-point bytes.

use serde::{Deserialize, Serialize};

/// Wheel configuration of the UGV base
pub const WHEEL_RADIUS: f64 = 0.065; // meters
pub const WHEELBASE: f64 = 0.150; // meters (distance between driving wheels)

/// Linear speed band accepted from commands (m/s)
pub const INPUT_MIN: f64 = -0.3;
pub const INPUT_MAX: f64 = 0.3;

/// Usable actuation band on the board. Kept inside 0..=255 so the
/// controller's deadband and overdrive regions are never hit.
pub const OUTPUT_MIN: u8 = 89;
pub const OUTPUT_MAX: u8 = 165;

/// Errors raised while building a transform from configuration
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("wheel radius must be positive and finite, got {0}")]
    WheelRadius(f64),

    #[error("wheelbase must be positive and finite, got {0}")]
    Wheelbase(f64),

    #[error("input range is empty or not finite: [{min}, {max}]")]
    InputRange { min: f64, max: f64 },

    #[error("output range is empty: [{min}, {max}]")]
    OutputRange { min: u8, max: u8 },

    #[error("failed to read drive config: {0}")]
    Load(String),
}

/// Physical dimensions of the base
///
/// A larger `wheel_radius` makes wheel speed less sensitive to both linear
/// and rotational input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleGeometry {
    pub wheel_radius: f64,
    pub wheelbase: f64,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            wheelbase: WHEELBASE,
        }
    }
}

/// Bounds of the clip-and-rescale step
///
/// `input_*` are linear speeds in m/s, `output_*` are the set-point bytes
/// that full reverse and full forward map onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingRange {
    pub input_min: f64,
    pub input_max: f64,
    pub output_min: u8,
    pub output_max: u8,
}

impl Default for ScalingRange {
    fn default() -> Self {
        Self {
            input_min: INPUT_MIN,
            input_max: INPUT_MAX,
            output_min: OUTPUT_MIN,
            output_max: OUTPUT_MAX,
        }
    }
}

/// Set-points for both wheels. 127 is roughly stopped, 0 full reverse,
/// 255 full forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelCommandPair {
    pub right: u8,
    pub left: u8,
}

impl WheelCommandPair {
    pub fn new(right: u8, left: u8) -> Self {
        Self { right, left }
    }

    /// Returns set-points in wire order [right, left]
    pub fn as_array(&self) -> [u8; 2] {
        [self.right, self.left]
    }
}

/// Validated differential-drive transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDrive {
    geometry: VehicleGeometry,
    scaling: ScalingRange,
    min_angular: f64,
    max_angular: f64,
}

impl DifferentialDrive {
    /// Build a transform, rejecting geometry or bounds that would divide by
    /// zero or produce an empty range
    pub fn new(geometry: VehicleGeometry, scaling: ScalingRange) -> Result<Self, ConfigurationError> {
        if !(geometry.wheel_radius.is_finite() && geometry.wheel_radius > 0.0) {
            return Err(ConfigurationError::WheelRadius(geometry.wheel_radius));
        }
        if !(geometry.wheelbase.is_finite() && geometry.wheelbase > 0.0) {
            return Err(ConfigurationError::Wheelbase(geometry.wheelbase));
        }
        if !(scaling.input_min.is_finite()
            && scaling.input_max.is_finite()
            && scaling.input_min < scaling.input_max)
        {
            return Err(ConfigurationError::InputRange {
                min: scaling.input_min,
                max: scaling.input_max,
            });
        }
        if scaling.output_min >= scaling.output_max {
            return Err(ConfigurationError::OutputRange {
                min: scaling.output_min,
                max: scaling.output_max,
            });
        }

        // A tiny radius can push the angular band (or its scaled span) to infinity
        let drive = Self::from_parts(geometry, scaling);
        let span = (drive.max_angular - drive.min_angular)
            * f64::from(scaling.output_max - scaling.output_min);
        if !(drive.min_angular.is_finite()
            && drive.max_angular.is_finite()
            && drive.min_angular < drive.max_angular
            && span.is_finite())
        {
            return Err(ConfigurationError::InputRange {
                min: scaling.input_min,
                max: scaling.input_max,
            });
        }

        Ok(drive)
    }

    fn from_parts(geometry: VehicleGeometry, scaling: ScalingRange) -> Self {
        // Linear speed band expressed as wheel angular speed
        let max_angular = scaling.input_max / geometry.wheel_radius;
        let min_angular = scaling.input_min / geometry.wheel_radius;

        Self {
            geometry,
            scaling,
            min_angular,
            max_angular,
        }
    }

    /// Convert body velocities to wheel set-points
    ///
    /// # Arguments
    /// * `linear` - Forward velocity in m/s (positive = forward)
    /// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
    ///
    /// Speeds outside the input band saturate at the output bounds.
    pub fn wheel_commands(&self, linear: f64, angular: f64) -> WheelCommandPair {
        let term1 = linear / self.geometry.wheel_radius;
        let term2 = (2.0 * self.geometry.wheel_radius * angular) / self.geometry.wheelbase;

        WheelCommandPair {
            right: self.scale(term1 + term2),
            left: self.scale(term1 - term2),
        }
    }

    /// Set-point pair for a zero velocity command
    pub fn neutral(&self) -> WheelCommandPair {
        self.wheel_commands(0.0, 0.0)
    }

    /// Clip a raw wheel angular speed and map it onto the output band.
    /// Floor on the quotient, then truncation to the byte.
    fn scale(&self, raw: f64) -> u8 {
        let clipped = raw.clamp(self.min_angular, self.max_angular);
        let out_span = f64::from(self.scaling.output_max - self.scaling.output_min);
        let num = (clipped - self.min_angular) * out_span;
        let den = self.max_angular - self.min_angular;
        let scaled = f64::from(self.scaling.output_min) + (num / den).floor();

        scaled.trunc() as u8
    }
}

impl Default for DifferentialDrive {
    fn default() -> Self {
        Self::from_parts(VehicleGeometry::default(), ScalingRange::default())
    }
}
