// Topics, serial defaults, CLI and drive tuning
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::motor::kinematics::{
    ConfigurationError, DifferentialDrive, ScalingRange, VehicleGeometry,
};
use crate::motor::protocol::DEFAULT_BAUDRATE;

// Serial devices searched when no port is given
pub const DEFAULT_PORT_PREFIX: &str = "/dev/ttyUSB";

/// Zenoh key for inbound velocity commands of one robot
pub fn cmd_topic(robot_id: u8) -> String {
    format!("robot_{}/cmd_vel", robot_id)
}

/// Zenoh key where dispatched wheel set-points are echoed
pub fn wheels_topic(robot_id: u8) -> String {
    format!("robot_{}/wheels", robot_id)
}

/// Forward velocity commands of one robot to its motor controller board
#[derive(Debug, Parser)]
#[command(name = "ugv-messenger", version)]
pub struct Cli {
    /// Robot identifier, also the address byte of its controller board
    #[arg(short = 'r', long = "robot-id")]
    pub robot_id: u8,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE)]
    pub baud: u32,

    /// Serial device; discovered from --port-prefix when omitted
    #[arg(short, long)]
    pub port: Option<String>,

    /// Path prefix used for device discovery
    #[arg(long, default_value = DEFAULT_PORT_PREFIX)]
    pub port_prefix: String,

    /// JSON file with geometry and scaling overrides
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Drive tuning: any field left out keeps its default
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DriveConfig {
    pub geometry: VehicleGeometry,
    pub scaling: ScalingRange,
}

impl DriveConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(text).map_err(|e| ConfigurationError::Load(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Validate into a transform
    pub fn build(&self) -> Result<DifferentialDrive, ConfigurationError> {
        DifferentialDrive::new(self.geometry, self.scaling)
    }
}
