// Motor control module for the two-wheel UGV base
//
// Provides:
// - Differential-drive kinematics (body velocity -> wheel set-points)
// - Serial message protocol spoken by the controller board
// - Controller session with a readiness gate
// - Serial device discovery

pub mod discovery;
pub mod kinematics;
pub mod protocol;
mod session;

pub use discovery::find_port;
pub use kinematics::{
    ConfigurationError, DifferentialDrive, ScalingRange, VehicleGeometry, WheelCommandPair,
};
pub use protocol::{BoardLink, ProtocolError};
pub use session::{ControllerSession, SessionError, SessionState, WheelSink};
