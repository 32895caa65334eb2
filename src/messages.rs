// Message types carried on the bus

use serde::{Deserialize, Serialize};

// Command from teleop/planners -> messenger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VelocityCommand {
    pub linear: f64,  // m/s, positive = forward
    pub angular: f64, // rad/s, positive = counter-clockwise
}

impl VelocityCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// NaN or infinite components cannot be clipped meaningfully
    pub fn is_valid(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}
