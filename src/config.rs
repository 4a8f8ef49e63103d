//! Run configuration.
//!
//! Every option has a default matching the production clay cell, so a config
//! file only needs the values that differ:
//!
//! ```json
//! {
//!     "dry_run": true,
//!     "start_index": 449,
//!     "signals": { "extrude_forward": "DO_9" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::element::{JointConfiguration, AXIS_COUNT};
use crate::error::{FabError, FabResult};
use crate::safety::{JointRange, JointSafetyMonitor, DEFAULT_JOINT_RANGES};

/// Fixed retraction dwell after each deposit.
pub const RETRACT_DWELL_SECONDS: f64 = 0.5;

pub const HOME_POS: JointConfiguration = JointConfiguration::new([0.0, 0.0, 0.0, 0.0, 0.0, 180.0]);
pub const RESET_POS: JointConfiguration =
    JointConfiguration::new([0.0, 0.0, 10.0, 0.0, 20.0, 180.0]);

/// Digital output identifiers of the extruder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalMap {
    pub extrude_forward: String,
    pub extrude_backward: String,
    pub pressure: String,
}

impl Default for SignalMap {
    fn default() -> Self {
        Self {
            extrude_forward: "DO_9".to_string(),
            extrude_backward: "DO_10".to_string(),
            pressure: "DO_1".to_string(),
        }
    }
}

/// Controller-level settings sent once before the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSetup {
    pub tool: String,
    pub work_object: String,
    /// Percent.
    pub acceleration: f64,
    /// Percent.
    pub ramp: f64,
    /// Percent.
    pub speed_override: f64,
    /// mm/s.
    pub max_tcp_speed: f64,
}

impl Default for RobotSetup {
    fn default() -> Self {
        Self {
            tool: "t_3dp_clay".to_string(),
            work_object: "w_3dp_clay".to_string(),
            acceleration: 100.0,
            ramp: 100.0,
            speed_override: 100.0,
            max_tcp_speed: 250.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// mm/s for entry, exit, transit, home and reset moves.
    pub travel_speed: f64,
    /// mm/s for the linear approach to the deposition pose.
    pub print_speed: f64,
    /// Clearance above the tallest deposit during transit, mm.
    pub hop_height: f64,
    /// mm of filament pushed per deposit.
    pub extrusion_length: f64,
    /// mm/s.
    pub extrusion_speed: f64,
    /// Suppress actuator signals, keep motion.
    pub dry_run: bool,
    /// First element to fabricate.
    pub start_index: usize,
    /// Running-max seed when resuming.
    pub highest_placed_z: Option<f64>,
    pub home_joints: JointConfiguration,
    pub reset_joints: JointConfiguration,
    pub joint_ranges: [JointRange; AXIS_COUNT],
    pub signals: SignalMap,
    pub setup: RobotSetup,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            travel_speed: 250.0,
            print_speed: 250.0,
            hop_height: 30.0,
            extrusion_length: 28.0,
            extrusion_speed: 10.6,
            dry_run: false,
            start_index: 0,
            highest_placed_z: None,
            home_joints: HOME_POS,
            reset_joints: RESET_POS,
            joint_ranges: DEFAULT_JOINT_RANGES,
            signals: SignalMap::default(),
            setup: RobotSetup::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> FabResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Extrusion dwell per deposit, seconds.
    pub fn dwell_seconds(&self) -> f64 {
        self.extrusion_length / self.extrusion_speed
    }

    pub fn safety_monitor(&self) -> FabResult<JointSafetyMonitor> {
        JointSafetyMonitor::new(self.joint_ranges)
    }

    pub fn validate(&self) -> FabResult<()> {
        let positive = [
            ("travel_speed", self.travel_speed),
            ("print_speed", self.print_speed),
            ("extrusion_speed", self.extrusion_speed),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(FabError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.hop_height >= 0.0) {
            return Err(FabError::InvalidConfig(format!(
                "hop_height must not be negative, got {}",
                self.hop_height
            )));
        }
        if !(self.extrusion_length >= 0.0) {
            return Err(FabError::InvalidConfig(format!(
                "extrusion_length must not be negative, got {}",
                self.extrusion_length
            )));
        }
        self.safety_monitor()?;
        Ok(())
    }
}
