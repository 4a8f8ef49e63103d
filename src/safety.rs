//! Joint safety monitor.
//!
//! A reading is safe when every axis lies strictly inside its allowed range.
//! Axes are checked in order and only the first violation is reported.

use serde::{Deserialize, Serialize};

use crate::element::{JointConfiguration, AXIS_COUNT};
use crate::error::{FabError, FabResult};

/// Open interval of allowed angles (degrees) for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
}

impl JointRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `min < angle < max`; a reading on either bound is outside the range.
    pub fn contains(&self, angle: f64) -> bool {
        self.min < angle && angle < self.max
    }
}

/// Default per-axis ranges, axis 1 first.
pub const DEFAULT_JOINT_RANGES: [JointRange; AXIS_COUNT] = [
    JointRange::new(-90.0, 90.0),
    JointRange::new(-360.0, 360.0),
    JointRange::new(-180.0, 180.0),
    JointRange::new(-100.0, 100.0),
    JointRange::new(-360.0, 360.0),
    JointRange::new(0.0, 360.0),
];

/// First axis found outside its range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointViolation {
    /// Zero-based axis index.
    pub axis_index: usize,
    pub min: f64,
    pub max: f64,
    pub actual: f64,
}

impl JointViolation {
    /// One-based axis number as printed on the robot.
    pub fn axis_number(&self) -> usize {
        self.axis_index + 1
    }
}

impl std::fmt::Display for JointViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Joint number {} out of bounds. Min: {}, max: {}, actual: {}",
            self.axis_number(),
            self.min,
            self.max,
            self.actual
        )
    }
}

/// Per-axis joint range check run after every element's exit move.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSafetyMonitor {
    ranges: [JointRange; AXIS_COUNT],
}

impl Default for JointSafetyMonitor {
    fn default() -> Self {
        Self {
            ranges: DEFAULT_JOINT_RANGES,
        }
    }
}

impl JointSafetyMonitor {
    /// Fails if any range is empty or inverted.
    pub fn new(ranges: [JointRange; AXIS_COUNT]) -> FabResult<Self> {
        if let Some((i, range)) = ranges.iter().enumerate().find(|(_, r)| !(r.min < r.max)) {
            return Err(FabError::InvalidConfig(format!(
                "joint range for axis {} is empty: ({}, {})",
                i + 1,
                range.min,
                range.max
            )));
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[JointRange; AXIS_COUNT] {
        &self.ranges
    }

    /// Checks a reading. Pure; reports only the lowest-indexed violating axis.
    pub fn check(&self, joints: &JointConfiguration) -> Result<(), JointViolation> {
        joints
            .angles()
            .iter()
            .zip(self.ranges.iter())
            .enumerate()
            .find(|(_, (angle, range))| !range.contains(**angle))
            .map_or(Ok(()), |(axis_index, (actual, range))| {
                Err(JointViolation {
                    axis_index,
                    min: range.min,
                    max: range.max,
                    actual: *actual,
                })
            })
    }
}

/// Outcome of the post-exit joint check.
///
/// `Recovering` lasts for exactly one reset maneuver; [`RecoveryState::resolve`]
/// always returns to `Nominal`, so recovery never loops.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RecoveryState {
    #[default]
    Nominal,
    Recovering(JointViolation),
}

impl RecoveryState {
    pub fn from_check(check: Result<(), JointViolation>) -> Self {
        match check {
            Ok(()) => Self::Nominal,
            Err(violation) => Self::Recovering(violation),
        }
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self, Self::Recovering(_))
    }

    /// Called once the reset move has been issued.
    pub fn resolve(self) -> Self {
        Self::Nominal
    }
}
