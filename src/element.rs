//! Discrete fabrication elements.
//!
//! An element is one spherical deposit of clay together with the travel poses
//! that bracket it. Elements are built before the run and only their placement
//! timestamp changes while the run is in progress.

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::pose::Pose;

/// Number of robot axes.
pub const AXIS_COUNT: usize = 6;

/// Six joint angles in degrees, axis 1 first.
///
/// Any values are representable; whether they are safe is decided by
/// [`JointSafetyMonitor`](crate::safety::JointSafetyMonitor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointConfiguration(pub [f64; AXIS_COUNT]);

impl JointConfiguration {
    pub const fn new(angles: [f64; AXIS_COUNT]) -> Self {
        Self(angles)
    }

    pub fn angles(&self) -> &[f64; AXIS_COUNT] {
        &self.0
    }
}

impl From<[f64; AXIS_COUNT]> for JointConfiguration {
    fn from(angles: [f64; AXIS_COUNT]) -> Self {
        Self(angles)
    }
}

/// A single placed unit of material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricationElement {
    /// Where the material is deposited.
    pub location_pose: Pose,
    /// Pose travelled to before placing.
    pub entry_pose: Pose,
    /// Pose travelled to after placing.
    pub exit_pose: Pose,
    /// Recorded joint path to the entry pose.
    #[serde(default)]
    pub entry_trajectory: Option<Vec<JointConfiguration>>,
    /// Recorded joint path away from the exit pose.
    #[serde(default)]
    pub exit_trajectory: Option<Vec<JointConfiguration>>,
    /// ISO-8601 time of confirmed placement.
    #[serde(default)]
    placed_timestamp: Option<String>,
}

impl FabricationElement {
    pub fn new(location_pose: Pose, entry_pose: Pose, exit_pose: Pose) -> Self {
        Self {
            location_pose,
            entry_pose,
            exit_pose,
            entry_trajectory: None,
            exit_trajectory: None,
            placed_timestamp: None,
        }
    }

    /// An element that enters and exits through the same travel pose.
    pub fn with_travel_pose(location_pose: Pose, travel_pose: Pose) -> Self {
        Self::new(location_pose, travel_pose, travel_pose)
    }

    pub fn placed_timestamp(&self) -> Option<&str> {
        self.placed_timestamp.as_deref()
    }

    pub fn is_placed(&self) -> bool {
        self.placed_timestamp.is_some()
    }

    /// Records the placement time. Returns `false` and leaves the element
    /// untouched if it was already placed.
    pub fn mark_placed(&mut self, timestamp: impl Into<String>) -> bool {
        if self.placed_timestamp.is_some() {
            return false;
        }
        self.placed_timestamp = Some(timestamp.into());
        true
    }

    /// Height of the deposit.
    pub fn deposit_z(&self) -> f64 {
        self.location_pose.position().z
    }

    fn map_poses(&mut self, f: impl Fn(&Pose) -> Pose) {
        self.location_pose = f(&self.location_pose);
        self.entry_pose = f(&self.entry_pose);
        self.exit_pose = f(&self.exit_pose);
    }

    /// Applies `xform` to the location, entry and exit poses.
    pub fn transform(&mut self, xform: &Isometry3<f64>) {
        self.map_poses(|pose| pose.transformed(xform));
    }

    pub fn transformed(&self, xform: &Isometry3<f64>) -> Self {
        let mut element = self.clone();
        element.transform(xform);
        element
    }

    /// Rotates each defining pose about its own axes, keeping its position.
    pub fn rotate_around_self(&mut self, rx: f64, ry: f64, rz: f64) {
        self.map_poses(|pose| pose.rotated_around_self(rx, ry, rz));
    }

    pub fn rotated_around_self(&self, rx: f64, ry: f64, rz: f64) -> Self {
        let mut element = self.clone();
        element.rotate_around_self(rx, ry, rz);
        element
    }
}
