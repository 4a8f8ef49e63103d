//! Safe transit between elements.
//!
//! The waypoint sits above the horizontal midpoint of the current exit and the
//! next entry, `hop_height` above the tallest deposit so far. Because deposits
//! only ever grow upward, this clears every previously placed element.

use nalgebra::Point3;

use crate::pose::Pose;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeTransitPlanner {
    hop_height: f64,
}

impl SafeTransitPlanner {
    pub fn new(hop_height: f64) -> Self {
        Self { hop_height }
    }

    /// Transit waypoint between `current_exit` and `next_entry`.
    ///
    /// The z of both input poses is ignored. The orientation is copied from
    /// `next_entry` so the approach orientation is set before descending.
    pub fn plan(&self, current_exit: &Pose, next_entry: &Pose, highest_placed_z: f64) -> Pose {
        plan_transit(current_exit, next_entry, highest_placed_z, self.hop_height)
    }
}

pub fn plan_transit(
    current_exit: &Pose,
    next_entry: &Pose,
    highest_placed_z: f64,
    hop_height: f64,
) -> Pose {
    let from = current_exit.position();
    let to = next_entry.position();
    let waypoint = Point3::new(
        (from.x + to.x) / 2.0,
        (from.y + to.y) / 2.0,
        highest_placed_z + hop_height,
    );
    next_entry.with_position(waypoint)
}
