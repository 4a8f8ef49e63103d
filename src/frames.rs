//! Pre-computed frame dataset.
//!
//! The dataset is produced upstream as two ordered pose sequences that are
//! indexed in lockstep: `travel_frames[i]` is both the entry and the exit pose
//! of element `i`, `extrude_frames[i]` is its deposition pose.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::element::FabricationElement;
use crate::error::{FabError, FabResult};
use crate::pose::Pose;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameDataset {
    #[serde(alias = "travel_poses")]
    pub travel_frames: Vec<Pose>,
    #[serde(alias = "deposition_poses")]
    pub extrude_frames: Vec<Pose>,
}

impl FrameDataset {
    pub fn new(travel_frames: Vec<Pose>, extrude_frames: Vec<Pose>) -> Self {
        Self {
            travel_frames,
            extrude_frames,
        }
    }

    pub fn from_json_str(json: &str) -> FabResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> FabResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Fails when the two sequences are not the same length.
    pub fn validate(&self) -> FabResult<usize> {
        if self.travel_frames.len() != self.extrude_frames.len() {
            return Err(FabError::FrameCountMismatch {
                travel: self.travel_frames.len(),
                deposition: self.extrude_frames.len(),
            });
        }
        Ok(self.extrude_frames.len())
    }

    /// Pairs the sequences into elements.
    pub fn into_elements(self) -> FabResult<Vec<FabricationElement>> {
        self.validate()?;
        Ok(self
            .extrude_frames
            .into_iter()
            .zip(self.travel_frames)
            .map(|(location, travel)| FabricationElement::with_travel_pose(location, travel))
            .collect())
    }
}
