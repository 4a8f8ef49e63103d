//! Immutable robot target frames.
//!
//! A [`Pose`] is a position plus an orthonormal orientation. The z-axis is never
//! stored; it is derived from the x- and y-axis so the frame cannot drift out of
//! orthogonality. Every transform returns a new pose.

use nalgebra::{Isometry3, Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{FabError, FabResult};

/// Length below which an axis is treated as zero.
const AXIS_EPSILON: f64 = 1e-9;

/// Position and orientation used for robot targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseRepr", into = "PoseData")]
pub struct Pose {
    point: Point3<f64>,
    xaxis: Unit<Vector3<f64>>,
    yaxis: Unit<Vector3<f64>>,
}

impl Pose {
    /// Builds a pose from a point and two (not necessarily unit or orthogonal) axes.
    ///
    /// The x-axis direction is kept, the y-axis is re-orthogonalized against it.
    /// Fails when either axis is zero-length or the two are parallel.
    pub fn new(point: Point3<f64>, xaxis: Vector3<f64>, yaxis: Vector3<f64>) -> FabResult<Self> {
        let xaxis = Unit::try_new(xaxis, AXIS_EPSILON)
            .ok_or_else(|| FabError::DegeneratePose("x-axis has zero length".to_string()))?;
        let zaxis = Unit::try_new(xaxis.cross(&yaxis), AXIS_EPSILON).ok_or_else(|| {
            FabError::DegeneratePose("x-axis and y-axis are parallel or y-axis is zero".to_string())
        })?;
        let yaxis = Unit::new_normalize(zaxis.cross(&xaxis.into_inner()));

        Ok(Self {
            point,
            xaxis,
            yaxis,
        })
    }

    /// A pose at `point` aligned with the world axes.
    pub fn world_xy(point: Point3<f64>) -> Self {
        Self {
            point,
            xaxis: Vector3::x_axis(),
            yaxis: Vector3::y_axis(),
        }
    }

    pub fn position(&self) -> Point3<f64> {
        self.point
    }

    pub fn xaxis(&self) -> Unit<Vector3<f64>> {
        self.xaxis
    }

    pub fn yaxis(&self) -> Unit<Vector3<f64>> {
        self.yaxis
    }

    pub fn zaxis(&self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.xaxis.cross(&self.yaxis.into_inner()))
    }

    /// Same orientation, new position.
    pub fn with_position(&self, point: Point3<f64>) -> Self {
        Self { point, ..*self }
    }

    /// Applies a rigid transform to both the position and the orientation.
    pub fn transformed(&self, xform: &Isometry3<f64>) -> Self {
        Self {
            point: xform * self.point,
            xaxis: Unit::new_normalize(xform * self.xaxis.into_inner()),
            yaxis: Unit::new_normalize(xform * self.yaxis.into_inner()),
        }
    }

    /// Rotates the orientation about the pose's own x-, y- and z-axis (radians),
    /// in that order, keeping the position fixed.
    ///
    /// All three rotation axes are taken from the pose before any rotation is applied.
    pub fn rotated_around_self(&self, rx: f64, ry: f64, rz: f64) -> Self {
        let rot_x = Rotation3::from_axis_angle(&self.xaxis, rx);
        let rot_y = Rotation3::from_axis_angle(&self.yaxis, ry);
        let rot_z = Rotation3::from_axis_angle(&self.zaxis(), rz);
        let rotation = rot_z * rot_y * rot_x;

        Self {
            point: self.point,
            xaxis: Unit::new_normalize(rotation * self.xaxis.into_inner()),
            yaxis: Unit::new_normalize(rotation * self.yaxis.into_inner()),
        }
    }

    /// True when the stored axes are unit length and mutually orthogonal within `tolerance`.
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let z = self.zaxis();
        (self.xaxis.norm() - 1.0).abs() < tolerance
            && (self.yaxis.norm() - 1.0).abs() < tolerance
            && self.xaxis.dot(&self.yaxis.into_inner()).abs() < tolerance
            && self.xaxis.dot(&z.into_inner()).abs() < tolerance
            && self.yaxis.dot(&z.into_inner()).abs() < tolerance
    }
}

/// Plain wire form of a pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseData {
    pub point: [f64; 3],
    pub xaxis: [f64; 3],
    pub yaxis: [f64; 3],
}

/// Accepts either the plain form or the plain form wrapped under `value`/`data`,
/// as written by CAD-side exporters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoseRepr {
    Plain(PoseData),
    Wrapped {
        #[serde(alias = "data")]
        value: PoseData,
    },
}

impl TryFrom<PoseData> for Pose {
    type Error = FabError;

    fn try_from(data: PoseData) -> FabResult<Self> {
        Pose::new(
            Point3::from(data.point),
            Vector3::from(data.xaxis),
            Vector3::from(data.yaxis),
        )
    }
}

impl TryFrom<PoseRepr> for Pose {
    type Error = FabError;

    fn try_from(repr: PoseRepr) -> FabResult<Self> {
        match repr {
            PoseRepr::Plain(data) | PoseRepr::Wrapped { value: data } => Pose::try_from(data),
        }
    }
}

impl From<Pose> for PoseData {
    fn from(pose: Pose) -> Self {
        Self {
            point: pose.point.coords.into(),
            xaxis: pose.xaxis.into_inner().into(),
            yaxis: pose.yaxis.into_inner().into(),
        }
    }
}
