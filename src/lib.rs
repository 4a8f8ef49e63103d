//! Clay extrusion fabrication run controller.
//!
//! This crate defines:
//! - [`Pose`] and [`FabricationElement`]: the pre-computed print positions.
//! - [`JointSafetyMonitor`]: the per-axis joint range check run after every element.
//! - [`SafeTransitPlanner`]: the elevated waypoint between elements.
//! - [`RunController`]: the sequencer that drives a [`RobotInterface`] through a run.
//! - [`PlacementLedger`] and [`ProgressReporter`]: placement persistence and the
//!   operator progress feed.

pub mod agent;
pub mod config;
pub mod controller;
pub mod element;
pub mod error;
pub mod frames;
pub mod ledger;
pub mod monitor;
pub mod pose;
pub mod robot;
pub mod safety;
pub mod transit;

// Re-export for downstream crates so they can open a ledger database without
// declaring a direct dependency on `sled`.
pub use sled;

pub use agent::Agent;
pub use config::{RobotSetup, RunConfig, SignalMap, HOME_POS, RESET_POS, RETRACT_DWELL_SECONDS};
pub use controller::{
    run_dataset, Actuator, ActuatorState, RunController, RunPhase, RunState, RunSummary,
};
pub use element::{FabricationElement, JointConfiguration, AXIS_COUNT};
pub use error::{FabError, FabResult};
pub use frames::FrameDataset;
pub use ledger::{PlacementLedger, PlacementRecord, LEDGER_PATH};
pub use monitor::{
    ProgressEvent, ProgressMonitor, ProgressReporter, ProgressSubscription, PROGRESS_SOCKET_NAME,
};
pub use pose::Pose;
pub use robot::{
    CommandMode, Feedback, Motion, RobotCommand, RobotInterface, SentCommand, SimulatedRobot, Zone,
};
pub use safety::{
    JointRange, JointSafetyMonitor, JointViolation, RecoveryState, DEFAULT_JOINT_RANGES,
};
pub use transit::{plan_transit, SafeTransitPlanner};
