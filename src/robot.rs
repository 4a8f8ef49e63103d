//! Robot command seam.
//!
//! The controller talks to the robot only through [`RobotInterface`]. The real
//! RPC transport lives outside this crate; [`SimulatedRobot`] records the
//! command stream and answers joint reads from a script.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::element::JointConfiguration;
use crate::error::{FabError, FabResult};
use crate::pose::Pose;

/// Blending zone around a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    /// Stop exactly on target.
    Fine,
    /// 1 mm blend. Entry and exit moves.
    Z1,
    /// 5 mm blend. Transit waypoints.
    Z5,
    /// 10 mm blend. Reset moves.
    Z10,
}

impl Zone {
    /// Blending radius in millimeters.
    pub fn radius_mm(self) -> f64 {
        match self {
            Zone::Fine => 0.0,
            Zone::Z1 => 1.0,
            Zone::Z5 => 5.0,
            Zone::Z10 => 10.0,
        }
    }
}

/// Interpolation used for a cartesian target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Motion {
    Joint,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotCommand {
    MoveToPose {
        pose: Pose,
        speed: f64,
        zone: Zone,
        motion: Motion,
    },
    MoveToJoints {
        joints: JointConfiguration,
        speed: f64,
        zone: Zone,
    },
    SetDigital {
        signal: String,
        high: bool,
    },
    WaitTime {
        seconds: f64,
    },
    GetJoints,
    PrintText(String),
    SetAcceleration {
        acceleration: f64,
        ramp: f64,
    },
    SetMaxSpeed {
        override_percent: f64,
        max_tcp: f64,
    },
    SetTool(String),
    SetWorkObject(String),
}

/// Response to an awaited command.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Done,
    Joints(JointConfiguration),
}

/// The external robot interface.
///
/// `send` queues a command without waiting for physical completion; queued
/// commands execute in FIFO order. `send_and_wait` returns only once the robot
/// has answered. Errors from either are transport failures and are fatal.
#[async_trait]
pub trait RobotInterface: Send {
    async fn send(&mut self, command: RobotCommand) -> FabResult<()>;

    async fn send_and_wait(&mut self, command: RobotCommand) -> FabResult<Feedback>;

    /// Releases the connection.
    async fn close(&mut self) -> FabResult<()>;

    async fn get_joint_configuration(&mut self) -> FabResult<JointConfiguration> {
        match self.send_and_wait(RobotCommand::GetJoints).await? {
            Feedback::Joints(joints) => Ok(joints),
            other => Err(FabError::UnexpectedFeedback {
                expected: "joint configuration".to_string(),
                received: format!("{other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    FireAndForget,
    Awaited,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub mode: CommandMode,
    pub command: RobotCommand,
}

/// In-memory robot that records every command it receives.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    sent: Vec<SentCommand>,
    joints: JointConfiguration,
    scripted_readings: VecDeque<JointConfiguration>,
    fail_at: Option<usize>,
    closed: bool,
}

impl SimulatedRobot {
    pub fn new(initial_joints: JointConfiguration) -> Self {
        Self {
            sent: Vec::new(),
            joints: initial_joints,
            scripted_readings: VecDeque::new(),
            fail_at: None,
            closed: false,
        }
    }

    /// Queues readings returned by subsequent joint reads, before falling back
    /// to the last commanded joint target.
    pub fn with_joint_readings(mut self, readings: impl IntoIterator<Item = JointConfiguration>) -> Self {
        self.scripted_readings.extend(readings);
        self
    }

    /// Makes the command at position `index` in the stream fail once with a
    /// transport error. The failed command is not recorded.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn sent(&self) -> &[SentCommand] {
        &self.sent
    }

    pub fn commands(&self) -> impl Iterator<Item = &RobotCommand> {
        self.sent.iter().map(|s| &s.command)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn accept(&mut self, mode: CommandMode, command: RobotCommand) -> FabResult<()> {
        if self.closed {
            return Err(FabError::Transport("connection closed".to_string()));
        }
        if self.fail_at == Some(self.sent.len()) {
            self.fail_at = None;
            return Err(FabError::Transport(format!(
                "simulated connection loss at command {}",
                self.sent.len()
            )));
        }

        debug!(?mode, ?command, "robot command");
        if let RobotCommand::MoveToJoints { joints, .. } = &command {
            self.joints = *joints;
        }
        self.sent.push(SentCommand { mode, command });
        Ok(())
    }
}

#[async_trait]
impl RobotInterface for SimulatedRobot {
    async fn send(&mut self, command: RobotCommand) -> FabResult<()> {
        self.accept(CommandMode::FireAndForget, command)
    }

    async fn send_and_wait(&mut self, command: RobotCommand) -> FabResult<Feedback> {
        let is_joint_read = command == RobotCommand::GetJoints;
        self.accept(CommandMode::Awaited, command)?;

        if is_joint_read {
            let joints = self.scripted_readings.pop_front().unwrap_or(self.joints);
            return Ok(Feedback::Joints(joints));
        }
        Ok(Feedback::Done)
    }

    async fn close(&mut self) -> FabResult<()> {
        self.closed = true;
        Ok(())
    }
}
