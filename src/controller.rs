//! Fabrication run controller.
//!
//! Drives the robot through every element from the configured start index:
//!
//! ```text
//! Homing -> PerElement(i) [-> Recovering(i)] -> Transiting(i) -> PerElement(i + 1) ... -> Done
//! ```
//!
//! Motion and signal commands are fire-and-forget. Joint reads, the reset move
//! and the inter-element transit are awaited, so the transit height is only
//! trusted once the robot has confirmed it is clear of the print.

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::config::{RunConfig, RETRACT_DWELL_SECONDS};
use crate::element::FabricationElement;
use crate::error::{FabError, FabResult};
use crate::frames::FrameDataset;
use crate::ledger::{PlacementLedger, PlacementRecord};
use crate::monitor::{ProgressEvent, ProgressReporter};
use crate::pose::Pose;
use crate::robot::{Motion, RobotCommand, RobotInterface, Zone};
use crate::safety::{JointSafetyMonitor, RecoveryState};
use crate::transit::SafeTransitPlanner;

const RESET_MESSAGE: &str = "Resetting joint positions.";

/// Where the controller is in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Constructed, nothing sent yet.
    Idle,
    /// Homing and pre-run setup.
    Homing,
    /// Entry, deposit and exit of the element.
    PerElement(usize),
    /// Resetting the arm after a joint violation on the element.
    Recovering(usize),
    /// Moving from the element to the next one.
    Transiting(usize),
    /// Last element finished, post-run steps follow.
    Done,
    /// Stopped by a runtime error.
    Aborted,
}

/// Mutable state of a run. Only the controller writes to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    index: usize,
    highest_placed_z: Option<f64>,
    dry_run: bool,
    phase: RunPhase,
    recovery: RecoveryState,
    last_completed: Option<usize>,
    completed: usize,
    recoveries: usize,
}

impl RunState {
    fn new(config: &RunConfig) -> Self {
        Self {
            index: config.start_index,
            highest_placed_z: config.highest_placed_z,
            dry_run: config.dry_run,
            phase: RunPhase::Idle,
            recovery: RecoveryState::Nominal,
            last_completed: None,
            completed: 0,
            recoveries: 0,
        }
    }

    /// Element currently (or last) being worked on.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn highest_placed_z(&self) -> Option<f64> {
        self.highest_placed_z
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn recovery(&self) -> RecoveryState {
        self.recovery
    }

    /// Last element whose deposit cycle finished. Resume at the next one.
    pub fn last_completed(&self) -> Option<usize> {
        self.last_completed
    }

    /// Folds a deposit into the running maximum and returns the new maximum.
    fn record_deposit(&mut self, z: f64) -> f64 {
        let highest = self.highest_placed_z.map_or(z, |h| h.max(z));
        self.highest_placed_z = Some(highest);
        highest
    }
}

/// The extruder outputs the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    ExtrudeForward,
    Retract,
    Pressure,
}

impl Actuator {
    const ALL: [Actuator; 3] = [Actuator::ExtrudeForward, Actuator::Retract, Actuator::Pressure];

    fn slot(self) -> usize {
        match self {
            Actuator::ExtrudeForward => 0,
            Actuator::Retract => 1,
            Actuator::Pressure => 2,
        }
    }
}

/// Outputs that may currently be high.
///
/// An output counts as energized from the moment its assert is issued until
/// its de-assert has been sent successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState {
    high: [bool; 3],
}

impl ActuatorState {
    pub fn is_energized(&self, actuator: Actuator) -> bool {
        self.high[actuator.slot()]
    }

    pub fn energized(&self) -> impl Iterator<Item = Actuator> + '_ {
        Actuator::ALL.into_iter().filter(|a| self.is_energized(*a))
    }

    fn set(&mut self, actuator: Actuator, high: bool) {
        self.high[actuator.slot()] = high;
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Deposit cycles completed in this run.
    pub completed: usize,
    /// Joint resets performed.
    pub recoveries: usize,
    /// Tallest deposit, including the resume seed.
    pub highest_placed_z: Option<f64>,
    /// Last element whose deposit cycle finished.
    pub last_completed: Option<usize>,
}

/// Sequences a fabrication run over a [`RobotInterface`].
///
/// Owns the element list and the run state. The optional ledger and progress
/// reporter are fed as elements complete.
pub struct RunController {
    config: RunConfig,
    elements: Vec<FabricationElement>,
    monitor: JointSafetyMonitor,
    planner: SafeTransitPlanner,
    state: RunState,
    actuators: ActuatorState,
    ledger: Option<PlacementLedger>,
    progress: Option<ProgressReporter>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("elements_len", &self.elements.len())
            .field("state", &self.state)
            .field("actuators", &self.actuators)
            .field("ledger", &self.ledger.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunController {
    /// Validates the configuration against the element list. Nothing is sent
    /// to the robot here, so every failure is a configuration error.
    pub fn new(config: RunConfig, elements: Vec<FabricationElement>) -> FabResult<Self> {
        config.validate()?;
        if config.start_index > elements.len() {
            return Err(FabError::StartIndexOutOfRange {
                start_index: config.start_index,
                len: elements.len(),
            });
        }

        Ok(Self {
            monitor: config.safety_monitor()?,
            planner: SafeTransitPlanner::new(config.hop_height),
            state: RunState::new(&config),
            actuators: ActuatorState::default(),
            ledger: None,
            progress: None,
            config,
            elements,
        })
    }

    pub fn from_dataset(config: RunConfig, dataset: FrameDataset) -> FabResult<Self> {
        let elements = dataset.into_elements()?;
        Self::new(config, elements)
    }

    /// Persist each confirmed placement.
    pub fn with_ledger(mut self, ledger: PlacementLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn actuators(&self) -> &ActuatorState {
        &self.actuators
    }

    pub fn elements(&self) -> &[FabricationElement] {
        &self.elements
    }

    pub fn ledger(&self) -> Option<&PlacementLedger> {
        self.ledger.as_ref()
    }

    pub fn into_elements(self) -> Vec<FabricationElement> {
        self.elements
    }

    /// Executes the run and releases the transport.
    ///
    /// On a fatal error every output that may still be high is switched off
    /// before the error is returned; [`RunState::last_completed`] then tells
    /// where to resume.
    #[instrument(
        skip_all,
        fields(
            total = self.elements.len(),
            start_index = self.config.start_index,
            dry_run = self.config.dry_run
        )
    )]
    pub async fn run<R>(&mut self, robot: &mut R) -> FabResult<RunSummary>
    where
        R: RobotInterface + ?Sized,
    {
        let outcome = self.drive(robot).await;

        if let Err(err) = &outcome {
            error!(%err, last_completed = ?self.state.last_completed, "run aborted");
            self.state.phase = RunPhase::Aborted;
            self.release_actuators(robot).await;
            self.publish(ProgressEvent::RunAborted {
                last_completed: self.state.last_completed,
                reason: err.to_string(),
            });
        }

        if let Err(close_err) = robot.close().await {
            warn!(%close_err, "failed to close robot connection");
        }

        outcome.map(|()| self.summary())
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            completed: self.state.completed,
            recoveries: self.state.recoveries,
            highest_placed_z: self.state.highest_placed_z,
            last_completed: self.state.last_completed,
        }
    }

    async fn drive<R>(&mut self, robot: &mut R) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        let total = self.elements.len();
        self.publish(ProgressEvent::RunStarted {
            total,
            start_index: self.config.start_index,
            dry_run: self.config.dry_run,
        });

        self.prepare(robot).await?;

        for index in self.config.start_index..total {
            let highest = self.fabricate(robot, index).await?;
            self.check_joints(robot, index).await?;
            self.transit(robot, index, highest).await?;
        }

        self.finish(robot).await
    }

    async fn prepare<R>(&mut self, robot: &mut R) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        self.state.phase = RunPhase::Homing;
        let setup = self.config.setup.clone();

        robot
            .send(RobotCommand::MoveToJoints {
                joints: self.config.home_joints,
                speed: self.config.travel_speed,
                zone: Zone::Fine,
            })
            .await?;
        robot
            .send(RobotCommand::SetAcceleration {
                acceleration: setup.acceleration,
                ramp: setup.ramp,
            })
            .await?;
        robot
            .send(RobotCommand::SetMaxSpeed {
                override_percent: setup.speed_override,
                max_tcp: setup.max_tcp_speed,
            })
            .await?;

        for actuator in Actuator::ALL {
            self.set_actuator(robot, actuator, false).await?;
        }

        robot.send(RobotCommand::SetTool(setup.tool)).await?;
        robot.send(RobotCommand::SetWorkObject(setup.work_object)).await?;
        info!("Tool, Wobj, Acc and MaxSpeed sent to robot");

        if !self.state.dry_run {
            self.set_actuator(robot, Actuator::Pressure, true).await?;
        }
        Ok(())
    }

    /// Entry, deposit, exit. Returns the running maximum deposit height.
    async fn fabricate<R>(&mut self, robot: &mut R, index: usize) -> FabResult<f64>
    where
        R: RobotInterface + ?Sized,
    {
        self.state.index = index;
        self.state.phase = RunPhase::PerElement(index);
        let total = self.elements.len();
        let element = &self.elements[index];
        let (entry, location, exit) = (element.entry_pose, element.location_pose, element.exit_pose);

        self.move_to(robot, entry, self.config.travel_speed, Zone::Z1, Motion::Joint)
            .await?;
        self.move_to(robot, location, self.config.print_speed, Zone::Fine, Motion::Linear)
            .await?;

        if !self.state.dry_run {
            self.pulse(robot, Actuator::ExtrudeForward, self.config.dwell_seconds())
                .await?;
            self.pulse(robot, Actuator::Retract, RETRACT_DWELL_SECONDS)
                .await?;
        }

        let message = format!("Extrusion number {index}/{total} done.");
        info!(index, total, "{message}");
        robot.send(RobotCommand::PrintText(message)).await?;

        if !self.state.dry_run {
            self.confirm_placement(index);
        }
        let highest = self.state.record_deposit(location.position().z);
        self.state.last_completed = Some(index);
        self.state.completed += 1;
        self.publish(ProgressEvent::ElementPlaced {
            index,
            total,
            highest_placed_z: highest,
        });

        self.move_to(robot, exit, self.config.travel_speed, Zone::Z1, Motion::Linear)
            .await?;
        Ok(highest)
    }

    fn confirm_placement(&mut self, index: usize) {
        let timestamp = Utc::now().to_rfc3339();
        let element = &mut self.elements[index];
        if !element.mark_placed(timestamp.clone()) {
            warn!(index, "element was already marked as placed");
        }

        if let Some(ledger) = &self.ledger {
            let record = PlacementRecord {
                index,
                placed_timestamp: timestamp,
                z: element.deposit_z(),
            };
            if let Err(err) = ledger.record(&record) {
                warn!(%err, index, "failed to persist placement");
            }
        }
    }

    /// Reads the joints after the exit move and resets the arm if any axis is
    /// outside its range. Never aborts the run.
    async fn check_joints<R>(&mut self, robot: &mut R, index: usize) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        let joints = robot.get_joint_configuration().await?;
        self.state.recovery = RecoveryState::from_check(self.monitor.check(&joints));

        let RecoveryState::Recovering(violation) = self.state.recovery else {
            return Ok(());
        };

        self.state.phase = RunPhase::Recovering(index);
        warn!(index, %violation, "joint reading out of range");
        robot
            .send(RobotCommand::PrintText(RESET_MESSAGE.to_string()))
            .await?;
        robot
            .send_and_wait(RobotCommand::MoveToJoints {
                joints: self.config.reset_joints,
                speed: self.config.travel_speed,
                zone: Zone::Z10,
            })
            .await?;

        self.state.recoveries += 1;
        self.publish(ProgressEvent::JointRecovery { index, violation });
        self.state.recovery = self.state.recovery.resolve();
        Ok(())
    }

    /// Awaited hop to the next entry, or the terminal transition after the last element.
    async fn transit<R>(&mut self, robot: &mut R, index: usize, highest: f64) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        let next = index + 1;
        if next >= self.elements.len() {
            self.state.phase = RunPhase::Done;
            return Ok(());
        }

        self.state.phase = RunPhase::Transiting(index);
        let waypoint = self.planner.plan(
            &self.elements[index].exit_pose,
            &self.elements[next].entry_pose,
            highest,
        );

        robot
            .send_and_wait(RobotCommand::MoveToPose {
                pose: waypoint,
                speed: self.config.travel_speed,
                zone: Zone::Z5,
                motion: Motion::Joint,
            })
            .await?;
        Ok(())
    }

    async fn finish<R>(&mut self, robot: &mut R) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        self.state.phase = RunPhase::Done;
        robot
            .send(RobotCommand::MoveToJoints {
                joints: self.config.home_joints,
                speed: self.config.travel_speed,
                zone: Zone::Fine,
            })
            .await?;
        self.set_actuator(robot, Actuator::Pressure, false).await?;

        self.publish(ProgressEvent::RunFinished {
            completed: self.state.completed,
            recoveries: self.state.recoveries,
        });
        info!(
            completed = self.state.completed,
            recoveries = self.state.recoveries,
            "run finished"
        );
        Ok(())
    }

    async fn move_to<R>(
        &self,
        robot: &mut R,
        pose: Pose,
        speed: f64,
        zone: Zone,
        motion: Motion,
    ) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        robot
            .send(RobotCommand::MoveToPose {
                pose,
                speed,
                zone,
                motion,
            })
            .await
    }

    /// Asserts `actuator`, dwells, de-asserts.
    async fn pulse<R>(&mut self, robot: &mut R, actuator: Actuator, seconds: f64) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        self.set_actuator(robot, actuator, true).await?;
        robot.send(RobotCommand::WaitTime { seconds }).await?;
        self.set_actuator(robot, actuator, false).await
    }

    async fn set_actuator<R>(&mut self, robot: &mut R, actuator: Actuator, high: bool) -> FabResult<()>
    where
        R: RobotInterface + ?Sized,
    {
        let signal = self.signal_id(actuator).to_string();
        if high {
            self.actuators.set(actuator, true);
        }
        robot.send(RobotCommand::SetDigital { signal, high }).await?;
        if !high {
            self.actuators.set(actuator, false);
        }
        Ok(())
    }

    fn signal_id(&self, actuator: Actuator) -> &str {
        let signals = &self.config.signals;
        match actuator {
            Actuator::ExtrudeForward => &signals.extrude_forward,
            Actuator::Retract => &signals.extrude_backward,
            Actuator::Pressure => &signals.pressure,
        }
    }

    /// Best-effort de-assert of every output that may still be high.
    async fn release_actuators<R>(&mut self, robot: &mut R)
    where
        R: RobotInterface + ?Sized,
    {
        let energized: Vec<Actuator> = self.actuators.energized().collect();
        for actuator in energized {
            if let Err(err) = self.set_actuator(robot, actuator, false).await {
                error!(%err, ?actuator, "failed to de-assert actuator");
            }
        }
    }

    fn publish(&mut self, event: ProgressEvent) {
        if let Some(progress) = self.progress.as_mut() {
            progress.publish(&event);
        }
    }
}

/// Builds a controller from the frame dataset and runs it. Length mismatches
/// are reported before the robot receives anything.
pub async fn run_dataset<R>(
    config: RunConfig,
    dataset: FrameDataset,
    robot: &mut R,
) -> FabResult<RunSummary>
where
    R: RobotInterface + ?Sized,
{
    let mut controller = RunController::from_dataset(config, dataset)?;
    controller.run(robot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HOME_POS, RESET_POS};
    use crate::element::JointConfiguration;
    use crate::robot::{CommandMode, SimulatedRobot};
    use nalgebra::Point3;

    fn pose(x: f64, y: f64, z: f64) -> Pose {
        Pose::world_xy(Point3::new(x, y, z))
    }

    /// Elements spaced along x with the travel pose 20 mm above each deposit.
    fn elements(deposit_z: &[f64]) -> Vec<FabricationElement> {
        deposit_z
            .iter()
            .enumerate()
            .map(|(i, z)| {
                let x = i as f64 * 10.0;
                FabricationElement::with_travel_pose(pose(x, 0.0, *z), pose(x, 5.0, z + 20.0))
            })
            .collect()
    }

    fn digital(signal: &str, high: bool) -> RobotCommand {
        RobotCommand::SetDigital {
            signal: signal.to_string(),
            high,
        }
    }

    fn transit_heights(robot: &SimulatedRobot) -> Vec<f64> {
        robot
            .commands()
            .filter_map(|c| match c {
                RobotCommand::MoveToPose {
                    pose,
                    zone: Zone::Z5,
                    ..
                } => Some(pose.position().z),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn full_run_emits_expected_command_stream() {
        let config = RunConfig::default();
        let dwell = config.dwell_seconds();
        let els = elements(&[10.0, 25.0]);
        let mut robot = SimulatedRobot::new(HOME_POS);
        let mut controller = RunController::new(config, els.clone()).expect("controller");

        let summary = controller.run(&mut robot).await.expect("run");

        let mv = |pose: Pose, speed: f64, zone: Zone, motion: Motion| RobotCommand::MoveToPose {
            pose,
            speed,
            zone,
            motion,
        };
        let mut expected = vec![
            RobotCommand::MoveToJoints {
                joints: HOME_POS,
                speed: 250.0,
                zone: Zone::Fine,
            },
            RobotCommand::SetAcceleration {
                acceleration: 100.0,
                ramp: 100.0,
            },
            RobotCommand::SetMaxSpeed {
                override_percent: 100.0,
                max_tcp: 250.0,
            },
            digital("DO_9", false),
            digital("DO_10", false),
            digital("DO_1", false),
            RobotCommand::SetTool("t_3dp_clay".to_string()),
            RobotCommand::SetWorkObject("w_3dp_clay".to_string()),
            digital("DO_1", true),
        ];
        for (i, element) in els.iter().enumerate() {
            expected.extend([
                mv(element.entry_pose, 250.0, Zone::Z1, Motion::Joint),
                mv(element.location_pose, 250.0, Zone::Fine, Motion::Linear),
                digital("DO_9", true),
                RobotCommand::WaitTime { seconds: dwell },
                digital("DO_9", false),
                digital("DO_10", true),
                RobotCommand::WaitTime { seconds: 0.5 },
                digital("DO_10", false),
                RobotCommand::PrintText(format!("Extrusion number {i}/2 done.")),
                mv(element.exit_pose, 250.0, Zone::Z1, Motion::Linear),
                RobotCommand::GetJoints,
            ]);
            if i == 0 {
                expected.push(mv(pose(5.0, 5.0, 40.0), 250.0, Zone::Z5, Motion::Joint));
            }
        }
        expected.extend([
            RobotCommand::MoveToJoints {
                joints: HOME_POS,
                speed: 250.0,
                zone: Zone::Fine,
            },
            digital("DO_1", false),
        ]);

        let sent: Vec<RobotCommand> = robot.commands().cloned().collect();
        assert_eq!(sent, expected);
        assert!(robot.is_closed());
        assert_eq!(controller.state().phase(), RunPhase::Done);
        assert_eq!(
            summary,
            RunSummary {
                completed: 2,
                recoveries: 0,
                highest_placed_z: Some(25.0),
                last_completed: Some(1),
            }
        );
        assert_eq!(controller.actuators().energized().count(), 0);
    }

    #[tokio::test]
    async fn only_reads_and_transits_are_awaited() {
        let mut robot = SimulatedRobot::new(HOME_POS);
        let mut controller =
            RunController::new(RunConfig::default(), elements(&[1.0, 2.0, 3.0])).expect("controller");
        controller.run(&mut robot).await.expect("run");

        for sent in robot.sent() {
            let awaited = matches!(
                sent.command,
                RobotCommand::GetJoints
                    | RobotCommand::MoveToPose {
                        zone: Zone::Z5,
                        ..
                    }
            );
            let expected_mode = if awaited {
                CommandMode::Awaited
            } else {
                CommandMode::FireAndForget
            };
            assert_eq!(sent.mode, expected_mode, "{:?}", sent.command);
        }
    }

    #[tokio::test]
    async fn transit_clears_tallest_deposit_so_far() {
        let config = RunConfig {
            dry_run: true,
            ..RunConfig::default()
        };
        let mut robot = SimulatedRobot::new(HOME_POS);
        let mut controller =
            RunController::new(config, elements(&[10.0, 25.0, 5.0, 30.0])).expect("controller");

        let summary = controller.run(&mut robot).await.expect("run");

        assert_eq!(transit_heights(&robot), vec![40.0, 55.0, 55.0]);
        assert_eq!(summary.highest_placed_z, Some(30.0));
    }

    #[tokio::test]
    async fn highest_placed_z_never_decreases() {
        let orderings: [&[f64]; 4] = [
            &[1.0, 2.0, 3.0, 4.0],
            &[4.0, 3.0, 2.0, 1.0],
            &[2.0, 9.0, 1.0, 9.0, 3.0],
            &[-5.0, -10.0, 0.0],
        ];
        for zs in orderings {
            let config = RunConfig {
                dry_run: true,
                hop_height: 0.0,
                ..RunConfig::default()
            };
            let mut robot = SimulatedRobot::new(HOME_POS);
            RunController::new(config, elements(zs))
                .expect("controller")
                .run(&mut robot)
                .await
                .expect("run");

            let heights = transit_heights(&robot);
            assert!(heights.windows(2).all(|w| w[0] <= w[1]), "{zs:?} -> {heights:?}");
        }
    }

    #[tokio::test]
    async fn dry_run_never_energizes_actuators() {
        let config = RunConfig {
            dry_run: true,
            ..RunConfig::default()
        };
        let mut robot = SimulatedRobot::new(HOME_POS);
        let mut controller = RunController::new(config, elements(&[1.0, 2.0])).expect("controller");
        controller.run(&mut robot).await.expect("run");

        assert!(robot.commands().all(|c| !matches!(
            c,
            RobotCommand::SetDigital { high: true, .. } | RobotCommand::WaitTime { .. }
        )));
        assert!(controller.elements().iter().all(|e| !e.is_placed()));
        assert_eq!(robot.commands().filter(|c| matches!(c, RobotCommand::MoveToPose { .. })).count(), 7);
    }

    #[tokio::test]
    async fn mismatched_frames_fail_before_motion() {
        let mut robot = SimulatedRobot::new(HOME_POS);
        let dataset = FrameDataset::new(vec![pose(0.0, 0.0, 20.0)], Vec::new());

        let err = run_dataset(RunConfig::default(), dataset, &mut robot)
            .await
            .expect_err("mismatch");

        assert!(err.is_configuration());
        assert!(robot.sent().is_empty());
        assert!(!robot.is_closed());
    }

    #[test]
    fn start_index_past_end_is_rejected() {
        let config = RunConfig {
            start_index: 3,
            ..RunConfig::default()
        };
        let err = RunController::new(config, elements(&[1.0, 2.0])).expect_err("out of range");
        assert!(matches!(
            err,
            FabError::StartIndexOutOfRange {
                start_index: 3,
                len: 2
            }
        ));
    }

    #[tokio::test]
    async fn joint_violation_resets_and_continues() {
        let bad = JointConfiguration::new([0.0, 0.0, 0.0, 100.0, 0.0, 180.0]);
        let mut robot = SimulatedRobot::new(HOME_POS).with_joint_readings([bad]);
        let mut controller =
            RunController::new(RunConfig::default(), elements(&[1.0, 2.0])).expect("controller");

        let summary = controller.run(&mut robot).await.expect("run");

        let sent = robot.sent();
        let reset_at = sent
            .iter()
            .position(|s| s.command == RobotCommand::PrintText(RESET_MESSAGE.to_string()))
            .expect("reset message");
        assert_eq!(sent[reset_at - 1].command, RobotCommand::GetJoints);
        assert_eq!(
            sent[reset_at + 1].command,
            RobotCommand::MoveToJoints {
                joints: RESET_POS,
                speed: 250.0,
                zone: Zone::Z10,
            }
        );
        assert_eq!(sent[reset_at + 1].mode, CommandMode::Awaited);
        assert!(matches!(
            sent[reset_at + 2].command,
            RobotCommand::MoveToPose { zone: Zone::Z5, .. }
        ));
        assert_eq!(summary.recoveries, 1);
        assert_eq!(summary.completed, 2);
        assert_eq!(controller.state().recovery(), RecoveryState::Nominal);
    }

    #[tokio::test]
    async fn resume_matches_truncated_full_run() {
        let els = elements(&[3.0, 12.0, 7.0, 15.0, 9.0]);
        let resume_at = 2;

        let mut full_robot = SimulatedRobot::new(HOME_POS);
        RunController::new(RunConfig::default(), els.clone())
            .expect("controller")
            .run(&mut full_robot)
            .await
            .expect("full run");

        let seed = els[..resume_at]
            .iter()
            .map(FabricationElement::deposit_z)
            .fold(f64::MIN, f64::max);
        let config = RunConfig {
            start_index: resume_at,
            highest_placed_z: Some(seed),
            ..RunConfig::default()
        };
        let mut resumed_robot = SimulatedRobot::new(HOME_POS);
        RunController::new(config, els.clone())
            .expect("controller")
            .run(&mut resumed_robot)
            .await
            .expect("resumed run");

        let full: Vec<RobotCommand> = full_robot.commands().cloned().collect();
        let setup_len = full
            .iter()
            .position(|c| matches!(c, RobotCommand::MoveToPose { .. }))
            .expect("first move");
        let resume_start = full
            .iter()
            .position(|c| {
                *c == RobotCommand::MoveToPose {
                    pose: els[resume_at].entry_pose,
                    speed: 250.0,
                    zone: Zone::Z1,
                    motion: Motion::Joint,
                }
            })
            .expect("entry of resumed element");

        let mut expected = full[..setup_len].to_vec();
        expected.extend_from_slice(&full[resume_start..]);
        let resumed: Vec<RobotCommand> = resumed_robot.commands().cloned().collect();
        assert_eq!(resumed, expected);
    }

    #[tokio::test]
    async fn transport_failure_releases_energized_outputs() {
        // 9 setup commands, 12 for element 0 including its transit, then
        // element 1's entry, deposit move and forward assert. Command 24 is
        // the extrusion dwell.
        let mut robot = SimulatedRobot::new(HOME_POS).fail_at(24);
        let mut controller =
            RunController::new(RunConfig::default(), elements(&[1.0, 2.0, 3.0])).expect("controller");

        let err = controller.run(&mut robot).await.expect_err("connection lost");

        assert!(matches!(err, FabError::Transport(_)));
        assert_eq!(controller.state().phase(), RunPhase::Aborted);
        assert_eq!(controller.state().last_completed(), Some(0));
        assert_eq!(controller.state().index(), 1);
        assert!(controller.elements()[0].is_placed());
        assert!(!controller.elements()[1].is_placed());
        assert_eq!(controller.actuators().energized().count(), 0);

        let sent = robot.sent();
        assert_eq!(sent[23].command, digital("DO_9", true));
        let tail: Vec<&RobotCommand> = sent[24..].iter().map(|s| &s.command).collect();
        assert_eq!(tail, vec![&digital("DO_9", false), &digital("DO_1", false)]);
        assert!(robot.is_closed());
    }

    #[tokio::test]
    async fn failure_during_retract_releases_retract_and_pressure() {
        // Element 1: forward assert at 23, dwell 24, de-assert 25, retract
        // assert 26, retract dwell 27.
        let mut robot = SimulatedRobot::new(HOME_POS).fail_at(27);
        let mut controller =
            RunController::new(RunConfig::default(), elements(&[1.0, 2.0, 3.0])).expect("controller");

        let err = controller.run(&mut robot).await.expect_err("connection lost");

        assert!(matches!(err, FabError::Transport(_)));
        assert_eq!(controller.state().last_completed(), Some(0));
        assert!(!controller.elements()[1].is_placed());
        assert_eq!(controller.actuators().energized().count(), 0);

        let sent = robot.sent();
        assert_eq!(sent[25].command, digital("DO_9", false));
        assert_eq!(sent[26].command, digital("DO_10", true));
        let tail: Vec<&RobotCommand> = sent[27..].iter().map(|s| &s.command).collect();
        assert_eq!(tail, vec![&digital("DO_10", false), &digital("DO_1", false)]);
        assert!(robot.is_closed());
    }

    #[tokio::test]
    async fn placements_are_recorded_in_ledger() {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("failed to open temporary sled db");
        let ledger = PlacementLedger::from_db(db).expect("ledger");
        let mut robot = SimulatedRobot::new(HOME_POS);
        let mut controller = RunController::new(RunConfig::default(), elements(&[4.0, 8.0]))
            .expect("controller")
            .with_ledger(ledger);

        controller.run(&mut robot).await.expect("run");

        let ledger = controller.ledger().expect("ledger attached");
        assert_eq!(ledger.resume_index().expect("resume"), 2);
        assert_eq!(ledger.highest_placed_z().expect("highest"), Some(8.0));
        let first = ledger.get(0).expect("get").expect("record 0");
        assert_eq!(Some(first.placed_timestamp.as_str()), controller.elements()[0].placed_timestamp());
    }

    #[tokio::test]
    async fn starting_at_end_only_homes() {
        let config = RunConfig {
            start_index: 2,
            ..RunConfig::default()
        };
        let mut robot = SimulatedRobot::new(HOME_POS);
        let summary = RunController::new(config, elements(&[1.0, 2.0]))
            .expect("controller")
            .run(&mut robot)
            .await
            .expect("run");

        assert_eq!(summary.completed, 0);
        assert!(robot.commands().all(|c| !matches!(c, RobotCommand::MoveToPose { .. })));
        assert_eq!(robot.commands().last(), Some(&digital("DO_1", false)));
    }
}
