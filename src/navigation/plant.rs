use super::state::{Mode, NavigationState};
use crate::differential_controller::DifferentialCommand;
use crate::driver::SharedDriver;
use crate::geometry::normalize_angle;
use crate::localisation::{ParticleFilter, RangeReadings};
use crate::map::Map;
use crate::pid::ControlPlant;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Closes the heading loop: localises on every error sample and turns the
/// controller output into motor commands for the current mode.
pub(crate) struct NavigationPlant {
    map: Arc<Map>,
    driver: SharedDriver,
    state: Arc<watch::Sender<NavigationState>>,
    filter: ParticleFilter,
    resample_interval: Duration,
    last_heading: f64,
    last_distance: f64,
    /// Mode and speed sampled together with the last error.
    tick: (Mode, f64),
}

impl NavigationPlant {
    pub(crate) fn new(
        map: Arc<Map>,
        driver: SharedDriver,
        state: Arc<watch::Sender<NavigationState>>,
        filter: ParticleFilter,
        resample_interval: Duration,
        (last_heading, last_distance): (f64, f64),
    ) -> Self {
        Self {
            map,
            driver,
            state,
            filter,
            resample_interval,
            last_heading,
            last_distance,
            tick: (Mode::Neutral, 0.0),
        }
    }
}

#[async_trait]
impl ControlPlant for NavigationPlant {
    async fn error(&mut self) -> Result<f64> {
        let (mode, target_heading, speed, last_correction) = {
            let state = self.state.borrow();
            (
                state.mode,
                state.target_heading,
                state.speed,
                state.last_correction,
            )
        };
        let correction_due = last_correction.elapsed() >= self.resample_interval;

        let (heading, distance, ranges) = {
            let driver = self.driver.lock().await;
            let ranges = correction_due
                .then(|| (driver.range_left(), driver.range_front(), driver.range_right()));
            (driver.heading_radians(), driver.total_distance(), ranges)
        };

        let turned = heading - self.last_heading;
        let travelled = self
            .map
            .inches_to_grid_units(distance - self.last_distance);
        self.last_heading = heading;
        self.last_distance = distance;
        let driven = if mode == Mode::Straight { travelled } else { 0.0 };
        self.filter.perturb(driven, turned);

        if let Some((left, front, right)) = ranges {
            let readings = RangeReadings::from_inches(&self.map, left, front, right);
            self.filter.resample(&self.map, &readings);
            debug!(?readings, scale = self.filter.scale(), "corrected pose estimate");
        }

        let pose = self.filter.representative_pose();
        self.state.send_modify(|state| {
            state.pose = pose;
            state.distance = distance;
            if ranges.is_some() {
                state.last_correction = Instant::now();
            }
        });
        self.tick = (mode, speed);

        let error = if mode.holds_heading() {
            normalize_angle(target_heading - pose.theta())
        } else {
            0.0
        };
        trace!(%mode, %pose, error, "sampled error");
        Ok(error)
    }

    async fn handle_output(&mut self, output: f64) -> Result<()> {
        let (mode, speed) = self.tick;
        let command = match mode {
            Mode::Turn => DifferentialCommand::turn(output),
            Mode::Straight => DifferentialCommand::straight(output, speed),
            Mode::Stop => DifferentialCommand::stopped(),
            Mode::Neutral | Mode::WallFollow => return Ok(()),
        };
        self.driver.lock().await.set_motors(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{
        shared_driver, MotorCurve, SimulatedRobot, SimulationConfig, SimulationProbe,
    };
    use crate::localisation::FilterParams;
    use crate::map::Pose;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn plant_on(
        map: Map,
    ) -> (
        NavigationPlant,
        Arc<watch::Sender<NavigationState>>,
        SimulationProbe,
    ) {
        plant_correcting_every(map, Duration::from_secs(3600))
    }

    fn plant_correcting_every(
        map: Map,
        resample_interval: Duration,
    ) -> (
        NavigationPlant,
        Arc<watch::Sender<NavigationState>>,
        SimulationProbe,
    ) {
        let map = Arc::new(map);
        let robot = SimulatedRobot::new(map.clone(), MotorCurve::default(), SimulationConfig::default());
        let probe = robot.probe();
        let start = map.start_pose();
        let state = Arc::new(watch::Sender::new(NavigationState::new(start, 0.0)));
        let params = FilterParams {
            motion_error: 0.0,
            angle_error: 0.0,
            gyro_drift: 0.0,
            seed: Some(3),
            ..Default::default()
        };
        let plant = NavigationPlant::new(
            map,
            shared_driver(Box::new(robot)),
            state.clone(),
            ParticleFilter::with_params(start, 10, params),
            resample_interval,
            (start.theta(), 0.0),
        );
        (plant, state, probe)
    }

    #[tokio::test]
    async fn turn_error_is_normalized_heading_difference() {
        let (mut plant, state, _probe) = plant_on("22:1,1,0".parse().unwrap());
        state.send_modify(|state| {
            state.mode = Mode::Turn;
            state.target_heading = FRAC_PI_2 + std::f64::consts::TAU;
        });
        assert_relative_eq!(plant.error().await.unwrap(), FRAC_PI_2, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn idle_modes_report_no_error() {
        let (mut plant, state, _probe) = plant_on("22:1,1,0".parse().unwrap());
        state.send_modify(|state| state.target_heading = 1.0);
        assert_eq!(plant.error().await.unwrap(), 0.0);
        state.send_modify(|state| state.mode = Mode::WallFollow);
        assert_eq!(plant.error().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn neutral_issues_no_motor_command() {
        let (mut plant, _state, probe) = plant_on("22:1,1,0".parse().unwrap());
        plant.error().await.unwrap();
        plant.handle_output(0.7).await.unwrap();
        assert_eq!(probe.commands_received(), 0);
        plant.tick = (Mode::Stop, 0.5);
        plant.handle_output(0.7).await.unwrap();
        assert_eq!(probe.commands_received(), 1);
        assert!(probe.motors().is_stopped());
    }

    #[tokio::test]
    async fn publishes_pose_estimate() {
        let (mut plant, state, _probe) = plant_on("22:1.5,2.5,0.25".parse().unwrap());
        plant.error().await.unwrap();
        let pose: Pose = state.borrow().pose;
        assert_relative_eq!(pose.x(), 1.5, epsilon = 1e-12);
        assert_relative_eq!(pose.y(), 2.5, epsilon = 1e-12);
        assert_relative_eq!(pose.theta(), 0.25, epsilon = 1e-12);
    }

    fn boxed_map() -> Map {
        "22:1,1,0:0,0,3,0,N:3,0,3,3,N:3,3,0,3,N:0,3,0,0,N"
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn due_correction_resamples_against_ranges() {
        let (mut plant, state, _probe) = plant_correcting_every(boxed_map(), Duration::ZERO);
        let before = state.borrow().last_correction;
        assert_eq!(plant.filter.scale(), 1.0);
        std::thread::sleep(Duration::from_millis(2));

        plant.error().await.unwrap();

        assert!(plant.filter.particles().iter().all(Option::is_some));
        // every copy of the true pose matches the readings exactly
        assert_relative_eq!(plant.filter.scale(), 10.0, epsilon = 1e-6);
        assert!(state.borrow().last_correction > before);
        let pose = state.borrow().pose;
        assert_relative_eq!(pose.x(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y(), 1.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn correction_waits_for_the_interval() {
        let (mut plant, state, _probe) = plant_on(boxed_map());
        let before = state.borrow().last_correction;

        plant.error().await.unwrap();

        assert_eq!(plant.filter.particles().iter().filter(|slot| slot.is_some()).count(), 1);
        assert_eq!(plant.filter.scale(), 1.0);
        assert_eq!(state.borrow().last_correction, before);
    }
}
