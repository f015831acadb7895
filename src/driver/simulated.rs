//! Kinematic stand in for the robot hardware.
//!
//! The simulation is advanced lazily: every sensor read or command first
//! integrates the motion since the previous access at the motor powers that
//! were in effect.

use super::{MotorCurve, RobotDriver};
use crate::differential_controller::DifferentialCommand;
use crate::localisation::sensor_model::SENSOR_HORIZON_METERS;
use crate::map::{Map, Pose};
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Deserialize;
use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Wheel surface speed at full motor power, inches per second.
    pub max_wheel_speed_inches: f64,
    pub track_width_inches: f64,
    /// Standard deviation of range sensor noise in inches.
    pub range_noise_inches: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_wheel_speed_inches: 60.0,
            track_width_inches: 14.0,
            range_noise_inches: 0.0,
            seed: None,
        }
    }
}

struct SimulationState {
    /// Grid units.
    pose: Pose,
    odometer_inches: f64,
    motors: DifferentialCommand,
    sorter_degrees: Option<f64>,
    commands_received: usize,
    last_update: Instant,
    rng: StdRng,
}

impl SimulationState {
    fn step(&mut self, dt: Duration, map: &Map, config: &SimulationConfig) {
        let dt = dt.as_secs_f64();
        let left = self.motors.left() * config.max_wheel_speed_inches;
        let right = self.motors.right() * config.max_wheel_speed_inches;
        let speed = (left + right) / 2.0;
        // positive heading error drives the left wheel forward
        let yaw_rate = (left - right) / config.track_width_inches;

        let travelled = speed * dt;
        let mid_heading = self.pose.theta() + yaw_rate * dt / 2.0;
        let grid_travelled = map.inches_to_grid_units(travelled);
        self.pose = Pose::new(
            (
                self.pose.x() + grid_travelled * mid_heading.cos(),
                self.pose.y() + grid_travelled * mid_heading.sin(),
            ),
            self.pose.theta() + yaw_rate * dt,
        );
        self.odometer_inches += travelled;
    }
}

/// Read only view into a [`SimulatedRobot`] that survives the robot being
/// boxed into a driver.
#[derive(Clone)]
pub struct SimulationProbe {
    state: Arc<Mutex<SimulationState>>,
}

impl SimulationProbe {
    /// Ground truth pose in grid units.
    pub fn true_pose(&self) -> Pose {
        self.state.lock().unwrap().pose
    }

    pub fn odometer_inches(&self) -> f64 {
        self.state.lock().unwrap().odometer_inches
    }

    /// Motor powers after the motor curve.
    pub fn motors(&self) -> DifferentialCommand {
        self.state.lock().unwrap().motors
    }

    pub fn sorter_degrees(&self) -> Option<f64> {
        self.state.lock().unwrap().sorter_degrees
    }

    pub fn commands_received(&self) -> usize {
        self.state.lock().unwrap().commands_received
    }
}

pub struct SimulatedRobot {
    map: Arc<Map>,
    config: SimulationConfig,
    motor_curve: MotorCurve,
    state: Arc<Mutex<SimulationState>>,
}

impl SimulatedRobot {
    /// Places the robot at the start pose of `map`.
    pub fn new(map: Arc<Map>, motor_curve: MotorCurve, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = SimulationState {
            pose: map.start_pose(),
            odometer_inches: 0.0,
            motors: DifferentialCommand::stopped(),
            sorter_degrees: None,
            commands_received: 0,
            last_update: Instant::now(),
            rng,
        };
        Self {
            map,
            config,
            motor_curve,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn probe(&self) -> SimulationProbe {
        SimulationProbe {
            state: self.state.clone(),
        }
    }

    fn advance(&self) -> MutexGuard<'_, SimulationState> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let dt = now.saturating_duration_since(state.last_update);
        state.step(dt, &self.map, &self.config);
        state.last_update = now;
        state
    }

    fn range(&self, offset: f64) -> f64 {
        let mut state = self.advance();
        let horizon = self.map.meters_to_grid_units(SENSOR_HORIZON_METERS);
        let grid_range =
            self.map
                .ray_distance(state.pose.position(), state.pose.theta() + offset, horizon);
        let inches = grid_range * self.map.grid_size();
        if inches.is_finite() && self.config.range_noise_inches > 0.0 {
            let noise: f64 = state.rng.sample(StandardNormal);
            (inches + noise * self.config.range_noise_inches).max(0.0)
        } else {
            inches
        }
    }
}

#[async_trait]
impl RobotDriver for SimulatedRobot {
    fn heading_radians(&self) -> f64 {
        self.advance().pose.theta()
    }

    fn total_distance(&self) -> f64 {
        self.advance().odometer_inches
    }

    fn range_left(&self) -> f64 {
        self.range(FRAC_PI_2)
    }

    fn range_front(&self) -> f64 {
        self.range(0.0)
    }

    fn range_right(&self) -> f64 {
        self.range(-FRAC_PI_2)
    }

    async fn set_motors(&mut self, command: DifferentialCommand) -> Result<()> {
        let motors = self.motor_curve.apply_command(&command);
        let mut state = self.advance();
        if state.motors != motors {
            trace!(left = motors.left(), right = motors.right(), "motors changed");
        }
        state.motors = motors;
        state.commands_received += 1;
        Ok(())
    }

    async fn set_sorter(&mut self, angle_degrees: f64) -> Result<()> {
        self.advance().sorter_degrees = Some(angle_degrees);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn open_map() -> Arc<Map> {
        Arc::new("22:0,0,0".parse().unwrap())
    }

    fn step(robot: &SimulatedRobot, motors: DifferentialCommand, seconds: f64) {
        let mut state = robot.state.lock().unwrap();
        state.motors = motors;
        state.step(Duration::from_secs_f64(seconds), &robot.map, &robot.config);
    }

    #[test]
    fn equal_powers_drive_straight() {
        let robot = SimulatedRobot::new(open_map(), MotorCurve::default(), SimulationConfig::default());
        step(&robot, DifferentialCommand::new(0.5, 0.5), 1.1);
        let probe = robot.probe();
        // 0.5 of 60 inches per second for 1.1 seconds is 33 inches
        assert_relative_eq!(probe.odometer_inches(), 33.0, epsilon = 1e-9);
        assert_relative_eq!(probe.true_pose().x(), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(probe.true_pose().y(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probe.true_pose().theta(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn opposite_powers_turn_in_place() {
        let robot = SimulatedRobot::new(open_map(), MotorCurve::default(), SimulationConfig::default());
        step(&robot, DifferentialCommand::new(0.35, -0.35), 0.5);
        let pose = robot.probe().true_pose();
        // 21 inches per second each way on a 14 inch track
        assert_relative_eq!(pose.theta(), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.x(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(robot.probe().odometer_inches(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ranges_are_reported_in_inches() {
        let robot = SimulatedRobot::new(
            Arc::new(Map::default_arena()),
            MotorCurve::default(),
            SimulationConfig::default(),
        );
        assert_relative_eq!(robot.range_front(), 22.0, epsilon = 1e-6);
        assert_relative_eq!(robot.range_right(), 22.0, epsilon = 1e-6);
        assert_relative_eq!(robot.range_left(), 22.0, epsilon = 1e-6);
        assert_relative_eq!(robot.heading_radians(), 0.0);
    }

    #[test]
    fn nothing_in_range_is_infinite() {
        let robot = SimulatedRobot::new(open_map(), MotorCurve::default(), SimulationConfig::default());
        assert!(robot.range_front().is_infinite());
    }

    #[tokio::test]
    async fn commands_pass_through_motor_curve() {
        let mut robot =
            SimulatedRobot::new(open_map(), MotorCurve::default(), SimulationConfig::default());
        let probe = robot.probe();
        robot
            .set_motors(DifferentialCommand::new(1.0, 0.01))
            .await
            .unwrap();
        robot.set_sorter(55.0).await.unwrap();
        assert_relative_eq!(probe.motors().left(), 0.42, epsilon = 1e-12);
        assert_eq!(probe.motors().right(), 0.0);
        assert_eq!(probe.sorter_degrees(), Some(55.0));
        assert_eq!(probe.commands_received(), 1);
    }
}
