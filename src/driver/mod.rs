pub mod simulated;

use crate::differential_controller::DifferentialCommand;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use simulated::{SimulatedRobot, SimulationConfig, SimulationProbe};

/// Actuators and sensors of the robot.
///
/// Getters return the latest sample without blocking. Distances are in
/// inches, headings in radians.
#[async_trait]
pub trait RobotDriver: Send + Sync {
    fn heading_radians(&self) -> f64;
    /// Odometer reading since power on.
    fn total_distance(&self) -> f64;
    /// Range readings report `f64::INFINITY` when nothing is in range.
    fn range_left(&self) -> f64;
    fn range_front(&self) -> f64;
    fn range_right(&self) -> f64;
    async fn set_motors(&mut self, command: DifferentialCommand) -> Result<()>;
    async fn set_sorter(&mut self, angle_degrees: f64) -> Result<()>;
}

pub type SharedDriver = Arc<Mutex<Box<dyn RobotDriver>>>;

pub fn shared_driver(driver: Box<dyn RobotDriver>) -> SharedDriver {
    Arc::new(Mutex::new(driver))
}

/// Maps a requested motor power onto what the motor controllers accept.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MotorCurve {
    /// Power needed to overcome static friction.
    pub min_power: f64,
    pub power_scale: f64,
}

impl Default for MotorCurve {
    fn default() -> Self {
        Self {
            min_power: 0.07,
            power_scale: 0.35,
        }
    }
}

impl MotorCurve {
    /// Powers that would only just overcome friction are dropped to zero.
    pub fn apply(&self, power: f64) -> f64 {
        let power = power.clamp(-1.0, 1.0);
        let scaled = self.min_power * power.signum() + self.power_scale * power;
        if scaled.abs() - self.min_power < 0.01 {
            0.0
        } else {
            scaled
        }
    }

    pub fn apply_command(&self, command: &DifferentialCommand) -> DifferentialCommand {
        DifferentialCommand::new(self.apply(command.left()), self.apply(command.right()))
    }
}

/// Physical configuration of the chassis and ball handling.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RobotConfig {
    pub green_capacity: u32,
    pub red_capacity: u32,
    pub sorter_green_degrees: f64,
    pub sorter_red_degrees: f64,
    pub motor_curve: MotorCurve,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            green_capacity: 10,
            red_capacity: 4,
            sorter_green_degrees: 55.0,
            sorter_red_degrees: 120.0,
            motor_curve: MotorCurve::default(),
        }
    }
}
