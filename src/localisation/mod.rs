pub mod particle_filter;
pub mod sensor_model;

use serde::Deserialize;
use std::time::Duration;

pub use particle_filter::ParticleFilter;
pub use sensor_model::{simulate, RangeReadings};

/// Noise model of the estimator.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FilterParams {
    /// Relative standard deviation of travelled distance.
    pub motion_error: f64,
    /// Relative standard deviation of turned angle.
    pub angle_error: f64,
    /// Radians of heading drift per update.
    pub gyro_drift: f64,
    /// Range sensor standard deviation in grid units.
    pub sensor_std_err: f64,
    /// Probability floor of a single range reading.
    pub flakiness: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            motion_error: 0.04,
            angle_error: 0.02,
            gyro_drift: 0.0008,
            sensor_std_err: 0.1,
            flakiness: 0.05,
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LocalisationConfig {
    pub particles: usize,
    /// Time between corrections against the range sensors.
    pub resample_interval_ms: u64,
    pub noise: FilterParams,
}

impl Default for LocalisationConfig {
    fn default() -> Self {
        Self {
            particles: 1000,
            resample_interval_ms: 2000,
            noise: FilterParams::default(),
        }
    }
}

impl LocalisationConfig {
    pub fn resample_interval(&self) -> Duration {
        Duration::from_millis(self.resample_interval_ms)
    }
}
