//! Range sensor model used to weigh pose hypotheses.

use super::FilterParams;
use crate::map::{Map, Pose};
use std::f64::consts::FRAC_PI_2;
use tracing::trace;

/// Range sensors see this far before reporting nothing.
pub const SENSOR_HORIZON_METERS: f64 = 10.0;

/// Left, front and right range readings in grid units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeReadings {
    pub left: f64,
    pub front: f64,
    pub right: f64,
}

impl RangeReadings {
    pub fn new(left: f64, front: f64, right: f64) -> Self {
        Self { left, front, right }
    }

    /// Converts raw readings in inches to grid units.
    ///
    /// A reading that is zero, negative or not a number is a sensor fault and
    /// is treated as "nothing in range".
    pub fn from_inches(map: &Map, left: f64, front: f64, right: f64) -> Self {
        let convert = |name: &str, inches: f64| {
            if inches.is_nan() || inches <= 0.0 {
                trace!(sensor = name, inches, "faulty range reading");
                f64::INFINITY
            } else {
                map.inches_to_grid_units(inches)
            }
        };
        Self {
            left: convert("left", left),
            front: convert("front", front),
            right: convert("right", right),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.left, self.front, self.right]
    }
}

/// Readings an ideal robot at `pose` would get.
pub fn simulate(pose: &Pose, map: &Map) -> RangeReadings {
    let horizon = map.meters_to_grid_units(SENSOR_HORIZON_METERS);
    let cast = |offset: f64| map.ray_distance(pose.position(), pose.theta() + offset, horizon);
    RangeReadings {
        left: cast(FRAC_PI_2),
        front: cast(0.0),
        right: cast(-FRAC_PI_2),
    }
}

/// Likelihood of `actual` readings given `simulated` ones, before the
/// population scale guard is applied.
pub fn likelihood(simulated: &RangeReadings, actual: &RangeReadings, params: &FilterParams) -> f64 {
    simulated
        .as_array()
        .iter()
        .zip(actual.as_array())
        .map(|(expected, measured)| {
            let z = standard_error(measured, *expected, params.sensor_std_err);
            params.flakiness + (1.0 - params.flakiness) * (-(z * z) / 2.0).exp()
        })
        .product()
}

/// Scores a hypothesis. `scale` is the total weight of the current population;
/// dividing by its square root keeps weights from collapsing or exploding
/// across repeated resamples.
pub fn score(
    simulated: &RangeReadings,
    actual: &RangeReadings,
    scale: f64,
    params: &FilterParams,
) -> f64 {
    likelihood(simulated, actual, params) / scale.sqrt()
}

fn standard_error(measured: f64, expected: f64, std_err: f64) -> f64 {
    // both saturated agree perfectly, one saturated is as bad as it gets
    if measured.is_infinite() && expected.is_infinite() && measured.signum() == expected.signum() {
        return 0.0;
    }
    let z = (measured - expected) / (std::f64::consts::SQRT_2 * std_err);
    if z.is_nan() {
        f64::INFINITY
    } else {
        z
    }
}
