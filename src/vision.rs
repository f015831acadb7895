use std::fmt;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BallColor {
    Green,
    Red,
}

impl BallColor {
    pub const ALL: [BallColor; 2] = [BallColor::Green, BallColor::Red];
}

impl fmt::Display for BallColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BallColor::Green => write!(f, "green"),
            BallColor::Red => write!(f, "red"),
        }
    }
}

/// Source of ball bearings produced by the vision pipeline.
pub trait BallTracker: Send + Sync {
    /// Bearing to the tracked ball in degrees, counter clockwise positive,
    /// or `None` when the ball is not visible.
    fn bearing(&self, color: BallColor) -> Option<f64>;
}

/// Latest bearing per color, written by the vision pipeline and read by the
/// navigator.
#[derive(Debug, Default)]
pub struct SharedBallTracker {
    green: RwLock<Option<f64>>,
    red: RwLock<Option<f64>>,
}

impl SharedBallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, color: BallColor, bearing: Option<f64>) {
        *self.slot(color).write().unwrap() = bearing;
    }

    fn slot(&self, color: BallColor) -> &RwLock<Option<f64>> {
        match color {
            BallColor::Green => &self.green,
            BallColor::Red => &self.red,
        }
    }
}

impl BallTracker for SharedBallTracker {
    fn bearing(&self, color: BallColor) -> Option<f64> {
        *self.slot(color).read().unwrap()
    }
}
