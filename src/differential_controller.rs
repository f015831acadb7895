use std::f64::consts::PI;

/// Left and right motor powers, nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DifferentialCommand {
    left: f64,
    right: f64,
}

impl DifferentialCommand {
    pub fn new(left: f64, right: f64) -> DifferentialCommand {
        DifferentialCommand { left, right }
    }

    pub fn stopped() -> Self {
        Self::default()
    }

    /// Turn in place, full power at half a turn of heading error.
    pub fn turn(error: f64) -> Self {
        Self::new(error / PI, -error / PI)
    }

    /// Drive at `speed` while steering out `error`.
    pub fn straight(error: f64, speed: f64) -> Self {
        let turn = Self::turn(error);
        Self::new(turn.left + speed, turn.right + speed)
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn is_stopped(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}
