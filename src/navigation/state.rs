use crate::driver::RobotConfig;
use crate::map::Pose;
use crate::vision::BallColor;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hold the target heading, turning in place.
    Turn,
    /// Drive forward while holding the target heading.
    Straight,
    /// Reserved, produces no error and no output.
    WallFollow,
    /// Idle, no output at all.
    Neutral,
    /// Motors forced off.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    TurnRequested,
    DriveRequested,
    WallFollowRequested,
    HeadingReached,
    DistanceReached,
    Halt,
}

impl Mode {
    /// Transition table of the navigator.
    ///
    /// Finishing a straight segment leaves the robot in `Turn` so it keeps
    /// holding its heading. Completion events in any other mode are ignored.
    pub fn on(self, event: ModeEvent) -> Mode {
        match (self, event) {
            (_, ModeEvent::Halt) => Mode::Stop,
            (_, ModeEvent::TurnRequested) => Mode::Turn,
            (_, ModeEvent::DriveRequested) => Mode::Straight,
            (_, ModeEvent::WallFollowRequested) => Mode::WallFollow,
            (Mode::Straight, ModeEvent::DistanceReached) => Mode::Turn,
            (Mode::Turn, ModeEvent::HeadingReached) => Mode::Turn,
            (mode, ModeEvent::DistanceReached | ModeEvent::HeadingReached) => mode,
        }
    }

    pub fn holds_heading(&self) -> bool {
        matches!(self, Mode::Turn | Mode::Straight)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Mode::Turn => "TURN",
            Mode::Straight => "STRAIGHT",
            Mode::WallFollow => "WALL_FOLLOW",
            Mode::Neutral => "NEUTRAL",
            Mode::Stop => "STOP",
        };
        write!(f, "{name}")
    }
}

/// One consistent snapshot of the navigation session.
///
/// The control loop writes `pose`, `distance` and `last_correction`; the
/// navigator writes `mode`, `target_heading` and `speed`.
#[derive(Debug, Clone)]
pub struct NavigationState {
    pub pose: Pose,
    pub mode: Mode,
    /// Radians, not normalized.
    pub target_heading: f64,
    pub speed: f64,
    /// Odometer reading in inches at the last control tick.
    pub distance: f64,
    pub last_correction: Instant,
}

impl NavigationState {
    pub fn new(pose: Pose, distance: f64) -> Self {
        Self {
            pose,
            mode: Mode::Neutral,
            target_heading: pose.theta(),
            speed: 0.0,
            distance,
            last_correction: Instant::now(),
        }
    }

    pub fn apply(&mut self, event: ModeEvent) {
        self.mode = self.mode.on(event);
    }
}

/// Balls carried so far against the hopper capacities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallInventory {
    green: u32,
    red: u32,
    green_capacity: u32,
    red_capacity: u32,
}

impl BallInventory {
    pub fn new(green_capacity: u32, red_capacity: u32) -> Self {
        Self {
            green: 0,
            red: 0,
            green_capacity,
            red_capacity,
        }
    }

    pub fn from_config(config: &RobotConfig) -> Self {
        Self::new(config.green_capacity, config.red_capacity)
    }

    pub fn count(&self, color: BallColor) -> u32 {
        match color {
            BallColor::Green => self.green,
            BallColor::Red => self.red,
        }
    }

    pub fn has_capacity(&self, color: BallColor) -> bool {
        match color {
            BallColor::Green => self.green < self.green_capacity,
            BallColor::Red => self.red < self.red_capacity,
        }
    }

    pub fn record(&mut self, color: BallColor) {
        match color {
            BallColor::Green => self.green += 1,
            BallColor::Red => self.red += 1,
        }
    }
}
