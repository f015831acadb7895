mod plant;
pub mod state;

use crate::configuration::AppConfig;
use crate::differential_controller::DifferentialCommand;
use crate::driver::{RobotConfig, SharedDriver};
use crate::error::{NavigationError, NavigationResult};
use crate::geometry::normalize_angle;
use crate::localisation::ParticleFilter;
use crate::map::{Map, Point, Pose};
use crate::path_finder::{AStarPlanner, PathPlanner};
use crate::pid::{spawn_control_loop, ControlLoopHandle, PidController};
use crate::vision::{BallColor, BallTracker};
use nalgebra as na;
use plant::NavigationPlant;
use rand::Rng;
use serde::Deserialize;
use std::f64::consts::FRAC_PI_4;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use state::{BallInventory, Mode, ModeEvent, NavigationState};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NavigationConfig {
    pub turn_threshold_degrees: f64,
    /// Motor power used between waypoints.
    pub cruise_speed: f64,
    /// Motor power used when closing in on a ball.
    pub approach_speed: f64,
    /// Farthest a single ball approach drives when the front sensor sees nothing.
    pub ball_approach_limit_squares: f64,
    pub poll_interval_ms: u64,
    /// Blocking waits give up after this long. Waits are unbounded when unset.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            turn_threshold_degrees: 10.0,
            cruise_speed: 0.5,
            approach_speed: 0.3,
            ball_approach_limit_squares: 2.0,
            poll_interval_ms: 50,
            wait_timeout_ms: None,
        }
    }
}

impl NavigationConfig {
    fn turn_threshold(&self) -> f64 {
        self.turn_threshold_degrees.to_radians()
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinOutcome {
    /// Full turn without seeing a ball we can carry.
    Completed,
    /// Spin was interrupted and a ball of this color was collected.
    Collected(BallColor),
}

/// Remaining distance in grid units below which forward speed is capped.
const SPEED_RAMP: [(f64, f64); 2] = [(2.0, 0.2), (5.0, 0.3)];

fn ramped_speed(speed: f64, remaining_squares: f64) -> f64 {
    SPEED_RAMP
        .iter()
        .find(|(below, _)| remaining_squares < *below)
        .map(|(_, cap)| speed.min(*cap))
        .unwrap_or(speed)
}

/// Turns a waypoint list into `(heading, distance)` drive segments.
/// Zero length hops are dropped.
pub fn route_segments(path: &[Point]) -> Vec<(f64, f64)> {
    path.windows(2)
        .filter_map(|pair| {
            let delta = pair[1] - pair[0];
            let distance = delta.norm();
            (distance > 0.0).then(|| (delta.y.atan2(delta.x), distance))
        })
        .collect()
}

/// Drives the robot through turns, straight segments and planned routes.
///
/// The pose estimate and motor commands are owned by a background control
/// loop. The navigator only changes mode, heading and speed, then waits for
/// the loop to report completion.
pub struct Navigator {
    map: Arc<Map>,
    driver: SharedDriver,
    tracker: Arc<dyn BallTracker>,
    planner: Box<dyn PathPlanner>,
    state: Arc<watch::Sender<NavigationState>>,
    inventory: BallInventory,
    config: NavigationConfig,
    robot: RobotConfig,
    cancellation: CancellationToken,
    control_loop: ControlLoopHandle,
}

impl Navigator {
    /// Seeds the estimator at the start pose of `map` and starts the control loop.
    pub async fn start(
        map: Arc<Map>,
        driver: SharedDriver,
        tracker: Arc<dyn BallTracker>,
        config: &AppConfig,
    ) -> Self {
        let start = map.start_pose();
        let baseline = {
            let driver = driver.lock().await;
            (driver.heading_radians(), driver.total_distance())
        };
        let state = Arc::new(watch::Sender::new(NavigationState::new(start, baseline.1)));
        let filter = ParticleFilter::with_params(
            start,
            config.localisation.particles,
            config.localisation.noise,
        );
        let plant = NavigationPlant::new(
            map.clone(),
            driver.clone(),
            state.clone(),
            filter,
            config.localisation.resample_interval(),
            baseline,
        );
        let control_loop = spawn_control_loop(PidController::new(config.control), plant);
        info!(%start, "navigator started");
        Self {
            map,
            driver,
            tracker,
            planner: Box::new(AStarPlanner),
            state,
            inventory: BallInventory::from_config(&config.robot),
            config: config.navigation.clone(),
            robot: config.robot.clone(),
            cancellation: CancellationToken::new(),
            control_loop,
        }
    }

    pub fn with_planner(mut self, planner: Box<dyn PathPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Current best pose estimate.
    pub fn pose(&self) -> Pose {
        self.state.borrow().pose
    }

    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    pub fn snapshot(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn inventory(&self) -> &BallInventory {
        &self.inventory
    }

    /// Cancelling the token aborts the current and every later blocking wait.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn halt(&self) {
        self.apply(ModeEvent::Halt);
    }

    /// Enters the reserved wall following mode. The control loop reports
    /// zero error and sends no motor commands while in it.
    pub fn wall_follow(&self) {
        self.apply(ModeEvent::WallFollowRequested);
    }

    pub async fn forward_squares(&self, speed: f64, squares: f64) -> NavigationResult<()> {
        self.forward_inches(speed, squares * self.map.grid_size())
            .await
    }

    /// Drives forward until the odometer advanced by `inches`. Speed is
    /// capped as the remaining distance shrinks.
    pub async fn forward_inches(&self, speed: f64, inches: f64) -> NavigationResult<()> {
        let until = self.state.borrow().distance + inches;
        debug!(speed, inches, "driving forward");
        self.state.send_modify(|state| {
            state.speed = speed;
            state.apply(ModeEvent::DriveRequested);
        });
        self.wait_until(|state| {
            let remaining = self.map.inches_to_grid_units(until - state.distance);
            let capped = ramped_speed(speed, remaining);
            self.state.send_if_modified(|state| {
                if state.speed != capped {
                    state.speed = capped;
                    true
                } else {
                    false
                }
            });
            state.distance >= until
        })
        .await?;
        self.apply(ModeEvent::DistanceReached);
        Ok(())
    }

    pub async fn turn_radians(&self, radians: f64) -> NavigationResult<()> {
        let target = self.state.borrow().target_heading + radians;
        self.turn_to_heading_radians(target).await
    }

    /// Turns in place until the estimated heading is within the turn threshold of `heading`.
    pub async fn turn_to_heading_radians(&self, heading: f64) -> NavigationResult<()> {
        debug!(heading = heading.to_degrees(), "turning");
        self.state.send_modify(|state| {
            state.target_heading = heading;
            state.apply(ModeEvent::TurnRequested);
        });
        let threshold = self.config.turn_threshold();
        self.wait_until(|state| {
            normalize_angle(state.target_heading - state.pose.theta()).abs() < threshold
        })
        .await?;
        self.apply(ModeEvent::HeadingReached);
        Ok(())
    }

    /// Plans a route from the current pose estimate and drives it as
    /// turn then straight segments. Returns the planned waypoints.
    pub async fn move_to_point(&self, destination: Point) -> NavigationResult<Vec<Point>> {
        let origin = *self.pose().position();
        let path = self.planner.plan(&self.map, origin, destination)?;
        info!(
            waypoints = path.len(),
            "planned route to ({:.2}, {:.2})", destination.x, destination.y
        );
        for (heading, distance) in route_segments(&path) {
            self.turn_to_heading_radians(heading).await?;
            self.forward_squares(self.config.cruise_speed, distance)
                .await?;
        }
        let pose = self.pose();
        debug!(
            %pose,
            miss = na::distance(pose.position(), &destination),
            "route finished"
        );
        Ok(path)
    }

    /// Drives to `count` random points inside the map bounds. An unreachable
    /// point is replaced by a fresh one, giving up after `max_attempts`
    /// unreachable points in a row.
    pub async fn random_walk<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        max_attempts: usize,
    ) -> NavigationResult<()> {
        let mut reached = 0;
        let mut failures = 0;
        while reached < count {
            let destination = self.map.random_point(rng);
            match self.move_to_point(destination).await {
                Ok(_) => {
                    reached += 1;
                    failures = 0;
                    info!(reached, count, "destination reached");
                }
                Err(err @ NavigationError::NoPathFound { .. }) => {
                    failures += 1;
                    if failures >= max_attempts {
                        warn!(attempts = failures, "no reachable destination, giving up");
                        return Err(err);
                    }
                    debug!("{err}, picking another destination");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Turns a full circle in eighths, stopping early to collect any ball
    /// that is visible and still fits in the hopper.
    pub async fn spin(&mut self) -> NavigationResult<SpinOutcome> {
        for _ in 0..8 {
            self.turn_radians(FRAC_PI_4).await?;
            if let Some(color) = self.interrupt() {
                info!(%color, "spin interrupted by ball");
                self.get_ball(color).await?;
                return Ok(SpinOutcome::Collected(color));
            }
        }
        Ok(SpinOutcome::Completed)
    }

    pub async fn get_green_ball(&mut self) -> NavigationResult<()> {
        self.get_ball(BallColor::Green).await
    }

    pub async fn get_red_ball(&mut self) -> NavigationResult<()> {
        self.get_ball(BallColor::Red).await
    }

    /// Servoes onto the ball while it stays visible, then sorts it.
    pub async fn get_ball(&mut self, color: BallColor) -> NavigationResult<()> {
        let limit_inches = self.config.ball_approach_limit_squares * self.map.grid_size();
        while let Some(bearing) = self.tracker.bearing(color) {
            let heading = self.pose().theta() + bearing.to_radians();
            self.turn_to_heading_radians(heading).await?;
            let front = self.driver.lock().await.range_front();
            let approach = if front.is_finite() && front > 0.0 {
                front
            } else {
                limit_inches
            };
            self.forward_inches(self.config.approach_speed, approach)
                .await?;
            let poll_interval = self.config.poll_interval();
            self.cancellable(async {
                tokio::time::sleep(poll_interval).await;
                Ok(())
            })
            .await?;
        }
        let sorter = match color {
            BallColor::Green => self.robot.sorter_green_degrees,
            BallColor::Red => self.robot.sorter_red_degrees,
        };
        self.driver
            .lock()
            .await
            .set_sorter(sorter)
            .await
            .map_err(NavigationError::Driver)?;
        self.halt();
        self.inventory.record(color);
        info!(%color, count = self.inventory.count(color), "ball collected");
        Ok(())
    }

    /// Halts the robot and stops the control loop.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.halt();
        self.control_loop.stop().await?;
        self.driver
            .lock()
            .await
            .set_motors(DifferentialCommand::stopped())
            .await
    }

    fn interrupt(&self) -> Option<BallColor> {
        BallColor::ALL.into_iter().find(|color| {
            self.inventory.has_capacity(*color) && self.tracker.bearing(*color).is_some()
        })
    }

    fn apply(&self, event: ModeEvent) {
        self.state.send_if_modified(|state| {
            let previous = state.mode;
            state.apply(event);
            if previous != state.mode {
                info!(from = %previous, to = %state.mode, "mode changed");
            }
            previous != state.mode
        });
    }

    /// Blocks until `done` holds for a state snapshot. Halts the robot when
    /// the wait is cancelled or times out.
    async fn wait_until<F>(&self, mut done: F) -> NavigationResult<()>
    where
        F: FnMut(&NavigationState) -> bool,
    {
        let mut receiver = self.state.subscribe();
        let wait = async {
            loop {
                let snapshot = receiver.borrow_and_update().clone();
                if done(&snapshot) {
                    return Ok(());
                }
                if receiver.changed().await.is_err() {
                    return Err(NavigationError::Cancelled);
                }
            }
        };
        let result = match self.config.wait_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, self.cancellable(wait)).await {
                Ok(result) => result,
                Err(_) => Err(NavigationError::UnreachableTarget { waited: timeout }),
            },
            None => self.cancellable(wait).await,
        };
        if let Err(err) = &result {
            warn!("Wait aborted with {}, halting", err);
            self.halt();
        }
        result
    }

    async fn cancellable<T>(
        &self,
        future: impl Future<Output = NavigationResult<T>>,
    ) -> NavigationResult<T> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(NavigationError::Cancelled),
            result = future => result,
        }
    }
}
