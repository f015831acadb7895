use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.75,
        }
    }
}

/// Textbook PID with two quirks kept on purpose: the derivative term is the
/// raw difference between consecutive errors (not divided by elapsed time)
/// and the integral has no windup limit.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integral: f64,
    previous_error: f64,
    previous_time: Option<Instant>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            previous_error: 0.0,
            previous_time: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Feeds one error sample taken at `now` and returns the control output.
    pub fn update(&mut self, error: f64, now: Instant) -> f64 {
        let dt = self
            .previous_time
            .map(|previous| now.saturating_duration_since(previous).as_secs_f64())
            .unwrap_or(0.0);
        self.integral += error * dt;
        let p_term = self.gains.kp * error;
        let i_term = self.gains.ki * self.integral;
        let d_term = self.gains.kd * (error - self.previous_error);
        self.previous_error = error;
        self.previous_time = Some(now);
        p_term + i_term + d_term
    }
}

/// The system a control loop closes around.
#[async_trait]
pub trait ControlPlant: Send {
    /// Samples the current error signal.
    async fn error(&mut self) -> Result<f64>;
    /// Applies the controller output.
    async fn handle_output(&mut self, output: f64) -> Result<()>;
}

pub struct ControlLoopHandle {
    cancellation: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ControlLoopHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the loop and waits for the current iteration to be dropped.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancellation.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Runs `plant` under `controller` as fast as the scheduler allows,
/// yielding between iterations, until the returned handle is stopped or
/// dropped. Failed iterations are logged and the loop carries on.
pub fn spawn_control_loop<P>(mut controller: PidController, mut plant: P) -> ControlLoopHandle
where
    P: ControlPlant + 'static,
{
    let cancellation = CancellationToken::new();
    let task = tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            debug!(gains = ?controller.gains(), "control loop started");
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    result = run_iteration(&mut controller, &mut plant) => {
                        if let Err(err) = result {
                            error!("Control loop iteration failed with {:?}", err);
                        }
                    }
                }
                tokio::task::yield_now().await;
            }
            debug!("control loop stopped");
        }
    });
    ControlLoopHandle {
        cancellation,
        task: Some(task),
    }
}

async fn run_iteration<P: ControlPlant>(controller: &mut PidController, plant: &mut P) -> Result<()> {
    let error = plant.error().await?;
    let output = controller.update(error, Instant::now());
    trace!(error, output, "control tick");
    plant.handle_output(output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn gains(kp: f64, ki: f64, kd: f64) -> PidGains {
        PidGains { kp, ki, kd }
    }

    #[test]
    fn proportional_only_matches_error() {
        let mut controller = PidController::new(gains(1.0, 0.0, 0.0));
        let start = Instant::now();
        assert_relative_eq!(controller.update(1.0, start), 1.0);
        assert_relative_eq!(controller.update(1.0, start + Duration::from_millis(10)), 1.0);
    }

    #[test]
    fn first_sample_does_not_integrate() {
        let mut controller = PidController::new(gains(0.0, 1.0, 0.0));
        let start = Instant::now();
        assert_relative_eq!(controller.update(2.0, start), 0.0);
        assert_relative_eq!(
            controller.update(2.0, start + Duration::from_millis(500)),
            1.0
        );
        assert_relative_eq!(controller.integral(), 1.0);
    }

    #[test]
    fn integral_winds_up_without_limit() {
        let mut controller = PidController::new(gains(0.0, 1.0, 0.0));
        let start = Instant::now();
        for second in 0..=100 {
            controller.update(10.0, start + Duration::from_secs(second));
        }
        assert_relative_eq!(controller.integral(), 1000.0);
    }

    #[test]
    fn derivative_ignores_elapsed_time() {
        let start = Instant::now();
        let mut fast = PidController::new(gains(0.0, 0.0, 0.5));
        fast.update(1.0, start);
        let mut slow = fast.clone();
        let fast_output = fast.update(3.0, start + Duration::from_millis(1));
        let slow_output = slow.update(3.0, start + Duration::from_secs(10));
        assert_relative_eq!(fast_output, 1.0);
        assert_relative_eq!(slow_output, 1.0);
    }

    struct ConstantPlant {
        error: f64,
        outputs: Arc<Mutex<Vec<f64>>>,
    }

    #[async_trait]
    impl ControlPlant for ConstantPlant {
        async fn error(&mut self) -> Result<f64> {
            Ok(self.error)
        }

        async fn handle_output(&mut self, output: f64) -> Result<()> {
            self.outputs.lock().unwrap().push(output);
            Ok(())
        }
    }

    #[tokio::test]
    async fn loop_delivers_outputs_until_stopped() {
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let plant = ConstantPlant {
            error: 1.0,
            outputs: outputs.clone(),
        };
        let mut handle = spawn_control_loop(PidController::new(gains(1.0, 0.0, 0.0)), plant);
        while outputs.lock().unwrap().len() < 10 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop().await.unwrap();
        assert!(!handle.is_running());
        let outputs = outputs.lock().unwrap().clone();
        assert!(outputs.iter().all(|output| (output - 1.0).abs() < 1e-12));
    }

    struct FailingPlant {
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl ControlPlant for FailingPlant {
        async fn error(&mut self) -> Result<f64> {
            *self.calls.lock().unwrap() += 1;
            anyhow::bail!("sensor unavailable")
        }

        async fn handle_output(&mut self, _output: f64) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn loop_survives_failed_iterations() {
        let calls = Arc::new(Mutex::new(0));
        let mut handle = spawn_control_loop(
            PidController::new(PidGains::default()),
            FailingPlant {
                calls: calls.clone(),
            },
        );
        while *calls.lock().unwrap() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(handle.is_running());
        handle.stop().await.unwrap();
    }
}
