use super::sensor_model::{score, simulate, RangeReadings};
use super::FilterParams;
use crate::map::{Map, Pose};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{trace, warn};

/// Population of pose hypotheses with a cumulative weight array.
///
/// `probs[i]` is the summed weight of particles `0..=i`, so drawing a uniform
/// number below `scale` and binary searching selects a particle in
/// proportion to its weight.
pub struct ParticleFilter {
    poses: Vec<Option<Pose>>,
    probs: Vec<f64>,
    scale: f64,
    params: FilterParams,
    rng: StdRng,
}

impl ParticleFilter {
    pub fn new(initial: Pose, particle_count: usize) -> Self {
        Self::with_params(initial, particle_count, FilterParams::default())
    }

    /// Only the first slot holds the initial pose. Every cumulative weight is
    /// one, so the first resample copies it into every slot.
    pub fn with_params(initial: Pose, particle_count: usize, params: FilterParams) -> Self {
        let particle_count = particle_count.max(1);
        let mut poses = vec![None; particle_count];
        poses[0] = Some(initial);
        Self {
            poses,
            probs: vec![1.0; particle_count],
            scale: 1.0,
            rng: rng_from_seed(params.seed),
            params,
        }
    }

    /// Builds a population from explicit, non negative weights.
    pub fn from_weighted(particles: Vec<(Pose, f64)>, params: FilterParams) -> Self {
        let mut total = 0.0;
        let (poses, probs) = particles
            .into_iter()
            .map(|(pose, weight)| {
                total += weight.max(0.0);
                (Some(pose), total)
            })
            .unzip();
        Self {
            poses,
            probs,
            scale: total,
            rng: rng_from_seed(params.seed),
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn particles(&self) -> &[Option<Pose>] {
        &self.poses
    }

    pub fn cumulative_weights(&self) -> &[f64] {
        &self.probs
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Propagates every particle through a noisy odometry step.
    ///
    /// `distance` is in grid units and is applied along the new heading.
    pub fn perturb(&mut self, distance: f64, angle: f64) {
        let FilterParams {
            motion_error,
            angle_error,
            gyro_drift,
            ..
        } = self.params;
        for slot in self.poses.iter_mut() {
            let Some(pose) = slot else {
                continue;
            };
            let turn_noise: f64 = self.rng.sample(StandardNormal);
            let drift_noise: f64 = self.rng.sample(StandardNormal);
            let theta =
                pose.theta() + angle * (1.0 + angle_error * turn_noise) + gyro_drift * drift_noise;
            let mut position = *pose.position();
            if distance != 0.0 {
                let distance_noise: f64 = self.rng.sample(StandardNormal);
                let travelled = distance * (1.0 + motion_error * distance_noise);
                position.x += travelled * theta.cos();
                position.y += travelled * theta.sin();
            }
            *slot = Some(Pose::from_na(position, theta));
        }
    }

    /// Sampling importance resampling against the latest range readings
    /// (grid units). Replaces the whole population.
    pub fn resample(&mut self, map: &Map, readings: &RangeReadings) {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            warn!(scale = self.scale, "degenerate particle weights, resetting to uniform");
            self.reset_weights();
        }
        let particle_count = self.poses.len();
        let mut poses = Vec::with_capacity(particle_count);
        let mut probs = Vec::with_capacity(particle_count);
        let mut total = 0.0;
        for _ in 0..particle_count {
            let k = self.rng.gen::<f64>() * self.scale;
            let pose = self.poses[self.find(k)];
            if let Some(pose) = &pose {
                total += score(&simulate(pose, map), readings, self.scale, &self.params);
            }
            poses.push(pose);
            probs.push(total);
        }
        trace!(previous_scale = self.scale, scale = total, "resampled");
        self.poses = poses;
        self.probs = probs;
        self.scale = total;
    }

    /// Weighted mean position and circular mean heading.
    ///
    /// The heading average misbehaves when the population is multimodal.
    /// Falls back to an unweighted mean when the total weight is zero or not finite.
    pub fn representative_pose(&self) -> Pose {
        let uniform = !(self.scale.is_finite() && self.scale > 0.0);
        if uniform {
            trace!(scale = self.scale, "degenerate weights, averaging particles uniformly");
        }
        let mut previous = 0.0;
        let mut total = 0.0;
        let (mut x, mut y, mut cos, mut sin) = (0.0, 0.0, 0.0, 0.0);
        for (slot, cumulative) in self.poses.iter().zip(&self.probs) {
            let weight = if uniform { 1.0 } else { cumulative - previous };
            previous = *cumulative;
            if let Some(pose) = slot {
                total += weight;
                x += pose.x() * weight;
                y += pose.y() * weight;
                cos += pose.theta().cos() * weight;
                sin += pose.theta().sin() * weight;
            }
        }
        Pose::new((x / total, y / total), sin.atan2(cos))
    }

    /// Index of the first particle whose cumulative weight exceeds `k`.
    fn find(&self, k: f64) -> usize {
        self.probs
            .partition_point(|cumulative| *cumulative <= k)
            .min(self.probs.len() - 1)
    }

    fn reset_weights(&mut self) {
        let mut total = 0.0;
        for (slot, cumulative) in self.poses.iter().zip(self.probs.iter_mut()) {
            if slot.is_some() {
                total += 1.0;
            }
            *cumulative = total;
        }
        self.scale = total;
    }
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
