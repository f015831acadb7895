//! Planar helpers shared by the planner, the estimator and the navigator.
//!
//! Everything here works in grid units.

use nalgebra as na;
use std::f64::consts::{PI, TAU};

/// Maps any angle in radians into `(-PI, PI]`.
pub fn normalize_angle(mut radians: f64) -> f64 {
    if !radians.is_finite() {
        return radians;
    }
    while radians > PI {
        radians -= TAU;
    }
    while radians <= -PI {
        radians += TAU;
    }
    radians
}

/// Shortest distance from `point` to the segment `start..end`.
pub fn point_segment_distance(
    point: &na::Point2<f64>,
    start: &na::Point2<f64>,
    end: &na::Point2<f64>,
) -> f64 {
    let segment = end - start;
    let length_squared = segment.norm_squared();
    if length_squared == 0.0 {
        return na::distance(point, start);
    }
    let t = ((point - start).dot(&segment) / length_squared).clamp(0.0, 1.0);
    na::distance(point, &(start + segment * t))
}

/// Distance along the ray from `origin` in direction `theta` to the segment
/// `start..end`, if the segment is hit within `max_range`.
pub fn ray_segment_distance(
    origin: &na::Point2<f64>,
    theta: f64,
    max_range: f64,
    start: &na::Point2<f64>,
    end: &na::Point2<f64>,
) -> Option<f64> {
    let direction = na::Vector2::new(theta.cos(), theta.sin());
    let segment = end - start;
    let denominator = direction.perp(&segment);
    if denominator.abs() < f64::EPSILON {
        // parallel, grazing hits are ignored
        return None;
    }
    let to_start = start - origin;
    let range = to_start.perp(&segment) / denominator;
    let along_segment = to_start.perp(&direction) / denominator;
    if range > 0.0 && range <= max_range && (0.0..=1.0).contains(&along_segment) {
        Some(range)
    } else {
        None
    }
}

/// True when the segments `a_start..a_end` and `b_start..b_end` cross or touch.
pub fn segments_intersect(
    a_start: &na::Point2<f64>,
    a_end: &na::Point2<f64>,
    b_start: &na::Point2<f64>,
    b_end: &na::Point2<f64>,
) -> bool {
    let a = a_end - a_start;
    let b = b_end - b_start;
    let denominator = a.perp(&b);
    if denominator.abs() < f64::EPSILON {
        return false;
    }
    let offset = b_start - a_start;
    let along_a = offset.perp(&b) / denominator;
    let along_b = offset.perp(&a) / denominator;
    (0.0..=1.0).contains(&along_a) && (0.0..=1.0).contains(&along_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn normalize_stays_in_half_open_range() {
        for step in -400..400 {
            let theta = step as f64 * 0.1;
            let normalized = normalize_angle(theta);
            assert!(normalized > -PI && normalized <= PI, "{theta} -> {normalized}");
        }
    }

    #[test]
    fn normalize_is_periodic() {
        for step in -50..50 {
            let theta = step as f64 * 0.37;
            assert_abs_diff_eq!(
                normalize_angle(theta + TAU),
                normalize_angle(theta),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn normalize_maps_minus_pi_to_pi() {
        assert_relative_eq!(normalize_angle(-PI), PI);
        assert_relative_eq!(normalize_angle(PI), PI);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI).abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn distance_to_segment_interior_and_ends() {
        let start = na::Point2::new(0.0, 0.0);
        let end = na::Point2::new(2.0, 0.0);
        assert_relative_eq!(
            point_segment_distance(&na::Point2::new(1.0, 0.5), &start, &end),
            0.5
        );
        assert_relative_eq!(
            point_segment_distance(&na::Point2::new(3.0, 0.0), &start, &end),
            1.0
        );
        assert_relative_eq!(
            point_segment_distance(&na::Point2::new(-3.0, 4.0), &start, &end),
            5.0
        );
    }

    #[test]
    fn distance_to_degenerate_segment() {
        let point = na::Point2::new(1.0, 1.0);
        assert_relative_eq!(
            point_segment_distance(&point, &na::Point2::origin(), &na::Point2::origin()),
            2.0_f64.sqrt()
        );
    }

    #[test]
    fn ray_hits_wall_in_front() {
        let hit = ray_segment_distance(
            &na::Point2::new(0.0, 0.0),
            0.0,
            10.0,
            &na::Point2::new(3.0, -1.0),
            &na::Point2::new(3.0, 1.0),
        );
        assert_relative_eq!(hit.unwrap(), 3.0);
    }

    #[test]
    fn ray_misses_wall_behind_or_out_of_range() {
        let start = na::Point2::new(3.0, -1.0);
        let end = na::Point2::new(3.0, 1.0);
        let origin = na::Point2::new(0.0, 0.0);
        assert!(ray_segment_distance(&origin, PI, 10.0, &start, &end).is_none());
        assert!(ray_segment_distance(&origin, 0.0, 2.0, &start, &end).is_none());
        assert!(ray_segment_distance(&origin, PI / 2.0, 10.0, &start, &end).is_none());
    }

    #[test]
    fn crossing_segments() {
        let origin = na::Point2::new(0.0, 0.0);
        assert!(segments_intersect(
            &origin,
            &na::Point2::new(2.0, 2.0),
            &na::Point2::new(0.0, 2.0),
            &na::Point2::new(2.0, 0.0),
        ));
        assert!(!segments_intersect(
            &origin,
            &na::Point2::new(0.9, 0.9),
            &na::Point2::new(0.0, 2.0),
            &na::Point2::new(2.0, 0.0),
        ));
        // parallel
        assert!(!segments_intersect(
            &origin,
            &na::Point2::new(1.0, 0.0),
            &na::Point2::new(0.0, 1.0),
            &na::Point2::new(1.0, 1.0),
        ));
    }

    #[test]
    fn ray_hits_diagonal_wall() {
        let hit = ray_segment_distance(
            &na::Point2::new(2.0, 1.0),
            PI / 4.0,
            10.0,
            &na::Point2::new(3.0, 1.0),
            &na::Point2::new(2.0, 2.0),
        )
        .unwrap();
        assert_relative_eq!(hit, 0.5_f64.sqrt(), epsilon = 1e-12);
    }
}
