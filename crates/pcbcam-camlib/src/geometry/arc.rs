//! Circular arc discretisation.

use geo::Coord;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Sweep direction of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    /// Clockwise (G02).
    Cw,
    /// Counter-clockwise (G03).
    Ccw,
}

impl ArcDirection {
    fn sign(self) -> f64 {
        match self {
            ArcDirection::Cw => -1.0,
            ArcDirection::Ccw => 1.0,
        }
    }
}

/// Absolute sweep from `start` to `stop` (radians) travelling in `direction`.
///
/// Equal angles give a full turn.
pub fn arc_angle(start: f64, stop: f64, direction: ArcDirection) -> f64 {
    let mut stop = stop;
    match direction {
        ArcDirection::Ccw if stop <= start => stop += 2.0 * PI,
        ArcDirection::Cw if stop >= start => stop -= 2.0 * PI,
        _ => {}
    }
    (stop - start).abs()
}

/// Points along an arc, both ends included.
///
/// The sweep is split into `max(ceil(sweep / 2pi * steps_per_circle), 2)`
/// equal steps, so the result always has at least three points.
pub fn arc(
    center: Coord<f64>,
    radius: f64,
    start: f64,
    stop: f64,
    direction: ArcDirection,
    steps_per_circle: usize,
) -> Vec<Coord<f64>> {
    let angle = arc_angle(start, stop, direction);
    let steps = ((angle / (2.0 * PI) * steps_per_circle as f64).ceil() as usize).max(2);
    let delta = direction.sign() * angle / steps as f64;

    (0..=steps)
        .map(|i| {
            let theta = start + delta * i as f64;
            Coord {
                x: center.x + radius * theta.cos(),
                y: center.y + radius * theta.sin(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_quarter_arc() {
        let pts = arc(Coord { x: 0.0, y: 0.0 }, 1.0, 0.0, PI / 2.0, ArcDirection::Ccw, 40);
        assert_eq!(pts.len(), 11);
        assert!((pts[0].x - 1.0).abs() < EPS);
        let last = pts[pts.len() - 1];
        assert!(last.x.abs() < EPS && (last.y - 1.0).abs() < EPS);
    }

    #[test]
    fn test_equal_angles_make_full_circle() {
        assert!((arc_angle(1.0, 1.0, ArcDirection::Ccw) - 2.0 * PI).abs() < EPS);
        assert!((arc_angle(1.0, 1.0, ArcDirection::Cw) - 2.0 * PI).abs() < EPS);
        let pts = arc(Coord { x: 2.0, y: 0.0 }, 0.5, 0.0, 0.0, ArcDirection::Cw, 20);
        assert_eq!(pts.len(), 21);
    }

    #[test]
    fn test_minimum_two_steps() {
        let pts = arc(Coord { x: 0.0, y: 0.0 }, 1.0, 0.0, 0.01, ArcDirection::Ccw, 20);
        assert_eq!(pts.len(), 3);
    }

    #[test]
    fn test_cw_sweep() {
        // From 90 degrees clockwise down to 0.
        let a = arc_angle(PI / 2.0, 0.0, ArcDirection::Cw);
        assert!((a - PI / 2.0).abs() < EPS);
        let pts = arc(Coord { x: 0.0, y: 0.0 }, 1.0, PI / 2.0, 0.0, ArcDirection::Cw, 40);
        assert!(pts[pts.len() / 2].x > 0.0 && pts[pts.len() / 2].y > 0.0);
    }
}
