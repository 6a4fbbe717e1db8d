//! Control-point smoothing and Bézier evaluation for bundled routes

use geo::{Coord, LineString};

/// Insert the midpoint of every consecutive pair, `levels - 1` times.
///
/// `levels <= 1` returns the input unchanged. This is corner-cutting on the
/// route vertices, not a curve fit through them.
pub fn refine(points: &[Coord<f64>], levels: u32) -> Vec<Coord<f64>> {
    let mut refined = points.to_vec();
    if refined.len() < 2 {
        return refined;
    }

    for _ in 1..levels {
        let mut next = Vec::with_capacity(refined.len() * 2 - 1);
        for pair in refined.windows(2) {
            next.push(pair[0]);
            next.push((pair[0] + pair[1]) / 2.0);
        }
        next.extend(refined.last().copied());
        refined = next;
    }

    refined
}

/// Evaluate the Bézier curve defined by `control_points` at `t` (de Casteljau).
///
/// Endpoints are returned exactly at `t = 0` and `t = 1`. Out-of-range `t`
/// or fewer than two control points yield the origin.
pub fn evaluate(control_points: &[Coord<f64>], t: f64) -> Coord<f64> {
    let zero = Coord { x: 0.0, y: 0.0 };
    if control_points.len() < 2 || !(0.0..=1.0).contains(&t) {
        return zero;
    }
    if t == 0.0 {
        return control_points[0];
    }
    if t == 1.0 {
        return control_points[control_points.len() - 1];
    }

    let mut points = control_points.to_vec();
    for level in (1..points.len()).rev() {
        for i in 0..level {
            points[i] = points[i] * (1.0 - t) + points[i + 1] * t;
        }
    }
    points[0]
}

/// Sample the curve at `n` evenly spaced parameters in `[0, 1)` plus the last control point.
///
/// `n < 2` degenerates to the straight segment between the first and last point.
pub fn sample(control_points: &[Coord<f64>], n: usize) -> Vec<Coord<f64>> {
    let (Some(&first), Some(&last)) = (control_points.first(), control_points.last()) else {
        return Vec::new();
    };
    if n < 2 {
        return vec![first, last];
    }

    let mut points: Vec<Coord<f64>> = (0..n)
        .map(|i| evaluate(control_points, i as f64 / n as f64))
        .collect();
    points.push(last);
    points
}

/// [`sample`] as a line geometry
pub fn sample_line(control_points: &[Coord<f64>], n: usize) -> LineString<f64> {
    LineString::from(sample(control_points, n))
}
