//! Polyline and segment geometry shared by targets, curve fitting and
//! trunk arc-length bookkeeping.

use nalgebra::Vector3;

pub type Point3 = Vector3<f64>;

const DEGENERATE_EPS: f64 = 1e-12;

/// Length of each segment of the polyline through `points`.
pub fn segment_lengths(points: &[Point3]) -> Vec<f64> {
    points.windows(2).map(|w| (w[1] - w[0]).norm()).collect()
}

/// Running sums of the segment lengths. Entry `i` is the arc length from
/// `points[0]` to `points[i + 1]`; empty for fewer than two points.
pub fn cumulative_lengths(points: &[Point3]) -> Vec<f64> {
    let mut total = 0.0;
    segment_lengths(points)
        .into_iter()
        .map(|len| {
            total += len;
            total
        })
        .collect()
}

/// Arc-length position of every point, starting at zero for `points[0]`.
pub fn arc_length_positions(points: &[Point3]) -> Vec<f64> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut positions = Vec::with_capacity(points.len());
    positions.push(0.0);
    positions.extend(cumulative_lengths(points));
    positions
}

pub fn polyline_length(points: &[Point3]) -> f64 {
    segment_lengths(points).iter().sum()
}

/// Returns `(t, point)` where `point = start + t * (end - start)` is the
/// point of the segment nearest to `query`, `t` clamped to `[0, 1]`.
pub fn closest_point_on_segment(query: &Point3, start: &Point3, end: &Point3) -> (f64, Point3) {
    let dir = end - start;
    let len_sq = dir.norm_squared();
    if len_sq <= DEGENERATE_EPS {
        return (0.0, *start);
    }
    let t = ((query - start).dot(&dir) / len_sq).clamp(0.0, 1.0);
    (t, start + dir * t)
}

/// Closest points between segments `p1 -> q1` and `p2 -> q2`.
/// Returns `(s, t, c1, c2)` with `c1 = p1 + s (q1 - p1)` and
/// `c2 = p2 + t (q2 - p2)`.
pub fn closest_points_between_segments(
    p1: &Point3,
    q1: &Point3,
    p2: &Point3,
    q2: &Point3,
) -> (f64, f64, Point3, Point3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    if a <= DEGENERATE_EPS && e <= DEGENERATE_EPS {
        return (0.0, 0.0, *p1, *p2);
    }

    let (s, t) = if a <= DEGENERATE_EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= DEGENERATE_EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            // Parallel segments: any s works, start from the first endpoint.
            let mut s = if denom > DEGENERATE_EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (s, t, p1 + d1 * s, p2 + d2 * t)
}

/// Nearest point of the polyline through `points` to `query`.
/// Returns `(segment_index, point)`, or `None` for an empty polyline.
pub fn closest_point_on_polyline(query: &Point3, points: &[Point3]) -> Option<(usize, Point3)> {
    match points {
        [] => None,
        [only] => Some((0, *only)),
        _ => points
            .windows(2)
            .enumerate()
            .map(|(idx, w)| (idx, closest_point_on_segment(query, &w[0], &w[1]).1))
            .min_by(|(_, a), (_, b)| {
                (a - query)
                    .norm_squared()
                    .total_cmp(&(b - query).norm_squared())
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical(n: usize) -> Vec<Point3> {
        (0..n).map(|i| Point3::new(0.0, 0.0, i as f64)).collect()
    }

    #[test]
    fn cumulative_and_positions_agree() {
        let pts = vertical(4);
        assert_eq!(cumulative_lengths(&pts), vec![1.0, 2.0, 3.0]);
        assert_eq!(arc_length_positions(&pts), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(polyline_length(&pts), 3.0);
    }

    #[test]
    fn short_polylines_have_no_length() {
        assert!(cumulative_lengths(&vertical(1)).is_empty());
        assert!(arc_length_positions(&[]).is_empty());
        assert_eq!(polyline_length(&vertical(1)), 0.0);
    }

    #[test]
    fn closest_point_on_segment_clamps_to_endpoints() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);

        let (t, p) = closest_point_on_segment(&Point3::new(1.0, 3.0, 0.0), &a, &b);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((p - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);

        let (t, p) = closest_point_on_segment(&Point3::new(-4.0, 1.0, 0.0), &a, &b);
        assert_eq!(t, 0.0);
        assert_eq!(p, a);
    }

    #[test]
    fn crossing_segments_meet_at_intersection_offset() {
        let (s, t, c1, c2) = closest_points_between_segments(
            &Point3::new(-1.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, -1.0, 2.0),
            &Point3::new(0.0, 1.0, 2.0),
        );
        assert!((s - 0.5).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((c1 - Point3::zeros()).norm() < 1e-12);
        assert!((c2 - Point3::new(0.0, 0.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn parallel_segments_report_gap() {
        let (_, _, c1, c2) = closest_points_between_segments(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 4.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 2.0),
        );
        assert!(((c1 - c2).norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn closest_point_on_polyline_picks_nearest_segment() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, 2.0),
        ];
        let (idx, p) = closest_point_on_polyline(&Point3::new(1.0, 0.0, 3.0), &pts)
            .expect("non-empty polyline");
        assert_eq!(idx, 1);
        assert!((p - Point3::new(1.0, 0.0, 2.0)).norm() < 1e-12);
        assert!(closest_point_on_polyline(&Point3::zeros(), &[]).is_none());
    }
}
