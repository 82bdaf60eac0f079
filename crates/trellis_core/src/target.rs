//! Trellis targets: the physical points and wires the plant is tied to.

use serde::{Deserialize, Serialize};

use crate::geometry::{
    closest_point_on_polyline, closest_point_on_segment, closest_points_between_segments, Point3,
};
use crate::traits::TrellisTarget;

/// Nearest approach between a target and a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolylineProximity {
    /// Index of the polyline segment holding `polyline_point`.
    pub segment_index: usize,
    pub distance: f64,
    pub polyline_point: Point3,
    /// Point on the target where a tie would land.
    pub target_point: Point3,
}

/// Nearest approach between a target and a line segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentProximity {
    pub distance: f64,
    pub segment_point: Point3,
    pub target_point: Point3,
}

/// A single tie-down point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointTarget {
    pub point: Point3,
}

impl PointTarget {
    pub fn new(point: Point3) -> Self {
        Self { point }
    }
}

impl TrellisTarget for PointTarget {
    fn point_sequence_dist(&self, points: &[Point3]) -> PolylineProximity {
        let (segment_index, polyline_point) =
            closest_point_on_polyline(&self.point, points).unwrap_or((0, self.point));
        PolylineProximity {
            segment_index,
            distance: (polyline_point - self.point).norm(),
            polyline_point,
            target_point: self.point,
        }
    }

    fn segment_dist(&self, start: &Point3, end: &Point3) -> SegmentProximity {
        let (_, segment_point) = closest_point_on_segment(&self.point, start, end);
        SegmentProximity {
            distance: (segment_point - self.point).norm(),
            segment_point,
            target_point: self.point,
        }
    }
}

/// A straight wire strung between two posts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireTarget {
    pub start: Point3,
    pub end: Point3,
}

impl WireTarget {
    pub fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }

    /// Position of `point` along the wire as a fraction of its length,
    /// clamped to the wire.
    pub fn project(&self, point: &Point3) -> f64 {
        closest_point_on_segment(point, &self.start, &self.end).0
    }
}

impl TrellisTarget for WireTarget {
    fn point_sequence_dist(&self, points: &[Point3]) -> PolylineProximity {
        match points {
            [] => PolylineProximity {
                segment_index: 0,
                distance: f64::INFINITY,
                polyline_point: self.start,
                target_point: self.start,
            },
            [only] => {
                let (_, target_point) = closest_point_on_segment(only, &self.start, &self.end);
                PolylineProximity {
                    segment_index: 0,
                    distance: (target_point - only).norm(),
                    polyline_point: *only,
                    target_point,
                }
            }
            _ => {
                let mut best: Option<PolylineProximity> = None;
                for (segment_index, w) in points.windows(2).enumerate() {
                    let (_, _, polyline_point, target_point) =
                        closest_points_between_segments(&w[0], &w[1], &self.start, &self.end);
                    let distance = (target_point - polyline_point).norm();
                    if best.map_or(true, |b| distance < b.distance) {
                        best = Some(PolylineProximity {
                            segment_index,
                            distance,
                            polyline_point,
                            target_point,
                        });
                    }
                }
                // Non-empty windows always produce a candidate.
                best.unwrap_or(PolylineProximity {
                    segment_index: 0,
                    distance: f64::INFINITY,
                    polyline_point: points[0],
                    target_point: self.start,
                })
            }
        }
    }

    fn segment_dist(&self, start: &Point3, end: &Point3) -> SegmentProximity {
        let (_, _, segment_point, target_point) =
            closest_points_between_segments(start, end, &self.start, &self.end);
        SegmentProximity {
            distance: (target_point - segment_point).norm(),
            segment_point,
            target_point,
        }
    }
}
