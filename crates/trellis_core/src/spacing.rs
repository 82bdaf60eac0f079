//! Arc-length bookkeeping along the trunk and greedy placement of leaders
//! into wall slots.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::geometry::{arc_length_positions, Point3};
use crate::graph::{BranchRecord, NodeId, WallId};

/// Distance from `position` to the nearest entry of an ascending sequence.
///
/// An empty sequence is infinitely far away.
pub fn distance_to_nearest_in_sorted_set(position: f64, sorted: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
        return f64::INFINITY;
    };
    if position < first {
        return first - position;
    }
    if position >= last {
        return position - last;
    }
    // first <= position < last, so the split lands strictly inside.
    let upper = sorted.partition_point(|&v| v <= position);
    (position - sorted[upper - 1]).min(sorted[upper] - position)
}

/// Inserts `value` keeping `sorted` ascending.
pub fn insert_sorted(sorted: &mut Vec<f64>, value: f64) {
    let idx = sorted.partition_point(|&v| v <= value);
    sorted.insert(idx, value);
}

/// Arc-length position of every trunk node, with index-of-node lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArcLengthIndex {
    nodes: Vec<NodeId>,
    positions: Vec<f64>,
    lookup: HashMap<NodeId, usize>,
}

impl ArcLengthIndex {
    /// `nodes` and `points` must be aligned; extra entries of the longer
    /// slice are ignored.
    pub fn new(nodes: &[NodeId], points: &[Point3]) -> Self {
        let len = nodes.len().min(points.len());
        let nodes = nodes[..len].to_vec();
        let positions = arc_length_positions(&points[..len]);
        let lookup = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        Self {
            nodes,
            positions,
            lookup,
        }
    }

    pub fn from_branch(branch: &BranchRecord) -> Self {
        Self::new(&branch.nodes, &branch.points)
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.lookup.get(&node).copied()
    }

    pub fn position_of(&self, node: NodeId) -> Option<f64> {
        self.index_of(node).map(|i| self.positions[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_length(&self) -> f64 {
        self.positions.last().copied().unwrap_or(0.0)
    }

    /// `(node, position)` pairs from the root upward.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.nodes.iter().copied().zip(self.positions.iter().copied())
    }
}

/// A candidate bud chosen for a wall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderAssignment {
    pub node: NodeId,
    pub wall: WallId,
    /// Arc-length position of `node` along the trunk.
    pub position: f64,
    /// Gap to the wall's nearest occupied position at the time of choice.
    pub spacing: f64,
}

/// Greedily places candidates into walls.
///
/// Each candidate goes to the wall below `quota` whose nearest occupied
/// position is closest while still at least `min_spacing` away; ties go to
/// the lowest wall id. Chosen positions are inserted into `occupied`, so
/// later candidates see them.
pub fn place_leaders<I>(
    candidates: I,
    occupied: &mut BTreeMap<WallId, Vec<f64>>,
    quota: usize,
    min_spacing: f64,
) -> Vec<LeaderAssignment>
where
    I: IntoIterator<Item = (NodeId, f64)>,
{
    let mut assignments = Vec::new();
    for (node, position) in candidates {
        let mut best: Option<(WallId, f64)> = None;
        for (&wall, positions) in occupied.iter() {
            if positions.len() >= quota {
                continue;
            }
            let spacing = distance_to_nearest_in_sorted_set(position, positions);
            if spacing < min_spacing {
                continue;
            }
            if best.map_or(true, |(_, current)| spacing < current) {
                best = Some((wall, spacing));
            }
        }

        if let Some((wall, spacing)) = best {
            if let Some(positions) = occupied.get_mut(&wall) {
                insert_sorted(positions, position);
            }
            assignments.push(LeaderAssignment {
                node,
                wall,
                position,
                spacing,
            });
        }
    }
    assignments
}
