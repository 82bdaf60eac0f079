//! Per-tick results reported by the training strategies.

use std::collections::{BTreeMap, HashSet};

use crate::geometry::Point3;
use crate::graph::{NodeId, WallId};
use crate::spacing::LeaderAssignment;

/// Trunk nodes already claimed by each wall, rebuilt from the graph's
/// tie/mark annotations on every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiedNodeRegistry {
    walls: BTreeMap<WallId, Vec<NodeId>>,
}

impl TiedNodeRegistry {
    /// Appends `node` under `wall`. Returns `false` if it was already there.
    pub fn register(&mut self, wall: WallId, node: NodeId) -> bool {
        let nodes = self.walls.entry(wall).or_default();
        if nodes.contains(&node) {
            return false;
        }
        nodes.push(node);
        true
    }

    /// Makes `wall` present even with no claimed nodes.
    pub fn ensure_wall(&mut self, wall: WallId) {
        self.walls.entry(wall).or_default();
    }

    pub fn nodes(&self, wall: WallId) -> &[NodeId] {
        self.walls.get(&wall).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, wall: WallId) -> usize {
        self.nodes(wall).len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.walls.values().any(|nodes| nodes.contains(&node))
    }

    pub fn all_nodes(&self) -> HashSet<NodeId> {
        self.walls.values().flatten().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WallId, &[NodeId])> + '_ {
        self.walls.iter().map(|(&wall, nodes)| (wall, nodes.as_slice()))
    }
}

/// What a trunk tie-down attempt did this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TieOutcome {
    /// Every trunk target is tied; nothing left to do.
    AllTargetsTied,
    /// The untied tail of the trunk has no length yet.
    NoUntiedLength,
    /// Not enough grown trunk to reach the target; wait for growth.
    InsufficientLength { available: f64, required: f64 },
    /// The guide curve could not be fitted this tick.
    FitFailed,
    Tied {
        target: usize,
        /// Trunk nodes that received the guide.
        span: Vec<NodeId>,
        curve: Vec<Point3>,
    },
}

/// Intended retraining of a leader from its current wire to the next one up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrainPlan {
    pub wall: WallId,
    pub next_slot: usize,
    pub base_point: Point3,
    /// Unit direction of the leader's first internode past the tie.
    pub direction: Point3,
    /// Where the leader would meet the next wire.
    pub wire_point: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TiedBranchAction {
    /// Leader on its wall's top wire, cut back to `excess` past `base`.
    Stubbed { base: NodeId, excess: f64 },
    Retrain(RetrainPlan),
    /// Nothing grown past the tie yet.
    AwaitingGrowth { wall: WallId, slot: usize },
    /// Tie refers to a wall the strategy does not know.
    UnknownWall { wall: WallId },
}

/// Result of one leader examination pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderSummary {
    pub registry: TiedNodeRegistry,
    /// Every wall already held its quota before assignment.
    pub complete: bool,
    pub assignments: Vec<LeaderAssignment>,
    pub actions: Vec<TiedBranchAction>,
}
