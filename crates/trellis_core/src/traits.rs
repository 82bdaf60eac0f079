use num_traits::{NumOps, One, Zero};
use std::fmt::Debug;
use std::ops::Neg;

use crate::error::{GraphError, StrategyError};
use crate::geometry::Point3;
use crate::graph::{
    BranchFilter, BranchId, BranchRecord, EdgeModules, EdgeTag, GuideKind, NodeId, WallId,
};
use crate::target::{PolylineProximity, SegmentProximity};

/// A trait for types that can be used as scalars in solver residuals.
/// Implemented for `f64` and for `Dual` so the same residual code yields
/// both values and forward-mode derivatives.
pub trait Scalar: Copy + Debug + NumOps + Neg<Output = Self> + Zero + One + 'static {
    fn from_f64(value: f64) -> Self;

    /// Real part of the scalar.
    fn value(self) -> f64;

    fn sqrt(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn value(self) -> f64 {
        self
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

/// A vector-valued residual over a fixed number of unknowns, used by the
/// least-squares curve fit.
pub trait ResidualSystem {
    /// Number of unknowns.
    fn dimension(&self) -> usize;

    /// Number of residual entries written by `evaluate`.
    fn residual_count(&self) -> usize;

    /// x: unknowns
    /// out: buffer of length `residual_count()`
    fn evaluate<T: Scalar>(&self, x: &[T], out: &mut [T]);
}

/// Read and mutation access to a grown plant graph.
///
/// The graph is the source of truth for what is tied or marked: strategies
/// rebuild their view of it on every tick through these queries.
pub trait PlantGraph {
    /// Node the trunk grows from.
    fn root(&self) -> NodeId;

    /// Returns every branch whose attribute satisfies `filter`, in id order.
    fn search_branches(&self, filter: &BranchFilter) -> Vec<BranchId>;

    /// Like `search_branches` but fails unless exactly one branch matches.
    fn search_unique_branch(&self, filter: &BranchFilter) -> Result<BranchId, GraphError> {
        let matches = self.search_branches(filter);
        match matches.as_slice() {
            [id] => Ok(*id),
            _ => Err(GraphError::NotUnique {
                filter: filter.to_string(),
                count: matches.len(),
            }),
        }
    }

    fn branch(&self, id: BranchId) -> Result<BranchRecord, GraphError>;

    /// Annotations on the internode `a -> b`, if that edge exists.
    fn edge_modules(&self, a: NodeId, b: NodeId) -> Option<&EdgeModules>;

    /// Tie/mark status of an internode. Missing edges and missing modules
    /// both read as untagged; a tie takes precedence over a mark on the same edge.
    fn edge_tag(&self, a: NodeId, b: NodeId) -> EdgeTag {
        self.edge_modules(a, b)
            .map(EdgeModules::tag)
            .unwrap_or(EdgeTag::Untagged)
    }

    /// Whether the trunk internode `a -> b` carries the tie flag.
    fn is_tie_flagged(&self, a: NodeId, b: NodeId) -> bool {
        self.edge_modules(a, b)
            .map(EdgeModules::is_tie_flagged)
            .unwrap_or(false)
    }

    fn node_point(&self, node: NodeId) -> Result<Point3, GraphError>;

    /// Replaces the physical guide on the internodes spanned by `nodes`.
    fn set_guide_on_nodes(
        &mut self,
        nodes: &[NodeId],
        curve: &[Point3],
        kind: GuideKind,
    ) -> Result<(), GraphError>;

    /// Cuts away growth further than `excess_length` along `nodes` from `nodes[0]`.
    fn stub_branch(&mut self, nodes: &[NodeId], excess_length: f64) -> Result<(), GraphError>;

    /// Reserves the bud at `trunk_node` for `wall`. Returns `false` when no
    /// first-generation branch has emerged at that node yet.
    fn mark_bud(&mut self, trunk_node: NodeId, wall: WallId) -> Result<bool, GraphError>;
}

/// A physical anchor (tie-down point or wire) on the trellis.
pub trait TrellisTarget: Debug {
    /// Nearest approach between this target and the polyline through `points`.
    fn point_sequence_dist(&self, points: &[Point3]) -> PolylineProximity;

    /// Nearest approach between this target and the segment `start -> end`.
    fn segment_dist(&self, start: &Point3, end: &Point3) -> SegmentProximity;
}

/// A training strategy applied to a bound plant graph once per growth cycle.
pub trait PruningStrategy {
    /// Runs one tick of pruning/training decisions.
    fn apply(&mut self) -> Result<(), StrategyError>;

    /// Polylines worth drawing for the current state. Empty unless overridden.
    fn visualize(&self) -> Vec<Vec<Point3>> {
        Vec::new()
    }
}
