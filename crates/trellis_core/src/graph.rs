//! Plant graph annotations and an in-memory plant tree.
//!
//! A plant is a tree of nodes joined by internodes (edges). Each internode
//! carries ordered module lists; ties and marks live in `pre_modules`, the
//! trunk tie flag in `post_modules`. Branches are runs of nodes tagged with
//! a growth generation (0 = trunk, 1 = leaders, ...).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::geometry::{arc_length_positions, polyline_length, Point3};
use crate::traits::PlantGraph;

pub type NodeId = usize;
pub type BranchId = usize;
pub type WallId = usize;

/// Flag value marking a trunk internode as tied down.
pub const TIE_FLAG: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Module {
    /// Physical tie to wire `slot` of wall `wall`.
    Tie { wall: WallId, slot: usize },
    /// Reservation of a bud for `wall` without a physical tie.
    Mark { wall: WallId },
    Flags(Vec<i32>),
}

/// Tie/mark status of a single internode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeTag {
    Untagged,
    Tied { wall: WallId, slot: usize },
    Marked { wall: WallId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideKind {
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub kind: GuideKind,
    pub points: Vec<Point3>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeModules {
    pub pre_modules: Vec<Module>,
    pub post_modules: Vec<Module>,
    #[serde(default)]
    pub guide: Option<Guide>,
}

impl EdgeModules {
    /// A tie anywhere in the pre-modules wins over a mark, so a mark that
    /// shares its edge with a tie reads as `Tied`. Use [`Self::mark_wall`]
    /// to see such marks.
    pub fn tag(&self) -> EdgeTag {
        let mut mark = None;
        for module in &self.pre_modules {
            match *module {
                Module::Tie { wall, slot } => return EdgeTag::Tied { wall, slot },
                Module::Mark { wall } if mark.is_none() => mark = Some(wall),
                _ => {}
            }
        }
        mark.map_or(EdgeTag::Untagged, |wall| EdgeTag::Marked { wall })
    }

    /// Wall of the first `Mark` in the pre-modules, ties notwithstanding.
    pub fn mark_wall(&self) -> Option<WallId> {
        self.pre_modules.iter().find_map(|m| match *m {
            Module::Mark { wall } => Some(wall),
            _ => None,
        })
    }

    pub fn is_tie_flagged(&self) -> bool {
        self.post_modules
            .iter()
            .any(|m| matches!(m, Module::Flags(flags) if flags.contains(&TIE_FLAG)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchAttribute {
    Generation,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// Predicate over one branch attribute, e.g. `generation = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchFilter {
    pub attribute: BranchAttribute,
    pub comparison: Comparison,
    pub value: f64,
}

impl BranchFilter {
    pub fn new(attribute: BranchAttribute, comparison: Comparison, value: f64) -> Self {
        Self {
            attribute,
            comparison,
            value,
        }
    }

    pub fn generation(generation: u32) -> Self {
        Self::new(
            BranchAttribute::Generation,
            Comparison::Eq,
            generation as f64,
        )
    }
}

impl fmt::Display for BranchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.attribute {
            BranchAttribute::Generation => "generation",
            BranchAttribute::Length => "length",
        };
        write!(f, "{} {} {}", name, self.comparison.symbol(), self.value)
    }
}

/// Snapshot of a branch with its derived geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: BranchId,
    pub nodes: Vec<NodeId>,
    /// Node coordinates aligned with `nodes`.
    pub points: Vec<Point3>,
    pub length: f64,
    pub generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct NodeData {
    point: Point3,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
struct BranchData {
    nodes: Vec<NodeId>,
    generation: u32,
}

/// In-memory plant tree implementing [`PlantGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlantTree {
    root: NodeId,
    nodes: BTreeMap<NodeId, NodeData>,
    edges: BTreeMap<(NodeId, NodeId), EdgeModules>,
    branches: BTreeMap<BranchId, BranchData>,
    next_node: NodeId,
    next_branch: BranchId,
}

impl PlantTree {
    pub fn new(root_point: Point3) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            0,
            NodeData {
                point: root_point,
                parent: None,
            },
        );
        Self {
            root: 0,
            nodes,
            edges: BTreeMap::new(),
            branches: BTreeMap::new(),
            next_node: 1,
            next_branch: 0,
        }
    }

    /// Grows a new node from `parent`, creating the internode between them.
    pub fn add_node(&mut self, parent: NodeId, point: Point3) -> Result<NodeId, GraphError> {
        if !self.nodes.contains_key(&parent) {
            return Err(GraphError::UnknownNode(parent));
        }
        let id = self.next_node;
        self.next_node += 1;
        self.nodes.insert(
            id,
            NodeData {
                point,
                parent: Some(parent),
            },
        );
        self.edges.insert((parent, id), EdgeModules::default());
        Ok(id)
    }

    /// Grows a chain of nodes from `from`. Returns `from` followed by the new ids.
    pub fn grow_chain(
        &mut self,
        from: NodeId,
        points: impl IntoIterator<Item = Point3>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let mut chain = vec![from];
        let mut tip = from;
        for point in points {
            tip = self.add_node(tip, point)?;
            chain.push(tip);
        }
        Ok(chain)
    }

    /// Registers a branch over consecutive, already connected nodes.
    pub fn add_branch(&mut self, nodes: Vec<NodeId>, generation: u32) -> Result<BranchId, GraphError> {
        if let Some(&missing) = nodes.iter().find(|n| !self.nodes.contains_key(n)) {
            return Err(GraphError::UnknownNode(missing));
        }
        for w in nodes.windows(2) {
            if !self.edges.contains_key(&(w[0], w[1])) {
                return Err(GraphError::MissingEdge(w[0], w[1]));
            }
        }
        let id = self.next_branch;
        self.next_branch += 1;
        self.branches.insert(id, BranchData { nodes, generation });
        Ok(id)
    }

    pub fn edge_mut(&mut self, a: NodeId, b: NodeId) -> Result<&mut EdgeModules, GraphError> {
        self.edges
            .get_mut(&(a, b))
            .ok_or(GraphError::MissingEdge(a, b))
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn branch_ids(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.branches.keys().copied()
    }

    fn attribute_value(&self, data: &BranchData, attribute: BranchAttribute) -> f64 {
        match attribute {
            BranchAttribute::Generation => data.generation as f64,
            BranchAttribute::Length => {
                let points: Vec<Point3> = data
                    .nodes
                    .iter()
                    .filter_map(|n| self.nodes.get(n).map(|d| d.point))
                    .collect();
                polyline_length(&points)
            }
        }
    }

    fn points_for(&self, nodes: &[NodeId]) -> Result<Vec<Point3>, GraphError> {
        nodes.iter().map(|&n| self.node_point(n)).collect()
    }

    /// Removes `start` and every node grown from it.
    fn remove_subtree(&mut self, start: NodeId) {
        if start == self.root || !self.nodes.contains_key(&start) {
            return;
        }
        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for (&id, data) in &self.nodes {
            if let Some(parent) = data.parent {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut removed = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if removed.insert(node) {
                if let Some(kids) = children.get(&node) {
                    stack.extend(kids.iter().copied());
                }
            }
        }

        self.nodes.retain(|id, _| !removed.contains(id));
        self.edges
            .retain(|(a, b), _| !removed.contains(a) && !removed.contains(b));
        for data in self.branches.values_mut() {
            data.nodes.retain(|n| !removed.contains(n));
        }
        self.branches.retain(|_, data| data.nodes.len() >= 2);
    }
}

impl PlantGraph for PlantTree {
    fn root(&self) -> NodeId {
        self.root
    }

    fn search_branches(&self, filter: &BranchFilter) -> Vec<BranchId> {
        self.branches
            .iter()
            .filter(|(_, data)| {
                filter
                    .comparison
                    .holds(self.attribute_value(data, filter.attribute), filter.value)
            })
            .map(|(&id, _)| id)
            .collect()
    }

    fn branch(&self, id: BranchId) -> Result<BranchRecord, GraphError> {
        let data = self
            .branches
            .get(&id)
            .ok_or(GraphError::UnknownBranch(id))?;
        let points = self.points_for(&data.nodes)?;
        Ok(BranchRecord {
            id,
            nodes: data.nodes.clone(),
            length: polyline_length(&points),
            points,
            generation: data.generation,
        })
    }

    fn edge_modules(&self, a: NodeId, b: NodeId) -> Option<&EdgeModules> {
        self.edges.get(&(a, b))
    }

    fn node_point(&self, node: NodeId) -> Result<Point3, GraphError> {
        self.nodes
            .get(&node)
            .map(|d| d.point)
            .ok_or(GraphError::UnknownNode(node))
    }

    /// Stores the guide on every internode of the span and flags the span's
    /// last internode as tied.
    fn set_guide_on_nodes(
        &mut self,
        nodes: &[NodeId],
        curve: &[Point3],
        kind: GuideKind,
    ) -> Result<(), GraphError> {
        if nodes.len() < 2 {
            return Err(GraphError::EmptySpan(nodes.len()));
        }
        for w in nodes.windows(2) {
            if !self.edges.contains_key(&(w[0], w[1])) {
                return Err(GraphError::MissingEdge(w[0], w[1]));
            }
        }

        let guide = Guide {
            kind,
            points: curve.to_vec(),
        };
        for w in nodes.windows(2) {
            self.edge_mut(w[0], w[1])?.guide = Some(guide.clone());
        }

        let last = nodes.len() - 1;
        let edge = self.edge_mut(nodes[last - 1], nodes[last])?;
        if !edge.is_tie_flagged() {
            edge.post_modules.push(Module::Flags(vec![TIE_FLAG]));
        }
        Ok(())
    }

    /// Keeps nodes within `excess_length` of `nodes[0]` and removes the
    /// subtree beyond them.
    fn stub_branch(&mut self, nodes: &[NodeId], excess_length: f64) -> Result<(), GraphError> {
        if nodes.len() < 2 {
            return Ok(());
        }
        let positions = arc_length_positions(&self.points_for(nodes)?);
        let Some(cut) = positions.iter().position(|&p| p > excess_length) else {
            return Ok(());
        };
        self.remove_subtree(nodes[cut.max(1)]);
        Ok(())
    }

    fn mark_bud(&mut self, trunk_node: NodeId, wall: WallId) -> Result<bool, GraphError> {
        if !self.nodes.contains_key(&trunk_node) {
            return Err(GraphError::UnknownNode(trunk_node));
        }
        let attachment = self
            .branches
            .values()
            .find(|data| data.generation == 1 && data.nodes.len() >= 2 && data.nodes[0] == trunk_node)
            .map(|data| (data.nodes[0], data.nodes[1]));

        let Some((a, b)) = attachment else {
            return Ok(false);
        };
        let edge = self.edge_mut(a, b)?;
        let mark = Module::Mark { wall };
        if !edge.pre_modules.contains(&mark) {
            edge.pre_modules.push(mark);
        }
        Ok(true)
    }
}
