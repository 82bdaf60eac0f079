//! Upright fruiting offshoots (UFO) training.
//!
//! The trunk is bent and tied onto an ordered series of trunk targets, one
//! target per successful tick. First-generation leaders are then spread over
//! the wire walls: existing ties and marks are read back from the graph, and
//! while a wall is below its quota untied trunk buds are assigned to walls
//! greedily, favouring the wall whose nearest occupied position is closest
//! without breaking the minimum spacing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace, warn};

use crate::bezier::{fit_cubic_bezier_strain, StrainFitSettings};
use crate::error::StrategyError;
use crate::geometry::{cumulative_lengths, polyline_length};
use crate::graph::{BranchFilter, EdgeModules, EdgeTag, GuideKind, NodeId, WallId};
use crate::params::StrategyParams;
use crate::spacing::{place_leaders, ArcLengthIndex};
use crate::traits::{PlantGraph, PruningStrategy, TrellisTarget};

use super::types::{LeaderSummary, RetrainPlan, TieOutcome, TiedBranchAction, TiedNodeRegistry};

/// Points sampled from a fitted trunk guide.
pub const GUIDE_SAMPLES: usize = 10;
/// Trunks shorter than this still get their competing buds rubbed off.
pub const YOUNG_TRUNK_LENGTH: f64 = 5.0;
const GUIDE_SPEED: f64 = 1.0;
/// Length of the probe segment used to find where a leader meets its next wire.
const RETRAIN_PROBE: f64 = 0.001;

#[derive(Debug)]
pub struct UfoStrategy<G> {
    trunk_targets: Vec<Box<dyn TrellisTarget>>,
    wire_walls: BTreeMap<WallId, Vec<Box<dyn TrellisTarget>>>,
    params: StrategyParams,
    fit_settings: StrainFitSettings,
    tree: Option<G>,

    next_trunk_target: usize,
    leaders_assigned: bool,
}

impl<G: PlantGraph> UfoStrategy<G> {
    /// `wire_walls` maps each wall id to its wires, lowest first.
    pub fn new(
        trunk_targets: Vec<Box<dyn TrellisTarget>>,
        wire_walls: BTreeMap<WallId, Vec<Box<dyn TrellisTarget>>>,
        params: StrategyParams,
    ) -> Result<Self, StrategyError> {
        params.validate()?;
        Ok(Self {
            trunk_targets,
            wire_walls,
            params,
            fit_settings: StrainFitSettings::default(),
            tree: None,
            next_trunk_target: 0,
            leaders_assigned: false,
        })
    }

    pub fn with_fit_settings(mut self, settings: StrainFitSettings) -> Self {
        self.fit_settings = settings;
        self
    }

    pub fn set_tree(&mut self, tree: G) {
        self.tree = Some(tree);
    }

    pub fn tree(&self) -> Option<&G> {
        self.tree.as_ref()
    }

    pub fn tree_mut(&mut self) -> Option<&mut G> {
        self.tree.as_mut()
    }

    pub fn take_tree(&mut self) -> Option<G> {
        self.tree.take()
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name)
    }

    /// Index of the trunk target to tie next; equals `trunk_target_count()`
    /// once the trunk is fully anchored.
    pub fn next_trunk_target(&self) -> usize {
        self.next_trunk_target
    }

    pub fn trunk_target_count(&self) -> usize {
        self.trunk_targets.len()
    }

    pub fn leaders_assigned(&self) -> bool {
        self.leaders_assigned
    }

    pub fn wall_ids(&self) -> impl Iterator<Item = WallId> + '_ {
        self.wire_walls.keys().copied()
    }

    fn bound_tree(&self) -> Result<&G, StrategyError> {
        self.tree.as_ref().ok_or(StrategyError::TreeNotBound)
    }

    /// One tick: trunk tie-down, then leader examination.
    pub fn apply_strategy(&mut self) -> Result<(), StrategyError> {
        self.tie_down_trunk()?;
        self.examine_leaders()?;
        Ok(())
    }

    /// Bends the untied tail of the trunk onto the next trunk target when
    /// enough trunk has grown to reach it.
    pub fn tie_down_trunk(&mut self) -> Result<TieOutcome, StrategyError> {
        if self.next_trunk_target >= self.trunk_targets.len() {
            return Ok(TieOutcome::AllTargetsTied);
        }

        let tree = self.tree.as_mut().ok_or(StrategyError::TreeNotBound)?;
        let target = &self.trunk_targets[self.next_trunk_target];
        let trunk = tree.branch(tree.search_unique_branch(&BranchFilter::generation(0))?)?;

        let last_tie_idx = trunk
            .nodes
            .windows(2)
            .enumerate()
            .filter(|(_, w)| tree.is_tie_flagged(w[0], w[1]))
            .map(|(idx, _)| idx + 1)
            .last()
            .unwrap_or(0);
        debug!(last_tie_idx, "located last trunk tie");

        let nodes = &trunk.nodes[last_tie_idx..];
        let pts = &trunk.points[last_tie_idx..];
        let cumul_lens = cumulative_lengths(pts);
        let length = cumul_lens.last().copied().unwrap_or(0.0);
        if length <= 0.0 {
            return Ok(TieOutcome::NoUntiedLength);
        }

        let proximity = target.point_sequence_dist(pts);
        // Material to reach the target plus the tail already spent before the projection.
        let required = proximity.distance + (proximity.polyline_point - pts[0]).norm();
        debug!(length, required, "checked untied trunk length");
        if !(length > required) {
            return Ok(TieOutcome::InsufficientLength {
                available: length,
                required,
            });
        }

        // Off the root the first internode is often a stub; look one further.
        let tangent_idx = if nodes[0] == tree.root() { 2 } else { 1 };
        let tangent = pts[tangent_idx.min(pts.len() - 1)] - pts[0];
        let fit = match fit_cubic_bezier_strain(
            [pts[0], proximity.target_point],
            &tangent,
            GUIDE_SPEED,
            self.fit_settings,
        ) {
            Ok(fit) if fit.converged => fit,
            Ok(fit) => {
                warn!(
                    iterations = fit.iterations,
                    cost = fit.cost,
                    "trunk guide fit did not converge"
                );
                return Ok(TieOutcome::FitFailed);
            }
            Err(err) => {
                warn!(error = %err, "trunk guide fit rejected");
                return Ok(TieOutcome::FitFailed);
            }
        };

        let curve = fit.curve.sample(GUIDE_SAMPLES);
        let curve_len = polyline_length(&curve);
        let fold_idx = cumul_lens
            .iter()
            .position(|&len| len > curve_len)
            .unwrap_or(nodes.len() - 2)
            + 1;
        let span = nodes[..=fold_idx].to_vec();
        tree.set_guide_on_nodes(&span, &curve, GuideKind::Global)?;

        let tied = self.next_trunk_target;
        self.next_trunk_target += 1;
        info!(trunk_target = tied, span = span.len(), curve_len, "tied trunk to target");

        Ok(TieOutcome::Tied {
            target: tied,
            span,
            curve,
        })
    }

    pub fn examine_leaders(&mut self) -> Result<LeaderSummary, StrategyError> {
        let tree = self.bound_tree()?;
        let trunk = tree.branch(tree.search_unique_branch(&BranchFilter::generation(0))?)?;
        if trunk.length < YOUNG_TRUNK_LENGTH {
            self.rub_off_trunk_buds();
        }
        self.assign_leaders()
    }

    pub fn rub_off_trunk_buds(&mut self) {
        // TODO: remove generation-1 buds below `trunk_bare_dist` once the graph exposes bud removal.
        trace!("bud rub-off requested on a young trunk");
    }

    /// Reads ties and marks back from the leaders and, while any wall is
    /// under quota, assigns untied trunk buds to walls.
    pub fn assign_leaders(&mut self) -> Result<LeaderSummary, StrategyError> {
        let quota = self.params.leaders_per_wall;
        let min_spacing = self.params.leader_spacing;
        let bare_dist = self.params.trunk_bare_dist;

        let leader_ids = self
            .bound_tree()?
            .search_branches(&BranchFilter::generation(1));
        let mut registry = TiedNodeRegistry::default();
        let mut actions = Vec::new();
        let mut buds = BTreeSet::new();

        for branch_id in leader_ids {
            let branch = self.bound_tree()?.branch(branch_id)?;
            let nodes = &branch.nodes;
            if nodes.len() < 2 {
                continue;
            }
            buds.insert(nodes[0]);

            // Walk from the tip back toward the trunk; the outermost tie counts.
            let tie = {
                let tree = self.bound_tree()?;
                (0..nodes.len() - 1)
                    .rev()
                    .find_map(|i| match tree.edge_tag(nodes[i], nodes[i + 1]) {
                        EdgeTag::Tied { wall, slot } => Some((i + 1, wall, slot)),
                        _ => None,
                    })
            };
            if let Some((past_tie, wall, slot)) = tie {
                registry.register(wall, nodes[0]);
                actions.push(self.manage_tied_branch(&nodes[past_tie..], wall, slot)?);
            }

            // Read marks directly: a tie on the attachment edge would hide them from `edge_tag`.
            let mark = self
                .bound_tree()?
                .edge_modules(nodes[0], nodes[1])
                .and_then(EdgeModules::mark_wall);
            if let Some(wall) = mark {
                registry.register(wall, nodes[0]);
            }
        }

        for &wall in self.wire_walls.keys() {
            registry.ensure_wall(wall);
        }
        let full = self
            .wire_walls
            .keys()
            .all(|&wall| registry.count(wall) >= quota);
        self.leaders_assigned = full;
        if full {
            debug!("every wall holds its leader quota");
            return Ok(LeaderSummary {
                registry,
                complete: true,
                assignments: Vec::new(),
                actions,
            });
        }

        let tree = self.tree.as_mut().ok_or(StrategyError::TreeNotBound)?;
        let trunk = tree.branch(tree.search_unique_branch(&BranchFilter::generation(0))?)?;
        let index = ArcLengthIndex::from_branch(&trunk);

        let mut occupied: BTreeMap<WallId, Vec<f64>> = BTreeMap::new();
        for (wall, nodes) in registry.iter() {
            if !self.wire_walls.contains_key(&wall) {
                warn!(wall, "leaders registered on a wall missing from the trellis");
                continue;
            }
            let mut positions: Vec<f64> = nodes
                .iter()
                .filter_map(|&node| {
                    let position = index.position_of(node);
                    if position.is_none() {
                        warn!(node, wall, "registered leader node is not on the trunk");
                    }
                    position
                })
                .collect();
            positions.sort_by(f64::total_cmp);
            occupied.insert(wall, positions);
        }

        // Only trunk nodes that already carry a leader can hold a mark.
        let registered = registry.all_nodes();
        let candidates: Vec<(NodeId, f64)> = index
            .iter()
            .skip(1)
            .filter(|&(node, position)| {
                buds.contains(&node) && !registered.contains(&node) && position >= bare_dist
            })
            .collect();
        let assignments = place_leaders(candidates, &mut occupied, quota, min_spacing);

        for assignment in &assignments {
            let marked = tree.mark_bud(assignment.node, assignment.wall)?;
            info!(
                node = assignment.node,
                wall = assignment.wall,
                position = assignment.position,
                marked,
                "assigned leader to wall"
            );
        }

        Ok(LeaderSummary {
            registry,
            complete: false,
            assignments,
            actions,
        })
    }

    /// Handles the part of a leader grown past its tie on wire `slot` of `wall`.
    pub fn manage_tied_branch(
        &mut self,
        nodes: &[NodeId],
        wall: WallId,
        slot: usize,
    ) -> Result<TiedBranchAction, StrategyError> {
        let excess = self.params.leader_excess_stub;
        let tree = self.tree.as_mut().ok_or(StrategyError::TreeNotBound)?;
        let Some(wires) = self.wire_walls.get(&wall) else {
            warn!(wall, slot, "leader tied to an unknown wall");
            return Ok(TiedBranchAction::UnknownWall { wall });
        };
        let Some(&base) = nodes.first() else {
            return Ok(TiedBranchAction::AwaitingGrowth { wall, slot });
        };

        if slot + 1 >= wires.len() {
            tree.stub_branch(nodes, excess)?;
            info!(wall, slot, base, excess, "stubbed leader past its top wire");
            return Ok(TiedBranchAction::Stubbed { base, excess });
        }

        let Some(&next) = nodes.get(1) else {
            return Ok(TiedBranchAction::AwaitingGrowth { wall, slot });
        };
        let base_point = tree.node_point(base)?;
        let offset = tree.node_point(next)? - base_point;
        let norm = offset.norm();
        if norm <= f64::EPSILON {
            return Ok(TiedBranchAction::AwaitingGrowth { wall, slot });
        }
        let direction = offset / norm;
        let probe = wires[slot + 1].segment_dist(&base_point, &(base_point + direction * RETRAIN_PROBE));
        debug!(wall, next_slot = slot + 1, distance = probe.distance, "planned leader retrain");

        Ok(TiedBranchAction::Retrain(RetrainPlan {
            wall,
            next_slot: slot + 1,
            base_point,
            direction,
            wire_point: probe.target_point,
        }))
    }
}

impl<G: PlantGraph> PruningStrategy for UfoStrategy<G> {
    fn apply(&mut self) -> Result<(), StrategyError> {
        self.apply_strategy()
    }
}
