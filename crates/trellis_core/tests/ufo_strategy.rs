use std::collections::BTreeMap;

use trellis_core::geometry::Point3;
use trellis_core::graph::{EdgeTag, NodeId, PlantTree, WallId};
use trellis_core::params::StrategyParams;
use trellis_core::strategy::{TieOutcome, UfoStrategy};
use trellis_core::target::{PointTarget, WireTarget};
use trellis_core::traits::{PlantGraph, PruningStrategy, TrellisTarget};

/// Vertical trunk with unit internodes and a one-node leader bud at each of
/// `leader_at`.
fn orchard_tree(len: usize, leader_at: &[usize]) -> (PlantTree, Vec<NodeId>, Vec<Vec<NodeId>>) {
    let mut tree = PlantTree::new(Point3::zeros());
    let trunk = tree
        .grow_chain(0, (1..=len).map(|z| Point3::new(0.0, 0.0, z as f64)))
        .expect("trunk should grow");
    tree.add_branch(trunk.clone(), 0).expect("trunk branch");

    let mut leaders = Vec::new();
    for &i in leader_at {
        let leader = tree
            .grow_chain(trunk[i], [Point3::new(0.5, 0.0, i as f64)])
            .expect("leader should grow");
        tree.add_branch(leader.clone(), 1).expect("leader branch");
        leaders.push(leader);
    }
    (tree, trunk, leaders)
}

fn two_walls() -> BTreeMap<WallId, Vec<Box<dyn TrellisTarget>>> {
    let wire = |x: f64| -> Box<dyn TrellisTarget> {
        Box::new(WireTarget::new(
            Point3::new(x, -5.0, 7.0),
            Point3::new(x, 5.0, 7.0),
        ))
    };
    BTreeMap::from([(0, vec![wire(-1.0)]), (1, vec![wire(1.0)])])
}

#[test]
fn two_ticks_tie_trunk_then_settle_leaders() {
    let (tree, trunk, leaders) = orchard_tree(10, &[5, 6, 7, 8, 9]);
    let params = StrategyParams::from_options([("leaders_per_wall", 2.0)]).expect("params");
    let targets: Vec<Box<dyn TrellisTarget>> =
        vec![Box::new(PointTarget::new(Point3::new(0.0, 1.0, 6.0)))];
    let mut strategy = UfoStrategy::new(targets, two_walls(), params).expect("strategy");
    strategy.set_tree(tree);

    PruningStrategy::apply(&mut strategy).expect("first tick");
    assert_eq!(strategy.next_trunk_target(), 1);
    assert_eq!(strategy.next_trunk_target(), strategy.trunk_target_count());
    assert!(!strategy.leaders_assigned());
    assert!(strategy.visualize().is_empty());

    let tree = strategy.tree().expect("tree bound");
    assert!(trunk.windows(2).any(|w| tree.is_tie_flagged(w[0], w[1])));
    let expected = [(0, 0), (1, 0), (2, 1), (3, 1)];
    for (leader, wall) in expected {
        let nodes = &leaders[leader];
        assert_eq!(tree.edge_tag(nodes[0], nodes[1]), EdgeTag::Marked { wall });
    }
    let last = &leaders[4];
    assert_eq!(tree.edge_tag(last[0], last[1]), EdgeTag::Untagged);

    assert_eq!(strategy.tie_down_trunk(), Ok(TieOutcome::AllTargetsTied));
    let summary = strategy.assign_leaders().expect("second pass");
    assert!(summary.complete);
    assert!(summary.assignments.is_empty());
    assert_eq!(summary.registry.nodes(0), &[trunk[5], trunk[6]]);
    assert_eq!(summary.registry.nodes(1), &[trunk[7], trunk[8]]);
    assert!(strategy.leaders_assigned());
}

#[test]
fn young_trunk_waits_for_growth() {
    let (tree, _, _) = orchard_tree(3, &[2]);
    let targets: Vec<Box<dyn TrellisTarget>> =
        vec![Box::new(PointTarget::new(Point3::new(0.0, 1.0, 6.0)))];
    let mut strategy =
        UfoStrategy::new(targets, two_walls(), StrategyParams::default()).expect("strategy");
    strategy.set_tree(tree.clone());

    let outcome = strategy.tie_down_trunk().expect("tie pass");
    assert!(matches!(
        outcome,
        TieOutcome::InsufficientLength { available, .. } if available == 3.0
    ));

    let summary = strategy.examine_leaders().expect("leader pass");
    assert!(!summary.complete);
    assert!(summary.assignments.is_empty());
    assert_eq!(strategy.tree(), Some(&tree));
}

#[test]
fn bare_trunk_section_never_gets_leaders() {
    let (tree, _, _) = orchard_tree(12, &[2, 4, 6, 8, 9, 10, 11, 12]);
    let params = StrategyParams::from_options([("trunk_bare_dist", 8.0)]).expect("params");
    let mut strategy: UfoStrategy<PlantTree> =
        UfoStrategy::new(Vec::new(), two_walls(), params).expect("strategy");
    strategy.set_tree(tree);

    let summary = strategy.assign_leaders().expect("leader pass");
    assert!(!summary.assignments.is_empty());
    assert_eq!(summary.assignments.len(), 5);
    assert!(summary.assignments.iter().all(|a| a.position >= 8.0));
    for wall in strategy.wall_ids() {
        let mut positions: Vec<f64> = summary
            .assignments
            .iter()
            .filter(|a| a.wall == wall)
            .map(|a| a.position)
            .collect();
        positions.sort_by(f64::total_cmp);
        assert!(positions.len() <= 5);
        assert!(positions.windows(2).all(|w| w[1] - w[0] >= 0.9));
    }
}

#[test]
fn unbound_strategy_fails_every_tick() {
    let mut strategy: UfoStrategy<PlantTree> = UfoStrategy::new(
        vec![Box::new(PointTarget::new(Point3::zeros()))],
        BTreeMap::new(),
        StrategyParams::default(),
    )
    .expect("strategy");
    let err = strategy.apply_strategy().expect_err("no tree");
    assert!(err.to_string().contains("no plant graph"));
}
