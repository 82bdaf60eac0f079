use thiserror::Error;

use crate::graph::{BranchId, NodeId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("expected exactly one branch matching {filter}, found {count}")]
    NotUnique { filter: String, count: usize },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("no internode between nodes {0} and {1}")]
    MissingEdge(NodeId, NodeId),

    #[error("node span must contain at least two nodes, got {0}")]
    EmptySpan(usize),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("no plant graph bound to the strategy")]
    TreeNotBound,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },
}
