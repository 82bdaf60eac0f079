//! Training strategies that react to a grown plant graph once per cycle.

pub mod types;
pub mod ufo;

pub use types::{LeaderSummary, RetrainPlan, TieOutcome, TiedBranchAction, TiedNodeRegistry};
pub use ufo::{UfoStrategy, GUIDE_SAMPLES, YOUNG_TRUNK_LENGTH};
