//! The `trellis_core` crate trains a simulated plant onto a trellis.
//! It reads and annotates a generic plant graph once per growth cycle and
//! decides where the trunk is tied and which buds become leaders.
//!
//! Key components:
//! - **Traits**: `PlantGraph` (graph access), `TrellisTarget` (tie points and wires),
//!   `PruningStrategy` (per-tick entry point), `Scalar`/`ResidualSystem` (curve fitting).
//! - **Bezier**: strain-minimising cubic Bézier fit, solved by Levenberg–Marquardt
//!   with Jacobians from the `autodiff` dual numbers.
//! - **Spacing**: arc-length bookkeeping and greedy leader placement.
//! - **Strategy**: the UFO trunk tie-down and leader assignment.
pub mod autodiff;
pub mod bezier;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod params;
pub mod spacing;
pub mod strategy;
pub mod target;
pub mod traits;

pub use error::{GraphError, StrategyError};
