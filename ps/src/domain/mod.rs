//! Domain types: dialogue turns and the structured project plan

mod plan;
mod turn;

pub use plan::{
    FeatureGroup, Milestone, Overview, Resources, Risk, Scope, StructuredPlan, TaskPhase, Timeline, normalize_payload,
};
pub use turn::{Role, Turn};
