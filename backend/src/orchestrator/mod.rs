//! Orchestrator - main experiment loop
//!
//! See `engine.rs` for the round loop and `result.rs` for the snapshot
//! produced at the end of a run.

pub mod engine;
pub mod result;

// Re-export main types for convenience
pub use engine::{
    agent_view, Condition, Orchestrator, RoundResult, SimulationConfig, SimulationError,
    UnknownCondition,
};
pub use result::{compute_config_hash, AgentMetadata, BehaviorSummary, RunParameters, SimulationResult};
