//! Agentic Economy Core - Rust Engine
//!
//! Round-based engine for economic experiments among N agents that interact
//! only through a structured message protocol. Decisions come from an
//! injected, untrusted oracle; the engine validates them, settles trades with
//! conservation guarantees and keeps a reproducible audit trail.
//!
//! # Architecture
//!
//! - **core**: endowments, targets and the seeded derangement
//! - **models**: domain types (AgentState, Message ledger, Event log, run state)
//! - **oracle**: decision-source trait, state views, retry, scripted replay
//! - **settlement**: institutions (barter trade engine, money exchange, planner)
//! - **orchestrator**: main round loop and result builder
//! - **rng**: deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Goods are conserved except by logged credit issuance or exchange minting
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Oracle output never crashes a run; malformed decisions are logged as
//!    `invalid_action`
//! 4. Message ids strictly increase within a run

// Module declarations
pub mod core;
pub mod models;
pub mod oracle;
pub mod orchestrator;
pub mod rng;
pub mod settlement;

// Re-exports for convenience
pub use core::assignment::{derangement, AssignmentError, InitialAssignment};
pub use models::{
    agent::{AgentError, AgentState},
    event::{Event, EventLog},
    message::{Message, MessageId, MessageLedger},
    state::SimulationState,
};
pub use oracle::{Oracle, OracleError, OracleRequest, RetryPolicy, ScriptedOracle};
pub use orchestrator::{
    Condition, Orchestrator, RoundResult, SimulationConfig, SimulationError, SimulationResult,
};
pub use rng::RngManager;
pub use settlement::{TradeCapabilities, TradeEngine};
