//! Settlement Module
//!
//! The three institutions an experiment can run under:
//! - [`barter`]: bilateral proposals, accepts and rejects (optionally with
//!   IOU credit labels and a free-text side channel)
//! - [`exchange`]: a price-setting counterparty that quotes and fills
//!   single-unit buy/sell requests against money
//! - [`planner`]: a central matcher that swaps mutually compatible pairs
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: a trade, fill or swap applies all of its effects or none
//! 2. **Conservation**: goods move, they are never created or destroyed,
//!    except for credit issuance and exchange minting, each logged as its own
//!    event
//! 3. **Late verification**: preconditions are re-checked immediately before
//!    mutation, never trusted from validation time
//! 4. **Non-negativity**: no inventory quantity or agent money balance ever
//!    drops below zero
//!
//! # Example
//!
//! ```rust
//! use agentic_economy_core_rs::{AgentState, RngManager, SimulationState};
//! use agentic_economy_core_rs::settlement::{TradeCapabilities, TradeEngine};
//! use serde_json::json;
//!
//! let agents = vec![
//!     AgentState::new("A0", "g0", "g1", 0.0),
//!     AgentState::new("A1", "g1", "g0", 0.0),
//! ];
//! let mut state = SimulationState::new(agents, vec!["g0".into(), "g1".into()], RngManager::new(7), 10);
//! let mut engine = TradeEngine::new(TradeCapabilities::BARTER);
//!
//! engine.apply_action(&mut state, 1, "A0", &json!({
//!     "action": "propose_trade", "to": "A1", "give": "g0", "receive": "g1"
//! }));
//! engine.apply_action(&mut state, 1, "A1", &json!({"action": "accept", "of_message_id": "m0"}));
//!
//! assert!(state.all_successful());
//! ```

pub mod barter;
pub mod exchange;
pub mod planner;

// Re-export public API
pub use barter::{
    execute_trade, ActionOutcome, BarterRoundOutcome, TradeCapabilities, TradeEngine, TradeError,
    TradeReceipt,
};
pub use exchange::{
    ExchangeEngine, ExchangeRoundMetrics, InboxEntry, NormalizedOutbox, OutboxEntry, Submission,
};
pub use planner::{match_pairs, send_assignments, send_reports, swap_payload};
