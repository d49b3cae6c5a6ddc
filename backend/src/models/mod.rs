//! Domain models for the agentic economy

pub mod action;
pub mod agent;
pub mod event;
pub mod message;
pub mod state;

// Re-exports
pub use action::{AgentAction, ExchangeResponse, InvalidReason, Side};
pub use agent::{AgentError, AgentState};
pub use event::{Event, EventLog};
pub use message::{Direction, HistoryEntry, Message, MessageId, MessageLedger};
pub use state::{SimulationState, EXCHANGE_ID, PLANNER_ID};
