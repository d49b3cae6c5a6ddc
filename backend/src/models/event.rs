//! Event logging for analysis and auditing.
//!
//! The event log is a diagnostic trail kept beside the message ledger. It
//! records what each agent tried, what was rejected and why, and every
//! departure from conservation (credit issuance, exchange minting). It is
//! never consulted to decide protocol outcomes.
//!
//! # Example
//!
//! ```rust
//! use agentic_economy_core_rs::models::event::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::ProposalRejected {
//!     round: 2,
//!     sender: "A0".to_string(),
//!     receiver: "A1".to_string(),
//!     proposal_id: "m0".to_string(),
//! });
//! assert_eq!(log.events_of_type("proposal_rejected").len(), 1);
//! ```

use crate::models::action::{InvalidReason, Side};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Simulation event
///
/// All events include a round number. Events are logged in the order they
/// occur within a round. Serialized with an `"event"` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Raw oracle decision for an agent, with the state it was made in
    AgentAction {
        round: usize,
        agent: String,
        action: Value,
        inventory: BTreeMap<String, u64>,
        target_good: String,
        money: f64,
    },

    /// Action rejected by protocol validation
    InvalidAction {
        round: usize,
        agent: String,
        reason: InvalidReason,
        action: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        proposal_id: Option<String>,
    },

    /// Free-text chat delivered
    MessageSent {
        round: usize,
        sender: String,
        receiver: String,
        message_id: String,
    },

    ProposalMade {
        round: usize,
        sender: String,
        receiver: String,
        give: String,
        receive: String,
        message_id: String,
    },

    TradeExecuted {
        round: usize,
        sender: String,
        receiver: String,
        give: String,
        receive: String,
        proposal_id: String,
    },

    /// Accepted proposal whose preconditions no longer held
    TradeFailed {
        round: usize,
        sender: String,
        receiver: String,
        proposal_id: String,
        payload: Value,
    },

    ProposalRejected {
        round: usize,
        sender: String,
        receiver: String,
        proposal_id: String,
    },

    /// An uncollateralized IOU unit was created by an executed trade
    CreditIssued {
        round: usize,
        issuer: String,
        receiver: String,
        label: String,
        proposal_id: String,
    },

    /// Raw exchange oracle reply
    ExchangeAction { round: usize, response: Value },

    ExchangeOutboxPadded {
        round: usize,
        inbox_len: usize,
        outbox_len: usize,
        padded: usize,
    },

    /// A confirm moved goods and money
    ExchangeSettled {
        round: usize,
        agent: String,
        good: String,
        side: Side,
        price: f64,
    },

    /// A confirm that could not be honoured
    ExchangeConfirmIgnored {
        round: usize,
        agent: String,
        reason: String,
        response: Value,
    },

    /// Exchange created a unit to stay liquid
    ExchangeMinted { round: usize, good: String },

    PlannerSwap {
        round: usize,
        agent_a: String,
        agent_b: String,
        good_a: String,
        good_b: String,
    },
}

impl Event {
    /// Get the round number when this event occurred
    pub fn round(&self) -> usize {
        match self {
            Event::AgentAction { round, .. } => *round,
            Event::InvalidAction { round, .. } => *round,
            Event::MessageSent { round, .. } => *round,
            Event::ProposalMade { round, .. } => *round,
            Event::TradeExecuted { round, .. } => *round,
            Event::TradeFailed { round, .. } => *round,
            Event::ProposalRejected { round, .. } => *round,
            Event::CreditIssued { round, .. } => *round,
            Event::ExchangeAction { round, .. } => *round,
            Event::ExchangeOutboxPadded { round, .. } => *round,
            Event::ExchangeSettled { round, .. } => *round,
            Event::ExchangeConfirmIgnored { round, .. } => *round,
            Event::ExchangeMinted { round, .. } => *round,
            Event::PlannerSwap { round, .. } => *round,
        }
    }

    /// Tag used in the serialized form
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::AgentAction { .. } => "agent_action",
            Event::InvalidAction { .. } => "invalid_action",
            Event::MessageSent { .. } => "message_sent",
            Event::ProposalMade { .. } => "proposal_made",
            Event::TradeExecuted { .. } => "trade_executed",
            Event::TradeFailed { .. } => "trade_failed",
            Event::ProposalRejected { .. } => "proposal_rejected",
            Event::CreditIssued { .. } => "credit_issued",
            Event::ExchangeAction { .. } => "exchange_action",
            Event::ExchangeOutboxPadded { .. } => "exchange_outbox_padded",
            Event::ExchangeSettled { .. } => "exchange_settled",
            Event::ExchangeConfirmIgnored { .. } => "exchange_confirm_ignored",
            Event::ExchangeMinted { .. } => "exchange_minted",
            Event::PlannerSwap { .. } => "planner_swap",
        }
    }

    /// Acting agent, if the event is attributable to one
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::AgentAction { agent, .. } => Some(agent),
            Event::InvalidAction { agent, .. } => Some(agent),
            Event::MessageSent { sender, .. } => Some(sender),
            Event::ProposalMade { sender, .. } => Some(sender),
            Event::TradeExecuted { receiver, .. } => Some(receiver),
            Event::TradeFailed { receiver, .. } => Some(receiver),
            Event::ProposalRejected { receiver, .. } => Some(receiver),
            Event::CreditIssued { issuer, .. } => Some(issuer),
            Event::ExchangeSettled { agent, .. } => Some(agent),
            Event::ExchangeConfirmIgnored { agent, .. } => Some(agent),
            _ => None,
        }
    }
}

/// Append-only event log with query helpers
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_in_round(&self, round: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.round() == round).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent_id() == Some(agent_id))
            .collect()
    }

    /// Count of `invalid_action` events attributed to `agent_id`
    pub fn invalid_action_count(&self, agent_id: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::InvalidAction { agent, .. } if agent == agent_id))
            .count()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
