//! Action vocabulary
//!
//! Oracle output is untrusted JSON. This module turns it into typed actions
//! without ever failing the run: anything that does not fit the vocabulary is
//! reported as an [`InvalidReason`] and the caller logs it.
//!
//! Agent actions (key `action`):
//! - `propose_trade{to,give,receive}`, `accept{of_message_id}`,
//!   `reject{of_message_id}`, `idle`, `send_message{to,message}`
//! - `request_quote{good}`, `buy{good,quantity}`, `sell{good,quantity}`
//!
//! Exchange responses: `quote{good,price}`,
//! `confirm{good,quantity,price,side}`, `deny{reason}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reason code attached to an `invalid_action` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Not an object, no string `action`, or a field of the wrong type
    MalformedAction,
    /// `action` names nothing in the vocabulary
    UnknownAction,
    /// A vocabulary action that this condition does not accept
    UnsupportedAction,
    InvalidSendMessage,
    InvalidReceiver,
    MissingTradeFields,
    NonTradableLabel,
    InsufficientInventory,
    MissingProposalId,
    UnknownProposalId,
    NotIntendedReceiver,
    MissingGood,
    UnknownGood,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MalformedAction => "malformed_action",
            InvalidReason::UnknownAction => "unknown_action",
            InvalidReason::UnsupportedAction => "unsupported_action",
            InvalidReason::InvalidSendMessage => "invalid_send_message",
            InvalidReason::InvalidReceiver => "invalid_receiver",
            InvalidReason::MissingTradeFields => "missing_trade_fields",
            InvalidReason::NonTradableLabel => "non_tradable_label",
            InvalidReason::InsufficientInventory => "insufficient_inventory",
            InvalidReason::MissingProposalId => "missing_proposal_id",
            InvalidReason::UnknownProposalId => "unknown_proposal_id",
            InvalidReason::NotIntendedReceiver => "not_intended_receiver",
            InvalidReason::MissingGood => "missing_good",
            InvalidReason::UnknownGood => "unknown_good",
        }
    }
}

/// Every action name an agent may emit, across all conditions
pub const AGENT_ACTIONS: &[&str] = &[
    "propose_trade",
    "accept",
    "reject",
    "idle",
    "send_message",
    "request_quote",
    "buy",
    "sell",
];

/// A structurally valid agent action
///
/// Fields stay optional: a missing field is a protocol violation with its own
/// reason code, not a parse failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    ProposeTrade {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        give: Option<String>,
        #[serde(default)]
        receive: Option<String>,
    },
    Accept {
        #[serde(default)]
        of_message_id: Option<String>,
    },
    Reject {
        #[serde(default)]
        of_message_id: Option<String>,
    },
    Idle {},
    SendMessage {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    RequestQuote {
        #[serde(default)]
        good: Option<String>,
    },
    Buy {
        #[serde(default)]
        good: Option<String>,
    },
    Sell {
        #[serde(default)]
        good: Option<String>,
    },
}

impl AgentAction {
    /// Parse an oracle-provided action object
    ///
    /// # Example
    /// ```
    /// use agentic_economy_core_rs::models::action::{AgentAction, InvalidReason};
    /// use serde_json::json;
    ///
    /// let action = AgentAction::parse(&json!({"action": "accept", "of_message_id": "m3"}));
    /// assert!(matches!(action, Ok(AgentAction::Accept { .. })));
    ///
    /// let bogus = AgentAction::parse(&json!({"action": "steal"}));
    /// assert_eq!(bogus, Err(InvalidReason::UnknownAction));
    /// ```
    pub fn parse(value: &Value) -> Result<AgentAction, InvalidReason> {
        let name = value
            .as_object()
            .and_then(|obj| obj.get("action"))
            .and_then(Value::as_str)
            .ok_or(InvalidReason::MalformedAction)?;
        if !AGENT_ACTIONS.contains(&name) {
            return Err(InvalidReason::UnknownAction);
        }
        AgentAction::deserialize(value).map_err(|_| InvalidReason::MalformedAction)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::ProposeTrade { .. } => "propose_trade",
            AgentAction::Accept { .. } => "accept",
            AgentAction::Reject { .. } => "reject",
            AgentAction::Idle {} => "idle",
            AgentAction::SendMessage { .. } => "send_message",
            AgentAction::RequestQuote { .. } => "request_quote",
            AgentAction::Buy { .. } => "buy",
            AgentAction::Sell { .. } => "sell",
        }
    }
}

/// Treat absent and blank strings alike
pub(crate) fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Response kinds the exchange oracle may return
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExchangeResponse {
    Quote {
        #[serde(default)]
        good: Option<String>,
        #[serde(default)]
        price: Option<f64>,
    },
    Confirm {
        #[serde(default)]
        good: Option<String>,
        #[serde(default)]
        quantity: Option<f64>,
        #[serde(default)]
        price: Option<f64>,
        #[serde(default)]
        side: Option<String>,
    },
    Deny {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ExchangeResponse {
    /// Parse a response payload; `None` when it fits no response kind
    pub fn parse(value: &Value) -> Option<ExchangeResponse> {
        ExchangeResponse::deserialize(value).ok()
    }

    /// `deny{reason:"missing response"}` used to pad a short outbox
    pub fn missing_response_payload() -> Value {
        serde_json::json!({"action": "deny", "reason": "missing response"})
    }
}

/// Side of a confirmed exchange trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(side: &str) -> Option<Side> {
        match side {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}
