//! Protocol messages and the canonical message ledger
//!
//! Every protocol-level communication (proposals, replies, chat, exchange
//! requests and responses, planner reports and swaps) is a [`Message`] in the
//! [`MessageLedger`]. The ledger is the authoritative, append-only record of
//! what each participant was told; the event log is diagnostic only.
//!
//! # Critical Invariants
//!
//! 1. **Monotonic ids**: ids are issued as `m0, m1, m2, ...` and never reused
//! 2. **Append-only**: a logged message is never mutated or removed
//! 3. **Ledger order = issue order**: messages are stored in id order

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a message identifier from its wire form
#[derive(Debug, Error, PartialEq)]
#[error("Invalid message id: {0:?}")]
pub struct MessageIdParseError(pub String);

/// Unique, strictly increasing message identifier
///
/// The wire form is `m<n>`, e.g. `m0`, `m17`. Oracles refer to proposals by
/// this string, so parsing must tolerate arbitrary garbage.
///
/// # Example
/// ```
/// use agentic_economy_core_rs::models::message::MessageId;
///
/// let id: MessageId = "m12".parse().unwrap();
/// assert_eq!(id.to_string(), "m12");
/// assert!("12".parse::<MessageId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MessageId(u64);

impl MessageId {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = MessageIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // only the canonical `m<n>` form: no padding, no leading zeros
        let digits = s
            .strip_prefix('m')
            .ok_or_else(|| MessageIdParseError(s.to_string()))?;
        if digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return Err(MessageIdParseError(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(MessageId)
            .map_err(|_| MessageIdParseError(s.to_string()))
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = MessageIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A logged protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "round")]
    pub round_number: usize,
    pub sender: String,
    pub receiver: String,
    pub message_id: MessageId,
    /// Opaque action/response object exactly as submitted
    pub payload: Value,
}

impl Message {
    /// Value of the payload's `action` field, if any
    pub fn action_name(&self) -> Option<&str> {
        self.payload.get("action").and_then(Value::as_str)
    }
}

/// Direction of a message relative to the agent whose history holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Direction-tagged copy of a message in an agent's visible history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub message_id: MessageId,
    pub round: usize,
    pub payload: Value,
}

impl HistoryEntry {
    pub fn new(direction: Direction, message: &Message) -> Self {
        Self {
            direction,
            from: message.sender.clone(),
            to: message.receiver.clone(),
            message_id: message.message_id,
            round: message.round_number,
            payload: message.payload.clone(),
        }
    }
}

/// Append-only ordered log of canonical messages
///
/// Also the sole issuer of message ids within a run.
#[derive(Debug, Clone, Default)]
pub struct MessageLedger {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next message id
    pub fn next_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocate an id and build a message in one step
    pub fn compose(
        &mut self,
        round_number: usize,
        sender: &str,
        receiver: &str,
        payload: Value,
    ) -> Message {
        Message {
            round_number,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            message_id: self.next_id(),
            payload,
        }
    }

    /// Append a message to the canonical log
    ///
    /// # Panics
    ///
    /// Panics if the message id does not exceed every id already logged
    /// (messages must be appended in issue order).
    pub fn append(&mut self, message: Message) {
        if let Some(last) = self.messages.last() {
            assert!(
                message.message_id > last.message_id,
                "Message {} appended after {}",
                message.message_id,
                last.message_id
            );
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .binary_search_by_key(&id, |m| m.message_id)
            .ok()
            .map(|idx| &self.messages[idx])
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
