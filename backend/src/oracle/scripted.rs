//! Scripted oracle for deterministic replays and tests
//!
//! Replies are keyed by caller identity: one FIFO queue per agent name and
//! one for the Exchange. An exhausted agent queue answers `idle`; an
//! exhausted exchange queue answers an empty outbox. Handlers can replace the
//! queues when a reply depends on what the caller sees.

use crate::oracle::{AgentView, ExchangeView, Oracle, OracleError, OracleRequest};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

type AgentHandler = Box<dyn FnMut(&AgentView, usize) -> Value>;
type ExchangeHandler = Box<dyn FnMut(&ExchangeView) -> Value>;

/// Deterministic [`Oracle`] double
///
/// # Example
///
/// ```rust
/// use agentic_economy_core_rs::oracle::ScriptedOracle;
/// use serde_json::json;
///
/// let oracle = ScriptedOracle::new()
///     .with_agent_script("A0", vec![json!({"action": "propose_trade", "to": "A1", "give": "g0", "receive": "g1"})])
///     .with_agent_script("A1", vec![json!({"action": "idle"}), json!({"action": "accept", "of_message_id": "m0"})]);
/// assert_eq!(oracle.calls_for("A0"), 0);
/// ```
#[derive(Default)]
pub struct ScriptedOracle {
    agent_scripts: HashMap<String, VecDeque<String>>,
    exchange_script: VecDeque<String>,
    agent_handler: Option<AgentHandler>,
    exchange_handler: Option<ExchangeHandler>,
    failures: VecDeque<OracleError>,
    calls: HashMap<String, usize>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue JSON replies for `agent`, consumed one per call
    pub fn with_agent_script(mut self, agent: &str, replies: Vec<Value>) -> Self {
        self.push_agent_replies(agent, replies.into_iter().map(|v| v.to_string()));
        self
    }

    /// Queue raw text replies for `agent` (for malformed-output scenarios)
    pub fn with_raw_agent_replies(mut self, agent: &str, replies: Vec<&str>) -> Self {
        self.push_agent_replies(agent, replies.into_iter().map(str::to_string));
        self
    }

    /// Queue replies for the Exchange
    pub fn with_exchange_script(mut self, replies: Vec<Value>) -> Self {
        self.exchange_script
            .extend(replies.into_iter().map(|v| v.to_string()));
        self
    }

    /// Compute agent replies from the view and the caller's call index
    /// (0-based); takes precedence over queued scripts
    pub fn with_agent_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&AgentView, usize) -> Value + 'static,
    {
        self.agent_handler = Some(Box::new(handler));
        self
    }

    /// Compute exchange replies from the exchange view
    pub fn with_exchange_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&ExchangeView) -> Value + 'static,
    {
        self.exchange_handler = Some(Box::new(handler));
        self
    }

    /// Fail the next call(s) with `error`, in the order queued
    pub fn fail_next(&mut self, error: OracleError) {
        self.failures.push_back(error);
    }

    /// Calls made on behalf of `caller` (failed attempts included)
    pub fn calls_for(&self, caller: &str) -> usize {
        self.calls.get(caller).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.values().sum()
    }

    fn push_agent_replies(&mut self, agent: &str, replies: impl Iterator<Item = String>) {
        self.agent_scripts
            .entry(agent.to_string())
            .or_default()
            .extend(replies);
    }
}

impl Oracle for ScriptedOracle {
    fn propose(&mut self, request: &OracleRequest) -> Result<String, OracleError> {
        let caller = request.caller().to_string();
        let call_index = self.calls.get(&caller).copied().unwrap_or(0);
        *self.calls.entry(caller.clone()).or_insert(0) += 1;

        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }

        let reply = match request {
            OracleRequest::Agent(view) => match self.agent_handler.as_mut() {
                Some(handler) => handler(view, call_index).to_string(),
                None => self
                    .agent_scripts
                    .get_mut(&caller)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or_else(|| json!({"action": "idle"}).to_string()),
            },
            OracleRequest::Exchange(view) => match self.exchange_handler.as_mut() {
                Some(handler) => handler(view).to_string(),
                None => self
                    .exchange_script
                    .pop_front()
                    .unwrap_or_else(|| json!({"outbox": []}).to_string()),
            },
        };
        Ok(reply)
    }
}

impl std::fmt::Debug for ScriptedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedOracle")
            .field("queued_agents", &self.agent_scripts.len())
            .field("queued_exchange", &self.exchange_script.len())
            .field("pending_failures", &self.failures.len())
            .field("calls", &self.calls)
            .finish()
    }
}
