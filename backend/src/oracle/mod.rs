//! Decision Oracle Interface
//!
//! The oracle is the external, untrusted decision source: given a read-only
//! view of one agent's (or the Exchange's) visible state it returns one JSON
//! object as text. The core never trusts that text: it is parsed leniently,
//! and anything that does not fit the action vocabulary becomes an
//! `invalid_action`, never a crash.
//!
//! # Error Tiers
//!
//! - `Transient` (timeouts, rate limiting): retried up to
//!   [`RetryPolicy::max_retries`] times with a fixed delay
//! - `Fatal`, or transient failures that exhaust retries: the run aborts
//! - Unparseable text: not an error at this layer at all
//!
//! # Example
//!
//! ```rust
//! use agentic_economy_core_rs::oracle::{Oracle, OracleError, OracleRequest};
//!
//! struct AlwaysIdle;
//!
//! impl Oracle for AlwaysIdle {
//!     fn propose(&mut self, _request: &OracleRequest) -> Result<String, OracleError> {
//!         Ok(r#"{"action":"idle"}"#.to_string())
//!     }
//! }
//! ```

pub mod scripted;

pub use scripted::ScriptedOracle;

use crate::models::message::HistoryEntry;
use crate::orchestrator::Condition;
use crate::settlement::exchange::InboxEntry;
use retry::delay::Fixed;
use retry::{Error as RetryError, OperationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Failure reported by an oracle call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    /// Worth retrying (timeout, rate limit, temporary unavailability)
    #[error("Transient oracle failure: {0}")]
    Transient(String),

    /// Not worth retrying
    #[error("Fatal oracle failure: {0}")]
    Fatal(String),

    #[error("Oracle still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// What an agent is allowed to see when deciding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub condition: Condition,
    pub round: usize,
    pub agent: String,
    pub inventory: BTreeMap<String, u64>,
    /// Present only in the money condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money: Option<f64>,
    pub target_good: String,
    /// Bounded visible history, oldest first
    pub recent_messages: Vec<HistoryEntry>,
    pub allowed_actions: Vec<&'static str>,
}

/// Holdings summary shown to the Exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateState {
    /// Per-good units across all agents plus the exchange's own stock
    pub inventory_totals: BTreeMap<String, u64>,
    pub money_balances: BTreeMap<String, f64>,
    pub exchange_money: f64,
}

/// What the Exchange sees when resolving a round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeView {
    pub round: usize,
    pub prices: BTreeMap<String, f64>,
    pub aggregate_state: AggregateState,
    pub inbox: Vec<InboxEntry>,
}

/// One oracle call's input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleRequest {
    Agent(AgentView),
    Exchange(ExchangeView),
}

impl OracleRequest {
    /// Identity the decision is made for
    pub fn caller(&self) -> &str {
        match self {
            OracleRequest::Agent(view) => &view.agent,
            OracleRequest::Exchange(_) => crate::models::state::EXCHANGE_ID,
        }
    }

    pub fn round(&self) -> usize {
        match self {
            OracleRequest::Agent(view) => view.round,
            OracleRequest::Exchange(view) => view.round,
        }
    }

    /// Structured textual description handed to prompt builders
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Injected decision capability
///
/// Implementations block until a reply is available. They classify their own
/// failures; the core handles retry and escalation.
pub trait Oracle {
    fn propose(&mut self, request: &OracleRequest) -> Result<String, OracleError>;
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn propose(&mut self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).propose(request)
    }
}

/// Bounded, fixed-delay retry for transient oracle failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts (tests, replays)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay_ms: 0,
        }
    }
}

/// Call the oracle, retrying transient failures per `policy`
///
/// # Returns
///
/// - `Ok(text)` as soon as any attempt succeeds
/// - `Err(Fatal)` immediately on a fatal failure
/// - `Err(RetriesExhausted)` after `max_retries + 1` transient failures
pub fn propose_with_retry(
    oracle: &mut dyn Oracle,
    request: &OracleRequest,
    policy: &RetryPolicy,
) -> Result<String, OracleError> {
    let delays = Fixed::from_millis(policy.retry_delay_ms).take(policy.max_retries as usize);
    let mut attempts: u32 = 0;
    let outcome = retry::retry(delays, || {
        attempts += 1;
        match oracle.propose(request) {
            Ok(reply) => OperationResult::Ok(reply),
            Err(OracleError::Transient(reason)) => {
                if attempts <= policy.max_retries {
                    warn!(
                        caller = request.caller(),
                        round = request.round(),
                        attempt = attempts,
                        delay_ms = policy.retry_delay_ms,
                        error = %reason,
                        "oracle_retry"
                    );
                }
                OperationResult::Retry(OracleError::Transient(reason))
            }
            Err(err) => OperationResult::Err(err),
        }
    });

    outcome.map_err(|err: RetryError<OracleError>| match err.error {
        OracleError::Transient(last) => OracleError::RetriesExhausted { attempts, last },
        other => other,
    })
}

/// Best-effort extraction of one JSON value from oracle text
///
/// Accepts bare JSON, or JSON embedded in surrounding prose/code fences (the
/// outermost `{...}` span). Returns `None` when nothing parses.
///
/// # Example
/// ```
/// use agentic_economy_core_rs::oracle::parse_reply;
///
/// let value = parse_reply("```json\n{\"action\":\"idle\"}\n```").unwrap();
/// assert_eq!(value["action"], "idle");
/// assert!(parse_reply("no idea").is_none());
/// ```
pub fn parse_reply(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Flaky {
        failures: VecDeque<OracleError>,
        calls: u32,
    }

    impl Oracle for Flaky {
        fn propose(&mut self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.calls += 1;
            match self.failures.pop_front() {
                Some(err) => Err(err),
                None => Ok("{\"action\":\"idle\"}".to_string()),
            }
        }
    }

    fn request() -> OracleRequest {
        OracleRequest::Agent(AgentView {
            condition: Condition::Barter,
            round: 1,
            agent: "A0".to_string(),
            inventory: BTreeMap::new(),
            money: None,
            target_good: "g1".to_string(),
            recent_messages: vec![],
            allowed_actions: vec!["idle"],
        })
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let mut oracle = Flaky {
            failures: VecDeque::from(vec![
                OracleError::Transient("timeout".into()),
                OracleError::Transient("rate limited".into()),
            ]),
            calls: 0,
        };
        let reply = propose_with_retry(&mut oracle, &request(), &RetryPolicy::immediate(2));
        assert!(reply.is_ok());
        assert_eq!(oracle.calls, 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut oracle = Flaky {
            failures: VecDeque::from(vec![OracleError::Transient("timeout".into()); 5]),
            calls: 0,
        };
        let reply = propose_with_retry(&mut oracle, &request(), &RetryPolicy::immediate(1));
        assert_eq!(
            reply,
            Err(OracleError::RetriesExhausted {
                attempts: 2,
                last: "timeout".to_string()
            })
        );
        assert_eq!(oracle.calls, 2);
    }

    #[test]
    fn test_fatal_failure_is_not_retried() {
        let mut oracle = Flaky {
            failures: VecDeque::from(vec![OracleError::Fatal("bad api key".into())]),
            calls: 0,
        };
        let reply = propose_with_retry(&mut oracle, &request(), &RetryPolicy::immediate(3));
        assert!(matches!(reply, Err(OracleError::Fatal(_))));
        assert_eq!(oracle.calls, 1);
    }

    #[test]
    fn test_delayed_retries_wait_between_attempts() {
        let mut oracle = Flaky {
            failures: VecDeque::from(vec![OracleError::Transient("timeout".into()); 3]),
            calls: 0,
        };
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 5,
        };
        let started = std::time::Instant::now();
        let reply = propose_with_retry(&mut oracle, &request(), &policy);
        assert!(matches!(
            reply,
            Err(OracleError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(oracle.calls, 3);
        assert!(started.elapsed() >= std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_zero_retries_is_a_single_attempt() {
        let mut oracle = Flaky {
            failures: VecDeque::from(vec![OracleError::Transient("timeout".into())]),
            calls: 0,
        };
        let reply = propose_with_retry(&mut oracle, &request(), &RetryPolicy::immediate(0));
        assert_eq!(
            reply,
            Err(OracleError::RetriesExhausted {
                attempts: 1,
                last: "timeout".to_string()
            })
        );
        assert_eq!(oracle.calls, 1);
    }

    #[test]
    fn test_request_serializes_with_kind() {
        let text = request().to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "agent");
        assert_eq!(value["condition"], "barter");
        assert!(value.get("money").is_none());
    }
}
