//! Result Builder
//!
//! Assembles the immutable end-of-run snapshot handed to external tooling for
//! persistence and analysis. The serialized form is the experiment's result
//! schema; field names are part of the contract.
//!
//! # Determinism
//!
//! Every map in the result is a `BTreeMap`, so two runs with the same
//! configuration and the same oracle replies serialize to identical bytes.

use crate::core::assignment::InitialAssignment;
use crate::models::event::{Event, EventLog};
use crate::models::message::Message;
use crate::models::state::SimulationState;
use crate::orchestrator::engine::{Condition, SimulationConfig, SimulationError};
use crate::settlement::exchange::{ExchangeEngine, ExchangeRoundMetrics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Starting position of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub endowment: String,
    pub target: String,
}

/// Parameters recorded alongside the outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub rounds: usize,
    pub history_limit: usize,
    pub model: String,
    /// Configured opening money per agent (money condition only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_money: Option<f64>,
}

/// Per-agent behavioural counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub proposals: usize,
    pub unique_partners: usize,
    /// Proposals whose `(to, give, receive)` repeats an earlier one
    pub repeated_identical_proposals: usize,
    pub messages_sent: usize,
    pub invalid_actions: usize,
}

/// Immutable snapshot of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub condition: Condition,
    #[serde(rename = "N")]
    pub n_agents: usize,
    pub seed: u64,
    pub rounds_run: usize,
    pub agents: BTreeMap<String, AgentMetadata>,
    pub messages: Vec<Message>,
    pub inventory_final: BTreeMap<String, BTreeMap<String, u64>>,
    pub successful_agents: usize,
    pub parameters: RunParameters,
    pub exchange_inventory: Option<BTreeMap<String, u64>>,
    pub exchange_money: Option<f64>,
    pub exchange_price_history: Option<Vec<BTreeMap<String, f64>>>,
    pub exchange_round_metrics: Option<Vec<ExchangeRoundMetrics>>,
    pub events: Vec<Event>,
    pub behavior_summary: BTreeMap<String, BehaviorSummary>,
    /// SHA-256 of the canonical configuration JSON
    pub config_hash: String,
}

impl SimulationResult {
    /// Consume the run context into a result
    pub fn build(
        config: &SimulationConfig,
        assignments: &[InitialAssignment],
        rounds_run: usize,
        state: SimulationState,
        exchange: Option<ExchangeEngine>,
    ) -> Result<Self, SimulationError> {
        let config_hash = compute_config_hash(config)?;
        let inventory_final = state.inventory_snapshot();
        let successful_agents = state.success_count();
        let agent_names = state.agent_names();
        let (_, ledger, event_log) = state.into_parts();

        let behavior_summary = agent_names
            .iter()
            .map(|name| (name.clone(), behavior_summary(name, ledger.messages(), &event_log)))
            .collect();
        let agents = assignments
            .iter()
            .map(|a| {
                let metadata = AgentMetadata {
                    endowment: a.endowment.clone(),
                    target: a.target.clone(),
                };
                (a.agent.clone(), metadata)
            })
            .collect();

        let (exchange_inventory, exchange_money, exchange_price_history, exchange_round_metrics) =
            match exchange {
                Some(exchange) => (
                    Some(exchange.inventory().clone()),
                    Some(exchange.money()),
                    Some(exchange.price_history().to_vec()),
                    Some(exchange.round_metrics().to_vec()),
                ),
                None => (None, None, None, None),
            };

        Ok(Self {
            condition: config.condition,
            n_agents: config.n_agents,
            seed: config.seed,
            rounds_run,
            agents,
            messages: ledger.into_messages(),
            inventory_final,
            successful_agents,
            parameters: RunParameters {
                rounds: config.rounds,
                history_limit: config.history_limit,
                model: config.model_name.clone(),
                starting_money: config
                    .condition
                    .is_monetary()
                    .then_some(config.starting_money),
            },
            exchange_inventory,
            exchange_money,
            exchange_price_history,
            exchange_round_metrics,
            events: event_log.into_events(),
            behavior_summary,
            config_hash,
        })
    }

    /// Whether `agent` ended the run holding its target
    pub fn is_successful(&self, agent: &str) -> bool {
        let Some(metadata) = self.agents.get(agent) else {
            return false;
        };
        self.inventory_final
            .get(agent)
            .and_then(|inv| inv.get(&metadata.target))
            .map_or(false, |qty| *qty >= 1)
    }

    pub fn to_json_pretty(&self) -> Result<String, SimulationError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimulationError::Serialization(format!("Result serialization failed: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Result parse failed: {}", e)))
    }
}

fn behavior_summary(agent: &str, messages: &[Message], events: &EventLog) -> BehaviorSummary {
    let sent_with = |action: &'static str| {
        messages
            .iter()
            .filter(move |m| m.sender == agent && m.action_name() == Some(action))
    };
    let field = |m: &Message, key: &str| m.payload.get(key).and_then(Value::as_str).map(str::to_string);

    let terms: Vec<(Option<String>, Option<String>, Option<String>)> = sent_with("propose_trade")
        .map(|m| (field(m, "to"), field(m, "give"), field(m, "receive")))
        .collect();
    let distinct: BTreeSet<_> = terms.iter().cloned().collect();
    let partners: BTreeSet<&String> = terms.iter().filter_map(|t| t.0.as_ref()).collect();

    BehaviorSummary {
        proposals: terms.len(),
        unique_partners: partners.len(),
        repeated_identical_proposals: terms.len() - distinct.len(),
        messages_sent: sent_with("send_message").count(),
        invalid_actions: events.invalid_action_count(agent),
    }
}

/// Compute SHA-256 hash of a configuration
///
/// Object keys are sorted recursively first, so the hash does not depend on
/// field declaration order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    let value = serde_json::to_value(config)
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
