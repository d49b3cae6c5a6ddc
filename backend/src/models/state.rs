//! Simulation State
//!
//! The run context: the agent registry plus everything else that is shared,
//! mutable and scoped to one experiment run (message ledger, event log, RNG,
//! tradable-good set). Engines receive it explicitly as `&mut SimulationState`;
//! there are no process-wide singletons.
//!
//! # Critical Invariants
//!
//! 1. **Registration order**: agents iterate in the order they were registered
//! 2. **Unique identities**: no two agents share a name
//! 3. **Bounded visibility**: an agent's history never exceeds `history_limit`
//! 4. **Synthetic parties hold no history**: `Exchange` and `Planner` are not
//!    registered agents

use crate::models::agent::AgentState;
use crate::models::event::{Event, EventLog};
use crate::models::message::{Direction, HistoryEntry, Message, MessageId, MessageLedger};
use crate::rng::RngManager;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Identity of the synthetic counterparty in the money condition
pub const EXCHANGE_ID: &str = "Exchange";

/// Identity of the synthetic authority in the central-planner condition
pub const PLANNER_ID: &str = "Planner";

/// Complete mutable state of one experiment run
///
/// # Example
///
/// ```rust
/// use agentic_economy_core_rs::{AgentState, RngManager, SimulationState};
/// use serde_json::json;
///
/// let agents = vec![
///     AgentState::new("A0", "g0", "g1", 0.0),
///     AgentState::new("A1", "g1", "g0", 0.0),
/// ];
/// let mut state = SimulationState::new(agents, vec!["g0".into(), "g1".into()], RngManager::new(1), 5);
///
/// let id = state.send(1, "A0", "A1", json!({"action": "idle"}));
/// assert_eq!(id.to_string(), "m0");
/// assert_eq!(state.get_agent("A1").unwrap().history_len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SimulationState {
    agents: Vec<AgentState>,
    index: HashMap<String, usize>,
    goods: Vec<String>,
    good_set: HashSet<String>,
    ledger: MessageLedger,
    event_log: EventLog,
    rng: RngManager,
    history_limit: usize,
}

impl SimulationState {
    /// Create a new run context
    ///
    /// # Panics
    ///
    /// Panics on duplicate agent names.
    pub fn new(
        agents: Vec<AgentState>,
        goods: Vec<String>,
        rng: RngManager,
        history_limit: usize,
    ) -> Self {
        let mut index = HashMap::new();
        for (idx, agent) in agents.iter().enumerate() {
            let previous = index.insert(agent.name().to_string(), idx);
            assert!(previous.is_none(), "Duplicate agent name {}", agent.name());
        }
        let good_set = goods.iter().cloned().collect();

        Self {
            agents,
            index,
            goods,
            good_set,
            ledger: MessageLedger::new(),
            event_log: EventLog::new(),
            rng,
            history_limit,
        }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn get_agent(&self, name: &str) -> Option<&AgentState> {
        self.index.get(name).map(|&idx| &self.agents[idx])
    }

    pub fn get_agent_mut(&mut self, name: &str) -> Option<&mut AgentState> {
        match self.index.get(name) {
            Some(&idx) => Some(&mut self.agents[idx]),
            None => None,
        }
    }

    /// Mutable access to two distinct agents at once
    ///
    /// Returns `None` if either is unknown or both names are the same.
    pub fn agent_pair_mut(
        &mut self,
        first: &str,
        second: &str,
    ) -> Option<(&mut AgentState, &mut AgentState)> {
        let a = *self.index.get(first)?;
        let b = *self.index.get(second)?;
        if a == b {
            return None;
        }
        if a < b {
            let (left, right) = self.agents.split_at_mut(b);
            Some((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.agents.split_at_mut(a);
            Some((&mut right[0], &mut left[b]))
        }
    }

    pub fn contains_agent(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Agents in registration order
    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    /// Agent names in registration order
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn goods(&self) -> &[String] {
        &self.goods
    }

    /// Whether `label` belongs to the fixed, finite tradable-good set
    pub fn is_good(&self, label: &str) -> bool {
        self.good_set.contains(label)
    }

    pub fn rng_mut(&mut self) -> &mut RngManager {
        &mut self.rng
    }

    // ========================================================================
    // Ledger & events
    // ========================================================================

    pub fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }

    /// Append a message and copy it into the histories of registered parties
    pub fn log_message(&mut self, message: Message) {
        let limit = self.history_limit;
        if let Some(&idx) = self.index.get(&message.sender) {
            self.agents[idx].record_history(HistoryEntry::new(Direction::Outgoing, &message), limit);
        }
        if let Some(&idx) = self.index.get(&message.receiver) {
            self.agents[idx].record_history(HistoryEntry::new(Direction::Incoming, &message), limit);
        }
        self.ledger.append(message);
    }

    /// Compose and log a new message, returning the id it was issued
    pub fn send(&mut self, round: usize, sender: &str, receiver: &str, payload: Value) -> MessageId {
        self.post(round, sender, receiver, payload).message_id
    }

    /// Like [`send`](Self::send), but hands back a copy of the logged message
    pub fn post(&mut self, round: usize, sender: &str, receiver: &str, payload: Value) -> Message {
        let message = self.ledger.compose(round, sender, receiver, payload);
        self.log_message(message.clone());
        message
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Number of agents holding their target good
    pub fn success_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_successful()).count()
    }

    pub fn all_successful(&self) -> bool {
        self.success_count() == self.agents.len()
    }

    /// Agent name → inventory copy
    pub fn inventory_snapshot(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.agents
            .iter()
            .map(|a| (a.name().to_string(), a.inventory().clone()))
            .collect()
    }

    /// Units of `label` held across all agents
    pub fn total_quantity(&self, label: &str) -> u64 {
        self.agents.iter().map(|a| a.quantity(label)).sum()
    }

    /// Consume the context into agents, ledger and event log
    pub fn into_parts(self) -> (Vec<AgentState>, MessageLedger, EventLog) {
        (self.agents, self.ledger, self.event_log)
    }
}
