//! Agent model
//!
//! Represents one participant in an experiment. Each agent has:
//! - An inventory of labels (tradable goods, and in credit conditions IOU labels)
//! - A private target good
//! - A money balance (non-zero only in the money-exchange condition)
//! - A bounded visible history of the messages it sent or received
//!
//! Agents are never mutated by the oracle directly. Only the settlement
//! engines call the mutators below, and every mutator checks its own
//! precondition so a stale decision can never drive a quantity negative.

use crate::models::message::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Errors that can occur during agent operations
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("Insufficient inventory of {label}: held {held}")]
    InsufficientInventory { label: String, held: u64 },

    #[error("Insufficient money: required {required}, available {available}")]
    InsufficientMoney { required: f64, available: f64 },

    #[error("Invalid money amount: {0}")]
    InvalidAmount(f64),
}

/// Economic and informational state of one agent
///
/// # Example
/// ```
/// use agentic_economy_core_rs::AgentState;
///
/// let mut agent = AgentState::new("A0", "g0", "g1", 0.0);
/// assert_eq!(agent.quantity("g0"), 1);
/// assert!(!agent.is_successful());
///
/// agent.remove_unit("g0").unwrap();
/// agent.add_unit("g1");
/// assert!(agent.is_successful());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Unique agent identifier (e.g., "A3")
    name: String,

    /// Label → quantity; zero entries are kept once a label has been held
    inventory: BTreeMap<String, u64>,

    /// Good received at initialization
    endowment: String,

    /// Good the agent must hold at least one unit of to succeed
    target_good: String,

    /// Money balance (never negative)
    money: f64,

    /// Most recent messages, oldest first
    history: VecDeque<HistoryEntry>,
}

impl AgentState {
    /// Create an agent holding one unit of `endowment`
    pub fn new(name: &str, endowment: &str, target_good: &str, money: f64) -> Self {
        let mut inventory = BTreeMap::new();
        inventory.insert(endowment.to_string(), 1);
        Self {
            name: name.to_string(),
            inventory,
            endowment: endowment.to_string(),
            target_good: target_good.to_string(),
            money,
            history: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endowment(&self) -> &str {
        &self.endowment
    }

    pub fn target_good(&self) -> &str {
        &self.target_good
    }

    pub fn money(&self) -> f64 {
        self.money
    }

    pub fn inventory(&self) -> &BTreeMap<String, u64> {
        &self.inventory
    }

    /// Quantity held of `label` (0 if never held)
    pub fn quantity(&self, label: &str) -> u64 {
        self.inventory.get(label).copied().unwrap_or(0)
    }

    pub fn holds(&self, label: &str) -> bool {
        self.quantity(label) > 0
    }

    /// First label (in label order) with a positive quantity
    pub fn first_held(&self) -> Option<&str> {
        self.inventory
            .iter()
            .find(|(_, qty)| **qty > 0)
            .map(|(label, _)| label.as_str())
    }

    /// Success = at least one unit of the target good
    pub fn is_successful(&self) -> bool {
        self.holds(&self.target_good)
    }

    pub fn add_unit(&mut self, label: &str) {
        *self.inventory.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Remove one unit of `label`
    ///
    /// # Errors
    /// `InsufficientInventory` if no unit is held; inventory is unchanged.
    pub fn remove_unit(&mut self, label: &str) -> Result<(), AgentError> {
        match self.inventory.get_mut(label) {
            Some(qty) if *qty > 0 => {
                *qty -= 1;
                Ok(())
            }
            _ => Err(AgentError::InsufficientInventory {
                label: label.to_string(),
                held: 0,
            }),
        }
    }

    pub fn can_afford(&self, amount: f64) -> bool {
        amount.is_finite() && amount >= 0.0 && self.money >= amount
    }

    /// Debit money
    ///
    /// # Errors
    /// `InvalidAmount` for negative/non-finite amounts, `InsufficientMoney`
    /// when the balance would go negative. No state change on error.
    pub fn debit_money(&mut self, amount: f64) -> Result<(), AgentError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AgentError::InvalidAmount(amount));
        }
        if self.money < amount {
            return Err(AgentError::InsufficientMoney {
                required: amount,
                available: self.money,
            });
        }
        self.money -= amount;
        Ok(())
    }

    pub fn credit_money(&mut self, amount: f64) -> Result<(), AgentError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AgentError::InvalidAmount(amount));
        }
        self.money += amount;
        Ok(())
    }

    /// Append to the visible history, evicting oldest entries beyond `limit`
    pub fn record_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.history.push_back(entry);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    /// Visible history, oldest first
    pub fn recent_history(&self) -> Vec<HistoryEntry> {
        self.history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
