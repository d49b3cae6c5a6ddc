//! Money Exchange Engine
//!
//! A synthetic counterparty, `Exchange`, trades single units of goods for
//! money against a per-good price vector. Each round has two phases:
//!
//! 1. **Inbox collection**: every agent offers one of `request_quote`, `buy`,
//!    `sell` or `idle`. Legal non-idle requests are logged as messages to
//!    `Exchange` and queued ([`ExchangeEngine::submit`]).
//! 2. **Resolution**: one oracle call sees the inbox, the prices and an
//!    aggregate snapshot, and answers with an outbox. The outbox is
//!    normalized to exactly one response per inbox entry, each response is
//!    sent back to its agent and then applied ([`ExchangeEngine::resolve`]).
//!
//! # Critical Invariants
//!
//! 1. **Padded outbox**: after normalization the outbox length equals the
//!    inbox length; missing responses become `deny{"missing response"}`
//! 2. **Unit fills only**: a `confirm` for any quantity other than 1 is ignored
//! 3. **No overdraft for agents**: a buy needs money ≥ price, a sell needs a
//!    held unit, otherwise nothing moves
//! 4. **Liquidity by minting**: a buy against an empty exchange stock mints
//!    one unit first and logs `exchange_minted`
//!
//! Exchange money itself is not bounded below.

use crate::models::action::{non_blank, AgentAction, ExchangeResponse, InvalidReason, Side};
use crate::models::event::Event;
use crate::models::message::MessageId;
use crate::models::state::{SimulationState, EXCHANGE_ID};
use crate::oracle::{
    parse_reply, propose_with_retry, AggregateState, ExchangeView, Oracle, OracleError,
    OracleRequest, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Price every good starts at
pub const INITIAL_PRICE: f64 = 1.0;

/// Price assumed when a quote or confirm omits one
pub const DEFAULT_RESPONSE_PRICE: f64 = 1.0;

/// One queued agent request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub from: String,
    pub message_id: MessageId,
    pub payload: Value,
}

/// One response addressed to an inbox entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub to_message_id: MessageId,
    pub response: Value,
}

/// Result of normalizing an oracle outbox against the inbox
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOutbox {
    /// Exactly one entry per inbox entry, in inbox order
    pub entries: Vec<OutboxEntry>,
    /// Length of the outbox array the oracle actually returned
    pub raw_len: usize,
    /// Inbox entries that received the synthetic deny
    pub padded: usize,
}

impl NormalizedOutbox {
    /// Match a raw `{"outbox":[...]}` reply to `inbox`
    ///
    /// Responses are matched by `to_message_id`. The first usable response
    /// for an id wins; duplicates, unknown ids and entries without an object
    /// `response` are discarded.
    pub fn from_reply(reply: &Value, inbox: &[InboxEntry]) -> Self {
        let raw = reply
            .get("outbox")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let expected: HashSet<MessageId> = inbox.iter().map(|e| e.message_id).collect();
        let mut matched: BTreeMap<MessageId, Value> = BTreeMap::new();
        for item in raw {
            let id = item
                .get("to_message_id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<MessageId>().ok());
            let response = item.get("response").filter(|r| r.is_object());
            if let (Some(id), Some(response)) = (id, response) {
                if expected.contains(&id) {
                    matched.entry(id).or_insert_with(|| response.clone());
                }
            }
        }

        let mut padded = 0;
        let entries = inbox
            .iter()
            .map(|entry| {
                let response = matched.remove(&entry.message_id).unwrap_or_else(|| {
                    padded += 1;
                    ExchangeResponse::missing_response_payload()
                });
                OutboxEntry {
                    to_message_id: entry.message_id,
                    response,
                }
            })
            .collect();

        Self {
            entries,
            raw_len: raw.len(),
            padded,
        }
    }
}

/// Observability record for one exchange round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRoundMetrics {
    pub round: usize,
    pub inbox_total: usize,
    pub inbox_by_action: BTreeMap<String, usize>,
    pub outbox_total: usize,
    pub outbox_by_action: BTreeMap<String, usize>,
    pub price_update_count: usize,
    pub price_total_abs_change: f64,
    /// Good → price delta versus the start of the round
    pub price_updates: BTreeMap<String, f64>,
}

/// What happened to one agent's exchange request
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Idle,
    Queued(MessageId),
    Invalid(InvalidReason),
}

/// Exchange-side state for the money condition
#[derive(Debug, Clone)]
pub struct ExchangeEngine {
    inventory: BTreeMap<String, u64>,
    money: f64,
    prices: BTreeMap<String, f64>,
    price_history: Vec<BTreeMap<String, f64>>,
    round_metrics: Vec<ExchangeRoundMetrics>,
    inbox: Vec<InboxEntry>,
}

impl ExchangeEngine {
    /// Create an exchange stocking `units_per_good` of every good
    pub fn new(goods: &[String], units_per_good: u64, money: f64) -> Self {
        Self {
            inventory: goods.iter().map(|g| (g.clone(), units_per_good)).collect(),
            money,
            prices: goods.iter().map(|g| (g.clone(), INITIAL_PRICE)).collect(),
            price_history: Vec::new(),
            round_metrics: Vec::new(),
            inbox: Vec::new(),
        }
    }

    /// Opening money balance: enough to buy back every agent's stake three
    /// times, and never less than 2.0 per agent
    pub fn initial_money(n_agents: usize, starting_money: f64) -> f64 {
        let n = n_agents as f64;
        (n * starting_money * 3.0).max(n * 2.0)
    }

    pub fn inventory(&self) -> &BTreeMap<String, u64> {
        &self.inventory
    }

    pub fn stock(&self, good: &str) -> u64 {
        self.inventory.get(good).copied().unwrap_or(0)
    }

    pub fn money(&self) -> f64 {
        self.money
    }

    pub fn prices(&self) -> &BTreeMap<String, f64> {
        &self.prices
    }

    pub fn price(&self, good: &str) -> Option<f64> {
        self.prices.get(good).copied()
    }

    /// One price snapshot per completed round
    pub fn price_history(&self) -> &[BTreeMap<String, f64>] {
        &self.price_history
    }

    pub fn round_metrics(&self) -> &[ExchangeRoundMetrics] {
        &self.round_metrics
    }

    pub fn inbox(&self) -> &[InboxEntry] {
        &self.inbox
    }

    pub fn allowed_actions() -> Vec<&'static str> {
        vec!["request_quote", "buy", "sell", "idle"]
    }

    // ========================================================================
    // Phase 1: inbox collection
    // ========================================================================

    /// Validate one agent request and queue it for resolution
    pub fn submit(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        agent: &str,
        raw: &Value,
    ) -> Submission {
        let good = match AgentAction::parse(raw) {
            Ok(AgentAction::Idle {}) => return Submission::Idle,
            Ok(AgentAction::RequestQuote { good })
            | Ok(AgentAction::Buy { good })
            | Ok(AgentAction::Sell { good }) => good,
            Ok(_) => return reject(state, round, agent, InvalidReason::UnsupportedAction, raw),
            Err(reason) => return reject(state, round, agent, reason, raw),
        };
        match non_blank(&good) {
            None => return reject(state, round, agent, InvalidReason::MissingGood, raw),
            Some(good) if !state.is_good(good) => {
                return reject(state, round, agent, InvalidReason::UnknownGood, raw)
            }
            Some(_) => {}
        }

        let message_id = state.send(round, agent, EXCHANGE_ID, raw.clone());
        self.inbox.push(InboxEntry {
            from: agent.to_string(),
            message_id,
            payload: raw.clone(),
        });
        Submission::Queued(message_id)
    }

    /// Snapshot handed to the exchange oracle
    pub fn view(&self, state: &SimulationState, round: usize) -> ExchangeView {
        let mut inventory_totals: BTreeMap<String, u64> =
            state.goods().iter().map(|g| (g.clone(), 0)).collect();
        for agent in state.agents() {
            for (label, qty) in agent.inventory() {
                *inventory_totals.entry(label.clone()).or_insert(0) += qty;
            }
        }
        for (good, qty) in &self.inventory {
            *inventory_totals.entry(good.clone()).or_insert(0) += qty;
        }
        let money_balances = state
            .agents()
            .iter()
            .map(|a| (a.name().to_string(), a.money()))
            .collect();

        ExchangeView {
            round,
            prices: self.prices.clone(),
            aggregate_state: AggregateState {
                inventory_totals,
                money_balances,
                exchange_money: self.money,
            },
            inbox: self.inbox.clone(),
        }
    }

    // ========================================================================
    // Phase 2: resolution
    // ========================================================================

    /// Resolve the queued inbox and close the round
    ///
    /// Skips the oracle when the inbox is empty. Always records the round's
    /// metrics and a price snapshot.
    ///
    /// # Errors
    ///
    /// Only oracle transport failures (after retries). Unparseable replies are
    /// treated as an empty outbox.
    pub fn resolve(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        oracle: &mut dyn Oracle,
        policy: &RetryPolicy,
    ) -> Result<ExchangeRoundMetrics, OracleError> {
        let previous_prices = self.prices.clone();
        let inbox = std::mem::take(&mut self.inbox);
        let inbox_by_action = tally(inbox.iter().map(|e| &e.payload));

        let mut outbox_by_action = BTreeMap::new();
        let mut outbox_total = 0;
        if !inbox.is_empty() {
            let request = OracleRequest::Exchange(self.view_with_inbox(state, round, &inbox));
            let text = propose_with_retry(oracle, &request, policy)?;
            let reply = parse_reply(&text).unwrap_or(Value::String(text));
            state.log_event(Event::ExchangeAction {
                round,
                response: reply.clone(),
            });

            let outbox = NormalizedOutbox::from_reply(&reply, &inbox);
            if outbox.padded > 0 || outbox.raw_len != inbox.len() {
                warn!(
                    round,
                    inbox_len = inbox.len(),
                    outbox_len = outbox.raw_len,
                    padded = outbox.padded,
                    "exchange_outbox_padded"
                );
                state.log_event(Event::ExchangeOutboxPadded {
                    round,
                    inbox_len: inbox.len(),
                    outbox_len: outbox.raw_len,
                    padded: outbox.padded,
                });
            }

            outbox_total = outbox.entries.len();
            outbox_by_action = tally(outbox.entries.iter().map(|e| &e.response));
            for (entry, response) in inbox.iter().zip(outbox.entries) {
                state.send(round, EXCHANGE_ID, &entry.from, response.response.clone());
                self.apply_response(state, round, &entry.from, &response.response);
            }
        }

        let price_updates: BTreeMap<String, f64> = self
            .prices
            .iter()
            .filter_map(|(good, price)| {
                let old = previous_prices.get(good).copied().unwrap_or(*price);
                (*price != old).then(|| (good.clone(), price - old))
            })
            .collect();
        let metrics = ExchangeRoundMetrics {
            round,
            inbox_total: inbox.len(),
            inbox_by_action,
            outbox_total,
            outbox_by_action,
            price_update_count: price_updates.len(),
            price_total_abs_change: price_updates.values().map(|d| d.abs()).sum(),
            price_updates,
        };
        self.round_metrics.push(metrics.clone());
        self.price_history.push(self.prices.clone());
        Ok(metrics)
    }

    fn view_with_inbox(
        &self,
        state: &SimulationState,
        round: usize,
        inbox: &[InboxEntry],
    ) -> ExchangeView {
        let mut view = self.view(state, round);
        view.inbox = inbox.to_vec();
        view
    }

    /// Apply one normalized response for `agent`
    pub fn apply_response(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        agent: &str,
        response: &Value,
    ) {
        match ExchangeResponse::parse(response) {
            Some(ExchangeResponse::Quote { good, price }) => {
                let price = price.unwrap_or(DEFAULT_RESPONSE_PRICE);
                if let Some(good) = non_blank(&good) {
                    if state.is_good(good) && is_valid_price(price) {
                        self.prices.insert(good.to_string(), price);
                    }
                }
            }
            Some(ExchangeResponse::Confirm {
                good,
                quantity,
                price,
                side,
            }) => {
                let ignored = |reason: &str, state: &mut SimulationState| {
                    debug!(round, agent, reason, "exchange_confirm_ignored");
                    state.log_event(Event::ExchangeConfirmIgnored {
                        round,
                        agent: agent.to_string(),
                        reason: reason.to_string(),
                        response: response.clone(),
                    });
                };

                if quantity.unwrap_or(1.0) != 1.0 {
                    return ignored("unsupported_quantity", state);
                }
                let good = match non_blank(&good) {
                    Some(good) if state.is_good(good) => good.to_string(),
                    _ => return ignored("unknown_good", state),
                };
                let price = price.unwrap_or(DEFAULT_RESPONSE_PRICE);
                if !is_valid_price(price) {
                    return ignored("invalid_price", state);
                }
                self.prices.insert(good.clone(), price);

                let settled = match side.as_deref().and_then(Side::parse) {
                    Some(Side::Buy) => self.fill_buy(state, agent, &good, price, round),
                    Some(Side::Sell) => self.fill_sell(state, agent, &good, price),
                    None => Err("invalid_side"),
                };
                match settled {
                    Ok(side) => {
                        debug!(round, agent, good = %good, price, "exchange_settled");
                        state.log_event(Event::ExchangeSettled {
                            round,
                            agent: agent.to_string(),
                            good,
                            side,
                            price,
                        });
                    }
                    Err(reason) => ignored(reason, state),
                }
            }
            Some(ExchangeResponse::Deny { .. }) | None => {}
        }
    }

    fn fill_buy(
        &mut self,
        state: &mut SimulationState,
        agent: &str,
        good: &str,
        price: f64,
        round: usize,
    ) -> Result<Side, &'static str> {
        let buyer = state.get_agent_mut(agent).ok_or("unknown_agent")?;
        if !buyer.can_afford(price) {
            return Err("insufficient_money");
        }
        buyer.debit_money(price).map_err(|_| "insufficient_money")?;
        buyer.add_unit(good);
        self.money += price;

        let stock = self.inventory.entry(good.to_string()).or_insert(0);
        if *stock == 0 {
            *stock += 1;
            state.log_event(Event::ExchangeMinted {
                round,
                good: good.to_string(),
            });
        }
        *stock -= 1;
        Ok(Side::Buy)
    }

    fn fill_sell(
        &mut self,
        state: &mut SimulationState,
        agent: &str,
        good: &str,
        price: f64,
    ) -> Result<Side, &'static str> {
        let seller = state.get_agent_mut(agent).ok_or("unknown_agent")?;
        if !seller.holds(good) {
            return Err("insufficient_inventory");
        }
        // credit first so a rejected price leaves the unit with the seller
        seller.credit_money(price).map_err(|_| "invalid_price")?;
        seller.remove_unit(good).map_err(|_| "insufficient_inventory")?;
        *self.inventory.entry(good.to_string()).or_insert(0) += 1;
        self.money -= price;
        Ok(Side::Sell)
    }
}

fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

fn tally<'a>(payloads: impl Iterator<Item = &'a Value>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for payload in payloads {
        if let Some(action) = payload.get("action").and_then(Value::as_str) {
            *counts.entry(action.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn reject(
    state: &mut SimulationState,
    round: usize,
    agent: &str,
    reason: InvalidReason,
    raw: &Value,
) -> Submission {
    debug!(round, agent, reason = reason.as_str(), "invalid_action");
    state.log_event(Event::InvalidAction {
        round,
        agent: agent.to_string(),
        reason,
        action: raw.clone(),
        proposal_id: None,
    });
    Submission::Invalid(reason)
}
