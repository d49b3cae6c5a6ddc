//! Bilateral Trade Engine
//!
//! One engine serves all four barter conditions. What differs between them is
//! captured by [`TradeCapabilities`]:
//!
//! | condition            | non-good labels | free-text messages |
//! |----------------------|-----------------|--------------------|
//! | `barter`             | no              | no                 |
//! | `barter_credit`      | yes             | no                 |
//! | `barter_chat`        | no              | yes                |
//! | `barter_chat_credit` | yes             | yes                |
//!
//! # Proposal Lifecycle
//!
//! ```text
//! propose_trade ──► pending ──accept──► trade_executed (reply sent)
//!                      │        └─────► trade_failed   (no reply)
//!                      └──reject──────► proposal_rejected (reply sent)
//! ```
//!
//! A pending proposal has at most one disposition. Once accepted or rejected
//! it leaves the pending set, so replaying its id yields
//! `unknown_proposal_id`. An accept or reject from someone other than the
//! intended receiver is refused and the proposal stays pending.
//!
//! # Credit
//!
//! With `allow_non_good_labels`, `give` may be any label outside the tradable
//! good set (an IOU). Such a label is never inventory-checked: if the issuer
//! holds units of it they are transferred, otherwise one unit is created for
//! the receiver and `credit_issued` is logged. Credit labels are never
//! redeemed.

use crate::models::action::{non_blank, AgentAction, InvalidReason};
use crate::models::agent::AgentError;
use crate::models::event::Event;
use crate::models::message::{Message, MessageId};
use crate::models::state::SimulationState;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Condition-specific switches for the trade engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeCapabilities {
    /// `give` may be an IOU label outside the tradable good set
    pub allow_non_good_labels: bool,
    /// `send_message` is accepted
    pub allow_free_text_messages: bool,
}

impl TradeCapabilities {
    pub const BARTER: TradeCapabilities = TradeCapabilities {
        allow_non_good_labels: false,
        allow_free_text_messages: false,
    };
    pub const BARTER_CREDIT: TradeCapabilities = TradeCapabilities {
        allow_non_good_labels: true,
        allow_free_text_messages: false,
    };
    pub const BARTER_CHAT: TradeCapabilities = TradeCapabilities {
        allow_non_good_labels: false,
        allow_free_text_messages: true,
    };
    pub const BARTER_CHAT_CREDIT: TradeCapabilities = TradeCapabilities {
        allow_non_good_labels: true,
        allow_free_text_messages: true,
    };

    /// Action names shown to agents under these capabilities
    pub fn allowed_actions(&self) -> Vec<&'static str> {
        let mut actions = vec!["propose_trade", "accept", "reject", "idle"];
        if self.allow_free_text_messages {
            actions.push("send_message");
        }
        actions
    }
}

/// Why an accepted proposal could not be executed
#[derive(Debug, Error, PartialEq)]
pub enum TradeError {
    #[error("Unknown agent {0}")]
    UnknownAgent(String),

    #[error("Proposer {agent} no longer holds {label}")]
    ProposerLacksGive { agent: String, label: String },

    #[error("Receiver {agent} does not hold {label}")]
    ReceiverLacksReceive { agent: String, label: String },

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Effects of a successfully executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeReceipt {
    /// A credit unit was created for the receiver
    pub credit_issued: bool,
}

/// Execute one accepted proposal between `proposer` and `receiver`
///
/// The proposer hands one unit of `give` to the receiver, the receiver hands
/// one unit of `receive` back. Both preconditions are verified before any
/// mutation, so on `Err` nothing has changed.
///
/// # Arguments
///
/// * `allow_credit` - treat a non-good `give` as an IOU label
///
/// # Example
///
/// ```rust
/// use agentic_economy_core_rs::{AgentState, RngManager, SimulationState};
/// use agentic_economy_core_rs::settlement::execute_trade;
///
/// let agents = vec![
///     AgentState::new("A0", "g0", "g1", 0.0),
///     AgentState::new("A1", "g1", "g0", 0.0),
/// ];
/// let mut state = SimulationState::new(agents, vec!["g0".into(), "g1".into()], RngManager::new(1), 4);
///
/// let receipt = execute_trade(&mut state, "A0", "A1", "g0", "g1", false).unwrap();
/// assert!(!receipt.credit_issued);
/// assert_eq!(state.get_agent("A0").unwrap().quantity("g1"), 1);
/// assert_eq!(state.get_agent("A1").unwrap().quantity("g0"), 1);
/// ```
pub fn execute_trade(
    state: &mut SimulationState,
    proposer: &str,
    receiver: &str,
    give: &str,
    receive: &str,
    allow_credit: bool,
) -> Result<TradeReceipt, TradeError> {
    let is_credit = allow_credit && !state.is_good(give);
    let (from, to) = state
        .agent_pair_mut(proposer, receiver)
        .ok_or_else(|| TradeError::UnknownAgent(format!("{}/{}", proposer, receiver)))?;

    // Verify everything before touching anything
    let proposer_holds_give = from.holds(give);
    if !is_credit && !proposer_holds_give {
        return Err(TradeError::ProposerLacksGive {
            agent: proposer.to_string(),
            label: give.to_string(),
        });
    }
    if !to.holds(receive) {
        return Err(TradeError::ReceiverLacksReceive {
            agent: receiver.to_string(),
            label: receive.to_string(),
        });
    }

    let credit_issued = !proposer_holds_give;
    if proposer_holds_give {
        from.remove_unit(give)?;
    }
    to.add_unit(give);
    to.remove_unit(receive)?;
    from.add_unit(receive);

    Ok(TradeReceipt { credit_issued })
}

/// What happened to a single agent action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Idle,
    MessageSent(MessageId),
    ProposalMade(MessageId),
    TradeExecuted { proposal_id: MessageId, credit_issued: bool },
    TradeFailed { proposal_id: MessageId },
    ProposalRejected { proposal_id: MessageId },
    Invalid(InvalidReason),
}

/// Tallies for one round of barter actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarterRoundOutcome {
    pub proposals_made: usize,
    pub trades_executed: usize,
    pub trades_failed: usize,
    pub proposals_rejected: usize,
    pub messages_sent: usize,
    pub credits_issued: usize,
    pub invalid_actions: usize,
}

impl BarterRoundOutcome {
    fn record(&mut self, outcome: &ActionOutcome) {
        match outcome {
            ActionOutcome::Idle => {}
            ActionOutcome::MessageSent(_) => self.messages_sent += 1,
            ActionOutcome::ProposalMade(_) => self.proposals_made += 1,
            ActionOutcome::TradeExecuted { credit_issued, .. } => {
                self.trades_executed += 1;
                if *credit_issued {
                    self.credits_issued += 1;
                }
            }
            ActionOutcome::TradeFailed { .. } => self.trades_failed += 1,
            ActionOutcome::ProposalRejected { .. } => self.proposals_rejected += 1,
            ActionOutcome::Invalid(_) => self.invalid_actions += 1,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingProposal {
    message: Message,
    give: String,
    receive: String,
}

/// Validates and applies barter actions, and owns the pending-proposal set
#[derive(Debug, Clone)]
pub struct TradeEngine {
    capabilities: TradeCapabilities,
    pending: BTreeMap<MessageId, PendingProposal>,
}

impl TradeEngine {
    pub fn new(capabilities: TradeCapabilities) -> Self {
        Self {
            capabilities,
            pending: BTreeMap::new(),
        }
    }

    pub fn capabilities(&self) -> TradeCapabilities {
        self.capabilities
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Apply one round of collected actions in the given order
    pub fn apply_round(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        actions: &[(String, Value)],
    ) -> BarterRoundOutcome {
        let mut outcome = BarterRoundOutcome::default();
        for (agent, raw) in actions {
            let result = self.apply_action(state, round, agent, raw);
            outcome.record(&result);
        }
        outcome
    }

    /// Validate and apply a single raw action from `agent`
    ///
    /// Never fails: every rejection is logged as an `invalid_action` event and
    /// reported as [`ActionOutcome::Invalid`].
    pub fn apply_action(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        agent: &str,
        raw: &Value,
    ) -> ActionOutcome {
        let action = match AgentAction::parse(raw) {
            Ok(action) => action,
            Err(reason) => return invalid(state, round, agent, reason, raw, None),
        };

        match action {
            AgentAction::Idle {} => ActionOutcome::Idle,
            AgentAction::SendMessage { to, message } => {
                if !self.capabilities.allow_free_text_messages {
                    return invalid(state, round, agent, InvalidReason::UnsupportedAction, raw, None);
                }
                self.send_message(state, round, agent, non_blank(&to), non_blank(&message), raw)
            }
            AgentAction::ProposeTrade { to, give, receive } => self.propose(
                state,
                round,
                agent,
                non_blank(&to),
                non_blank(&give),
                non_blank(&receive),
                raw,
            ),
            AgentAction::Accept { of_message_id } => {
                self.resolve(state, round, agent, non_blank(&of_message_id), true, raw)
            }
            AgentAction::Reject { of_message_id } => {
                self.resolve(state, round, agent, non_blank(&of_message_id), false, raw)
            }
            AgentAction::RequestQuote { .. } | AgentAction::Buy { .. } | AgentAction::Sell { .. } => {
                invalid(state, round, agent, InvalidReason::UnsupportedAction, raw, None)
            }
        }
    }

    fn send_message(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        sender: &str,
        to: Option<&str>,
        text: Option<&str>,
        raw: &Value,
    ) -> ActionOutcome {
        let receiver = match (to, text) {
            (Some(receiver), Some(_)) if receiver != sender && state.contains_agent(receiver) => {
                receiver.to_string()
            }
            _ => return invalid(state, round, sender, InvalidReason::InvalidSendMessage, raw, None),
        };

        let message_id = state.send(round, sender, &receiver, raw.clone());
        state.log_event(Event::MessageSent {
            round,
            sender: sender.to_string(),
            receiver,
            message_id: message_id.to_string(),
        });
        ActionOutcome::MessageSent(message_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn propose(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        sender: &str,
        to: Option<&str>,
        give: Option<&str>,
        receive: Option<&str>,
        raw: &Value,
    ) -> ActionOutcome {
        let receiver = match to {
            Some(receiver) if receiver != sender && state.contains_agent(receiver) => receiver,
            _ => return invalid(state, round, sender, InvalidReason::InvalidReceiver, raw, None),
        };
        let (give, receive) = match (give, receive) {
            (Some(give), Some(receive)) => (give, receive),
            _ => return invalid(state, round, sender, InvalidReason::MissingTradeFields, raw, None),
        };

        if state.is_good(give) {
            let held = state.get_agent(sender).map_or(0, |a| a.quantity(give));
            if held == 0 {
                return invalid(state, round, sender, InvalidReason::InsufficientInventory, raw, None);
            }
        } else if !self.capabilities.allow_non_good_labels {
            return invalid(state, round, sender, InvalidReason::NonTradableLabel, raw, None);
        }

        let (give, receive, receiver) = (give.to_string(), receive.to_string(), receiver.to_string());
        let message = state.post(round, sender, &receiver, raw.clone());
        let message_id = message.message_id;
        debug!(round, sender, receiver = %receiver, give = %give, receive = %receive, %message_id, "proposal_made");
        state.log_event(Event::ProposalMade {
            round,
            sender: sender.to_string(),
            receiver,
            give: give.clone(),
            receive: receive.clone(),
            message_id: message_id.to_string(),
        });
        self.pending.insert(
            message_id,
            PendingProposal {
                message,
                give,
                receive,
            },
        );
        ActionOutcome::ProposalMade(message_id)
    }

    /// Shared accept/reject path
    fn resolve(
        &mut self,
        state: &mut SimulationState,
        round: usize,
        responder: &str,
        of_message_id: Option<&str>,
        accept: bool,
        raw: &Value,
    ) -> ActionOutcome {
        let Some(raw_id) = of_message_id else {
            return invalid(state, round, responder, InvalidReason::MissingProposalId, raw, None);
        };
        let proposal_id = match raw_id.parse::<MessageId>() {
            Ok(id) if self.pending.contains_key(&id) => id,
            _ => {
                return invalid(
                    state,
                    round,
                    responder,
                    InvalidReason::UnknownProposalId,
                    raw,
                    Some(raw_id.to_string()),
                )
            }
        };

        let intended = self
            .pending
            .get(&proposal_id)
            .map(|p| p.message.receiver == responder)
            .unwrap_or(false);
        if !intended {
            return invalid(
                state,
                round,
                responder,
                InvalidReason::NotIntendedReceiver,
                raw,
                Some(proposal_id.to_string()),
            );
        }

        let Some(proposal) = self.pending.remove(&proposal_id) else {
            return invalid(
                state,
                round,
                responder,
                InvalidReason::UnknownProposalId,
                raw,
                Some(proposal_id.to_string()),
            );
        };
        let proposer = proposal.message.sender.clone();

        if !accept {
            state.log_event(Event::ProposalRejected {
                round,
                sender: proposer.clone(),
                receiver: responder.to_string(),
                proposal_id: proposal_id.to_string(),
            });
            state.send(round, responder, &proposer, raw.clone());
            return ActionOutcome::ProposalRejected { proposal_id };
        }

        match execute_trade(
            state,
            &proposer,
            responder,
            &proposal.give,
            &proposal.receive,
            self.capabilities.allow_non_good_labels,
        ) {
            Ok(receipt) => {
                if receipt.credit_issued {
                    state.log_event(Event::CreditIssued {
                        round,
                        issuer: proposer.clone(),
                        receiver: responder.to_string(),
                        label: proposal.give.clone(),
                        proposal_id: proposal_id.to_string(),
                    });
                }
                debug!(round, proposer = %proposer, responder, %proposal_id, "trade_executed");
                state.log_event(Event::TradeExecuted {
                    round,
                    sender: proposer.clone(),
                    receiver: responder.to_string(),
                    give: proposal.give,
                    receive: proposal.receive,
                    proposal_id: proposal_id.to_string(),
                });
                state.send(round, responder, &proposer, raw.clone());
                ActionOutcome::TradeExecuted {
                    proposal_id,
                    credit_issued: receipt.credit_issued,
                }
            }
            Err(err) => {
                debug!(round, %proposal_id, error = %err, "trade_failed");
                state.log_event(Event::TradeFailed {
                    round,
                    sender: proposer,
                    receiver: responder.to_string(),
                    proposal_id: proposal_id.to_string(),
                    payload: proposal.message.payload,
                });
                ActionOutcome::TradeFailed { proposal_id }
            }
        }
    }
}

fn invalid(
    state: &mut SimulationState,
    round: usize,
    agent: &str,
    reason: InvalidReason,
    raw: &Value,
    proposal_id: Option<String>,
) -> ActionOutcome {
    debug!(round, agent, reason = reason.as_str(), "invalid_action");
    state.log_event(Event::InvalidAction {
        round,
        agent: agent.to_string(),
        reason,
        action: raw.clone(),
        proposal_id,
    });
    ActionOutcome::Invalid(reason)
}
