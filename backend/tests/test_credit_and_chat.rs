//! Credit and Chat Variant Tests
//!
//! The credit variants let `give` be an IOU label outside the good set; the
//! chat variants accept free-text `send_message`.

use agentic_economy_core_rs::models::action::InvalidReason;
use agentic_economy_core_rs::models::event::Event;
use agentic_economy_core_rs::settlement::{ActionOutcome, TradeCapabilities, TradeEngine};
use agentic_economy_core_rs::{AgentState, RngManager, SimulationState};
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_state() -> SimulationState {
    let agents = vec![
        AgentState::new("A0", "g0", "g1", 0.0),
        AgentState::new("A1", "g1", "g2", 0.0),
        AgentState::new("A2", "g2", "g0", 0.0),
    ];
    let goods = vec!["g0".to_string(), "g1".to_string(), "g2".to_string()];
    SimulationState::new(agents, goods, RngManager::new(5), 10)
}

fn propose(to: &str, give: &str, receive: &str) -> Value {
    json!({"action": "propose_trade", "to": to, "give": give, "receive": receive})
}

fn accept(id: &str) -> Value {
    json!({"action": "accept", "of_message_id": id})
}

fn chat(to: &str, text: &str) -> Value {
    json!({"action": "send_message", "to": to, "message": text})
}

// ============================================================================
// Credit
// ============================================================================

#[test]
fn test_iou_trade_issues_credit() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CREDIT);

    // A0 pays for g1 with a promise instead of its g0
    let outcome = engine.apply_action(&mut state, 1, "A0", &propose("A1", "IOU_A0", "g1"));
    assert!(matches!(outcome, ActionOutcome::ProposalMade(_)));
    let outcome = engine.apply_action(&mut state, 1, "A1", &accept("m0"));
    assert!(matches!(
        outcome,
        ActionOutcome::TradeExecuted { credit_issued: true, .. }
    ));

    let a0 = state.get_agent("A0").unwrap();
    let a1 = state.get_agent("A1").unwrap();
    assert_eq!(a0.quantity("g0"), 1);
    assert_eq!(a0.quantity("g1"), 1);
    assert_eq!(a1.quantity("IOU_A0"), 1);
    assert_eq!(a1.quantity("g1"), 0);

    let credits = state.event_log().events_of_type("credit_issued");
    assert_eq!(credits.len(), 1);
    match credits[0] {
        Event::CreditIssued { issuer, receiver, label, proposal_id, .. } => {
            assert_eq!(issuer, "A0");
            assert_eq!(receiver, "A1");
            assert_eq!(label, "IOU_A0");
            assert_eq!(proposal_id, "m0");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_held_iou_is_transferred_not_reissued() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CREDIT);

    engine.apply_action(&mut state, 1, "A0", &propose("A1", "IOU_A0", "g1"));
    engine.apply_action(&mut state, 1, "A1", &accept("m0"));
    // A1 passes the IOU on to A2
    engine.apply_action(&mut state, 2, "A1", &propose("A2", "IOU_A0", "g2"));
    let outcome = engine.apply_action(&mut state, 2, "A2", &accept("m2"));

    assert!(matches!(
        outcome,
        ActionOutcome::TradeExecuted { credit_issued: false, .. }
    ));
    assert_eq!(state.get_agent("A1").unwrap().quantity("IOU_A0"), 0);
    assert_eq!(state.get_agent("A2").unwrap().quantity("IOU_A0"), 1);
    assert_eq!(state.total_quantity("IOU_A0"), 1);
    assert_eq!(state.event_log().events_of_type("credit_issued").len(), 1);
}

#[test]
fn test_failed_credit_trade_issues_nothing() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CREDIT);

    // A1 does not hold g0, so the trade fails at acceptance
    engine.apply_action(&mut state, 1, "A0", &propose("A1", "IOU_A0", "g0"));
    let outcome = engine.apply_action(&mut state, 1, "A1", &accept("m0"));

    assert!(matches!(outcome, ActionOutcome::TradeFailed { .. }));
    assert!(state.event_log().events_of_type("credit_issued").is_empty());
    assert_eq!(state.total_quantity("IOU_A0"), 0);
    // no reply is sent for a failed trade
    assert_eq!(state.ledger().len(), 1);
}

#[test]
fn test_credit_variant_still_checks_real_goods() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CREDIT);
    let outcome = engine.apply_action(&mut state, 1, "A0", &propose("A1", "g2", "g1"));
    assert_eq!(outcome, ActionOutcome::Invalid(InvalidReason::InsufficientInventory));
}

#[test]
fn test_base_variant_refuses_iou() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CHAT);
    let outcome = engine.apply_action(&mut state, 1, "A0", &propose("A1", "IOU_A0", "g1"));
    assert_eq!(outcome, ActionOutcome::Invalid(InvalidReason::NonTradableLabel));
    assert!(state.ledger().is_empty());
}

// ============================================================================
// Chat
// ============================================================================

#[test]
fn test_chat_message_is_delivered() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CHAT);

    let outcome = engine.apply_action(&mut state, 1, "A0", &chat("A2", "I have g0 if you have g1"));
    assert!(matches!(outcome, ActionOutcome::MessageSent(_)));

    let message = &state.ledger().messages()[0];
    assert_eq!(message.receiver, "A2");
    assert_eq!(message.payload["message"], "I have g0 if you have g1");
    assert_eq!(state.get_agent("A2").unwrap().history_len(), 1);
    assert_eq!(state.event_log().events_of_type("message_sent").len(), 1);
}

#[test]
fn test_invalid_chat_messages() {
    let mut state = create_state();
    let mut engine = TradeEngine::new(TradeCapabilities::BARTER_CHAT_CREDIT);

    let cases = vec![
        chat("A0", "talking to myself"),
        chat("A7", "hello?"),
        chat("A1", "   "),
        json!({"action": "send_message", "to": "A1"}),
        json!({"action": "send_message", "message": "to whom"}),
    ];
    for action in cases {
        assert_eq!(
            engine.apply_action(&mut state, 1, "A0", &action),
            ActionOutcome::Invalid(InvalidReason::InvalidSendMessage),
            "action {}",
            action
        );
    }
    assert!(state.ledger().is_empty());
    assert_eq!(state.event_log().invalid_action_count("A0"), 5);
}

#[test]
fn test_chat_unsupported_without_chat_capability() {
    let mut state = create_state();
    for capabilities in [TradeCapabilities::BARTER, TradeCapabilities::BARTER_CREDIT] {
        let mut engine = TradeEngine::new(capabilities);
        assert_eq!(
            engine.apply_action(&mut state, 1, "A0", &chat("A1", "hi")),
            ActionOutcome::Invalid(InvalidReason::UnsupportedAction)
        );
    }
    assert!(state.ledger().is_empty());
}

#[test]
fn test_allowed_actions_follow_capabilities() {
    assert!(!TradeCapabilities::BARTER.allowed_actions().contains(&"send_message"));
    assert!(TradeCapabilities::BARTER_CHAT.allowed_actions().contains(&"send_message"));
    assert_eq!(
        TradeCapabilities::BARTER_CREDIT.allowed_actions(),
        TradeCapabilities::BARTER.allowed_actions()
    );
}
