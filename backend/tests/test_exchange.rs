//! Money Exchange Tests
//!
//! Request validation, outbox normalization, confirm settlement and the
//! exchange round as driven by the orchestrator.

use agentic_economy_core_rs::models::action::InvalidReason;
use agentic_economy_core_rs::models::event::Event;
use agentic_economy_core_rs::models::state::EXCHANGE_ID;
use agentic_economy_core_rs::settlement::{ExchangeEngine, InboxEntry, NormalizedOutbox, Submission};
use agentic_economy_core_rs::{
    AgentState, Condition, Orchestrator, RetryPolicy, RngManager, ScriptedOracle, SimulationConfig,
    SimulationState,
};
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

/// A0 holds g0 wants g1, A1 holds g1 wants g0, both with 1.0 money
fn setup(units_per_good: u64) -> (SimulationState, ExchangeEngine) {
    let agents = vec![
        AgentState::new("A0", "g0", "g1", 1.0),
        AgentState::new("A1", "g1", "g0", 1.0),
    ];
    let goods: Vec<String> = vec!["g0".into(), "g1".into()];
    let exchange = ExchangeEngine::new(&goods, units_per_good, ExchangeEngine::initial_money(2, 1.0));
    (SimulationState::new(agents, goods, RngManager::new(11), 10), exchange)
}

fn confirm(good: &str, side: &str, price: f64) -> Value {
    json!({"action": "confirm", "good": good, "quantity": 1, "price": price, "side": side})
}

fn ignored_reasons(state: &SimulationState) -> Vec<String> {
    state
        .event_log()
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::ExchangeConfirmIgnored { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

fn inbox_entry(from: &str, id: &str) -> InboxEntry {
    InboxEntry {
        from: from.to_string(),
        message_id: id.parse().unwrap(),
        payload: json!({"action": "buy", "good": "g0"}),
    }
}

fn money_config(n_agents: usize, seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::new(Condition::MoneyExchange, n_agents, seed);
    config.retry = RetryPolicy::immediate(0);
    config
}

// ============================================================================
// Settlement
// ============================================================================

#[test]
fn test_sell_then_buy_at_par_nets_zero_money() {
    let (mut state, mut exchange) = setup(2);
    let exchange_money = exchange.money();

    exchange.apply_response(&mut state, 1, "A0", &confirm("g0", "sell", 1.0));
    exchange.apply_response(&mut state, 1, "A0", &confirm("g1", "buy", 1.0));

    let a0 = state.get_agent("A0").unwrap();
    assert_eq!(a0.money(), 1.0);
    assert_eq!(a0.quantity("g0"), 0);
    assert_eq!(a0.quantity("g1"), 1);
    assert!(a0.is_successful());
    assert_eq!(exchange.stock("g0"), 3);
    assert_eq!(exchange.stock("g1"), 1);
    assert_eq!(exchange.money(), exchange_money);
    assert_eq!(state.event_log().events_of_type("exchange_settled").len(), 2);
}

#[test]
fn test_buy_without_money_is_a_noop() {
    let (mut state, mut exchange) = setup(2);
    exchange.apply_response(&mut state, 1, "A0", &confirm("g1", "buy", 1.5));

    let a0 = state.get_agent("A0").unwrap();
    assert_eq!(a0.money(), 1.0);
    assert_eq!(a0.quantity("g1"), 0);
    assert_eq!(exchange.stock("g1"), 2);
    assert_eq!(ignored_reasons(&state), vec!["insufficient_money"]);
    // the confirmed price still becomes the posted price
    assert_eq!(exchange.price("g1"), Some(1.5));
}

#[test]
fn test_sell_without_inventory_is_a_noop() {
    let (mut state, mut exchange) = setup(2);
    exchange.apply_response(&mut state, 1, "A0", &confirm("g1", "sell", 1.0));

    assert_eq!(state.get_agent("A0").unwrap().money(), 1.0);
    assert_eq!(exchange.stock("g1"), 2);
    assert_eq!(ignored_reasons(&state), vec!["insufficient_inventory"]);
}

#[test]
fn test_malformed_confirms_are_ignored() {
    let (mut state, mut exchange) = setup(2);
    let responses = vec![
        json!({"action": "confirm", "good": "g0", "quantity": 2, "price": 1.0, "side": "sell"}),
        json!({"action": "confirm", "good": "silver", "quantity": 1, "price": 1.0, "side": "buy"}),
        json!({"action": "confirm", "good": "g1", "quantity": 1, "price": -3.0, "side": "buy"}),
        json!({"action": "confirm", "good": "g1", "quantity": 1, "price": 0.5, "side": "lend"}),
    ];
    for response in &responses {
        exchange.apply_response(&mut state, 1, "A0", response);
    }
    assert_eq!(
        ignored_reasons(&state),
        vec!["unsupported_quantity", "unknown_good", "invalid_price", "invalid_side"]
    );
    let a0 = state.get_agent("A0").unwrap();
    assert_eq!(a0.quantity("g0"), 1);
    assert_eq!(a0.money(), 1.0);
}

#[test]
fn test_buy_from_empty_stock_mints() {
    let (mut state, mut exchange) = setup(0);
    exchange.apply_response(&mut state, 1, "A0", &confirm("g1", "buy", 1.0));

    assert_eq!(state.get_agent("A0").unwrap().quantity("g1"), 1);
    assert_eq!(exchange.stock("g1"), 0);
    assert_eq!(state.event_log().events_of_type("exchange_minted").len(), 1);
}

#[test]
fn test_quote_updates_price_only_when_valid() {
    let (mut state, mut exchange) = setup(2);
    exchange.apply_response(&mut state, 1, "A0", &json!({"action": "quote", "good": "g0", "price": 2.5}));
    exchange.apply_response(&mut state, 1, "A0", &json!({"action": "quote", "good": "g1", "price": 0.0}));
    exchange.apply_response(&mut state, 1, "A0", &json!({"action": "quote", "good": "gx", "price": 4.0}));

    assert_eq!(exchange.price("g0"), Some(2.5));
    assert_eq!(exchange.price("g1"), Some(1.0));
    assert_eq!(exchange.price("gx"), None);
}

// ============================================================================
// Inbox & Outbox
// ============================================================================

#[test]
fn test_invalid_requests_never_reach_the_inbox() {
    let (mut state, mut exchange) = setup(2);
    let cases = vec![
        (json!({"action": "sell"}), InvalidReason::MissingGood),
        (json!({"action": "request_quote", "good": "g9"}), InvalidReason::UnknownGood),
        (json!({"action": "accept", "of_message_id": "m0"}), InvalidReason::UnsupportedAction),
        (json!("buy g1 please"), InvalidReason::MalformedAction),
    ];
    for (raw, reason) in cases {
        assert_eq!(exchange.submit(&mut state, 1, "A0", &raw), Submission::Invalid(reason));
    }
    assert_eq!(exchange.submit(&mut state, 1, "A0", &json!({"action": "idle"})), Submission::Idle);
    assert!(exchange.inbox().is_empty());
    assert!(state.ledger().is_empty());
}

#[test]
fn test_outbox_padded_to_inbox_length() {
    let inbox = vec![inbox_entry("A0", "m0"), inbox_entry("A1", "m1"), inbox_entry("A2", "m2")];
    let reply = json!({"outbox": [
        {"to_message_id": "m2", "response": {"action": "deny", "reason": "closed"}},
        {"to_message_id": "m2", "response": {"action": "quote", "good": "g0", "price": 9.0}},
        {"to_message_id": "m7", "response": {"action": "deny"}},
        {"to_message_id": "m0", "response": "not an object"},
    ]});

    let outbox = NormalizedOutbox::from_reply(&reply, &inbox);
    assert_eq!(outbox.raw_len, 4);
    assert_eq!(outbox.entries.len(), 3);
    assert_eq!(outbox.padded, 2);
    let ids: Vec<String> = outbox.entries.iter().map(|e| e.to_message_id.to_string()).collect();
    assert_eq!(ids, vec!["m0", "m1", "m2"]);
    assert_eq!(outbox.entries[0].response["reason"], "missing response");
    assert_eq!(outbox.entries[2].response["reason"], "closed");
}

#[test]
fn test_missing_outbox_key_pads_everything() {
    let inbox = vec![inbox_entry("A0", "m0")];
    let outbox = NormalizedOutbox::from_reply(&json!({"prices": {}}), &inbox);
    assert_eq!(outbox.raw_len, 0);
    assert_eq!(outbox.padded, 1);
}

#[test]
fn test_resolve_answers_every_request() {
    let (mut state, mut exchange) = setup(2);
    exchange.submit(&mut state, 1, "A0", &json!({"action": "buy", "good": "g1"}));
    exchange.submit(&mut state, 1, "A1", &json!({"action": "request_quote", "good": "g0"}));

    let mut oracle = ScriptedOracle::new().with_exchange_script(vec![json!({"outbox": [
        {"to_message_id": "m0", "response": {"action": "confirm", "good": "g1", "quantity": 1, "price": 1.0, "side": "buy"}}
    ]})]);
    let metrics = exchange
        .resolve(&mut state, 1, &mut oracle, &RetryPolicy::immediate(0))
        .unwrap();

    assert_eq!(metrics.inbox_total, 2);
    assert_eq!(metrics.outbox_total, 2);
    assert_eq!(metrics.outbox_by_action.get("deny"), Some(&1));
    assert_eq!(metrics.inbox_by_action.get("request_quote"), Some(&1));
    assert_eq!(state.event_log().events_of_type("exchange_outbox_padded").len(), 1);

    let responses: Vec<_> = state
        .ledger()
        .messages()
        .iter()
        .filter(|m| m.sender == EXCHANGE_ID)
        .collect();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].receiver, "A0");
    assert_eq!(responses[1].receiver, "A1");
    assert_eq!(responses[1].payload["action"], "deny");

    assert!(state.get_agent("A0").unwrap().is_successful());
    assert!(exchange.inbox().is_empty());
    assert_eq!(exchange.price_history().len(), 1);
}

#[test]
fn test_empty_inbox_skips_oracle_but_records_round() {
    let (mut state, mut exchange) = setup(2);
    let mut oracle = ScriptedOracle::new();
    let metrics = exchange
        .resolve(&mut state, 1, &mut oracle, &RetryPolicy::immediate(0))
        .unwrap();

    assert_eq!(oracle.total_calls(), 0);
    assert_eq!(metrics.inbox_total, 0);
    assert_eq!(exchange.round_metrics().len(), 1);
    assert_eq!(exchange.price_history().len(), 1);
}

// ============================================================================
// Orchestrated Runs
// ============================================================================

#[test]
fn test_money_run_with_accommodating_exchange() {
    // Every agent sells what it holds, then buys its target
    let mut oracle = ScriptedOracle::new()
        .with_agent_handler(|view, call| {
            let held = view.inventory.iter().find(|(_, q)| **q > 0).map(|(g, _)| g.clone());
            match (call, held) {
                (0, Some(good)) if good != view.target_good => json!({"action": "sell", "good": good}),
                (1, _) => json!({"action": "buy", "good": view.target_good}),
                _ => json!({"action": "idle"}),
            }
        })
        .with_exchange_handler(|view| {
            let outbox: Vec<Value> = view
                .inbox
                .iter()
                .map(|entry| {
                    let side = entry.payload["action"].as_str().unwrap_or("deny");
                    json!({
                        "to_message_id": entry.message_id.to_string(),
                        "response": {
                            "action": "confirm",
                            "good": entry.payload["good"],
                            "quantity": 1,
                            "price": 1.0,
                            "side": side,
                        }
                    })
                })
                .collect();
            json!({"outbox": outbox})
        });

    let orchestrator = Orchestrator::new(money_config(4, 77)).unwrap();
    let result = orchestrator.run(&mut oracle).unwrap();

    assert_eq!(result.successful_agents, 4);
    assert_eq!(result.rounds_run, 2);
    assert_eq!(result.parameters.starting_money, Some(1.0));
    assert_eq!(result.exchange_money, Some(ExchangeEngine::initial_money(4, 1.0)));
    assert_eq!(result.exchange_price_history.as_ref().map(Vec::len), Some(2));
    assert_eq!(result.exchange_round_metrics.as_ref().map(Vec::len), Some(2));
    for (agent, inventory) in &result.inventory_final {
        assert_eq!(inventory.values().sum::<u64>(), 1, "{} holds one unit", agent);
    }
}

#[test]
fn test_agent_view_shows_money_only_in_money_condition() {
    let mut oracle = ScriptedOracle::new().with_agent_handler(|view, _| {
        assert_eq!(view.money, Some(1.0));
        assert!(view.allowed_actions.contains(&"buy"));
        json!({"action": "idle"})
    });
    let mut orchestrator = Orchestrator::new(money_config(2, 1)).unwrap();
    orchestrator.step_round(&mut oracle).unwrap();
    assert_eq!(oracle.calls_for("A0"), 1);
    assert_eq!(oracle.calls_for(EXCHANGE_ID), 0);
}
