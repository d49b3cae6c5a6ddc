//! Central Planner
//!
//! No negotiation: every round each agent reports its holdings to `Planner`,
//! then the planner walks a seeded shuffle of the agents once and swaps every
//! pair whose held goods are each other's targets.
//!
//! # Matching Pass
//!
//! For each `i` in shuffled order and each `j` after it, the goods compared
//! are each agent's first held good *at that moment*. An agent that already
//! swapped earlier in the pass is compared with what it holds now, and the
//! pair is re-verified right before the swap is applied. The pass is not
//! iterated to a fixed point; leftovers wait for the next round.

use crate::models::agent::AgentState;
use crate::models::event::Event;
use crate::models::state::{SimulationState, PLANNER_ID};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Each agent reports `{inventory, target_good}` to the planner
pub fn send_reports(state: &mut SimulationState, round: usize) {
    let reports: Vec<(String, Value)> = state
        .agents()
        .iter()
        .map(|agent| {
            let payload = json!({
                "action": "report",
                "inventory": agent.inventory(),
                "target_good": agent.target_good(),
            });
            (agent.name().to_string(), payload)
        })
        .collect();
    for (agent, payload) in reports {
        state.send(round, &agent, PLANNER_ID, payload);
    }
}

/// Payload broadcast to both parties of a swap
pub fn swap_payload(agent_a: &str, agent_b: &str, good_a: &str, good_b: &str) -> Value {
    let mut give = Map::new();
    give.insert(agent_a.to_string(), json!(good_a));
    give.insert(agent_b.to_string(), json!(good_b));
    let mut receive = Map::new();
    receive.insert(agent_a.to_string(), json!(good_b));
    receive.insert(agent_b.to_string(), json!(good_a));
    json!({
        "action": "swap",
        "agents": [agent_a, agent_b],
        "give": give,
        "receive": receive,
    })
}

/// Goods `a` and `b` would hand each other, if they are a compatible pair
fn compatible_goods(a: &AgentState, b: &AgentState) -> Option<(String, String)> {
    let good_a = a.first_held()?;
    let good_b = b.first_held()?;
    if a.target_good() == good_b && b.target_good() == good_a {
        Some((good_a.to_string(), good_b.to_string()))
    } else {
        None
    }
}

/// One seeded single-pass matching round
///
/// # Returns
///
/// Number of swaps executed.
pub fn match_pairs(state: &mut SimulationState, round: usize) -> usize {
    let mut order = state.agent_names();
    state.rng_mut().shuffle(&mut order);

    let mut swaps = 0;
    for i in 0..order.len() {
        for j in (i + 1)..order.len() {
            let (name_a, name_b) = (&order[i], &order[j]);
            let Some((a, b)) = state.agent_pair_mut(name_a, name_b) else {
                continue;
            };
            let Some((good_a, good_b)) = compatible_goods(a, b) else {
                continue;
            };
            if !(a.holds(&good_a) && b.holds(&good_b)) {
                continue;
            }
            if a.remove_unit(&good_a).is_err() {
                continue;
            }
            if b.remove_unit(&good_b).is_err() {
                a.add_unit(&good_a);
                continue;
            }
            a.add_unit(&good_b);
            b.add_unit(&good_a);
            swaps += 1;

            debug!(round, agent_a = %name_a, agent_b = %name_b, good_a = %good_a, good_b = %good_b, "planner_swap");
            state.log_event(Event::PlannerSwap {
                round,
                agent_a: name_a.clone(),
                agent_b: name_b.clone(),
                good_a: good_a.clone(),
                good_b: good_b.clone(),
            });
            let payload = swap_payload(name_a, name_b, &good_a, &good_b);
            state.send(round, PLANNER_ID, name_a, payload.clone());
            state.send(round, PLANNER_ID, name_b, payload);
        }
    }
    swaps
}

/// Final `assignment{inventory}` message from the planner to every agent
pub fn send_assignments(state: &mut SimulationState, round: usize) {
    let assignments: Vec<(String, Value)> = state
        .agents()
        .iter()
        .map(|agent| {
            let payload = json!({"action": "assignment", "inventory": agent.inventory()});
            (agent.name().to_string(), payload)
        })
        .collect();
    for (agent, payload) in assignments {
        state.send(round, PLANNER_ID, &agent, payload);
    }
}
