//! Orchestrator Engine
//!
//! Main experiment loop tying the run context, the oracle and the active
//! institution together.
//!
//! # Architecture
//!
//! ```text
//! For each round r (1-based, at most `rounds`):
//! 1. Barter:  ask the oracle once per agent (registration order), log each
//!             raw decision, then apply them all through the trade engine
//!    Money:   ask the oracle once per agent, queue each legal request at
//!             once, then make one exchange resolution call
//!    Planner: every agent reports, then one seeded matching pass
//! 2. Check termination
//! 3. Planner only: on the final round, send the closing assignments
//! ```
//!
//! # Termination
//!
//! Barter and money runs stop after the first round in which every agent
//! holds its target. Planner runs stop only when a round executes zero swaps
//! *and* every agent holds its target; a run stuck in an unmatchable
//! configuration keeps going until the round cap.
//!
//! # Example
//!
//! ```rust
//! use agentic_economy_core_rs::orchestrator::{Condition, Orchestrator, SimulationConfig};
//! use agentic_economy_core_rs::oracle::ScriptedOracle;
//!
//! let config = SimulationConfig::new(Condition::CentralPlanner, 4, 12345);
//! let orchestrator = Orchestrator::new(config).unwrap();
//! let result = orchestrator.run(&mut ScriptedOracle::new()).unwrap();
//! assert!(result.rounds_run >= 1);
//! ```

use crate::core::assignment::{goods_for, initial_assignments, AssignmentError, InitialAssignment};
use crate::models::agent::AgentState;
use crate::models::event::{Event, EventLog};
use crate::models::state::SimulationState;
use crate::oracle::{
    parse_reply, propose_with_retry, AgentView, Oracle, OracleError, OracleRequest, RetryPolicy,
};
use crate::orchestrator::result::SimulationResult;
use crate::rng::RngManager;
use crate::settlement::exchange::{ExchangeEngine, Submission};
use crate::settlement::planner;
use crate::settlement::{TradeCapabilities, TradeEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration Types
// ============================================================================

/// Institutional design under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Barter,
    BarterCredit,
    BarterChat,
    BarterChatCredit,
    CentralPlanner,
    MoneyExchange,
}

impl Condition {
    pub const ALL: [Condition; 6] = [
        Condition::Barter,
        Condition::BarterCredit,
        Condition::BarterChat,
        Condition::BarterChatCredit,
        Condition::CentralPlanner,
        Condition::MoneyExchange,
    ];

    /// Label used in results and configuration files
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Barter => "barter",
            Condition::BarterCredit => "barter_credit",
            Condition::BarterChat => "barter_chat",
            Condition::BarterChatCredit => "barter_chat_credit",
            Condition::CentralPlanner => "central_planner",
            Condition::MoneyExchange => "money_exchange",
        }
    }

    /// Trade engine switches, for the four barter conditions
    pub fn trade_capabilities(&self) -> Option<TradeCapabilities> {
        match self {
            Condition::Barter => Some(TradeCapabilities::BARTER),
            Condition::BarterCredit => Some(TradeCapabilities::BARTER_CREDIT),
            Condition::BarterChat => Some(TradeCapabilities::BARTER_CHAT),
            Condition::BarterChatCredit => Some(TradeCapabilities::BARTER_CHAT_CREDIT),
            Condition::CentralPlanner | Condition::MoneyExchange => None,
        }
    }

    pub fn is_monetary(&self) -> bool {
        matches!(self, Condition::MoneyExchange)
    }

    /// Whether agents are asked for decisions at all
    pub fn uses_oracle(&self) -> bool {
        !matches!(self, Condition::CentralPlanner)
    }

    /// Action names offered to agents
    pub fn allowed_actions(&self) -> Vec<&'static str> {
        match self.trade_capabilities() {
            Some(capabilities) => capabilities.allowed_actions(),
            None if self.is_monetary() => ExchangeEngine::allowed_actions(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error parsing a condition label
#[derive(Debug, Error, PartialEq)]
#[error("Unknown condition {0:?}")]
pub struct UnknownCondition(pub String);

impl FromStr for Condition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::ALL
            .iter()
            .copied()
            .find(|c| c.label() == s)
            .ok_or_else(|| UnknownCondition(s.to_string()))
    }
}

/// Complete run configuration
///
/// Serialized canonically to produce the result's `config_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub condition: Condition,

    /// Number of agents (and goods)
    pub n_agents: usize,

    /// Round cap
    pub rounds: usize,

    /// Seed for the derangement and planner shuffles
    pub seed: u64,

    /// Visible history length per agent
    pub history_limit: usize,

    /// Identifier of the decision source, recorded in the result
    pub model_name: String,

    /// Opening money per agent (money condition only)
    pub starting_money: f64,

    /// Opening exchange stock per good (money condition only)
    pub exchange_inventory_units: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl SimulationConfig {
    pub const DEFAULT_ROUNDS: usize = 12;
    pub const DEFAULT_HISTORY_LIMIT: usize = 10;
    pub const DEFAULT_MODEL: &'static str = "gpt-5-mini";

    /// Configuration with the usual experiment defaults
    pub fn new(condition: Condition, n_agents: usize, seed: u64) -> Self {
        Self {
            condition,
            n_agents,
            rounds: Self::DEFAULT_ROUNDS,
            seed,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
            model_name: Self::DEFAULT_MODEL.to_string(),
            starting_money: 1.0,
            exchange_inventory_units: 2,
            retry: RetryPolicy::default(),
        }
    }

    /// Check the configuration before any state is built
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.n_agents < 2 {
            return Err(SimulationError::InvalidConfig(format!(
                "at least 2 agents required (targets are a derangement), got {}",
                self.n_agents
            )));
        }
        if self.rounds == 0 {
            return Err(SimulationError::InvalidConfig(
                "rounds must be positive".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(SimulationError::InvalidConfig(
                "history_limit must be positive".to_string(),
            ));
        }
        if !self.starting_money.is_finite() || self.starting_money < 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "starting_money must be finite and non-negative, got {}",
                self.starting_money
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Errors & Results
// ============================================================================

/// Simulation error types
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration validation error
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Oracle failed for good; the run is aborted
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// `step_round` called after the run ended
    #[error("Run already finished after round {0}")]
    RunFinished(usize),

    /// An earlier round failed part-way; the run state is not usable
    #[error("Run aborted during round {0}")]
    RunAborted(usize),
}

impl From<AssignmentError> for SimulationError {
    fn from(err: AssignmentError) -> Self {
        SimulationError::InvalidConfig(err.to_string())
    }
}

/// Result of a single round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// Round number (1-based)
    pub round: usize,

    /// Trades, exchange fills or planner swaps executed this round
    pub trades_executed: usize,

    /// Actions rejected as `invalid_action` this round
    pub invalid_actions: usize,

    /// Agents holding their target after the round
    pub successful_agents: usize,

    /// No further rounds will run
    pub finished: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Institution-specific state carried across rounds
#[derive(Debug)]
enum Institution {
    Barter(TradeEngine),
    Exchange(ExchangeEngine),
    Planner,
}

/// Main orchestrator owning one experiment run
///
/// # Determinism
///
/// All randomness comes from the seeded xorshift64* RNG in the run context.
/// Same config + same oracle replies = identical result.
#[derive(Debug)]
pub struct Orchestrator {
    config: SimulationConfig,
    assignments: Vec<InitialAssignment>,
    state: SimulationState,
    institution: Institution,
    rounds_run: usize,
    finished: bool,
    /// Round that failed part-way, if any
    aborted_at: Option<usize>,
}

impl Orchestrator {
    /// Validate `config` and build the initial run state
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for fewer than 2 agents, zero rounds, zero history or
    /// unusable starting money.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;

        let mut rng = RngManager::new(config.seed);
        let assignments = initial_assignments(config.n_agents, &mut rng)?;
        let goods = goods_for(config.n_agents);
        let money = if config.condition.is_monetary() {
            config.starting_money
        } else {
            0.0
        };
        let agents = assignments
            .iter()
            .map(|a| AgentState::new(&a.agent, &a.endowment, &a.target, money))
            .collect();

        let institution = match config.condition.trade_capabilities() {
            Some(capabilities) => Institution::Barter(TradeEngine::new(capabilities)),
            None if config.condition.is_monetary() => Institution::Exchange(ExchangeEngine::new(
                &goods,
                config.exchange_inventory_units,
                ExchangeEngine::initial_money(config.n_agents, config.starting_money),
            )),
            None => Institution::Planner,
        };
        let state = SimulationState::new(agents, goods, rng, config.history_limit);

        info!(
            condition = config.condition.label(),
            n_agents = config.n_agents,
            rounds = config.rounds,
            seed = config.seed,
            "simulation_initialized"
        );

        Ok(Self {
            config,
            assignments,
            state,
            institution,
            rounds_run: 0,
            finished: false,
            aborted_at: None,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn assignments(&self) -> &[InitialAssignment] {
        &self.assignments
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn event_log(&self) -> &EventLog {
        self.state.event_log()
    }

    /// Last round executed (0 before the first round)
    pub fn rounds_run(&self) -> usize {
        self.rounds_run
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A round failed part-way and the run can go no further
    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// Exchange state, in the money condition
    pub fn exchange(&self) -> Option<&ExchangeEngine> {
        match &self.institution {
            Institution::Exchange(exchange) => Some(exchange),
            _ => None,
        }
    }

    /// Trade engine, in the barter conditions
    pub fn trade_engine(&self) -> Option<&TradeEngine> {
        match &self.institution {
            Institution::Barter(engine) => Some(engine),
            _ => None,
        }
    }

    // ========================================================================
    // Main Loop
    // ========================================================================

    /// Execute one complete round
    ///
    /// # Errors
    ///
    /// - `Oracle` when a decision could not be obtained; the run should be
    ///   abandoned
    /// - `RunFinished` when called after the final round
    /// - `RunAborted` when an earlier round failed
    ///
    /// A failed round may already have applied some decisions, so the run
    /// is marked aborted and refuses further rounds and result snapshots.
    pub fn step_round(&mut self, oracle: &mut dyn Oracle) -> Result<RoundResult, SimulationError> {
        if let Some(round) = self.aborted_at {
            return Err(SimulationError::RunAborted(round));
        }
        if self.finished {
            return Err(SimulationError::RunFinished(self.rounds_run));
        }
        let round = self.rounds_run + 1;
        self.execute_round(round, oracle).map_err(|err| {
            warn!(round, error = %err, "round_aborted");
            self.aborted_at = Some(round);
            err
        })
    }

    fn execute_round(
        &mut self,
        round: usize,
        oracle: &mut dyn Oracle,
    ) -> Result<RoundResult, SimulationError> {
        let condition = self.config.condition;
        let policy = self.config.retry.clone();

        let (trades_executed, invalid_actions) = match &mut self.institution {
            Institution::Barter(engine) => {
                let allowed = engine.capabilities().allowed_actions();
                let mut actions = Vec::with_capacity(self.state.num_agents());
                for agent in self.state.agent_names() {
                    let action =
                        decide(&mut self.state, condition, &policy, round, &agent, &allowed, oracle)?;
                    actions.push((agent, action));
                }
                let outcome = engine.apply_round(&mut self.state, round, &actions);
                (outcome.trades_executed, outcome.invalid_actions)
            }
            Institution::Exchange(exchange) => {
                let allowed = ExchangeEngine::allowed_actions();
                let mut invalid = 0;
                for agent in self.state.agent_names() {
                    let action =
                        decide(&mut self.state, condition, &policy, round, &agent, &allowed, oracle)?;
                    if let Submission::Invalid(_) =
                        exchange.submit(&mut self.state, round, &agent, &action)
                    {
                        invalid += 1;
                    }
                }
                let settled_before = self.state.event_log().events_of_type("exchange_settled").len();
                exchange.resolve(&mut self.state, round, oracle, &policy)?;
                let settled =
                    self.state.event_log().events_of_type("exchange_settled").len() - settled_before;
                (settled, invalid)
            }
            Institution::Planner => {
                planner::send_reports(&mut self.state, round);
                (planner::match_pairs(&mut self.state, round), 0)
            }
        };

        self.rounds_run = round;
        let all_successful = self.state.all_successful();
        let converged = match self.institution {
            Institution::Planner => trades_executed == 0 && all_successful,
            _ => all_successful,
        };
        self.finished = converged || round >= self.config.rounds;
        if self.finished {
            if let Institution::Planner = self.institution {
                planner::send_assignments(&mut self.state, round);
            }
        }

        let result = RoundResult {
            round,
            trades_executed,
            invalid_actions,
            successful_agents: self.state.success_count(),
            finished: self.finished,
        };
        debug!(
            round,
            trades = result.trades_executed,
            invalid = result.invalid_actions,
            successful = result.successful_agents,
            "round_complete"
        );
        Ok(result)
    }

    /// Run to completion and build the result
    ///
    /// A fatal oracle error aborts the run; no partial result is produced.
    pub fn run(mut self, oracle: &mut dyn Oracle) -> Result<SimulationResult, SimulationError> {
        while !self.finished {
            self.step_round(oracle)?;
        }
        info!(
            condition = self.config.condition.label(),
            rounds_run = self.rounds_run,
            successful_agents = self.state.success_count(),
            n_agents = self.state.num_agents(),
            "simulation_complete"
        );
        self.into_result()
    }

    /// Snapshot the run as it stands
    ///
    /// # Errors
    ///
    /// `RunAborted` if a round failed part-way.
    pub fn into_result(self) -> Result<SimulationResult, SimulationError> {
        if let Some(round) = self.aborted_at {
            return Err(SimulationError::RunAborted(round));
        }
        let exchange = match self.institution {
            Institution::Exchange(exchange) => Some(exchange),
            _ => None,
        };
        SimulationResult::build(
            &self.config,
            &self.assignments,
            self.rounds_run,
            self.state,
            exchange,
        )
    }
}

// ============================================================================
// Oracle Helpers
// ============================================================================

/// Read-only view of `agent` for the oracle
pub fn agent_view(
    state: &SimulationState,
    condition: Condition,
    round: usize,
    agent: &str,
    allowed_actions: &[&'static str],
) -> Option<AgentView> {
    let agent = state.get_agent(agent)?;
    Some(AgentView {
        condition,
        round,
        agent: agent.name().to_string(),
        inventory: agent.inventory().clone(),
        money: condition.is_monetary().then(|| agent.money()),
        target_good: agent.target_good().to_string(),
        recent_messages: agent.recent_history(),
        allowed_actions: allowed_actions.to_vec(),
    })
}

/// Ask the oracle for one agent's action and log it as `agent_action`
///
/// Unparseable text is kept as a JSON string, which every engine rejects as
/// `malformed_action`.
fn decide(
    state: &mut SimulationState,
    condition: Condition,
    policy: &RetryPolicy,
    round: usize,
    agent: &str,
    allowed_actions: &[&'static str],
    oracle: &mut dyn Oracle,
) -> Result<Value, OracleError> {
    let view = agent_view(state, condition, round, agent, allowed_actions)
        .ok_or_else(|| OracleError::Fatal(format!("no view for unknown agent {}", agent)))?;
    let request = OracleRequest::Agent(view);
    let text = propose_with_retry(oracle, &request, policy)?;
    let action = parse_reply(&text).unwrap_or(Value::String(text));

    if let OracleRequest::Agent(view) = request {
        state.log_event(Event::AgentAction {
            round,
            agent: view.agent,
            action: action.clone(),
            inventory: view.inventory,
            target_good: view.target_good,
            money: state.get_agent(agent).map_or(0.0, |a| a.money()),
        });
    }
    Ok(action)
}

// ============================================================================
// Tests
// ============================================================================
