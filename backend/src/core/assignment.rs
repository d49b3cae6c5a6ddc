//! Endowment and target assignment
//!
//! Every experiment starts from the same shape: N agents `A0..A{N-1}`, N goods
//! `g0..g{N-1}`, agent `Ai` endowed with one unit of `gi`. Targets are drawn
//! as a derangement of agent indices so that no agent starts out already
//! successful.
//!
//! # Critical Invariants
//!
//! 1. **Bijection**: the target assignment is a permutation of `0..N`
//! 2. **No fixed point**: `target[i] != i` for every agent
//! 3. **Determinism**: the assignment depends only on the RNG state

use crate::rng::RngManager;
use thiserror::Error;

/// Errors raised while building the initial assignment
#[derive(Debug, Error, PartialEq)]
pub enum AssignmentError {
    #[error("A derangement requires at least 2 agents, got {n_agents}")]
    TooFewAgents { n_agents: usize },
}

/// Label of the `index`-th tradable good
pub fn good_label(index: usize) -> String {
    format!("g{}", index)
}

/// Name of the `index`-th agent
pub fn agent_name(index: usize) -> String {
    format!("A{}", index)
}

/// The fixed, finite set of tradable goods for an `n_agents` experiment
pub fn goods_for(n_agents: usize) -> Vec<String> {
    (0..n_agents).map(good_label).collect()
}

/// Draw a uniformly random derangement of `0..n_agents`
///
/// Shuffles until no index maps to itself. For `n >= 2` the acceptance
/// probability is about 1/e, so the expected number of shuffles is below 3.
///
/// # Errors
///
/// `TooFewAgents` when `n_agents < 2`: no derangement exists for a single
/// element, and the empty experiment is meaningless.
///
/// # Example
///
/// ```rust
/// use agentic_economy_core_rs::core::assignment::derangement;
/// use agentic_economy_core_rs::RngManager;
///
/// let mut rng = RngManager::new(42);
/// let targets = derangement(5, &mut rng).unwrap();
/// assert!(targets.iter().enumerate().all(|(i, t)| i != *t));
/// ```
pub fn derangement(n_agents: usize, rng: &mut RngManager) -> Result<Vec<usize>, AssignmentError> {
    if n_agents < 2 {
        return Err(AssignmentError::TooFewAgents { n_agents });
    }

    let mut indices: Vec<usize> = (0..n_agents).collect();
    loop {
        rng.shuffle(&mut indices);
        if indices.iter().enumerate().all(|(idx, target)| idx != *target) {
            return Ok(indices);
        }
    }
}

/// One agent's starting position
#[derive(Debug, Clone, PartialEq)]
pub struct InitialAssignment {
    pub agent: String,
    pub endowment: String,
    pub target: String,
}

/// Build the full initial assignment for an experiment
pub fn initial_assignments(
    n_agents: usize,
    rng: &mut RngManager,
) -> Result<Vec<InitialAssignment>, AssignmentError> {
    let targets = derangement(n_agents, rng)?;
    Ok(targets
        .into_iter()
        .enumerate()
        .map(|(idx, target_idx)| InitialAssignment {
            agent: agent_name(idx),
            endowment: good_label(idx),
            target: good_label(target_idx),
        })
        .collect())
}
