//! Deterministic random number generation
//!
//! Uses xorshift64* algorithm for fast, deterministic random number generation.
//! CRITICAL: All randomness in an experiment run (target derangement, planner
//! matching order) MUST go through this module.

mod xorshift;

pub use xorshift::RngManager;
