//! Experiment initialization: goods, agent identities and target assignment.

pub mod assignment;
