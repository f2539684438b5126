//! # cinder-search
//!
//! The simulated-annealing controller at the heart of Cinder: proposes
//! candidate token vectors subject to a caller-supplied feasibility
//! constraint and folds observed rewards back into its state (current point,
//! temperature, history, best-so-far).

mod constraint;
mod controller;

pub use constraint::{Constraint, Unconstrained};
pub use controller::{Observation, SaConfig, SaController};
