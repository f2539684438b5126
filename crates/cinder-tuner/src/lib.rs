//! # cinder-tuner
//!
//! The consumer-facing facade over the Cinder core: owns a client (and
//! optionally a co-located server), drives the propose/evaluate/report
//! loop, and manages rollback of whatever external state a trial perturbed.
//! The evaluation itself stays behind the [`Evaluator`] seam.

mod config;
mod evaluate;
mod tuner;

pub use config::TunerConfig;
pub use evaluate::{Evaluator, RatioConstraint, Rollback};
pub use tuner::{AutoTuner, TrialRecord};
