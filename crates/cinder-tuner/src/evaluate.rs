//! Collaborator seams: trial evaluation and side-effect rollback.

use async_trait::async_trait;

use cinder_search::Constraint;
use cinder_types::{tokens_to_ratios, CinderResult};

/// The external objective function a worker runs per trial.
///
/// Implementations apply the candidate configuration (e.g. prune a model at
/// the given ratios), measure, and return a scalar reward. The core never
/// interprets what the ratios mean.
#[async_trait]
pub trait Evaluator: Send {
    /// Run one trial at `ratios` and return its reward.
    async fn evaluate(&mut self, ratios: &[f64]) -> CinderResult<f64>;
}

/// Captures-and-restores guard for external mutable state a trial perturbs.
///
/// Registered on the tuner before a trial runs; `restore` is invoked when
/// the trial reports, before the observation is sent to the server, so the
/// next trial starts from clean state.
pub trait Rollback: Send {
    fn restore(&mut self) -> CinderResult<()>;
}

/// Adapts a ratio-domain feasibility predicate to the controller's token
/// domain.
pub struct RatioConstraint<F> {
    predicate: F,
    step: f64,
}

impl<F> RatioConstraint<F>
where
    F: Fn(&[f64]) -> bool + Send + Sync,
{
    pub fn new(predicate: F, step: f64) -> Self {
        Self { predicate, step }
    }
}

impl<F> Constraint for RatioConstraint<F>
where
    F: Fn(&[f64]) -> bool + Send + Sync,
{
    fn feasible(&self, tokens: &[i64]) -> bool {
        (self.predicate)(&tokens_to_ratios(tokens, self.step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_constraint_decodes_before_testing() {
        let under_budget = RatioConstraint::new(|ratios: &[f64]| ratios.iter().sum::<f64>() < 1.0, 0.01);
        assert!(under_budget.feasible(&[30, 40])); // 0.3 + 0.4
        assert!(!under_budget.feasible(&[60, 50])); // 0.6 + 0.5
    }
}
