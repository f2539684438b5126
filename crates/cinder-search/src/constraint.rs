//! Feasibility seam between the controller and the caller's domain.

/// A caller-supplied predicate every proposed candidate must pass.
///
/// The controller never interprets tokens itself; whatever domain meaning a
/// candidate has (FLOPs budget, latency target, ...) lives behind this trait.
pub trait Constraint: Send + Sync {
    fn feasible(&self, tokens: &[i64]) -> bool;
}

impl<F> Constraint for F
where
    F: Fn(&[i64]) -> bool + Send + Sync,
{
    fn feasible(&self, tokens: &[i64]) -> bool {
        self(tokens)
    }
}

/// Accepts every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl Constraint for Unconstrained {
    fn feasible(&self, _tokens: &[i64]) -> bool {
        true
    }
}
