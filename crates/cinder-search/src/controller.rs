//! The simulated-annealing state machine.

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cinder_types::{CinderError, CinderResult, RangeTable};

use crate::constraint::Constraint;

/// Annealing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaConfig {
    /// Starting temperature.
    pub init_temperature: f64,
    /// Multiplicative cooling factor applied once per observation; must be
    /// strictly between 0 and 1.
    pub reduce_rate: f64,
    /// Attempts at finding a feasible candidate before `propose` falls back
    /// to the current tokens.
    pub max_try_number: usize,
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            init_temperature: 100.0,
            reduce_rate: 0.85,
            max_try_number: 300,
        }
    }
}

impl SaConfig {
    pub fn with_temperature(mut self, init_temperature: f64, reduce_rate: f64) -> Self {
        self.init_temperature = init_temperature;
        self.reduce_rate = reduce_rate;
        self
    }

    pub fn with_max_try_number(mut self, n: usize) -> Self {
        self.max_try_number = n;
        self
    }

    pub fn validate(&self) -> CinderResult<()> {
        if !(self.init_temperature > 0.0) {
            return Err(CinderError::Config(format!(
                "init_temperature must be positive, got {}",
                self.init_temperature
            )));
        }
        if !(self.reduce_rate > 0.0 && self.reduce_rate < 1.0) {
            return Err(CinderError::Config(format!(
                "reduce_rate must be in (0, 1), got {}",
                self.reduce_rate
            )));
        }
        if self.max_try_number == 0 {
            return Err(CinderError::Config(
                "max_try_number must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One scored trial, as recorded in the controller's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tokens: Vec<i64>,
    pub reward: f64,
    pub observed_at: DateTime<Utc>,
}

/// Simulated-annealing search controller.
///
/// Owns the whole search state: current point, temperature, history, and
/// best-so-far. One instance drives one search session; all access must be
/// serialized by the owner.
pub struct SaController {
    range_table: RangeTable,
    config: SaConfig,
    constraint: Box<dyn Constraint>,
    tokens: Vec<i64>,
    reward: f64,
    temperature: f64,
    history: Vec<Observation>,
    best_tokens: Vec<i64>,
    best_reward: f64,
    rng: ChaCha8Rng,
}

impl SaController {
    /// Create a controller starting from `init_tokens`.
    ///
    /// The initial point is required: there is no principled heuristic for
    /// deriving one from a constraint budget, so the caller must supply it.
    pub fn new(
        range_table: RangeTable,
        init_tokens: Vec<i64>,
        config: SaConfig,
        constraint: Box<dyn Constraint>,
    ) -> CinderResult<Self> {
        config.validate()?;
        if init_tokens.len() != range_table.dims() {
            return Err(CinderError::Config(format!(
                "initial tokens have {} dimensions, range table has {}",
                init_tokens.len(),
                range_table.dims()
            )));
        }
        if let Some(dim) = range_table.violation(&init_tokens) {
            let (min, max) = range_table.dim_bounds(dim);
            return Err(CinderError::OutOfRange {
                dim,
                token: init_tokens[dim],
                min,
                max,
            });
        }
        Ok(Self {
            best_tokens: init_tokens.clone(),
            best_reward: f64::NEG_INFINITY,
            tokens: init_tokens,
            reward: f64::NEG_INFINITY,
            temperature: config.init_temperature,
            history: Vec::new(),
            rng: ChaCha8Rng::from_entropy(),
            range_table,
            config,
            constraint,
        })
    }

    /// Seed the internal RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Propose the next candidate token vector.
    ///
    /// Perturbs the current point and re-samples up to `max_try_number` times
    /// until the constraint accepts. When no feasible candidate turns up,
    /// falls back to returning the current tokens unchanged.
    pub fn propose(&mut self) -> Vec<i64> {
        for _ in 0..self.config.max_try_number {
            let candidate = self.perturb();
            if self.constraint.feasible(&candidate) {
                debug!(?candidate, "proposing candidate");
                return candidate;
            }
        }
        warn!(
            tries = self.config.max_try_number,
            "no feasible candidate found; falling back to current tokens"
        );
        self.tokens.clone()
    }

    /// Fold an observed reward into the search state.
    ///
    /// Metropolis acceptance: an improvement over the current point is always
    /// accepted, a worse candidate with probability `exp(-delta / T)`. The
    /// temperature cools by `reduce_rate` exactly once per call, and the
    /// best-so-far pair is replaced only on strict improvement.
    pub fn observe(&mut self, tokens: Vec<i64>, reward: f64) -> CinderResult<()> {
        if tokens.len() != self.range_table.dims() {
            return Err(CinderError::Config(format!(
                "observed tokens have {} dimensions, range table has {}",
                tokens.len(),
                self.range_table.dims()
            )));
        }
        if let Some(dim) = self.range_table.violation(&tokens) {
            let (min, max) = self.range_table.dim_bounds(dim);
            return Err(CinderError::OutOfRange {
                dim,
                token: tokens[dim],
                min,
                max,
            });
        }

        self.history.push(Observation {
            tokens: tokens.clone(),
            reward,
            observed_at: Utc::now(),
        });

        let accepted = reward > self.reward || {
            let deficit = self.reward - reward;
            self.rng.gen::<f64>() < (-deficit / self.temperature).exp()
        };
        if accepted {
            debug!(reward, temperature = self.temperature, "candidate accepted");
            self.tokens = tokens.clone();
            self.reward = reward;
        } else {
            debug!(reward, temperature = self.temperature, "candidate rejected");
        }

        if reward > self.best_reward {
            info!(reward, ?tokens, "new best reward");
            self.best_reward = reward;
            self.best_tokens = tokens;
        }

        self.temperature *= self.config.reduce_rate;
        Ok(())
    }

    /// Perturb one uniformly chosen dimension within its bounds.
    fn perturb(&mut self) -> Vec<i64> {
        let mut candidate = self.tokens.clone();
        let dim = self.rng.gen_range(0..candidate.len());
        let (lo, hi) = self.range_table.dim_bounds(dim);
        candidate[dim] = self.rng.gen_range(lo..=hi);
        self.range_table.clamp(&mut candidate);
        candidate
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn current_tokens(&self) -> &[i64] {
        &self.tokens
    }

    /// Best tokens and reward observed so far. `None` until the first
    /// observation arrives.
    pub fn best(&self) -> Option<(&[i64], f64)> {
        if self.history.is_empty() {
            None
        } else {
            Some((&self.best_tokens, self.best_reward))
        }
    }

    /// Append-only observation history, in arrival order.
    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    pub fn range_table(&self) -> &RangeTable {
        &self.range_table
    }
}
