//! Token/ratio encoding and per-dimension search bounds.
//!
//! A candidate configuration lives in two domains: the real-valued ratio
//! domain the caller understands, and the discrete token domain the search
//! controller operates on.  The mapping is a fixed quantization step, lossy
//! by design: round-tripping a ratio through a token lands within `step / 2`
//! of the original value.

use serde::{Deserialize, Serialize};

use crate::errors::{CinderError, CinderResult};

/// Default quantization step: one token per percentage point of ratio.
pub const DEFAULT_STEP: f64 = 0.01;

/// Quantize a ratio into its token.
pub fn ratio_to_token(value: f64, step: f64) -> i64 {
    (value / step).round() as i64
}

/// Decode a token back into the ratio domain.
pub fn token_to_ratio(token: i64, step: f64) -> f64 {
    token as f64 * step
}

/// Vector form of [`ratio_to_token`].
pub fn ratios_to_tokens(ratios: &[f64], step: f64) -> Vec<i64> {
    ratios.iter().map(|r| ratio_to_token(*r, step)).collect()
}

/// Vector form of [`token_to_ratio`].
pub fn tokens_to_ratios(tokens: &[i64], step: f64) -> Vec<f64> {
    tokens.iter().map(|t| token_to_ratio(*t, step)).collect()
}

/// A domain bound: either one scalar broadcast across every dimension or an
/// explicit per-dimension list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Scalar(f64),
    PerDim(Vec<f64>),
}

impl Bound {
    /// Expand to one value per dimension. Fails when an explicit list does
    /// not match the dimension count.
    fn expand(&self, dims: usize) -> CinderResult<Vec<f64>> {
        match self {
            Self::Scalar(v) => Ok(vec![*v; dims]),
            Self::PerDim(values) if values.len() == dims => Ok(values.clone()),
            Self::PerDim(values) => Err(CinderError::Config(format!(
                "bound has {} entries but the search space has {dims} dimensions",
                values.len()
            ))),
        }
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Bound {
    fn from(values: Vec<f64>) -> Self {
        Self::PerDim(values)
    }
}

/// Per-dimension `[min, max]` token bounds for the search space.
///
/// Every token vector the controller proposes or accepts satisfies
/// `min_tokens[i] <= t[i] <= max_tokens[i]` for all `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeTable {
    pub min_tokens: Vec<i64>,
    pub max_tokens: Vec<i64>,
}

impl RangeTable {
    /// Build the table by encoding ratio-domain bounds.
    ///
    /// Scalar bounds broadcast across all `dims` dimensions; per-dimension
    /// lists must match `dims` exactly. Fails with
    /// [`CinderError::InvalidBounds`] when any `min > max`.
    pub fn new(min: Bound, max: Bound, dims: usize, step: f64) -> CinderResult<Self> {
        if dims == 0 {
            return Err(CinderError::Config(
                "search space needs at least one dimension".to_string(),
            ));
        }
        let min_ratios = min.expand(dims)?;
        let max_ratios = max.expand(dims)?;
        for (dim, (lo, hi)) in min_ratios.iter().zip(&max_ratios).enumerate() {
            if lo > hi {
                return Err(CinderError::InvalidBounds {
                    dim,
                    min: *lo,
                    max: *hi,
                });
            }
        }
        Ok(Self {
            min_tokens: ratios_to_tokens(&min_ratios, step),
            max_tokens: ratios_to_tokens(&max_ratios, step),
        })
    }

    /// Number of search dimensions.
    pub fn dims(&self) -> usize {
        self.min_tokens.len()
    }

    /// `[min, max]` token bounds for one dimension.
    pub fn dim_bounds(&self, dim: usize) -> (i64, i64) {
        (self.min_tokens[dim], self.max_tokens[dim])
    }

    /// First dimension where `tokens` violates the table, if any.
    pub fn violation(&self, tokens: &[i64]) -> Option<usize> {
        tokens
            .iter()
            .zip(self.min_tokens.iter().zip(&self.max_tokens))
            .position(|(t, (lo, hi))| t < lo || t > hi)
    }

    /// Whether `tokens` satisfies the table component-wise.
    pub fn contains(&self, tokens: &[i64]) -> bool {
        tokens.len() == self.dims() && self.violation(tokens).is_none()
    }

    /// Clamp each component into its `[min, max]` range.
    pub fn clamp(&self, tokens: &mut [i64]) {
        for (dim, t) in tokens.iter_mut().enumerate() {
            *t = (*t).clamp(self.min_tokens[dim], self.max_tokens[dim]);
        }
    }
}
