//! Order Selector: exhaustive ARIMA order grid search
//!
//! Every `(p, d, q)` in the Cartesian product of the configured ranges is fitted
//! independently on a rayon pool and scored by AIC. A candidate that fails to
//! fit scores `+inf` and never aborts its siblings.
//!
//! Enumeration order is `p` outermost, then `d`, then `q`. The reduction keeps
//! the first candidate (in enumeration order) with the strictly smallest score,
//! so the result is deterministic regardless of how the pool schedules fits.

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::arima::{ArimaOrder, FitError, FittedArima};

/// Half-open ranges for each order parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGrid {
    pub p: Range<usize>,
    pub d: Range<usize>,
    pub q: Range<usize>,
}

impl Default for OrderGrid {
    fn default() -> Self {
        Self {
            p: 0..3,
            d: 0..2,
            q: 0..3,
        }
    }
}

impl OrderGrid {
    pub fn new(p: Range<usize>, d: Range<usize>, q: Range<usize>) -> Self {
        Self { p, d, q }
    }

    /// Candidates in enumeration order.
    pub fn candidates(&self) -> Vec<ArimaOrder> {
        let mut out = Vec::with_capacity(self.len());
        for p in self.p.clone() {
            for d in self.d.clone() {
                for q in self.q.clone() {
                    out.push(ArimaOrder::new(p, d, q));
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.p.len() * self.d.len() * self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of fitting one candidate order.
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub order: ArimaOrder,
    pub outcome: Result<f64, FitError>,
}

impl CandidateScore {
    /// The ranking score: AIC, or `+inf` when the fit failed.
    pub fn score(&self) -> f64 {
        match &self.outcome {
            Ok(aic) => *aic,
            Err(_) => f64::INFINITY,
        }
    }
}

/// Result of a completed grid search.
#[derive(Debug, Clone)]
pub struct OrderSearch {
    pub best: ArimaOrder,
    pub best_score: f64,
    /// Every candidate, in enumeration order
    pub candidates: Vec<CandidateScore>,
}

impl OrderSearch {
    /// `false` when every candidate failed and `best` is only the first of
    /// equally infinite scores.
    pub fn is_reliable(&self) -> bool {
        self.best_score.is_finite()
    }

    pub fn failed_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.outcome.is_err()).count()
    }
}

#[derive(Debug, Error)]
pub enum OrderSearchError {
    #[error("order grid is empty (p {p:?}, d {d:?}, q {q:?})")]
    EmptyGrid {
        p: Range<usize>,
        d: Range<usize>,
        q: Range<usize>,
    },
}

/// Parallel grid search over ARIMA orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderSelector {
    /// Worker threads; `None` uses the global rayon pool (all cores)
    pub workers: Option<usize>,
}

impl OrderSelector {
    pub fn new(workers: Option<usize>) -> Self {
        Self { workers }
    }

    /// Find the order in `grid` with the lowest AIC on `data`.
    pub fn select(&self, data: &[f64], grid: &OrderGrid) -> Result<OrderSearch, OrderSearchError> {
        if grid.is_empty() {
            return Err(OrderSearchError::EmptyGrid {
                p: grid.p.clone(),
                d: grid.d.clone(),
                q: grid.q.clone(),
            });
        }

        let candidates = grid.candidates();
        let evaluate = || -> Vec<CandidateScore> {
            candidates
                .par_iter()
                .map(|&order| CandidateScore {
                    order,
                    outcome: FittedArima::fit(data, order).map(|m| m.aic()),
                })
                .collect()
        };

        let scores = match self.workers {
            Some(n) if n > 0 => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(evaluate),
                Err(e) => {
                    warn!(workers = n, error = %e, "Failed to build order-search pool, using global pool");
                    evaluate()
                }
            },
            _ => evaluate(),
        };

        for c in &scores {
            match &c.outcome {
                Ok(aic) => debug!(order = %c.order, aic, "candidate fitted"),
                Err(e) => debug!(order = %c.order, error = %e, "candidate failed"),
            }
        }

        // first strictly smaller score wins; all-infinite keeps the first candidate
        let mut best = 0;
        for (i, c) in scores.iter().enumerate().skip(1) {
            if c.score() < scores[best].score() {
                best = i;
            }
        }

        Ok(OrderSearch {
            best: scores[best].order,
            best_score: scores[best].score(),
            candidates: scores,
        })
    }
}

/// Convenience wrapper over [`OrderSelector::select`] on the global pool.
pub fn select_order(data: &[f64], grid: &OrderGrid) -> Result<OrderSearch, OrderSearchError> {
    OrderSelector::default().select(data, grid)
}
