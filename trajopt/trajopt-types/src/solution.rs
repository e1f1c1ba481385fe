//! Solve outcomes and per-iteration diagnostics.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a solve loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// The stopping criterion fell below its threshold on a feasible
    /// iterate.
    Converged,
    /// The iteration budget was spent without meeting the stopping
    /// criterion.
    MaxIterations,
    /// Regularization reached its upper bound without producing a usable
    /// search direction. The best candidate found so far is retained.
    RegularizationExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "stopping criterion below threshold"),
            Self::MaxIterations => write!(f, "maximum iterations reached"),
            Self::RegularizationExhausted => write!(f, "regularization exhausted"),
        }
    }
}

/// Summary of a completed solve.
///
/// The optimized trajectory itself stays inside the solver (read it through
/// the candidate accessors); the summary carries the scalar outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveResult {
    /// Why the loop stopped.
    pub termination: Termination,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Total cost of the final candidate.
    pub cost: f64,
    /// Final value of the stopping criterion.
    pub stop: f64,
}

impl SolveResult {
    /// Whether the stopping threshold was reached (as opposed to running
    /// out of iterations or regularization headroom).
    #[must_use]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Snapshot of solver state after one accepted iteration.
///
/// Passed to registered diagnostic callbacks, one invocation per accepted
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IterationRecord {
    /// Iteration index (0-based).
    pub iter: usize,
    /// Total cost of the newly accepted candidate.
    pub cost: f64,
    /// Stopping criterion evaluated for the accepted direction.
    pub stop: f64,
    /// Linear expected-improvement coefficient of the direction.
    pub d1: f64,
    /// Quadratic expected-improvement coefficient of the direction.
    pub d2: f64,
    /// Accepted step length.
    pub step_length: f64,
    /// State regularization after the acceptance update.
    pub xreg: f64,
    /// Control regularization after the acceptance update.
    pub ureg: f64,
    /// Whether the accepted candidate is dynamically feasible.
    pub is_feasible: bool,
}
