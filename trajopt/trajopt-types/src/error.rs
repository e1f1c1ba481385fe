//! Error types for trajectory optimization.

use thiserror::Error;

/// Errors that can occur while building or solving a trajectory
/// optimization problem.
///
/// Two families of errors exist, with different propagation policies:
///
/// - **Structural errors** ([`DimensionMismatch`](SolverError::DimensionMismatch),
///   [`SizeMismatch`](SolverError::SizeMismatch),
///   [`NoCandidate`](SolverError::NoCandidate),
///   [`DirectionStale`](SolverError::DirectionStale)) signal a contract
///   violation at the call site. They propagate to the caller immediately.
/// - **Numerical errors** ([`NotPositiveDefinite`](SolverError::NotPositiveDefinite),
///   [`Diverged`](SolverError::Diverged)) are expected events in a
///   regularized solver. The solve loop handles them internally by raising
///   regularization or discarding the trial step; they only reach the caller
///   when invoking the low-level operations directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// A vector or matrix argument has the wrong shape.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which argument is mis-shaped.
        what: &'static str,
        /// Expected dimension.
        expected: usize,
        /// Provided dimension.
        actual: usize,
    },

    /// A trajectory has the wrong number of elements.
    #[error("size mismatch for {what}: expected {expected} elements, got {actual}")]
    SizeMismatch {
        /// Which trajectory is mis-sized.
        what: &'static str,
        /// Expected element count.
        expected: usize,
        /// Provided element count.
        actual: usize,
    },

    /// The regularized control Hessian could not be factorized.
    ///
    /// Recoverable: raise the regularization and recompute the direction.
    #[error("control Hessian not positive definite at stage {stage}")]
    NotPositiveDefinite {
        /// Stage at which the Cholesky factorization failed.
        stage: usize,
    },

    /// A computation produced non-finite values (`NaN` or `Inf`).
    #[error("numerical divergence in {what}")]
    Diverged {
        /// Description of where the non-finite values appeared.
        what: &'static str,
    },

    /// Invalid solver configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: &'static str,
    },

    /// A direction was requested before a candidate trajectory was set.
    #[error("no candidate trajectory: call set_candidate first")]
    NoCandidate,

    /// A step was tried without a valid search direction.
    ///
    /// The direction is invalidated whenever the candidate changes; call
    /// `compute_direction` again before trying a step.
    #[error("search direction is stale: call compute_direction first")]
    DirectionStale,
}

impl SolverError {
    /// Create a divergence error.
    #[must_use]
    pub fn diverged(what: &'static str) -> Self {
        Self::Diverged { what }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }

    /// Check whether the solve loop can recover from this error by
    /// adjusting regularization or the step length.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotPositiveDefinite { .. } | Self::Diverged { .. }
        )
    }
}
