//! The solver contract shared by all trajectory optimizers.
//!
//! A solver owns a [`ShootingProblem`](crate::ShootingProblem) plus a
//! candidate trajectory, and refines the candidate through two primitive
//! operations: computing a search direction and trying a step along it.
//! [`Solver::solve`] composes them into a full convergence loop with
//! regularization-based globalization.
//!
//! # State machine
//!
//! ```text
//! ┌──────────────┐ set_candidate ┌───────────────┐ compute_direction
//! │ uninitialized├──────────────▶│ candidate set ├──────────────────┐
//! └──────────────┘               └───────▲───────┘                  │
//!                                        │ (candidate change        ▼
//!                                        │  invalidates direction) ┌──────────┐
//!                                        └──────────── try_step ◀──┤ direction│
//!                                                     (accept)     │ computed │
//!                                                                  └──────────┘
//! ```
//!
//! `try_step` evaluates a trial without committing it; committing an
//! accepted trial (and looping until convergence) is `solve`'s job.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DVector, Vector2};
use trajopt_types::{IterationRecord, Result, SolveResult};

use crate::problem::ShootingProblem;

/// Thread-safe callback wrapper that implements Debug.
///
/// Wraps `Arc<dyn Fn(...) + Send + Sync>` and provides a Debug impl
/// (since `dyn Fn` doesn't implement Debug).
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(<fn>)")
    }
}

/// Diagnostic callback: invoked once per accepted solve iteration with a
/// snapshot of the solver state.
pub type IterationCallback = Callback<dyn Fn(&IterationRecord) + Send + Sync>;

impl IterationCallback {
    /// Wrap a closure as an iteration callback.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&IterationRecord) + Send + Sync + 'static,
    {
        Callback(Arc::new(f))
    }
}

/// A callback that mirrors each accepted iteration to a `tracing` event.
#[must_use]
pub fn logging_callback() -> IterationCallback {
    IterationCallback::from_fn(|record| {
        tracing::info!(
            iter = record.iter,
            cost = record.cost,
            stop = record.stop,
            step_length = record.step_length,
            xreg = record.xreg,
            ureg = record.ureg,
            is_feasible = record.is_feasible,
            "iteration accepted"
        );
    })
}

/// Operations every trajectory optimizer must provide.
///
/// The contract splits the optimizer into its primitives so hosts can drive
/// them directly (custom globalization, benchmarking a single backward
/// pass, …) while [`solve`](Self::solve) remains the turnkey entry point.
///
/// All operations mutate internal solver state — the candidate, the
/// regularization, and the stored direction; none is a pure function of its
/// arguments.
pub trait Solver {
    /// The problem this solver optimizes.
    fn problem(&self) -> &ShootingProblem;

    /// Mutable access to the problem, e.g. to move the initial state
    /// between receding-horizon re-solves.
    fn problem_mut(&mut self) -> &mut ShootingProblem;

    /// Install a candidate trajectory (warm start).
    ///
    /// `xs` defaults to the initial state replicated over the horizon and
    /// `us` to zero controls of each stage's dimension. `is_feasible`
    /// declares whether `xs` is an exact rollout of `us`; it is never
    /// inferred, because the forward pass branches on it.
    ///
    /// Installing a candidate invalidates any previously computed
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns a size/dimension error when the provided trajectories do not
    /// match the problem.
    fn set_candidate(
        &mut self,
        xs: Option<Vec<DVector<f64>>>,
        us: Option<Vec<DVector<f64>>>,
        is_feasible: bool,
    ) -> Result<()>;

    /// Compute a search direction for the current candidate.
    ///
    /// With `recalc` the problem derivatives are re-evaluated first; pass
    /// `false` to reuse them, e.g. when retrying after a regularization
    /// increase. The direction is stored internally and consumed by
    /// [`try_step`](Self::try_step).
    ///
    /// # Errors
    ///
    /// [`SolverError::NoCandidate`](trajopt_types::SolverError::NoCandidate)
    /// before any candidate is set;
    /// [`SolverError::NotPositiveDefinite`](trajopt_types::SolverError::NotPositiveDefinite)
    /// or [`SolverError::Diverged`](trajopt_types::SolverError::Diverged)
    /// when the backward pass fails under the current regularization (both
    /// recoverable by raising it).
    fn compute_direction(&mut self, recalc: bool) -> Result<()>;

    /// Try a step of length `step_length ∈ (0, 1]` along the stored
    /// direction and return the realized cost improvement (positive is
    /// better). The candidate is not committed.
    ///
    /// # Errors
    ///
    /// [`SolverError::DirectionStale`](trajopt_types::SolverError::DirectionStale)
    /// without a current direction;
    /// [`SolverError::Diverged`](trajopt_types::SolverError::Diverged) when
    /// the trial rollout produces non-finite values.
    fn try_step(&mut self, step_length: f64) -> Result<f64>;

    /// Non-negative convergence measure: the sum over stages of the squared
    /// control-gradient residual norm of the last computed direction. Zero
    /// at an exact local optimum; zero before any direction was computed.
    fn stopping_criteria(&self) -> f64;

    /// Expected-improvement coefficients `(d1, d2)` of the stored
    /// direction: a step of length `α` predicts a cost decrease of
    /// `α·(d1 + ½·α·d2)`.
    fn expected_improvement(&self) -> Vector2<f64>;

    /// Run the full convergence loop from a warm start.
    ///
    /// Iterates direction computation, line search, and regularization
    /// updates until the stopping criterion falls below the configured
    /// threshold on a feasible iterate, the iteration budget `maxiter` is
    /// spent, or regularization is exhausted. The optimized trajectory is
    /// left in the candidate accessors; the returned summary says why the
    /// loop stopped.
    ///
    /// `reg_init` overrides the configured initial regularization — small
    /// values suit good warm starts.
    ///
    /// # Errors
    ///
    /// Structural errors (mis-sized warm starts, mis-shaped model outputs)
    /// propagate immediately. Numerical failures do not: they are absorbed
    /// by the globalization strategy or reported through the summary's
    /// termination reason.
    fn solve(
        &mut self,
        init_xs: Option<Vec<DVector<f64>>>,
        init_us: Option<Vec<DVector<f64>>>,
        maxiter: usize,
        is_feasible: bool,
        reg_init: Option<f64>,
    ) -> Result<SolveResult>;

    /// The candidate state trajectory (`T + 1` elements).
    fn xs(&self) -> &[DVector<f64>];

    /// The candidate control trajectory (`T` elements).
    fn us(&self) -> &[DVector<f64>];

    /// Whether the candidate is an exact rollout of its controls.
    fn is_feasible(&self) -> bool;

    /// Total cost of the current candidate (valid after the first
    /// evaluation).
    fn cost(&self) -> f64;

    /// Current state regularization.
    fn xreg(&self) -> f64;

    /// Current control regularization.
    fn ureg(&self) -> f64;

    /// Set the state regularization, clamped to the configured bounds.
    fn set_xreg(&mut self, xreg: f64);

    /// Set the control regularization, clamped to the configured bounds.
    fn set_ureg(&mut self, ureg: f64);

    /// Step acceptance threshold.
    fn th_acceptstep(&self) -> f64;

    /// Set the step acceptance threshold.
    fn set_th_acceptstep(&mut self, th: f64);

    /// Stopping threshold.
    fn th_stop(&self) -> f64;

    /// Set the stopping threshold.
    fn set_th_stop(&mut self, th: f64);

    /// Replace the list of per-iteration diagnostic callbacks.
    ///
    /// Callbacks run synchronously, in order, once per accepted iteration.
    fn set_callbacks(&mut self, callbacks: Vec<IterationCallback>);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_clone_and_debug() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter_in = Arc::clone(&counter);
        let cb = IterationCallback::from_fn(move |_| {
            counter_in.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let cb2 = cb.clone();
        assert_eq!(format!("{cb:?}"), "Callback(<fn>)");

        let record = IterationRecord {
            iter: 0,
            cost: 1.0,
            stop: 0.1,
            d1: 0.5,
            d2: -0.5,
            step_length: 1.0,
            xreg: 1e-9,
            ureg: 1e-9,
            is_feasible: true,
        };
        (cb.0)(&record);
        (cb2.0)(&record);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
