//! Solver configuration: regularization schedule, line search, thresholds.

use crate::{Result, SolverError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the regularized DDP solver.
///
/// Regularization acts as a trust region: `reg_factor` scales it up after a
/// failed factorization or an exhausted line search, and scales it down after
/// a confident (long) accepted step. The line search tries a geometric
/// sequence of step lengths `1, ls_decay, ls_decay², …`.
///
/// # Defaults
///
/// The defaults match common practice for shooting-based optimal control:
/// regularization in `[1e-9, 1e9]` with factor 10, acceptance threshold 0.1,
/// stopping threshold 1e-9, and ten halving step lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DdpConfig {
    /// Initial regularization installed at the start of `solve`
    /// (unless overridden by the caller's `reg_init` argument).
    pub reg_init: f64,

    /// Multiplicative factor applied when increasing or decreasing
    /// regularization.
    pub reg_factor: f64,

    /// Lower bound for `xreg`/`ureg`.
    pub reg_min: f64,

    /// Upper bound for `xreg`/`ureg`. Reaching this bound during a solve
    /// terminates it unsuccessfully.
    pub reg_max: f64,

    /// Step acceptance threshold: a trial step is accepted when the realized
    /// improvement exceeds `th_acceptstep` times the expected improvement.
    pub th_acceptstep: f64,

    /// Stopping threshold on the squared norm of the control-gradient
    /// residual.
    pub th_stop: f64,

    /// Gradient threshold below which any step is accepted (the quadratic
    /// model predicts no further progress).
    pub th_grad: f64,

    /// Step lengths above this threshold count as confident steps and
    /// trigger a regularization decrease.
    pub th_stepdec: f64,

    /// Geometric decay between consecutive trial step lengths.
    pub ls_decay: f64,

    /// Number of trial step lengths before the line search gives up.
    pub ls_max_trials: usize,
}

impl Default for DdpConfig {
    fn default() -> Self {
        Self {
            reg_init: 1e-9,
            reg_factor: 10.0,
            reg_min: 1e-9,
            reg_max: 1e9,
            th_acceptstep: 0.1,
            th_stop: 1e-9,
            th_grad: 1e-12,
            th_stepdec: 0.5,
            ls_decay: 0.5,
            ls_max_trials: 10,
        }
    }
}

impl DdpConfig {
    /// High-accuracy configuration for offline trajectory generation.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            th_stop: 1e-12,
            ls_max_trials: 15,
            ..Self::default()
        }
    }

    /// Fast configuration for receding-horizon (MPC) use, where a handful of
    /// iterations from a warm start is the common case.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            th_stop: 1e-6,
            ls_max_trials: 5,
            ..Self::default()
        }
    }

    /// Set the stopping threshold.
    #[must_use]
    pub const fn with_th_stop(mut self, th_stop: f64) -> Self {
        self.th_stop = th_stop;
        self
    }

    /// Set the step acceptance threshold.
    #[must_use]
    pub const fn with_th_acceptstep(mut self, th_acceptstep: f64) -> Self {
        self.th_acceptstep = th_acceptstep;
        self
    }

    /// Set the regularization bounds.
    #[must_use]
    pub const fn with_reg_bounds(mut self, reg_min: f64, reg_max: f64) -> Self {
        self.reg_min = reg_min;
        self.reg_max = reg_max;
        self
    }

    /// Set the line search schedule.
    #[must_use]
    pub const fn with_line_search(mut self, decay: f64, max_trials: usize) -> Self {
        self.ls_decay = decay;
        self.ls_max_trials = max_trials;
        self
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidConfig`] naming the offending parameter.
    /// Violations would otherwise surface as `NaN`s or infinite loops deep
    /// inside a solve.
    pub fn validate(&self) -> Result<()> {
        if !(self.reg_min >= 0.0 && self.reg_min <= self.reg_max) {
            return Err(SolverError::invalid_config(
                "reg_min must satisfy 0 <= reg_min <= reg_max",
            ));
        }
        if self.reg_factor <= 1.0 {
            return Err(SolverError::invalid_config("reg_factor must exceed 1"));
        }
        if !(self.ls_decay > 0.0 && self.ls_decay < 1.0) {
            return Err(SolverError::invalid_config("ls_decay must lie in (0, 1)"));
        }
        if self.ls_max_trials == 0 {
            return Err(SolverError::invalid_config("ls_max_trials must be positive"));
        }
        if !(self.th_acceptstep > 0.0 && self.th_acceptstep <= 1.0) {
            return Err(SolverError::invalid_config(
                "th_acceptstep must lie in (0, 1]",
            ));
        }
        if self.th_stop < 0.0 || self.th_grad < 0.0 {
            return Err(SolverError::invalid_config("thresholds must be non-negative"));
        }
        Ok(())
    }
}
