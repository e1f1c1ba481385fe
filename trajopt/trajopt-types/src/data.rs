//! Per-stage scratch storage for action model evaluation.

use nalgebra::{DMatrix, DVector};

/// Scratch storage for one stage of a shooting problem.
///
/// Holds the outputs of a stage evaluation: the next state and running cost
/// (filled by `calc`), and the quadratic expansion of dynamics and cost
/// (additionally filled by `calc_diff`). One instance is allocated per stage
/// at problem construction and then mutated in place on every evaluation —
/// the solve loop performs no per-iteration allocation for stage data.
///
/// Naming follows the standard optimal-control convention: `f` is the
/// dynamics, `l` the running cost, subscripts denote differentiation with
/// respect to the state tangent (`x`, dimension `ndx`) or the control
/// (`u`, dimension `nu`).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionData {
    /// Next state, dimension `nx`.
    pub xnext: DVector<f64>,
    /// Running cost at the evaluated state/control pair.
    pub cost: f64,
    /// Dynamics Jacobian with respect to the state, `ndx × ndx`.
    pub fx: DMatrix<f64>,
    /// Dynamics Jacobian with respect to the control, `ndx × nu`.
    pub fu: DMatrix<f64>,
    /// Cost gradient with respect to the state, dimension `ndx`.
    pub lx: DVector<f64>,
    /// Cost gradient with respect to the control, dimension `nu`.
    pub lu: DVector<f64>,
    /// Cost Hessian with respect to the state, `ndx × ndx`.
    pub lxx: DMatrix<f64>,
    /// Cross cost Hessian, `ndx × nu`.
    pub lxu: DMatrix<f64>,
    /// Cost Hessian with respect to the control, `nu × nu`.
    pub luu: DMatrix<f64>,
}

impl ActionData {
    /// Allocate zeroed scratch storage for a stage with state dimension
    /// `nx`, tangent dimension `ndx`, and control dimension `nu`.
    #[must_use]
    pub fn new(nx: usize, ndx: usize, nu: usize) -> Self {
        Self {
            xnext: DVector::zeros(nx),
            cost: 0.0,
            fx: DMatrix::zeros(ndx, ndx),
            fu: DMatrix::zeros(ndx, nu),
            lx: DVector::zeros(ndx),
            lu: DVector::zeros(nu),
            lxx: DMatrix::zeros(ndx, ndx),
            lxu: DMatrix::zeros(ndx, nu),
            luu: DMatrix::zeros(nu, nu),
        }
    }

    /// State dimension this data was allocated for.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.xnext.len()
    }

    /// Tangent dimension this data was allocated for.
    #[must_use]
    pub fn ndx(&self) -> usize {
        self.lx.len()
    }

    /// Control dimension this data was allocated for.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.lu.len()
    }

    /// Check that every derivative block holds finite values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cost.is_finite()
            && self.xnext.iter().all(|v| v.is_finite())
            && self.fx.iter().all(|v| v.is_finite())
            && self.fu.iter().all(|v| v.is_finite())
            && self.lx.iter().all(|v| v.is_finite())
            && self.lu.iter().all(|v| v.is_finite())
            && self.lxx.iter().all(|v| v.is_finite())
            && self.lxu.iter().all(|v| v.is_finite())
            && self.luu.iter().all(|v| v.is_finite())
    }
}
