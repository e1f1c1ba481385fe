//! Linear-quadratic stage model.

use nalgebra::{DMatrix, DVector};
use trajopt_types::{ActionData, Result};

use crate::action::ActionModel;
use crate::state::{StateManifold, VectorState};

/// Linear dynamics with quadratic cost:
///
/// ```text
/// x' = Fx·x + Fu·u
/// l(x, u) = ½·xᵀLxx·x + ½·uᵀLuu·u + xᵀLxu·u + lx₀ᵀx + lu₀ᵀu
/// ```
///
/// The quadratic expansion returned by `calc_diff` is exact, so a DDP
/// iteration on a problem built from `LqrAction` stages is a full Newton
/// step: the solver reaches the optimum in one accepted step. That makes
/// this model the workhorse for convergence and closed-form tests, and a
/// usable stage in its own right for locally linearized systems.
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use trajopt_core::actions::LqrAction;
/// use trajopt_core::ActionModel;
///
/// // 1-D point mass: x' = x + u, effort-only running cost
/// let model = LqrAction::new(
///     DMatrix::identity(1, 1),
///     DMatrix::identity(1, 1),
///     DMatrix::zeros(1, 1),
///     DMatrix::identity(1, 1),
/// );
/// assert_eq!(model.nu(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct LqrAction {
    state: VectorState,
    fx: DMatrix<f64>,
    fu: DMatrix<f64>,
    lxx: DMatrix<f64>,
    luu: DMatrix<f64>,
    lxu: DMatrix<f64>,
    lx0: DVector<f64>,
    lu0: DVector<f64>,
}

impl LqrAction {
    /// Build a model from its dynamics matrices and cost Hessians. The
    /// cross term and linear cost terms start at zero; see
    /// [`with_cross_term`](Self::with_cross_term) and
    /// [`with_linear_cost`](Self::with_linear_cost).
    ///
    /// `Fx` must be square (`nx × nx`) and every block consistent with it.
    #[must_use]
    pub fn new(fx: DMatrix<f64>, fu: DMatrix<f64>, lxx: DMatrix<f64>, luu: DMatrix<f64>) -> Self {
        let nx = fx.nrows();
        let nu = fu.ncols();
        debug_assert_eq!(fx.ncols(), nx);
        debug_assert_eq!(fu.nrows(), nx);
        debug_assert_eq!(lxx.shape(), (nx, nx));
        debug_assert_eq!(luu.shape(), (nu, nu));
        Self {
            state: VectorState::new(nx),
            lxu: DMatrix::zeros(nx, nu),
            lx0: DVector::zeros(nx),
            lu0: DVector::zeros(nu),
            fx,
            fu,
            lxx,
            luu,
        }
    }

    /// Set the cross cost term `Lxu`.
    #[must_use]
    pub fn with_cross_term(mut self, lxu: DMatrix<f64>) -> Self {
        debug_assert_eq!(lxu.shape(), (self.state.nx(), self.nu()));
        self.lxu = lxu;
        self
    }

    /// Set the linear cost terms `lx₀`, `lu₀`.
    ///
    /// A quadratic penalty `½·w·(x − x_ref)²` expands to `Lxx = w` and
    /// `lx₀ = −w·x_ref` (plus an irrelevant constant), so reference-tracking
    /// costs are expressed through this builder.
    #[must_use]
    pub fn with_linear_cost(mut self, lx0: DVector<f64>, lu0: DVector<f64>) -> Self {
        debug_assert_eq!(lx0.len(), self.state.nx());
        debug_assert_eq!(lu0.len(), self.nu());
        self.lx0 = lx0;
        self.lu0 = lu0;
        self
    }
}

impl ActionModel for LqrAction {
    fn state(&self) -> &dyn StateManifold {
        &self.state
    }

    fn nu(&self) -> usize {
        self.fu.ncols()
    }

    fn calc(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        data.xnext.copy_from(&(&self.fx * x));
        data.xnext.gemv(1.0, &self.fu, u, 1.0);
        data.cost = 0.5 * (x.dot(&(&self.lxx * x)) + u.dot(&(&self.luu * u)))
            + x.dot(&(&self.lxu * u))
            + self.lx0.dot(x)
            + self.lu0.dot(u);
        Ok(())
    }

    fn calc_diff(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        data.fx.copy_from(&self.fx);
        data.fu.copy_from(&self.fu);
        data.lx.copy_from(&self.lx0);
        data.lx.gemv(1.0, &self.lxx, x, 1.0);
        data.lx.gemv(1.0, &self.lxu, u, 1.0);
        data.lu.copy_from(&self.lu0);
        data.lu.gemv(1.0, &self.luu, u, 1.0);
        data.lu.gemv_tr(1.0, &self.lxu, x, 1.0);
        data.lxx.copy_from(&self.lxx);
        data.lxu.copy_from(&self.lxu);
        data.luu.copy_from(&self.luu);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn toy_model() -> LqrAction {
        let fx = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        let fu = DMatrix::from_row_slice(2, 1, &[0.005, 0.1]);
        let lxx = DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 1.0]);
        let luu = DMatrix::from_diagonal_element(1, 1, 0.5);
        LqrAction::new(fx, fu, lxx, luu)
            .with_cross_term(DMatrix::from_row_slice(2, 1, &[0.2, -0.1]))
            .with_linear_cost(
                DVector::from_vec(vec![0.3, -0.2]),
                DVector::from_vec(vec![0.1]),
            )
    }

    #[test]
    fn test_dynamics_are_linear() {
        let model = toy_model();
        let mut data = model.create_data();
        let x = DVector::from_vec(vec![1.0, -0.5]);
        let u = DVector::from_vec(vec![0.3]);
        model.calc(&mut data, &x, &u).unwrap();

        assert_relative_eq!(data.xnext[0], 1.0 - 0.05 + 0.005 * 0.3, epsilon = 1e-12);
        assert_relative_eq!(data.xnext[1], -0.5 + 0.1 * 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let model = toy_model();
        let mut data = model.create_data();
        let x = DVector::from_vec(vec![0.7, -0.3]);
        let u = DVector::from_vec(vec![0.4]);
        model.calc_diff(&mut data, &x, &u).unwrap();

        let h = 1e-7;
        let mut scratch = model.create_data();
        let cost_at = |scratch: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>| {
            model.calc(scratch, x, u).unwrap();
            scratch.cost
        };

        for i in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[i] += h;
            xm[i] -= h;
            let fd = (cost_at(&mut scratch, &xp, &u) - cost_at(&mut scratch, &xm, &u)) / (2.0 * h);
            assert_relative_eq!(data.lx[i], fd, epsilon = 1e-6);
        }

        let mut up = u.clone();
        let mut um = u.clone();
        up[0] += h;
        um[0] -= h;
        let fd = (cost_at(&mut scratch, &x, &up) - cost_at(&mut scratch, &x, &um)) / (2.0 * h);
        assert_relative_eq!(data.lu[0], fd, epsilon = 1e-6);
    }
}
