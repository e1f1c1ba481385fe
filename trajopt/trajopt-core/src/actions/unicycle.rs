//! Planar unicycle stage model.

use nalgebra::DVector;
use trajopt_types::{ActionData, Result};

use crate::action::ActionModel;
use crate::state::{StateManifold, VectorState};

/// Kinematic unicycle on the plane with a quadratic regulation cost.
///
/// State `(p_x, p_y, θ)`, control `(v, ω)` (forward and turning rate),
/// integrated with explicit Euler over a fixed timestep:
///
/// ```text
/// p_x' = p_x + cos(θ)·v·dt
/// p_y' = p_y + sin(θ)·v·dt
/// θ'   = θ + ω·dt
/// l(x, u) = ½·(w_state²·‖x‖² + w_control²·‖u‖²)
/// ```
///
/// The dynamics are nonlinear in `θ`, so problems built from this model
/// exercise the solver's line search and regularization paths while staying
/// small enough to reason about: the optimum parks the unicycle at the
/// origin facing forward.
#[derive(Debug, Clone)]
pub struct UnicycleAction {
    state: VectorState,
    dt: f64,
    w_state: f64,
    w_control: f64,
}

impl Default for UnicycleAction {
    fn default() -> Self {
        Self::new()
    }
}

impl UnicycleAction {
    /// Create a unicycle model with a 0.1 s timestep and weights
    /// `(w_state, w_control) = (10, 1)`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: VectorState::new(3),
            dt: 0.1,
            w_state: 10.0,
            w_control: 1.0,
        }
    }

    /// Set the cost weights.
    #[must_use]
    pub fn with_weights(mut self, w_state: f64, w_control: f64) -> Self {
        self.w_state = w_state;
        self.w_control = w_control;
        self
    }

    /// Set the integration timestep.
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }
}

impl ActionModel for UnicycleAction {
    fn state(&self) -> &dyn StateManifold {
        &self.state
    }

    fn nu(&self) -> usize {
        2
    }

    fn calc(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        let (v, w) = (u[0], u[1]);
        let (sin_th, cos_th) = x[2].sin_cos();
        data.xnext[0] = x[0] + cos_th * v * self.dt;
        data.xnext[1] = x[1] + sin_th * v * self.dt;
        data.xnext[2] = x[2] + w * self.dt;
        data.cost = 0.5
            * (self.w_state * self.w_state * x.norm_squared()
                + self.w_control * self.w_control * u.norm_squared());
        Ok(())
    }

    fn calc_diff(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        let v = u[0];
        let (sin_th, cos_th) = x[2].sin_cos();
        let ws2 = self.w_state * self.w_state;
        let wc2 = self.w_control * self.w_control;

        data.lx.copy_from(x);
        data.lx *= ws2;
        data.lu.copy_from(u);
        data.lu *= wc2;
        data.lxx.fill(0.0);
        data.lxx.fill_diagonal(ws2);
        data.luu.fill(0.0);
        data.luu.fill_diagonal(wc2);
        data.lxu.fill(0.0);

        data.fx.fill(0.0);
        data.fx.fill_diagonal(1.0);
        data.fx[(0, 2)] = -sin_th * v * self.dt;
        data.fx[(1, 2)] = cos_th * v * self.dt;

        data.fu.fill(0.0);
        data.fu[(0, 0)] = cos_th * self.dt;
        data.fu[(1, 0)] = sin_th * self.dt;
        data.fu[(2, 1)] = self.dt;
        Ok(())
    }
}
