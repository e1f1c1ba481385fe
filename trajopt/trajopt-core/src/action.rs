//! Stage models: per-time-step dynamics and cost.
//!
//! An [`ActionModel`] bundles everything one step of a shooting problem
//! needs: the discrete dynamics `x_{t+1} = f(x_t, u_t)`, the running cost
//! `l(x_t, u_t)`, and their first/second derivatives. Evaluation writes into
//! an [`ActionData`] scratch instance created once by [`ActionModel::create_data`]
//! and reused for the lifetime of the problem.
//!
//! Models are consumed through `dyn ActionModel`, so a shooting problem can
//! mix stages of arbitrary concrete type (and arbitrary control dimension)
//! as long as they share a state manifold.

use nalgebra::DVector;
use trajopt_types::{ActionData, Result};

use crate::state::StateManifold;

/// A boxed stage model, the form stored by a shooting problem.
///
/// The `Send + Sync` bounds let per-stage derivative evaluation fan out
/// across threads; models are read-only during evaluation (all mutation goes
/// into the per-stage [`ActionData`]).
pub type BoxedActionModel = Box<dyn ActionModel + Send + Sync>;

/// Dynamics and cost for a single stage of a shooting problem.
///
/// The solver calls [`calc`](Self::calc) wherever it only needs next states
/// and costs (rollouts, line search trials) and
/// [`calc_diff`](Self::calc_diff) before each backward pass. Implementations
/// fill the corresponding fields of the provided [`ActionData`] and must not
/// allocate: the data instance already has every block at the right shape.
///
/// Terminal stages are ordinary models with `nu() == 0`; the
/// [`calc_terminal`](Self::calc_terminal) convenience forms evaluate a model
/// at a state alone.
pub trait ActionModel {
    /// The state manifold this model's states live on.
    fn state(&self) -> &dyn StateManifold;

    /// Control dimension of this stage.
    fn nu(&self) -> usize;

    /// Allocate scratch data shaped for this model.
    fn create_data(&self) -> ActionData {
        ActionData::new(self.state().nx(), self.state().ndx(), self.nu())
    }

    /// Evaluate the next state and running cost at `(x, u)`, writing
    /// `data.xnext` and `data.cost`.
    ///
    /// # Errors
    ///
    /// Returns a dimension error when `x` or `u` does not match the model.
    fn calc(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()>;

    /// Evaluate the quadratic expansion of dynamics and cost at `(x, u)`,
    /// writing every derivative block of `data`. Implementations may assume
    /// [`calc`](Self::calc) has been or will be called at the same point
    /// whenever they share work; the solver always pairs the two through
    /// `calc_diff` with recomputation.
    ///
    /// # Errors
    ///
    /// Returns a dimension error when `x` or `u` does not match the model.
    fn calc_diff(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()>;

    /// Evaluate cost (and trivial dynamics) at a state alone, for terminal
    /// stages.
    ///
    /// # Errors
    ///
    /// Returns a dimension error when `x` does not match the model.
    fn calc_terminal(&self, data: &mut ActionData, x: &DVector<f64>) -> Result<()> {
        let u = DVector::zeros(self.nu());
        self.calc(data, x, &u)
    }

    /// Evaluate the quadratic cost expansion at a state alone, for terminal
    /// stages.
    ///
    /// # Errors
    ///
    /// Returns a dimension error when `x` does not match the model.
    fn calc_diff_terminal(&self, data: &mut ActionData, x: &DVector<f64>) -> Result<()> {
        let u = DVector::zeros(self.nu());
        self.calc_diff(data, x, &u)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::state::VectorState;

    /// Minimal model: x' = x + u, cost ½‖u‖².
    struct Shift {
        state: VectorState,
    }

    impl ActionModel for Shift {
        fn state(&self) -> &dyn StateManifold {
            &self.state
        }

        fn nu(&self) -> usize {
            2
        }

        fn calc(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
            data.xnext.copy_from(x);
            data.xnext += u;
            data.cost = 0.5 * u.norm_squared();
            Ok(())
        }

        fn calc_diff(
            &self,
            data: &mut ActionData,
            _x: &DVector<f64>,
            u: &DVector<f64>,
        ) -> Result<()> {
            data.fx.fill_diagonal(1.0);
            data.fu.fill_diagonal(1.0);
            data.lu.copy_from(u);
            data.luu.fill_diagonal(1.0);
            Ok(())
        }
    }

    #[test]
    fn test_create_data_shapes() {
        let model = Shift {
            state: VectorState::new(2),
        };
        let data = model.create_data();
        assert_eq!(data.nx(), 2);
        assert_eq!(data.ndx(), 2);
        assert_eq!(data.nu(), 2);
    }

    #[test]
    fn test_terminal_uses_zero_control() {
        let model = Shift {
            state: VectorState::new(2),
        };
        let mut data = model.create_data();
        let x = DVector::from_vec(vec![1.0, -1.0]);
        model.calc_terminal(&mut data, &x).unwrap();
        assert_eq!(data.cost, 0.0);
        assert_eq!(data.xnext, x);
    }
}
