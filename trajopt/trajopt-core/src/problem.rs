//! Shooting problem: a full-horizon composition of stage models.
//!
//! A [`ShootingProblem`] owns an initial state, `T` running stage models,
//! one terminal model, and the per-stage scratch data they evaluate into.
//! It exposes the three aggregate operations a solver needs:
//!
//! - [`rollout`](ShootingProblem::rollout): integrate controls into a
//!   feasible state trajectory
//! - [`calc`](ShootingProblem::calc): total cost of a candidate trajectory
//! - [`calc_diff`](ShootingProblem::calc_diff): total cost plus every
//!   stage's quadratic expansion, the input of a backward pass
//!
//! Evaluation mutates the per-stage scratch data in place; a problem
//! instance must not be shared between concurrently running solvers. With
//! the `parallel` feature, `calc_diff` fans the independent per-stage
//! derivative evaluations out across threads (stages only couple through
//! the value recursion, not through their derivatives).

use nalgebra::DVector;
use trajopt_types::{ActionData, Result, SolverError};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::action::{ActionModel, BoxedActionModel};
use crate::state::StateManifold;

/// A discrete-time optimal control problem over a fixed horizon.
///
/// # Example
///
/// ```
/// use nalgebra::DVector;
/// use trajopt_core::actions::UnicycleAction;
/// use trajopt_core::{BoxedActionModel, ShootingProblem};
///
/// let horizon = 20;
/// let running: Vec<BoxedActionModel> = (0..horizon)
///     .map(|_| Box::new(UnicycleAction::new()) as BoxedActionModel)
///     .collect();
/// let terminal: BoxedActionModel = Box::new(UnicycleAction::new());
/// let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
/// let mut problem = ShootingProblem::new(x0, running, terminal).unwrap();
///
/// // A zero-control rollout stays put (and is feasible by construction)
/// let us = vec![DVector::zeros(2); horizon];
/// let xs = problem.rollout(&us).unwrap();
/// assert_eq!(xs.len(), horizon + 1);
/// ```
pub struct ShootingProblem {
    x0: DVector<f64>,
    running_models: Vec<BoxedActionModel>,
    terminal_model: BoxedActionModel,
    running_datas: Vec<ActionData>,
    terminal_data: ActionData,
}

impl std::fmt::Debug for ShootingProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShootingProblem")
            .field("horizon", &self.running_models.len())
            .field("nx", &self.x0.len())
            .finish_non_exhaustive()
    }
}

impl ShootingProblem {
    /// Build a problem from an initial state, running models, and a
    /// terminal model. Allocates one scratch data instance per stage.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] when `running` is empty and
    /// [`SolverError::DimensionMismatch`] when `x0` or any model disagrees
    /// with the terminal model's state manifold dimensions.
    pub fn new(
        x0: DVector<f64>,
        running: Vec<BoxedActionModel>,
        terminal: BoxedActionModel,
    ) -> Result<Self> {
        if running.is_empty() {
            return Err(SolverError::SizeMismatch {
                what: "running models",
                expected: 1,
                actual: 0,
            });
        }
        let nx = terminal.state().nx();
        let ndx = terminal.state().ndx();
        if x0.len() != nx {
            return Err(SolverError::DimensionMismatch {
                what: "x0",
                expected: nx,
                actual: x0.len(),
            });
        }
        for model in &running {
            if model.state().nx() != nx {
                return Err(SolverError::DimensionMismatch {
                    what: "running model nx",
                    expected: nx,
                    actual: model.state().nx(),
                });
            }
            if model.state().ndx() != ndx {
                return Err(SolverError::DimensionMismatch {
                    what: "running model ndx",
                    expected: ndx,
                    actual: model.state().ndx(),
                });
            }
        }

        let running_datas = running.iter().map(|m| m.create_data()).collect();
        let terminal_data = terminal.create_data();
        Ok(Self {
            x0,
            running_models: running,
            terminal_model: terminal,
            running_datas,
            terminal_data,
        })
    }

    /// Horizon length `T` (number of running stages).
    #[must_use]
    pub fn horizon(&self) -> usize {
        self.running_models.len()
    }

    /// The initial state.
    #[must_use]
    pub fn initial_state(&self) -> &DVector<f64> {
        &self.x0
    }

    /// Replace the initial state, e.g. when re-solving from a new
    /// measurement in a receding-horizon loop.
    ///
    /// Changing `x0` generally invalidates the feasibility of a previously
    /// computed trajectory; re-set the solver candidate accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::DimensionMismatch`] when the dimension of
    /// `x0` changes.
    pub fn set_initial_state(&mut self, x0: DVector<f64>) -> Result<()> {
        if x0.len() != self.x0.len() {
            return Err(SolverError::DimensionMismatch {
                what: "x0",
                expected: self.x0.len(),
                actual: x0.len(),
            });
        }
        self.x0 = x0;
        Ok(())
    }

    /// The state manifold shared by all stages.
    #[must_use]
    pub fn state(&self) -> &dyn StateManifold {
        self.terminal_model.state()
    }

    /// The running stage models, in time order.
    #[must_use]
    pub fn running_models(&self) -> &[BoxedActionModel] {
        &self.running_models
    }

    /// The terminal model.
    #[must_use]
    pub fn terminal_model(&self) -> &dyn ActionModel {
        &*self.terminal_model
    }

    /// Scratch data of the running stages, in time order.
    #[must_use]
    pub fn running_datas(&self) -> &[ActionData] {
        &self.running_datas
    }

    /// Scratch data of the terminal stage.
    #[must_use]
    pub fn terminal_data(&self) -> &ActionData {
        &self.terminal_data
    }

    /// Borrow stage `t`'s model together with its mutable scratch data.
    ///
    /// # Panics
    ///
    /// Panics when `t` is out of range; stage indices come from the problem
    /// horizon.
    #[must_use]
    pub fn stage_mut(&mut self, t: usize) -> (&dyn ActionModel, &mut ActionData) {
        (&*self.running_models[t], &mut self.running_datas[t])
    }

    /// Borrow the terminal model together with its mutable scratch data.
    #[must_use]
    pub fn terminal_mut(&mut self) -> (&dyn ActionModel, &mut ActionData) {
        (&*self.terminal_model, &mut self.terminal_data)
    }

    fn check_lengths(&self, xs: &[DVector<f64>], us: &[DVector<f64>]) -> Result<()> {
        let t = self.horizon();
        if xs.len() != t + 1 {
            return Err(SolverError::SizeMismatch {
                what: "xs",
                expected: t + 1,
                actual: xs.len(),
            });
        }
        if us.len() != t {
            return Err(SolverError::SizeMismatch {
                what: "us",
                expected: t,
                actual: us.len(),
            });
        }
        Ok(())
    }

    /// Integrate the dynamics forward from the initial state under the
    /// controls `us`, producing a feasible state trajectory of `T + 1`
    /// elements.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] when `us` does not have `T`
    /// elements, or any stage evaluation error.
    pub fn rollout(&mut self, us: &[DVector<f64>]) -> Result<Vec<DVector<f64>>> {
        let t_horizon = self.horizon();
        if us.len() != t_horizon {
            return Err(SolverError::SizeMismatch {
                what: "us",
                expected: t_horizon,
                actual: us.len(),
            });
        }
        let mut xs = Vec::with_capacity(t_horizon + 1);
        xs.push(self.x0.clone());
        for t in 0..t_horizon {
            let (model, data) = (&*self.running_models[t], &mut self.running_datas[t]);
            model.calc(data, &xs[t], &us[t])?;
            xs.push(data.xnext.clone());
        }
        Ok(xs)
    }

    /// Total cost of the trajectory `(xs, us)`: the sum of every running
    /// cost plus the terminal cost. Fills each stage's `xnext`/`cost`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] on wrong trajectory lengths,
    /// or any stage evaluation error.
    pub fn calc(&mut self, xs: &[DVector<f64>], us: &[DVector<f64>]) -> Result<f64> {
        self.check_lengths(xs, us)?;
        let mut cost = 0.0;
        for t in 0..self.horizon() {
            let (model, data) = (&*self.running_models[t], &mut self.running_datas[t]);
            model.calc(data, &xs[t], &us[t])?;
            cost += data.cost;
        }
        self.terminal_model
            .calc_terminal(&mut self.terminal_data, &xs[self.running_models.len()])?;
        cost += self.terminal_data.cost;
        Ok(cost)
    }

    /// Total cost of the trajectory `(xs, us)` plus the quadratic expansion
    /// of every stage, filling all derivative blocks of the per-stage data.
    /// Must be called before a backward pass.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] on wrong trajectory lengths,
    /// or any stage evaluation error.
    pub fn calc_diff(&mut self, xs: &[DVector<f64>], us: &[DVector<f64>]) -> Result<f64> {
        self.check_lengths(xs, us)?;
        let cost = self.calc_diff_running(xs, us)?;

        let t_horizon = self.running_models.len();
        self.terminal_model
            .calc_terminal(&mut self.terminal_data, &xs[t_horizon])?;
        self.terminal_model
            .calc_diff_terminal(&mut self.terminal_data, &xs[t_horizon])?;
        Ok(cost + self.terminal_data.cost)
    }

    #[cfg(not(feature = "parallel"))]
    fn calc_diff_running(&mut self, xs: &[DVector<f64>], us: &[DVector<f64>]) -> Result<f64> {
        let mut cost = 0.0;
        for t in 0..self.horizon() {
            let (model, data) = (&*self.running_models[t], &mut self.running_datas[t]);
            model.calc(data, &xs[t], &us[t])?;
            model.calc_diff(data, &xs[t], &us[t])?;
            cost += data.cost;
        }
        Ok(cost)
    }

    /// Per-stage derivative evaluation is independent across stages, so it
    /// fans out across threads; each stage's scratch data has exactly one
    /// owner for the duration of the call.
    #[cfg(feature = "parallel")]
    fn calc_diff_running(&mut self, xs: &[DVector<f64>], us: &[DVector<f64>]) -> Result<f64> {
        let t_horizon = self.running_models.len();
        let costs: Result<Vec<f64>> = self
            .running_models
            .par_iter()
            .zip(self.running_datas.par_iter_mut())
            .zip(xs[..t_horizon].par_iter().zip(us.par_iter()))
            .map(|((model, data), (x, u))| {
                model.calc(data, x, u)?;
                model.calc_diff(data, x, u)?;
                Ok(data.cost)
            })
            .collect();
        Ok(costs?.iter().sum())
    }
}
