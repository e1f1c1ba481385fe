//! Regularized differential dynamic programming.
//!
//! [`DdpSolver`] implements the [`Solver`] contract with the classic
//! Riccati-style recursion:
//!
//! - **Backward pass** ([`compute_direction`](Solver::compute_direction)):
//!   sweep the horizon in reverse time, combining each stage's quadratic
//!   expansion with the value function of the next stage into the
//!   action-value blocks `Qxx, Qxu, Quu, Qx, Qu`, factorizing the
//!   regularized `Quu` to obtain feedback/feedforward gains, and propagating
//!   the value function one stage back.
//! - **Forward pass** ([`try_step`](Solver::try_step)): roll the candidate
//!   forward under the gain-corrected controls for a trial step length and
//!   measure the realized cost improvement.
//! - **Globalization** ([`solve`](Solver::solve)): a backtracking line
//!   search over step lengths paired with a trust-region-like
//!   regularization schedule — failed factorizations and failed line
//!   searches shrink the trust region (raise `xreg`/`ureg`), confident
//!   steps grow it back.
//!
//! Warm starts need not be dynamically consistent: for an infeasible
//! candidate the solver measures the per-stage defect ("gap") between the
//! guessed states and the rolled-out dynamics, folds the gaps into the
//! backward pass, and closes them progressively in the forward pass — a
//! full step closes every gap at once.
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use trajopt_core::actions::UnicycleAction;
//! use trajopt_core::{BoxedActionModel, DdpSolver, ShootingProblem, Solver};
//!
//! let horizon = 30;
//! let running: Vec<BoxedActionModel> = (0..horizon)
//!     .map(|_| Box::new(UnicycleAction::new()) as BoxedActionModel)
//!     .collect();
//! let terminal: BoxedActionModel = Box::new(UnicycleAction::new());
//! let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
//! let problem = ShootingProblem::new(x0, running, terminal).unwrap();
//!
//! let mut solver = DdpSolver::new(problem);
//! let result = solver.solve(None, None, 100, false, None).unwrap();
//! assert!(result.converged());
//! // The optimized trajectory drives the unicycle toward the origin
//! assert!(solver.xs().last().unwrap().norm() < 0.1);
//! ```

use nalgebra::{DMatrix, DVector, Vector2};
use tracing::{debug, info, warn};
use trajopt_types::{
    DdpConfig, IterationRecord, Result, SolveResult, SolverError, Termination,
};

use crate::problem::ShootingProblem;
use crate::solver::{IterationCallback, Solver};

/// Differential dynamic programming solver with Tikhonov-style
/// regularization of the value and control Hessians.
///
/// The solver owns its [`ShootingProblem`] and every buffer it needs across
/// iterations — candidate and trial trajectories, per-stage gains, value
/// function blocks, feasibility gaps — all allocated once at construction
/// and reused for the solver's lifetime.
///
/// Candidate and regularization persist across [`solve`](Solver::solve)
/// calls, so a subsequent solve warm-starts from the previous solution.
#[derive(Debug)]
pub struct DdpSolver {
    problem: ShootingProblem,
    config: DdpConfig,

    // Candidate trajectory
    xs: Vec<DVector<f64>>,
    us: Vec<DVector<f64>>,
    is_feasible: bool,
    was_feasible: bool,
    cost: f64,

    // Regularization (trust region)
    xreg: f64,
    ureg: f64,

    // Search direction: value function, gains, and residuals per stage
    vxx: Vec<DMatrix<f64>>,
    vx: Vec<DVector<f64>>,
    qu: Vec<DVector<f64>>,
    kgain: Vec<DMatrix<f64>>,
    kff: Vec<DVector<f64>>,
    gaps: Vec<DVector<f64>>,
    d1: f64,
    d2: f64,

    // Trial trajectory for the line search
    xs_try: Vec<DVector<f64>>,
    us_try: Vec<DVector<f64>>,
    cost_try: f64,

    // Scratch vectors for the forward pass
    dx_buf: DVector<f64>,
    gap_buf: DVector<f64>,

    candidate_set: bool,
    direction_valid: bool,
    callbacks: Vec<IterationCallback>,
}

impl DdpSolver {
    /// Create a solver for `problem` with the default configuration.
    #[must_use]
    pub fn new(problem: ShootingProblem) -> Self {
        Self::build(problem, DdpConfig::default())
    }

    /// Create a solver with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidConfig`] when the configuration is
    /// internally inconsistent.
    pub fn with_config(problem: ShootingProblem, config: DdpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(problem, config))
    }

    fn build(problem: ShootingProblem, config: DdpConfig) -> Self {
        let t_horizon = problem.horizon();
        let ndx = problem.state().ndx();
        let nus: Vec<usize> = problem.running_models().iter().map(|m| m.nu()).collect();
        let x0 = problem.initial_state().clone();

        let xreg = config.reg_init;
        Self {
            xs: vec![x0.clone(); t_horizon + 1],
            us: nus.iter().map(|&nu| DVector::zeros(nu)).collect(),
            is_feasible: false,
            was_feasible: false,
            cost: 0.0,
            xreg,
            ureg: xreg,
            vxx: vec![DMatrix::zeros(ndx, ndx); t_horizon + 1],
            vx: vec![DVector::zeros(ndx); t_horizon + 1],
            qu: nus.iter().map(|&nu| DVector::zeros(nu)).collect(),
            kgain: nus.iter().map(|&nu| DMatrix::zeros(nu, ndx)).collect(),
            kff: nus.iter().map(|&nu| DVector::zeros(nu)).collect(),
            gaps: vec![DVector::zeros(ndx); t_horizon + 1],
            d1: 0.0,
            d2: 0.0,
            xs_try: vec![x0; t_horizon + 1],
            us_try: nus.iter().map(|&nu| DVector::zeros(nu)).collect(),
            cost_try: 0.0,
            dx_buf: DVector::zeros(ndx),
            gap_buf: DVector::zeros(ndx),
            candidate_set: false,
            direction_valid: false,
            callbacks: Vec::new(),
            config,
            problem,
        }
    }

    /// The solver configuration.
    #[must_use]
    pub fn config(&self) -> &DdpConfig {
        &self.config
    }

    /// Per-stage feedback gains `K` of the last computed direction.
    #[must_use]
    pub fn feedback_gains(&self) -> &[DMatrix<f64>] {
        &self.kgain
    }

    /// Per-stage feedforward terms `k` of the last computed direction.
    #[must_use]
    pub fn feedforward_terms(&self) -> &[DVector<f64>] {
        &self.kff
    }

    /// Value function gradients `Vx` of the last computed direction — the
    /// dual (costate) trajectory, `T + 1` elements.
    #[must_use]
    pub fn value_gradients(&self) -> &[DVector<f64>] {
        &self.vx
    }

    /// Evaluate cost and derivatives at the current candidate and, for
    /// infeasible candidates, the per-stage dynamics gaps
    /// `gap[t+1] = diff(xs[t+1], f(xs[t], us[t]))` (with `gap[0]` measured
    /// against the problem's initial state).
    fn update_derivatives(&mut self) -> Result<()> {
        self.cost = self.problem.calc_diff(&self.xs, &self.us)?;
        if !self.is_feasible {
            let state = self.problem.state();
            state.diff(&self.xs[0], self.problem.initial_state(), &mut self.gaps[0])?;
            for t in 0..self.problem.horizon() {
                let xnext = &self.problem.running_datas()[t].xnext;
                state.diff(&self.xs[t + 1], xnext, &mut self.gaps[t + 1])?;
            }
        }
        Ok(())
    }

    /// Reverse-time Riccati sweep producing gains, value function, and
    /// expected-improvement coefficients.
    fn backward_pass(&mut self) -> Result<()> {
        let t_horizon = self.problem.horizon();
        let ndx = self.problem.state().ndx();

        // Terminal value function from the terminal cost expansion
        {
            let td = self.problem.terminal_data();
            self.vx[t_horizon].copy_from(&td.lx);
            self.vxx[t_horizon].copy_from(&td.lxx);
        }
        if self.xreg != 0.0 {
            for i in 0..ndx {
                self.vxx[t_horizon][(i, i)] += self.xreg;
            }
        }

        self.d1 = 0.0;
        self.d2 = 0.0;

        for t in (0..t_horizon).rev() {
            let data = &self.problem.running_datas()[t];
            let vx_next = &self.vx[t + 1];
            let vxx_next = &self.vxx[t + 1];

            // Action-value expansion: Bellman backup of the quadratic model
            let fx_t_vxx = data.fx.tr_mul(vxx_next);
            let qxx = &data.lxx + &fx_t_vxx * &data.fx;
            let qxu = &data.lxu + &fx_t_vxx * &data.fu;
            let mut quu = &data.luu + data.fu.tr_mul(vxx_next) * &data.fu;
            let mut qx = &data.lx + data.fx.tr_mul(vx_next);
            let mut qu = &data.lu + data.fu.tr_mul(vx_next);

            // Infeasible warm start: fold the deflection along the dynamics
            // gap into the gradients
            if !self.is_feasible {
                let deflect = vxx_next * &self.gaps[t + 1];
                qx += data.fx.tr_mul(&deflect);
                qu += data.fu.tr_mul(&deflect);
            }

            if self.ureg != 0.0 {
                for i in 0..quu.nrows() {
                    quu[(i, i)] += self.ureg;
                }
            }

            // Gains from the regularized normal equations
            let Some(chol) = quu.clone().cholesky() else {
                return Err(SolverError::NotPositiveDefinite { stage: t });
            };
            let kgain = chol.solve(&qxu.transpose());
            let kff = chol.solve(&qu);

            self.d1 += qu.dot(&kff);
            self.d2 -= kff.dot(&(&quu * &kff));

            // Value recursion, symmetrized against drift
            let vx_new = &qx - kgain.tr_mul(&qu);
            let mut vxx_new = &qxx - &qxu * &kgain;
            vxx_new = 0.5 * (&vxx_new + vxx_new.transpose());
            if self.xreg != 0.0 {
                for i in 0..ndx {
                    vxx_new[(i, i)] += self.xreg;
                }
            }

            if !(vx_new.iter().all(|v| v.is_finite())
                && vxx_new.iter().all(|v| v.is_finite()))
            {
                return Err(SolverError::diverged("backward pass"));
            }

            self.qu[t].copy_from(&qu);
            self.kgain[t].copy_from(&kgain);
            self.kff[t].copy_from(&kff);
            self.vx[t].copy_from(&vx_new);
            self.vxx[t].copy_from(&vxx_new);
        }
        Ok(())
    }

    /// Roll a trial trajectory at step length `alpha`, accumulating its
    /// cost into `cost_try`. The candidate is left untouched.
    fn forward_pass(&mut self, alpha: f64) -> Result<()> {
        let t_horizon = self.problem.horizon();
        self.cost_try = 0.0;

        if self.is_feasible || alpha == 1.0 {
            self.xs_try[0].copy_from(self.problem.initial_state());
        } else {
            // Partially close the initial gap, consistent with the stages
            self.gap_buf.copy_from(&self.gaps[0]);
            self.gap_buf *= alpha - 1.0;
            let state = self.problem.state();
            state.integrate(
                self.problem.initial_state(),
                &self.gap_buf,
                &mut self.xs_try[0],
            )?;
        }

        for t in 0..t_horizon {
            let (model, data) = self.problem.stage_mut(t);

            // u' = u − α·k − K·diff(x, x')
            model
                .state()
                .diff(&self.xs[t], &self.xs_try[t], &mut self.dx_buf)?;
            self.us_try[t].copy_from(&self.us[t]);
            self.us_try[t].axpy(-alpha, &self.kff[t], 1.0);
            self.us_try[t].gemv(-1.0, &self.kgain[t], &self.dx_buf, 1.0);

            model.calc(data, &self.xs_try[t], &self.us_try[t])?;
            self.cost_try += data.cost;

            if self.is_feasible || alpha == 1.0 {
                self.xs_try[t + 1].copy_from(&data.xnext);
            } else {
                // Carry the remaining fraction of the dynamics gap forward
                self.gap_buf.copy_from(&self.gaps[t + 1]);
                self.gap_buf *= alpha - 1.0;
                model
                    .state()
                    .integrate(&data.xnext, &self.gap_buf, &mut self.xs_try[t + 1])?;
            }

            if !self.cost_try.is_finite()
                || !self.xs_try[t + 1].iter().all(|v| v.is_finite())
            {
                return Err(SolverError::diverged("forward pass"));
            }
        }

        let t_final = t_horizon;
        let (terminal, tdata) = self.problem.terminal_mut();
        terminal.calc_terminal(tdata, &self.xs_try[t_final])?;
        self.cost_try += tdata.cost;
        if !self.cost_try.is_finite() {
            return Err(SolverError::diverged("forward pass"));
        }
        Ok(())
    }

    fn increase_regularization(&mut self) {
        self.xreg = (self.xreg * self.config.reg_factor).min(self.config.reg_max);
        self.ureg = (self.ureg * self.config.reg_factor).min(self.config.reg_max);
    }

    fn decrease_regularization(&mut self) {
        self.xreg = (self.xreg / self.config.reg_factor).max(self.config.reg_min);
        self.ureg = (self.ureg / self.config.reg_factor).max(self.config.reg_min);
    }

    fn summary(&self, termination: Termination, iterations: usize, stop: f64) -> SolveResult {
        SolveResult {
            termination,
            iterations,
            cost: self.cost,
            stop,
        }
    }
}

impl Solver for DdpSolver {
    fn problem(&self) -> &ShootingProblem {
        &self.problem
    }

    fn problem_mut(&mut self) -> &mut ShootingProblem {
        &mut self.problem
    }

    fn set_candidate(
        &mut self,
        xs: Option<Vec<DVector<f64>>>,
        us: Option<Vec<DVector<f64>>>,
        is_feasible: bool,
    ) -> Result<()> {
        let t_horizon = self.problem.horizon();
        let nx = self.problem.state().nx();

        match us {
            Some(us) => {
                if us.len() != t_horizon {
                    return Err(SolverError::SizeMismatch {
                        what: "us",
                        expected: t_horizon,
                        actual: us.len(),
                    });
                }
                for (t, u) in us.iter().enumerate() {
                    let nu = self.problem.running_models()[t].nu();
                    if u.len() != nu {
                        return Err(SolverError::DimensionMismatch {
                            what: "us element",
                            expected: nu,
                            actual: u.len(),
                        });
                    }
                }
                self.us = us;
            }
            None => {
                for u in &mut self.us {
                    u.fill(0.0);
                }
            }
        }

        match xs {
            Some(xs) => {
                if xs.len() != t_horizon + 1 {
                    return Err(SolverError::SizeMismatch {
                        what: "xs",
                        expected: t_horizon + 1,
                        actual: xs.len(),
                    });
                }
                for x in &xs {
                    if x.len() != nx {
                        return Err(SolverError::DimensionMismatch {
                            what: "xs element",
                            expected: nx,
                            actual: x.len(),
                        });
                    }
                }
                self.xs = xs;
            }
            None => {
                for x in &mut self.xs {
                    x.copy_from(self.problem.initial_state());
                }
            }
        }

        self.is_feasible = is_feasible;
        self.candidate_set = true;
        self.direction_valid = false;
        Ok(())
    }

    fn compute_direction(&mut self, recalc: bool) -> Result<()> {
        if !self.candidate_set {
            return Err(SolverError::NoCandidate);
        }
        self.direction_valid = false;
        if recalc {
            self.update_derivatives()?;
        }
        self.backward_pass()?;
        self.direction_valid = true;
        Ok(())
    }

    fn try_step(&mut self, step_length: f64) -> Result<f64> {
        if !self.direction_valid {
            return Err(SolverError::DirectionStale);
        }
        debug_assert!(
            step_length > 0.0 && step_length <= 1.0,
            "step length must lie in (0, 1]"
        );
        self.forward_pass(step_length)?;
        Ok(self.cost - self.cost_try)
    }

    fn stopping_criteria(&self) -> f64 {
        self.qu.iter().map(|qu| qu.norm_squared()).sum()
    }

    fn expected_improvement(&self) -> Vector2<f64> {
        Vector2::new(self.d1, self.d2)
    }

    fn solve(
        &mut self,
        init_xs: Option<Vec<DVector<f64>>>,
        init_us: Option<Vec<DVector<f64>>>,
        maxiter: usize,
        is_feasible: bool,
        reg_init: Option<f64>,
    ) -> Result<SolveResult> {
        self.set_candidate(init_xs, init_us, is_feasible)?;
        let reg = reg_init.unwrap_or(self.config.reg_init);
        self.set_xreg(reg);
        self.set_ureg(reg);
        self.was_feasible = false;
        let mut stop = f64::INFINITY;

        for iter in 0..maxiter {
            // Direction computation, raising regularization until the
            // factorization goes through
            let mut recalc = true;
            loop {
                match self.compute_direction(recalc) {
                    Ok(()) => break,
                    Err(e) if e.is_recoverable() => {
                        debug!(iter, xreg = self.xreg, error = %e, "raising regularization");
                        recalc = false;
                        self.increase_regularization();
                        if self.xreg >= self.config.reg_max {
                            warn!(iter, "regularization exhausted during backward pass");
                            return Ok(self.summary(
                                Termination::RegularizationExhausted,
                                iter,
                                self.stopping_criteria(),
                            ));
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            let d = self.expected_improvement();
            let (d1, d2) = (d[0], d[1]);

            // Backtracking line search over geometric step lengths
            let mut accepted_step = None;
            let mut alpha = 1.0;
            for _ in 0..self.config.ls_max_trials {
                let dv = match self.try_step(alpha) {
                    Ok(dv) => dv,
                    Err(e) if e.is_recoverable() => {
                        alpha *= self.config.ls_decay;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let dv_expected = alpha * (d1 + 0.5 * d2 * alpha);

                // Accept when the quadratic model predicts no progress, when
                // the step closes gaps of an infeasible candidate, or when
                // the realized/expected ratio clears the threshold
                if d1 < self.config.th_grad
                    || !self.is_feasible
                    || dv > self.config.th_acceptstep * dv_expected
                {
                    self.was_feasible = self.is_feasible;
                    std::mem::swap(&mut self.xs, &mut self.xs_try);
                    std::mem::swap(&mut self.us, &mut self.us_try);
                    self.cost = self.cost_try;
                    self.is_feasible = self.was_feasible || alpha == 1.0;
                    self.direction_valid = false;
                    accepted_step = Some(alpha);
                    break;
                }
                alpha *= self.config.ls_decay;
            }

            match accepted_step {
                Some(step) => {
                    if step > self.config.th_stepdec {
                        self.decrease_regularization();
                    }
                    stop = self.stopping_criteria();

                    let record = IterationRecord {
                        iter,
                        cost: self.cost,
                        stop,
                        d1,
                        d2,
                        step_length: step,
                        xreg: self.xreg,
                        ureg: self.ureg,
                        is_feasible: self.is_feasible,
                    };
                    for callback in &self.callbacks {
                        (callback.0)(&record);
                    }
                    debug!(
                        iter,
                        cost = self.cost,
                        stop,
                        step,
                        xreg = self.xreg,
                        "iteration accepted"
                    );

                    if self.was_feasible && stop < self.config.th_stop {
                        info!(iter, cost = self.cost, stop, "converged");
                        return Ok(self.summary(Termination::Converged, iter + 1, stop));
                    }
                }
                None => {
                    debug!(iter, xreg = self.xreg, "line search failed, shrinking trust region");
                    self.increase_regularization();
                    if self.xreg >= self.config.reg_max {
                        warn!(iter, "regularization exhausted during line search");
                        return Ok(self.summary(
                            Termination::RegularizationExhausted,
                            iter + 1,
                            stop,
                        ));
                    }
                }
            }
        }

        debug!(maxiter, cost = self.cost, "iteration budget exhausted");
        Ok(self.summary(Termination::MaxIterations, maxiter, stop))
    }

    fn xs(&self) -> &[DVector<f64>] {
        &self.xs
    }

    fn us(&self) -> &[DVector<f64>] {
        &self.us
    }

    fn is_feasible(&self) -> bool {
        self.is_feasible
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn xreg(&self) -> f64 {
        self.xreg
    }

    fn ureg(&self) -> f64 {
        self.ureg
    }

    fn set_xreg(&mut self, xreg: f64) {
        self.xreg = xreg.clamp(self.config.reg_min, self.config.reg_max);
    }

    fn set_ureg(&mut self, ureg: f64) {
        self.ureg = ureg.clamp(self.config.reg_min, self.config.reg_max);
    }

    fn th_acceptstep(&self) -> f64 {
        self.config.th_acceptstep
    }

    fn set_th_acceptstep(&mut self, th: f64) {
        self.config.th_acceptstep = th;
    }

    fn th_stop(&self) -> f64 {
        self.config.th_stop
    }

    fn set_th_stop(&mut self, th: f64) {
        self.config.th_stop = th;
    }

    fn set_callbacks(&mut self, callbacks: Vec<IterationCallback>) {
        self.callbacks = callbacks;
    }
}
