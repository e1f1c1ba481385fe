//! Contract tests: preconditions, error taxonomy, and the regularization
//! recovery path.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use nalgebra::{DMatrix, DVector};
use trajopt_core::actions::LqrAction;
use trajopt_core::{
    ActionData, ActionModel, BoxedActionModel, DdpSolver, Result, ShootingProblem, Solver,
    SolverError, StateManifold, Termination, VectorState,
};

/// Scalar stage whose control Hessian is indefinite: the quadratic model
/// alone cannot produce a descent direction, forcing the solver through its
/// regularization recovery path.
struct IndefiniteAction {
    state: VectorState,
    luu: f64,
}

impl IndefiniteAction {
    fn new(luu: f64) -> Self {
        Self {
            state: VectorState::new(1),
            luu,
        }
    }
}

impl ActionModel for IndefiniteAction {
    fn state(&self) -> &dyn StateManifold {
        &self.state
    }

    fn nu(&self) -> usize {
        1
    }

    fn calc(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        data.xnext[0] = x[0] + u[0];
        data.cost = 0.5 * (x[0] * x[0] + self.luu * u[0] * u[0]);
        Ok(())
    }

    fn calc_diff(&self, data: &mut ActionData, x: &DVector<f64>, u: &DVector<f64>) -> Result<()> {
        data.fx[(0, 0)] = 1.0;
        data.fu[(0, 0)] = 1.0;
        data.lx[0] = x[0];
        data.lu[0] = self.luu * u[0];
        data.lxx[(0, 0)] = 1.0;
        data.luu[(0, 0)] = self.luu;
        data.lxu[(0, 0)] = 0.0;
        Ok(())
    }
}

fn scalar_problem(luu: f64) -> ShootingProblem {
    let running = vec![Box::new(IndefiniteAction::new(luu)) as BoxedActionModel];
    let eye = DMatrix::identity(1, 1);
    let terminal = Box::new(LqrAction::new(
        eye.clone(),
        eye,
        DMatrix::identity(1, 1),
        DMatrix::zeros(1, 1),
    )) as BoxedActionModel;
    ShootingProblem::new(DVector::from_vec(vec![1.0]), running, terminal).unwrap()
}

#[test]
fn direction_requires_candidate() {
    let mut solver = DdpSolver::new(scalar_problem(1.0));
    let err = solver.compute_direction(true).unwrap_err();
    assert_eq!(err, SolverError::NoCandidate);
}

#[test]
fn step_requires_direction() {
    let mut solver = DdpSolver::new(scalar_problem(1.0));
    solver.set_candidate(None, None, false).unwrap();
    let err = solver.try_step(1.0).unwrap_err();
    assert_eq!(err, SolverError::DirectionStale);
}

#[test]
fn candidate_sizes_are_checked() {
    let mut solver = DdpSolver::new(scalar_problem(1.0));

    let err = solver
        .set_candidate(Some(vec![DVector::zeros(1); 5]), None, false)
        .unwrap_err();
    assert!(matches!(err, SolverError::SizeMismatch { what: "xs", .. }));

    let err = solver
        .set_candidate(None, Some(vec![DVector::zeros(3); 1]), false)
        .unwrap_err();
    assert!(matches!(
        err,
        SolverError::DimensionMismatch { what: "us element", .. }
    ));

    let err = solver
        .solve(None, Some(vec![DVector::zeros(1); 4]), 10, false, None)
        .unwrap_err();
    assert!(matches!(err, SolverError::SizeMismatch { what: "us", .. }));
}

#[test]
fn indefinite_hessian_fails_without_regularization() {
    // Quu = luu + Vxx' = -2 + 1 < 0 at the default (tiny) regularization
    let mut solver = DdpSolver::new(scalar_problem(-2.0));
    solver.set_candidate(None, None, false).unwrap();

    let err = solver.compute_direction(true).unwrap_err();
    assert_eq!(err, SolverError::NotPositiveDefinite { stage: 0 });
    assert!(err.is_recoverable());

    // Raising the control regularization repairs the factorization without
    // re-deriving the problem
    solver.set_ureg(10.0);
    solver.compute_direction(false).unwrap();
}

#[test]
fn solve_recovers_by_raising_regularization() {
    let mut solver = DdpSolver::new(scalar_problem(-2.0));
    let reg_before = solver.xreg();
    let _ = solver.solve(None, None, 3, false, None).unwrap();

    // The backward pass must have failed at least once, and every failure
    // raises the regularization monotonically from its initial value
    assert!(
        solver.xreg() > reg_before,
        "expected a regularization increase, got {} -> {}",
        reg_before,
        solver.xreg()
    );
    assert!(solver.ureg() > reg_before);
}

#[test]
fn hopeless_hessian_exhausts_regularization() {
    // No admissible regularization below reg_max can make Quu positive
    let mut solver = DdpSolver::new(scalar_problem(-1e12));
    let result = solver.solve(None, None, 10, false, None).unwrap();

    assert_eq!(result.termination, Termination::RegularizationExhausted);
    assert!(!result.converged());

    // The solver still holds a usable candidate (the warm start)
    assert_eq!(solver.xs().len(), 2);
    assert_eq!(solver.us().len(), 1);
    assert!(solver.xs().iter().all(|x| x[0].is_finite()));
}

#[test]
fn stopping_criteria_is_nonnegative_and_small_at_optimum() {
    let mut solver = DdpSolver::new(scalar_problem(1.0));
    let result = solver.solve(None, None, 20, false, None).unwrap();
    assert!(result.converged());
    assert!(result.stop >= 0.0);
    assert!(result.stop < solver.th_stop());
}

#[test]
fn threshold_accessors_roundtrip() {
    let mut solver = DdpSolver::new(scalar_problem(1.0));
    solver.set_th_stop(1e-4);
    solver.set_th_acceptstep(0.25);
    assert_eq!(solver.th_stop(), 1e-4);
    assert_eq!(solver.th_acceptstep(), 0.25);
}
