//! End-to-end solver scenarios with known outcomes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use trajopt_core::actions::{LqrAction, UnicycleAction};
use trajopt_core::{
    BoxedActionModel, DdpSolver, IterationCallback, IterationRecord, ShootingProblem, Solver,
};

fn unicycle_problem(horizon: usize, x0: Vec<f64>) -> ShootingProblem {
    let running: Vec<BoxedActionModel> = (0..horizon)
        .map(|_| Box::new(UnicycleAction::new()) as BoxedActionModel)
        .collect();
    let terminal: BoxedActionModel = Box::new(UnicycleAction::new());
    ShootingProblem::new(DVector::from_vec(x0), running, terminal).unwrap()
}

/// 1-D point mass `x' = x + u` over a single step, starting at the origin,
/// with running cost `½·u²` and terminal cost `½·w·(x − 1)²`.
///
/// The total cost as a function of the only control is
/// `J(u) = ½·u² + ½·w·(u − 1)²`, minimized at `u* = w / (1 + w)`.
fn point_mass_problem(w: f64) -> ShootingProblem {
    let eye = DMatrix::identity(1, 1);
    let running = vec![Box::new(LqrAction::new(
        eye.clone(),
        eye.clone(),
        DMatrix::zeros(1, 1),
        eye.clone(),
    )) as BoxedActionModel];
    let terminal = Box::new(
        LqrAction::new(
            eye.clone(),
            eye,
            DMatrix::from_diagonal_element(1, 1, w),
            DMatrix::zeros(1, 1),
        )
        .with_linear_cost(DVector::from_vec(vec![-w]), DVector::zeros(1)),
    ) as BoxedActionModel;
    ShootingProblem::new(DVector::zeros(1), running, terminal).unwrap()
}

fn recording_callback() -> (IterationCallback, Arc<Mutex<Vec<IterationRecord>>>) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let callback = IterationCallback::from_fn(move |record: &IterationRecord| {
        sink.lock().unwrap().push(*record);
    });
    (callback, records)
}

#[test]
fn point_mass_reaches_closed_form_optimum() {
    let w = 10.0;
    let mut solver = DdpSolver::new(point_mass_problem(w));
    let result = solver.solve(None, None, 5, false, None).unwrap();

    assert!(result.converged(), "termination: {:?}", result.termination);
    assert!(result.iterations <= 5);
    assert_relative_eq!(solver.us()[0][0], w / (1.0 + w), epsilon = 1e-6);
    assert_relative_eq!(solver.xs()[1][0], w / (1.0 + w), epsilon = 1e-6);
}

#[test]
fn unicycle_parks_at_origin() {
    let mut solver = DdpSolver::new(unicycle_problem(30, vec![1.0, -0.5, 0.4]));
    let result = solver.solve(None, None, 100, false, None).unwrap();

    assert!(result.converged(), "termination: {:?}", result.termination);
    let final_state = solver.xs().last().unwrap();
    assert!(
        final_state.norm() < 0.1,
        "unicycle ended at {final_state:?}"
    );
}

#[test]
fn accepted_trajectories_are_exact_rollouts() {
    let mut solver = DdpSolver::new(unicycle_problem(12, vec![0.8, 0.2, 0.0]));
    let result = solver.solve(None, None, 100, false, None).unwrap();
    assert!(result.converged());
    assert!(solver.is_feasible());

    // The states must be bit-exact stage evaluations of the controls
    let xs = solver.xs().to_vec();
    let us = solver.us().to_vec();
    let problem = solver.problem_mut();
    for t in 0..problem.horizon() {
        let (model, data) = problem.stage_mut(t);
        model.calc(data, &xs[t], &us[t]).unwrap();
        assert_eq!(data.xnext, xs[t + 1], "rollout mismatch at stage {t}");
    }
}

#[test]
fn cost_decreases_monotonically_from_feasible_start() {
    let mut solver = DdpSolver::new(unicycle_problem(20, vec![1.0, 1.0, 0.0]));

    // Build a genuinely feasible warm start by rolling out zero controls
    let us = vec![DVector::zeros(2); 20];
    let xs = solver.problem_mut().rollout(&us).unwrap();

    let (callback, records) = recording_callback();
    solver.set_callbacks(vec![callback]);
    let result = solver
        .solve(Some(xs), Some(us), 100, true, None)
        .unwrap();
    assert!(result.converged());

    let records = records.lock().unwrap();
    assert!(!records.is_empty());
    for pair in records.windows(2) {
        assert!(
            pair[1].cost <= pair[0].cost + 1e-12,
            "cost increased: {} -> {}",
            pair[0].cost,
            pair[1].cost
        );
    }
}

#[test]
fn infeasible_warm_start_closes_gaps() {
    // Reference: cold start
    let mut reference = DdpSolver::new(unicycle_problem(15, vec![1.0, 0.0, 0.0]));
    let reference_result = reference.solve(None, None, 100, false, None).unwrap();
    assert!(reference_result.converged());

    // A state guess that is not a rollout of the zero controls
    let garbage_xs: Vec<DVector<f64>> = (0..=15)
        .map(|t| {
            let s = 1.0 - t as f64 / 15.0;
            DVector::from_vec(vec![s, 0.3 * s, -0.2 * s])
        })
        .collect();
    let us = vec![DVector::zeros(2); 15];

    let mut solver = DdpSolver::new(unicycle_problem(15, vec![1.0, 0.0, 0.0]));
    let result = solver
        .solve(Some(garbage_xs), Some(us), 100, false, None)
        .unwrap();

    assert!(result.converged(), "termination: {:?}", result.termination);
    assert!(solver.is_feasible());
    assert_relative_eq!(result.cost, reference_result.cost, epsilon = 1e-6);
}

#[test]
fn callbacks_fire_once_per_accepted_iteration() {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in = Arc::clone(&counter);
    let (recorder, records) = recording_callback();

    let mut solver = DdpSolver::new(unicycle_problem(10, vec![0.5, -0.5, 0.0]));
    solver.set_callbacks(vec![
        IterationCallback::from_fn(move |_| {
            counter_in.fetch_add(1, Ordering::SeqCst);
        }),
        recorder,
    ]);

    let result = solver.solve(None, None, 100, false, None).unwrap();
    assert!(result.converged());

    // One invocation per accepted iteration, never more than the iteration
    // count (iterations whose line search fails do not fire callbacks)
    let fired = counter.load(Ordering::SeqCst);
    let records = records.lock().unwrap();
    assert_eq!(fired, records.len());
    assert!(fired >= 1 && fired <= result.iterations);

    // Iteration numbers reported to callbacks are strictly increasing
    for pair in records.windows(2) {
        assert!(pair[1].iter > pair[0].iter);
    }
}

#[test]
fn regularization_stays_within_bounds() {
    let mut solver = DdpSolver::new(unicycle_problem(20, vec![2.0, -1.0, 1.5]));
    let (callback, records) = recording_callback();
    solver.set_callbacks(vec![callback]);
    let result = solver.solve(None, None, 200, false, None).unwrap();
    assert!(result.converged());

    let (reg_min, reg_max) = {
        let config = solver.config();
        (config.reg_min, config.reg_max)
    };
    for record in records.lock().unwrap().iter() {
        assert!(record.xreg >= reg_min && record.xreg <= reg_max);
        assert!(record.ureg >= reg_min && record.ureg <= reg_max);
    }
    assert!(solver.xreg() >= reg_min && solver.xreg() <= reg_max);
    assert!(solver.ureg() >= reg_min && solver.ureg() <= reg_max);
}

#[test]
fn receding_horizon_resolve_reuses_solution() {
    let mut solver = DdpSolver::new(unicycle_problem(25, vec![1.0, 0.0, 0.0]));
    let cold = solver.solve(None, None, 100, false, None).unwrap();
    assert!(cold.converged());

    // Move the initial state slightly and warm start from the previous
    // solution, the receding-horizon pattern
    solver
        .problem_mut()
        .set_initial_state(DVector::from_vec(vec![0.95, 0.02, 0.0]))
        .unwrap();
    let xs = solver.xs().to_vec();
    let us = solver.us().to_vec();
    let warm = solver
        .solve(Some(xs), Some(us), 100, false, Some(1e-9))
        .unwrap();

    assert!(warm.converged());
    assert!(warm.iterations <= cold.iterations);
}
