//! Differential dynamic programming for shooting-based trajectory
//! optimization.
//!
//! This crate solves discrete-time optimal control problems: given a
//! sequence of stage models describing per-step dynamics and cost, it
//! computes a locally optimal state and control trajectory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       DdpSolver                              │
//! │  Backward pass → line search → regularization schedule       │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ShootingProblem                           │
//! │  Initial state + T running stages + terminal stage           │
//! │  Provides: rollout, cost, per-stage quadratic expansions     │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │   ActionModel (per stage)    │   StateManifold              │
//! │   dynamics + cost + partials │   diff / integrate + partials│
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! The seams are traits: stage models implement [`ActionModel`] over any
//! [`StateManifold`], and solvers implement the [`Solver`] contract. The
//! shipped [`DdpSolver`] is the canonical regularized DDP scheme; its
//! backward pass tolerates indefinite Hessians by raising a
//! trust-region-like regularization and retrying.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::DVector;
//! use trajopt_core::actions::UnicycleAction;
//! use trajopt_core::{BoxedActionModel, DdpSolver, ShootingProblem, Solver};
//!
//! // Park a unicycle at the origin from (1, 0), facing forward
//! let running: Vec<BoxedActionModel> = (0..20)
//!     .map(|_| Box::new(UnicycleAction::new()) as BoxedActionModel)
//!     .collect();
//! let terminal: BoxedActionModel = Box::new(UnicycleAction::new());
//! let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
//! let problem = ShootingProblem::new(x0, running, terminal).unwrap();
//!
//! let mut solver = DdpSolver::new(problem);
//! let result = solver.solve(None, None, 100, false, None).unwrap();
//! assert!(result.converged());
//! ```
//!
//! # Warm Starting
//!
//! Candidates need not be dynamically consistent. Pass `is_feasible =
//! false` and the solver treats the state trajectory as a guess, measuring
//! the per-stage dynamics gaps and closing them as it steps; pass `true`
//! only when the states are an exact rollout of the controls. The candidate
//! and regularization persist across [`Solver::solve`] calls, which is the
//! intended pattern for receding-horizon loops: move the problem's initial
//! state, shift the previous solution, and re-solve.
//!
//! # Feature Flags
//!
//! - `parallel`: evaluate per-stage derivatives across threads with rayon
//! - `serde`: serialization for configuration and diagnostic records

#![doc(html_root_url = "https://docs.rs/trajopt-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod action;
pub mod actions;
mod ddp;
mod problem;
mod solver;
mod state;

pub use action::{ActionModel, BoxedActionModel};
pub use ddp::DdpSolver;
pub use problem::ShootingProblem;
pub use solver::{logging_callback, Callback, IterationCallback, Solver};
pub use state::{Jcomponent, So2State, StateManifold, VectorState};

// Re-export the shared data types
pub use trajopt_types::{
    ActionData, DdpConfig, IterationRecord, Result, SolveResult, SolverError, Termination,
};
