//! Core types for trajectory optimization.
//!
//! This crate provides the foundational types shared by shooting-based
//! optimal control solvers:
//!
//! - [`ActionData`] - Per-stage scratch storage for dynamics/cost evaluation
//! - [`DdpConfig`] - Regularization schedule, line search, and thresholds
//! - [`SolverError`] - Error taxonomy with a recoverable/structural split
//! - [`SolveResult`] / [`IterationRecord`] - Solve outcomes and diagnostics
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no solver behavior and no
//! dynamics; they're the common language between:
//!
//! - Solvers (DDP and its variants)
//! - Problem descriptions (stage models, shooting problems)
//! - Diagnostics (per-iteration callbacks, logging, benchmarks)
//!
//! # Example
//!
//! ```
//! use trajopt_types::{ActionData, DdpConfig};
//!
//! // Scratch data for a stage with 3 states, 3 tangent dims, 2 controls
//! let data = ActionData::new(3, 3, 2);
//! assert_eq!(data.fu.shape(), (3, 2));
//!
//! // A high-accuracy solver configuration
//! let config = DdpConfig::high_accuracy().with_reg_bounds(1e-10, 1e10);
//! assert!(config.validate().is_ok());
//! ```

#![doc(html_root_url = "https://docs.rs/trajopt-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod config;
mod data;
mod error;
mod solution;

pub use config::DdpConfig;
pub use data::ActionData;
pub use error::SolverError;
pub use solution::{IterationRecord, SolveResult, Termination};

// Re-export math types for convenience
pub use nalgebra::{DMatrix, DVector, Vector2};

/// Result type for trajectory optimization operations.
pub type Result<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_result_alias() {
        fn fails() -> Result<()> {
            Err(SolverError::NoCandidate)
        }
        assert!(fails().is_err());
    }

    #[test]
    fn test_reexports() {
        let v = DVector::<f64>::zeros(3);
        assert_eq!(v.len(), 3);
        let d = Vector2::new(1.0, -0.5);
        assert_eq!(d.x, 1.0);
    }
}
