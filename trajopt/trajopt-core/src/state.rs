//! State manifolds: the spaces trajectories live on.
//!
//! Solver states are not always plain vectors. Orientations, for instance,
//! live on a curved space where subtraction is meaningless. The
//! [`StateManifold`] trait captures the two operations the solver actually
//! needs — a difference producing a tangent vector and an integration
//! consuming one — together with their Jacobians. The ambient dimension `nx`
//! (how states are stored) and the tangent dimension `ndx` (how
//! perturbations are parameterized) may differ.
//!
//! Two reference manifolds ship with the crate:
//!
//! - [`VectorState`]: Euclidean vectors, `nx == ndx`, the common case
//! - [`So2State`]: planar rotations stored as `(cos θ, sin θ)`, `nx = 2`,
//!   `ndx = 1`
//!
//! # Round-trip law
//!
//! Every manifold must satisfy, to numerical tolerance:
//!
//! ```text
//! diff(x, integrate(x, dx)) == dx
//! integrate(x, diff(x, y)) == y
//! ```

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use trajopt_types::{Result, SolverError};

/// Selects which Jacobian(s) of a two-argument manifold operation to
/// populate, so callers can skip computation they do not need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jcomponent {
    /// Populate only the Jacobian with respect to the first argument.
    First,
    /// Populate only the Jacobian with respect to the second argument.
    Second,
    /// Populate both Jacobians.
    Both,
}

impl Jcomponent {
    /// Whether the first-argument Jacobian is requested.
    #[must_use]
    pub fn wants_first(self) -> bool {
        matches!(self, Self::First | Self::Both)
    }

    /// Whether the second-argument Jacobian is requested.
    #[must_use]
    pub fn wants_second(self) -> bool {
        matches!(self, Self::Second | Self::Both)
    }
}

/// A differentiable state manifold.
///
/// Implementations define how two states are compared (`diff`), how a state
/// is perturbed along a tangent vector (`integrate`), and the Jacobians of
/// both operations. All output buffers are caller-allocated and written in
/// place, so the solver's hot loop allocates nothing.
///
/// # Errors
///
/// Every operation taking buffers returns
/// [`SolverError::DimensionMismatch`] when an argument does not match `nx`
/// (states) or `ndx` (tangents, Jacobian blocks).
pub trait StateManifold {
    /// Ambient state dimension.
    fn nx(&self) -> usize;

    /// Tangent (perturbation) dimension.
    fn ndx(&self) -> usize;

    /// The neutral element of the manifold.
    fn zero(&self) -> DVector<f64>;

    /// A random element of the manifold, for testing and exploration.
    fn rand(&self) -> DVector<f64>;

    /// Write into `out` the tangent vector pointing from `x0` to `x1`.
    fn diff(&self, x0: &DVector<f64>, x1: &DVector<f64>, out: &mut DVector<f64>) -> Result<()>;

    /// Write into `out` the state reached from `x` along the tangent `dx`.
    fn integrate(&self, x: &DVector<f64>, dx: &DVector<f64>, out: &mut DVector<f64>)
        -> Result<()>;

    /// Populate the requested Jacobian(s) of `diff(x0, x1)`.
    ///
    /// `jfirst` receives `∂ diff/∂ x0` and `jsecond` receives
    /// `∂ diff/∂ x1`, both `ndx × ndx` and expressed in tangent
    /// coordinates. Only the component(s) selected by `which` are written.
    fn jdiff(
        &self,
        x0: &DVector<f64>,
        x1: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()>;

    /// Populate the requested Jacobian(s) of `integrate(x, dx)`.
    ///
    /// `jfirst` receives `∂ integrate/∂ x` and `jsecond` receives
    /// `∂ integrate/∂ dx`, both `ndx × ndx` in tangent coordinates.
    fn jintegrate(
        &self,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()>;
}

fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

// ============================================================================
// Euclidean states
// ============================================================================

/// Euclidean state space: `diff` is subtraction and `integrate` is addition.
///
/// The ambient and tangent dimensions coincide and both Jacobians are
/// (signed) identities. This is the right manifold for any system whose
/// state has no wrap-around or normalization constraints.
///
/// # Example
///
/// ```
/// use nalgebra::DVector;
/// use trajopt_core::{StateManifold, VectorState};
///
/// let state = VectorState::new(3);
/// let x0 = DVector::from_vec(vec![1.0, 2.0, 3.0]);
/// let x1 = DVector::from_vec(vec![1.5, 1.0, 3.0]);
/// let mut dx = DVector::zeros(3);
/// state.diff(&x0, &x1, &mut dx).unwrap();
/// assert_eq!(dx[0], 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorState {
    nx: usize,
}

impl VectorState {
    /// Create a Euclidean state space of dimension `nx`.
    #[must_use]
    pub fn new(nx: usize) -> Self {
        Self { nx }
    }
}

impl StateManifold for VectorState {
    fn nx(&self) -> usize {
        self.nx
    }

    fn ndx(&self) -> usize {
        self.nx
    }

    fn zero(&self) -> DVector<f64> {
        DVector::zeros(self.nx)
    }

    fn rand(&self) -> DVector<f64> {
        let mut rng = rand::thread_rng();
        DVector::from_fn(self.nx, |_, _| rng.gen_range(-1.0..1.0))
    }

    fn diff(&self, x0: &DVector<f64>, x1: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        check_dim("x0", self.nx, x0.len())?;
        check_dim("x1", self.nx, x1.len())?;
        check_dim("dxout", self.nx, out.len())?;
        out.copy_from(x1);
        *out -= x0;
        Ok(())
    }

    fn integrate(
        &self,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        check_dim("x", self.nx, x.len())?;
        check_dim("dx", self.nx, dx.len())?;
        check_dim("xout", self.nx, out.len())?;
        out.copy_from(x);
        *out += dx;
        Ok(())
    }

    fn jdiff(
        &self,
        x0: &DVector<f64>,
        x1: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()> {
        check_dim("x0", self.nx, x0.len())?;
        check_dim("x1", self.nx, x1.len())?;
        if which.wants_first() {
            check_dim("Jfirst", self.nx, jfirst.nrows())?;
            check_dim("Jfirst", self.nx, jfirst.ncols())?;
            jfirst.fill(0.0);
            jfirst.fill_diagonal(-1.0);
        }
        if which.wants_second() {
            check_dim("Jsecond", self.nx, jsecond.nrows())?;
            check_dim("Jsecond", self.nx, jsecond.ncols())?;
            jsecond.fill(0.0);
            jsecond.fill_diagonal(1.0);
        }
        Ok(())
    }

    fn jintegrate(
        &self,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()> {
        check_dim("x", self.nx, x.len())?;
        check_dim("dx", self.nx, dx.len())?;
        if which.wants_first() {
            check_dim("Jfirst", self.nx, jfirst.nrows())?;
            check_dim("Jfirst", self.nx, jfirst.ncols())?;
            jfirst.fill(0.0);
            jfirst.fill_diagonal(1.0);
        }
        if which.wants_second() {
            check_dim("Jsecond", self.nx, jsecond.nrows())?;
            check_dim("Jsecond", self.nx, jsecond.ncols())?;
            jsecond.fill(0.0);
            jsecond.fill_diagonal(1.0);
        }
        Ok(())
    }
}

// ============================================================================
// Planar rotations
// ============================================================================

/// Planar rotation manifold SO(2), stored as `(cos θ, sin θ)`.
///
/// The ambient dimension is 2 (the embedding on the unit circle) while the
/// tangent dimension is 1 (a relative angle). `diff` returns the wrapped
/// relative angle in `(-π, π]` and `integrate` rotates, so trajectories
/// never suffer angle wind-up.
///
/// Stored states are expected to lie on the unit circle; `integrate`
/// preserves unit norm up to rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct So2State;

impl So2State {
    /// Create the planar rotation manifold.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Embed an angle into the manifold representation.
    #[must_use]
    pub fn from_angle(theta: f64) -> DVector<f64> {
        DVector::from_vec(vec![theta.cos(), theta.sin()])
    }
}

impl StateManifold for So2State {
    fn nx(&self) -> usize {
        2
    }

    fn ndx(&self) -> usize {
        1
    }

    fn zero(&self) -> DVector<f64> {
        DVector::from_vec(vec![1.0, 0.0])
    }

    fn rand(&self) -> DVector<f64> {
        let mut rng = rand::thread_rng();
        Self::from_angle(rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI))
    }

    fn diff(&self, x0: &DVector<f64>, x1: &DVector<f64>, out: &mut DVector<f64>) -> Result<()> {
        check_dim("x0", 2, x0.len())?;
        check_dim("x1", 2, x1.len())?;
        check_dim("dxout", 1, out.len())?;
        // Relative rotation x0⁻¹·x1, read off as a wrapped angle
        let cos_rel = x0[0] * x1[0] + x0[1] * x1[1];
        let sin_rel = x0[0] * x1[1] - x0[1] * x1[0];
        out[0] = sin_rel.atan2(cos_rel);
        Ok(())
    }

    fn integrate(
        &self,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        out: &mut DVector<f64>,
    ) -> Result<()> {
        check_dim("x", 2, x.len())?;
        check_dim("dx", 1, dx.len())?;
        check_dim("xout", 2, out.len())?;
        let (sin_d, cos_d) = dx[0].sin_cos();
        out[0] = x[0] * cos_d - x[1] * sin_d;
        out[1] = x[1] * cos_d + x[0] * sin_d;
        Ok(())
    }

    fn jdiff(
        &self,
        x0: &DVector<f64>,
        x1: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()> {
        check_dim("x0", 2, x0.len())?;
        check_dim("x1", 2, x1.len())?;
        if which.wants_first() {
            check_dim("Jfirst", 1, jfirst.nrows())?;
            check_dim("Jfirst", 1, jfirst.ncols())?;
            jfirst[(0, 0)] = -1.0;
        }
        if which.wants_second() {
            check_dim("Jsecond", 1, jsecond.nrows())?;
            check_dim("Jsecond", 1, jsecond.ncols())?;
            jsecond[(0, 0)] = 1.0;
        }
        Ok(())
    }

    fn jintegrate(
        &self,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        jfirst: &mut DMatrix<f64>,
        jsecond: &mut DMatrix<f64>,
        which: Jcomponent,
    ) -> Result<()> {
        check_dim("x", 2, x.len())?;
        check_dim("dx", 1, dx.len())?;
        if which.wants_first() {
            check_dim("Jfirst", 1, jfirst.nrows())?;
            check_dim("Jfirst", 1, jfirst.ncols())?;
            jfirst[(0, 0)] = 1.0;
        }
        if which.wants_second() {
            check_dim("Jsecond", 1, jsecond.nrows())?;
            check_dim("Jsecond", 1, jsecond.ncols())?;
            jsecond[(0, 0)] = 1.0;
        }
        Ok(())
    }
}
