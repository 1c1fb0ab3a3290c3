//! Adaptive triangle-mesh refinement for non-linear 2D transforms.
//!
//! A [`MeshRefiner`] starts from a small seed triangulation and repeatedly
//! splits the edge whose straight-line approximation of the projector is
//! worst, until the error is small enough or the caller stops stepping.

pub mod error;
pub mod output;
pub mod projector;
pub mod refiner;
mod segment;
mod validate;

pub use error::*;
pub use output::*;
pub use projector::*;
pub use refiner::*;
