//! Linear least-squares fitting against a small set of basis functions, one independent
//! system per texel (or per texel and color channel).

mod matrix_builder;
mod ptm;

pub use matrix_builder::{LeastSquaresMatrixBuilder, LinearConstraint};
pub use ptm::{LuminanceSamples, PolynomialTextureMapModel};

/// Describes how a bundle of samples `S` turns into rows of a least-squares system.
///
/// Rows for which [`is_valid`](Self::is_valid) is false are excluded from accumulation
/// entirely: none of the other methods are called for them.
pub trait LeastSquaresModel<S, T> {
    fn is_valid(&self, samples: &S, system_index: usize) -> bool;

    fn sample_weight(&self, samples: &S, system_index: usize) -> f64;

    /// The dependent value of the row.
    fn samples(&self, samples: &S, system_index: usize) -> T;

    fn basis_function_count(&self) -> usize;

    /// Maps a column index to the evaluated basis function for this row.
    fn basis_functions(&self, samples: &S, system_index: usize) -> impl Fn(usize) -> T;

    fn inner_product(&self, a: &T, b: &T) -> f64;
}
