//! Image-based material fitting: basis decomposition storage, roughness refinement
//! driven through a small GPU contract, and the on-disk formats the fitted material
//! is exchanged in.

pub mod basis;
pub mod error;
pub mod gpu;
pub mod io;
pub mod least_squares;
pub mod microfacet;
pub mod optimization;
pub mod roughness;
pub mod settings;

pub use error::{FitError, GpuError, SerializationError};
