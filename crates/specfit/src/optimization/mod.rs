mod convergence;
mod double_buffer;
mod error_report;
mod shader_based;

pub use convergence::{ConvergenceOutcome, ConvergenceSummary, ConvergenceTracker, DampingController, StepOutcome};
pub use double_buffer::DoubleBuffer;
pub use error_report::ErrorReport;
pub use shader_based::{SetupContext, ShaderBasedOptimization};
