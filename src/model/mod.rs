pub mod betting_math;
pub mod pipeline;
pub mod simulator;

pub use pipeline::{Pipeline, PipelineSettings};
pub use simulator::{FgaMethod, OutcomeSimulator, SimulationParams};
