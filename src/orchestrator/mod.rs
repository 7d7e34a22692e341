pub mod runner;

pub use runner::{DEFAULT_NODE_TIMEOUT, GraphRunner, RunOutput, RunnerConfig};
