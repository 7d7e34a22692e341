pub mod audit;
pub mod checkpoint;
pub mod collaborator;
pub mod config;
pub mod errors;
pub mod graph;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod util;

