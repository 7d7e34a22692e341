//! Phase graphs.
//!
//! A graph is a set of [`PhaseNode`]s joined by directed edges between the
//! synthetic [`START`] and [`END`] markers. Build one with [`GraphBuilder`],
//! then `compile()` it into a [`CompiledGraph`] for the runner.
//!
//! ```no_run
//! use conduit::graph::{END, FnNode, GraphBuilder, START};
//!
//! # fn example() -> Result<(), conduit::errors::GraphError> {
//! let mut builder = GraphBuilder::new("base");
//! builder.add_node(FnNode::transition("initialization", "initialized", "System started"))?;
//! builder.add_node(FnNode::transition("validation", "validated", "Basic validation executed"))?;
//! builder.add_edge(START, "initialization")?;
//! builder.add_edge("initialization", "validation")?;
//! builder.add_edge("validation", END)?;
//! let graph = builder.compile()?;
//! assert_eq!(graph.execution_order(), ["initialization", "validation"]);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod node;

pub use builder::{CompiledGraph, END, EdgeSelection, GraphBuilder, START};
pub use node::{FnNode, GraphState, PhaseNode};
