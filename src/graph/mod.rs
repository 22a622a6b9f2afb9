// src/graph/mod.rs

//! Process graph representation.
//!
//! - [`process_graph`] holds the immutable node/flow definitions plus the
//!   host -> boundary index.
//! - [`flow`] defines sequence flows and the take/discard messages.

pub mod flow;
pub mod process_graph;

pub use flow::{FlowMessage, FlowSignal, SequenceFlow};
pub use process_graph::{NodeDef, ProcessGraph};
