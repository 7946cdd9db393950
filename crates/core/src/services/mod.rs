//! Engine services: sandboxed execution, classification, aggregation and the
//! orchestrator that ties them together.

pub mod aggregate;
pub mod file_type;
pub mod harness;
pub mod heuristics;
pub mod orchestrator;
pub mod sandboxes;
pub mod unpack;
