//! Composes the registry, supervisor, router, CGRAG retriever and
//! inference client into the four query modes the rest of the workspace
//! defines the seams for: Simple, TwoStage, Benchmark and Council.

mod benchmark;
mod context;
mod council;
mod deadline;
mod engine;
mod simple;
#[cfg(test)]
mod test_support;
mod two_stage;

pub use deadline::Deadline;
pub use engine::Engine;
