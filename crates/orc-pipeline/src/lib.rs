//! Per-query pipeline state tracking and the orchestrator-wide event bus.

pub mod bus;
pub mod tracker;

pub use bus::{BusMetrics, BusRecvError, EventBus, EventSubscription, LagPolicy};
pub use tracker::PipelineTracker;
