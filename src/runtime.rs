//! Runtime glue shared by every worker: configuration, fault capture, the
//! per-thread cooperative scheduler bridge, and telemetry.

pub mod config;
pub mod fault;
pub mod scheduler;
pub mod telemetry;
