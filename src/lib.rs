// src/lib.rs
// Library surface shared by the binary and the integration tests.

pub mod aggregate;
pub mod cancel;
pub mod categories;
pub mod classify;
pub mod config;
pub mod curate;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod rank;
pub mod storage;
pub mod week;

pub use crate::config::ConfigSnapshot;
pub use crate::pipeline::{Pipeline, RunResult, RunStatus};
pub use crate::week::WeekId;
