//! Course enrollment orchestration.
//!
//! Course and section selection with schedule conflict detection, a cache for job results
//! pushed back by the backend, a poller that resolves asynchronous jobs, and a relay to the
//! upstream gateway.

pub mod callbacks;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod schedule;
pub mod telemetry;
