//! Concurrent TCP scan engine: worker pool, port probe, coordination, and
//! result aggregation.

pub mod aggregate;
pub mod context;
pub mod coordinator;
pub mod probe;
pub mod services;

pub use coordinator::{ActivePolicy, ScanCoordinator, ScanRequest, ScanStatus};
