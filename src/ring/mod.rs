//! Ring buffers: the in-process bounded byte ring lives here as
//! [`local::BoundedRing`]. The cross-process variant lives in [`crate::shm`].

pub mod local;

pub use local::{BoundedRing, ReadDecision, ReadOutcome, WriteOutcome};
