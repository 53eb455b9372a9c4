//! Cross-process shared-memory ring buffer.
//!
//! POSIX shared memory (`shm_open`/`mmap`), two robust process-shared
//! mutexes serializing producer processes against each other and consumer
//! processes against each other, and a counting semaphore built from a
//! third robust mutex plus a process-shared condition variable. Kept as
//! raw `libc` calls rather than a higher-level mmap crate, because the
//! robust mutexes and semaphore state must live inside the same mapping as
//! the ring payload, which such crates do not expose a way to place.

pub mod robust;
pub mod ring;
pub mod token;

pub use ring::{ShmReadOutcome, ShmRing, ShmWriteOutcome, WaitOutcome};
pub use robust::WaitTimeout;
