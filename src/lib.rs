//! High-throughput, multi-process, multi-threaded logging core.
//!
//! Each [`Logger`](logger::Logger) owns a lock-free in-process ring
//! ([`ring::local::BoundedRing`]) fed by producer threads and drained by one
//! background consumer thread, which fans records out to stdout, syslog, a
//! rolling file, and/or a cross-process shared-memory ring
//! ([`shm::ring::ShmRing`]). [`manager::LoggerManager`] owns every logger in
//! the process, keyed by ident and by a stable numeric id.
//!
//! A `tracing`-based ambient logging layer carries this crate's own
//! diagnostics (shm degrade warnings, rotation failures), `chrono` handles
//! every timestamp computation, `parking_lot` backs every mutex/condvar/
//! rwlock, and raw `libc` is reached for only where POSIX primitives
//! (shared memory, robust mutexes, syslog, thread ids) have no safe
//! wrapper in the existing dependency set.

pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod levels;
pub mod logger;
pub mod manager;
pub mod ring;
pub mod rotation;
pub mod shm;
pub mod syslog;

pub use clock::{BrokenDownTime, RealTimeClock, Tick, TickResolution};
pub use config::{LoggerConfig, SubSecondUnit, DEFAULT_MAGIC_KEY};
pub use error::{FerrologError, Result};
pub use levels::{Appender, DateFormat, Layout, Level, RollingTimeUnit};
pub use logger::{Logger, MaxWait};
pub use manager::{get, init, lib_version, load, stamp_id, uninit, LoggerManager};
