//! Crate-wide error type.
//!
//! Mirrors the taxonomy from the design: configuration errors, resource-open
//! errors, and the distinct token-mismatch error raised when a shared-memory
//! attacher presents the wrong token. Everything else (ring contention,
//! oversize messages, crashed-holder recovery) is handled locally and never
//! surfaces as an `Err` — see the module docs on `ring`, `format`, and
//! `shm::robust` respectively.

use std::fmt;

/// Errors that can surface from fallible, one-shot operations (manager init,
/// logger creation, shared-memory attach). Per-message and per-entry failures
/// are not represented here; they are recovered locally.
#[derive(Debug)]
pub enum FerrologError {
    /// A configuration value was missing or did not parse (e.g. an unknown
    /// level name, an invalid rolling-time unit).
    Configuration(String),
    /// A resource could not be opened: a rolling file, a shared-memory
    /// segment, a mutex or semaphore primitive.
    ResourceOpen(String),
    /// A shared-memory attacher's token did not match the segment's stored
    /// magic/cipher pair.
    TokenMismatch(String),
    /// An ident was not found in the manager's table.
    UnknownIdent(String),
}

impl fmt::Display for FerrologError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FerrologError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            FerrologError::ResourceOpen(msg) => write!(f, "failed to open resource: {msg}"),
            FerrologError::TokenMismatch(msg) => write!(f, "token mismatch: {msg}"),
            FerrologError::UnknownIdent(ident) => write!(f, "unknown logger ident: {ident}"),
        }
    }
}

impl std::error::Error for FerrologError {}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FerrologError>;
