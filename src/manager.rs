//! Process-wide logger manager.
//!
//! Owns a readers-writer lock over an ident table plus a parallel numeric
//! id array for O(1) lookup, and a tiny shared-memory handshake segment
//! (via [`crate::shm::ring::ShmRing`]) keyed by executable identity and PID
//! so a second `init` call from a dynamically loaded module resolves to
//! the same manager rather than creating a duplicate.
//!
//! Config-file resolution and the INI parser itself are out of scope;
//! `init` takes already-populated [`LoggerConfig`]s rather than a path,
//! since there is no parser in this crate to hand a path to.

use crate::clock::{RealTimeClock, TickResolution};
use crate::config::LoggerConfig;
use crate::error::{FerrologError, Result};
use crate::format;
use crate::logger::Logger;
use crate::shm::ring::{self, ShmRing};
use md5::{Digest, Md5};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn handshake_name() -> String {
    let exe = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "ferrolog".to_string());
    let digest = Md5::digest(exe.as_bytes());
    let tag: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("/ferrolog-mgr-{tag}-{}", std::process::id())
}

struct Inner {
    by_ident: HashMap<String, Arc<Logger>>,
    /// `by_id[0]` holds id 1 (the first-created logger), `by_id[n]` holds
    /// id `n+1` — reindexed from 0 since a separate "current maximum
    /// id" slot is redundant with `Vec::len`.
    by_id: Vec<Arc<Logger>>,
    default_ident: Option<String>,
    next_id: u64,
}

/// Owns every logger in the process, keyed by ident and by a stable
/// numeric id assigned in creation order.
pub struct LoggerManager {
    inner: RwLock<Inner>,
    clock: Arc<RealTimeClock>,
    handshake: Mutex<Option<ShmRing>>,
    initialized: AtomicBool,
}

impl LoggerManager {
    pub fn new() -> Self {
        LoggerManager {
            inner: RwLock::new(Inner {
                by_ident: HashMap::new(),
                by_id: Vec::new(),
                default_ident: None,
                next_id: 1,
            }),
            clock: Arc::new(RealTimeClock::start()),
            handshake: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Idempotent: a second call while already initialized is a no-op
    /// rather than an error, so a second `init` from another loaded
    /// module re-resolves to the same instance.
    pub fn init(&self, configs: &[LoggerConfig]) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let name = handshake_name();
        let ring = ShmRing::create_or_attach(&name, 4096, None)?;
        *self.handshake.lock() = Some(ring);

        let mut inner = self.inner.write();
        for cfg in configs {
            self.create_locked(&mut inner, cfg.clone())?;
        }
        Ok(())
    }

    fn create_locked(&self, inner: &mut Inner, config: LoggerConfig) -> Result<Arc<Logger>> {
        let id = inner.next_id;
        inner.next_id += 1;
        let ident = config.ident.clone();
        let logger = Arc::new(Logger::create(config, Arc::clone(&self.clock), id)?);
        inner.by_ident.insert(ident.clone(), Arc::clone(&logger));
        inner.by_id.push(Arc::clone(&logger));
        if inner.default_ident.is_none() {
            inner.default_ident = Some(ident);
        }
        Ok(logger)
    }

    /// Return the logger for `ident`, creating and caching one at default
    /// config on first call under the writer side of the lock. `None`
    /// returns the default application logger (the first ident `init` was
    /// given) without taking the writer lock at all.
    pub fn load(&self, ident: Option<&str>) -> Result<Arc<Logger>> {
        let ident = match ident {
            Some(ident) => ident.to_string(),
            None => {
                let guard = self.inner.read();
                guard
                    .default_ident
                    .clone()
                    .ok_or_else(|| FerrologError::UnknownIdent("<default>".to_string()))?
            }
        };

        if let Some(logger) = self.inner.read().by_ident.get(&ident) {
            return Ok(Arc::clone(logger));
        }

        let mut inner = self.inner.write();
        if let Some(logger) = inner.by_ident.get(&ident) {
            return Ok(Arc::clone(logger));
        }
        self.create_locked(&mut inner, LoggerConfig::named(ident))
    }

    /// O(1) lookup by numeric id: `0` is the first-created logger, `-1`
    /// the last, any positive value a direct id.
    pub fn get(&self, id: i64) -> Result<Arc<Logger>> {
        let inner = self.inner.read();
        if inner.by_id.is_empty() {
            return Err(FerrologError::UnknownIdent(format!("id {id}")));
        }
        let idx = match id {
            0 => 0,
            -1 => inner.by_id.len() - 1,
            id if id > 0 => (id as usize).saturating_sub(1),
            _ => return Err(FerrologError::UnknownIdent(format!("id {id}"))),
        };
        inner
            .by_id
            .get(idx)
            .cloned()
            .ok_or_else(|| FerrologError::UnknownIdent(format!("id {id}")))
    }

    /// `"{seconds.nanoseconds}"`, the manager-level stamp id helper.
    pub fn stamp_id(&self) -> String {
        let tick = self.clock.tick(TickResolution::Millisecond);
        format::stamp_id(tick.seconds, tick.nanoseconds)
    }

    /// Flip the init flag, drop every logger (joining each consumer
    /// thread), and tear down the handshake segment. Safe to call more
    /// than once; only the first call after `init` does anything.
    pub fn uninit(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.write();
        inner.by_ident.clear();
        inner.by_id.clear();
        inner.default_ident = None;
        inner.next_id = 1;
        drop(inner);

        let mut handshake = self.handshake.lock();
        if let Some(ring) = handshake.take() {
            let name = ring.name().to_string();
            drop(ring);
            let _ = ring::unlink(&name);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

impl Default for LoggerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide instance, published via a `once_cell::sync::Lazy` rather
/// than a raw `static mut`, so every dynamically loaded module in the
/// process that calls [`init`] resolves to the same manager.
static GLOBAL: once_cell::sync::Lazy<LoggerManager> = once_cell::sync::Lazy::new(LoggerManager::new);

/// `(name, version)` of this crate.
pub fn lib_version() -> (&'static str, &'static str) {
    ("ferrolog", env!("CARGO_PKG_VERSION"))
}

/// Process-wide `init`. Config-file resolution is out of scope here (see
/// the module doc comment); callers supply already-resolved
/// [`LoggerConfig`]s directly.
pub fn init(configs: &[LoggerConfig]) -> Result<()> {
    GLOBAL.init(configs)
}

/// Process-wide `uninit`.
pub fn uninit() {
    GLOBAL.uninit()
}

/// Process-wide `load`.
pub fn load(ident: Option<&str>) -> Result<Arc<Logger>> {
    GLOBAL.load(ident)
}

/// Process-wide `get`.
pub fn get(id: i64) -> Result<Arc<Logger>> {
    GLOBAL.get(id)
}

/// Process-wide `stamp_id`.
pub fn stamp_id() -> String {
    GLOBAL.stamp_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::Appender;

    fn cfg(ident: &str) -> LoggerConfig {
        let mut c = LoggerConfig::named(ident);
        c.appender = Appender::STDOUT;
        c
    }

    #[test]
    fn init_is_idempotent() {
        let mgr = LoggerManager::new();
        assert!(mgr.init(&[cfg("app")]).is_ok());
        assert!(mgr.init(&[cfg("other")]).is_ok());
        // Second call was a no-op: "other" was never created.
        assert!(mgr.get(2).is_err());
        mgr.uninit();
    }

    #[test]
    fn first_ident_becomes_default() {
        let mgr = LoggerManager::new();
        mgr.init(&[cfg("app"), cfg("worker")]).unwrap();
        let default = mgr.load(None).unwrap();
        assert_eq!(default.ident(), "app");
        mgr.uninit();
    }

    #[test]
    fn repeated_load_returns_identical_logger() {
        let mgr = LoggerManager::new();
        mgr.init(&[cfg("app")]).unwrap();
        let a = mgr.load(Some("app")).unwrap();
        let b = mgr.load(Some("app")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        mgr.uninit();
    }

    #[test]
    fn load_creates_uninitialized_ident_lazily() {
        let mgr = LoggerManager::new();
        mgr.init(&[cfg("app")]).unwrap();
        let lazy = mgr.load(Some("lazy")).unwrap();
        assert_eq!(lazy.ident(), "lazy");
        mgr.uninit();
    }

    #[test]
    fn get_supports_first_last_and_direct_ids() {
        let mgr = LoggerManager::new();
        mgr.init(&[cfg("a"), cfg("b"), cfg("c")]).unwrap();
        assert_eq!(mgr.get(0).unwrap().ident(), "a");
        assert_eq!(mgr.get(-1).unwrap().ident(), "c");
        assert_eq!(mgr.get(2).unwrap().ident(), "b");
        mgr.uninit();
    }

    #[test]
    fn uninit_then_reinit_is_well_defined() {
        let mgr = LoggerManager::new();
        mgr.init(&[cfg("app")]).unwrap();
        mgr.uninit();
        assert!(!mgr.is_initialized());

        // uninit must have shm_unlinked the handshake segment, not just
        // munmapped it: re-attaching under the same name should find
        // nothing left behind.
        let name = handshake_name();
        let probe = ShmRing::create_or_attach(&name, 4096, None).unwrap();
        assert!(probe.created(), "handshake segment survived uninit()");
        let probe_name = probe.name().to_string();
        drop(probe);
        let _ = ring::unlink(&probe_name);

        mgr.init(&[cfg("app")]).unwrap();
        assert_eq!(mgr.get(0).unwrap().ident(), "app");
        mgr.uninit();
    }

    #[test]
    fn global_singleton_free_functions_round_trip() {
        uninit();
        init(&[cfg("global-app")]).unwrap();
        let logger = load(Some("global-app")).unwrap();
        assert_eq!(logger.ident(), "global-app");
        assert_eq!(lib_version().0, "ferrolog");
        uninit();
    }
}
