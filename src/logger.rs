//! Per-ident logger: formatting free-list, in-process ring, sink fan-out,
//! and the single background consumer thread.
//!
//! The consumer is a condvar-signaled background worker owned by the
//! struct that spawns it (join on drop, shutdown via a flag rather than
//! killing the thread outright). The shutdown handshake — created locked,
//! unlocked at destruction to release the consumer — is implemented the
//! same way `clock.rs`'s background thread is: a `Mutex<bool>` plus
//! `Condvar`, rather than literally holding a lock guard across the
//! struct's lifetime (which Rust's borrow checker does not allow without
//! self-referential tricks).

use crate::clock::{BrokenDownTime, RealTimeClock, Tick, TickResolution};
use crate::config::LoggerConfig;
use crate::error::{FerrologError, Result};
use crate::format::{self, Record, RecordTime};
use crate::levels::{Appender, Layout, Level};
use crate::ring::local::{BoundedRing, ReadDecision, WriteOutcome};
use crate::rotation::RollingFileAppender;
use crate::shm::ring::{ShmRing, ShmWriteOutcome};
use crate::shm::token;
use crate::syslog::Syslog;
use chrono::TimeZone;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// The config table names no dedicated shared-memory ring size key;
/// every shm-backed logger gets a fixed-size ring rather than inventing a
/// new config field.
const DEFAULT_SHM_RING_BYTES: u64 = 1 << 20;

/// How long a producer is willing to wait for ring space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxWait {
    /// Block until a slot is available.
    Infinite,
    /// Drop immediately on contention.
    Nowait,
    /// Poll-sleep at a 1ms interval until `ms` elapses, then drop.
    Millis(u64),
}

fn thread_id() -> u64 {
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

struct FreeList {
    buffers: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    buf_size: usize,
}

impl FreeList {
    fn new(capacity: usize, buf_size: usize) -> Self {
        let buffers = (0..capacity).map(|_| vec![0u8; buf_size]).collect();
        FreeList {
            buffers: Mutex::new(buffers),
            capacity,
            buf_size,
        }
    }

    fn acquire(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buf_size))
    }

    fn release(&self, mut buf: Vec<u8>) {
        let mut guard = self.buffers.lock();
        if guard.len() < self.capacity {
            buf.clear();
            guard.push(buf);
        }
    }
}

fn level_to_byte(level: Level) -> u8 {
    level as u8
}

fn level_from_byte(b: u8) -> Level {
    match b {
        0 => Level::Off,
        4 => Level::Fatal,
        5 => Level::Error,
        6 => Level::Warn,
        7 => Level::Info,
        8 => Level::Debug,
        9 => Level::Trace,
        _ => Level::All,
    }
}

/// Pack `level` + the date-minute string + the already-rendered payload
/// into one ring entry: a level byte, a date-minute length-prefix, the
/// date-minute string itself, then the payload.
fn encode_entry(level: Level, date_minute: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + date_minute.len() + payload.len());
    buf.push(level_to_byte(level));
    buf.push(date_minute.len() as u8);
    buf.extend_from_slice(date_minute.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn decode_entry(bytes: &[u8]) -> (Level, &str, &[u8]) {
    let level = level_from_byte(bytes[0]);
    let len = bytes[1] as usize;
    let date_minute = std::str::from_utf8(&bytes[2..2 + len]).unwrap_or("");
    (level, date_minute, &bytes[2 + len..])
}

fn shm_segment_name(config: &LoggerConfig) -> String {
    if !config.shm_log_file.is_empty() {
        if config.shm_log_file.starts_with('/') {
            config.shm_log_file.clone()
        } else {
            format!("/{}", config.shm_log_file)
        }
    } else {
        format!("/ferrolog-{}", config.ident)
    }
}

struct Shared {
    config: LoggerConfig,
    clock: Arc<RealTimeClock>,
    ring: BoundedRing,
    free_list: FreeList,
    file: Option<Mutex<RollingFileAppender>>,
    shm: Option<ShmRing>,
    syslog: Option<Syslog>,
    shutdown: Mutex<bool>,
    wake: Condvar,
    message_count: AtomicU64,
    round_count: AtomicU64,
    id: u64,
}

/// A per-ident logger: level-gated entry points feed a lock-free ring
/// drained by one background consumer thread, which fans each record out
/// to the configured sinks in a fixed order.
pub struct Logger {
    shared: Arc<Shared>,
    consumer: Option<JoinHandle<()>>,
}

impl Logger {
    /// Create a logger for an already-resolved [`LoggerConfig`], sharing
    /// `clock` with the manager and every other logger in the process.
    pub fn create(config: LoggerConfig, clock: Arc<RealTimeClock>, id: u64) -> Result<Self> {
        let max_msg = config.clamped_max_msg_size();
        // queue_length names an entry count; approximate the ring's byte
        // capacity as that many max-size entries plus header/alignment
        // slack, since BoundedRing is sized in bytes.
        let ring_bytes = config.queue_length.max(2) * (max_msg + 32);
        let free_list = FreeList::new(config.max_concurrents.max(1), max_msg);
        let ring = BoundedRing::new(ring_bytes);

        let file = if config.appender.contains(Appender::ROLLING_FILE) {
            Some(Mutex::new(RollingFileAppender::open(&config)?))
        } else {
            None
        };

        let shm = if config.appender.contains(Appender::SHMMAP) {
            let name = shm_segment_name(&config);
            let token = token::token_from_magic_key(&config.magic_key);
            match ShmRing::create_or_attach(&name, DEFAULT_SHM_RING_BYTES, Some(token)) {
                Ok(ring) => Some(ring),
                Err(FerrologError::TokenMismatch(name)) => {
                    tracing::warn!(
                        shm_name = %name,
                        "shared-memory token mismatch; disabling shm sink for this logger"
                    );
                    None
                }
                Err(other) => return Err(other),
            }
        } else {
            None
        };

        let syslog = config
            .appender
            .contains(Appender::SYSLOG)
            .then(|| Syslog::open(&config.ident));

        let shared = Arc::new(Shared {
            config,
            clock,
            ring,
            free_list,
            file,
            shm,
            syslog,
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
            message_count: AtomicU64::new(0),
            round_count: AtomicU64::new(0),
            id,
        });

        let worker = Arc::clone(&shared);
        let consumer = std::thread::spawn(move || consumer_loop(worker));

        Ok(Logger {
            shared,
            consumer: Some(consumer),
        })
    }

    /// `true` iff `level` is admitted by this logger's configured level.
    pub fn level_enabled(&self, level: Level) -> bool {
        level.admits(self.shared.config.log_level)
    }

    /// Raw entry point: `bytes` is the already-expanded message text, still
    /// run through the configured layout (timestamp, level, ident, …) the
    /// same as [`Self::log_format`] — the buffer is local rather than
    /// free-list-pooled, and overflow is truncated to `maxMsgSize - 1`
    /// bytes with the excess simply dropped, no `...` marker.
    pub fn log_message(&self, level: Level, wait: MaxWait, bytes: &[u8]) -> bool {
        if !self.level_enabled(level) {
            return false;
        }
        let cfg = &self.shared.config;
        let now = self.shared.clock.tick(TickResolution::Millisecond);
        let (offset_minutes, _) = self.shared.clock.timezone();
        let bdt = RealTimeClock::localtime(cfg.local_time, offset_minutes, now.seconds);
        let time = RecordTime::from_broken_down(bdt, now.nanoseconds, offset_minutes);
        let date_minute = self.date_minute_for(now);

        let message = String::from_utf8_lossy(bytes);
        let stamp_id = cfg
            .timestamp_id
            .then(|| format::stamp_id(now.seconds, now.nanoseconds));
        let record = Record {
            level,
            message: &message,
            file: None,
            line: None,
            function: None,
            pid: std::process::id(),
            tid: thread_id(),
            stamp_id,
        };
        let rendered = match cfg.layout {
            Layout::Dated => format::assemble_dated(cfg, &time, &record),
            Layout::Plain => format::assemble_plain(cfg, &date_minute, &record),
        };

        let mut rendered = rendered.into_bytes();
        let cap = cfg.clamped_max_msg_size().saturating_sub(1);
        if rendered.len() > cap {
            rendered.truncate(cap);
        }

        let entry = encode_entry(level, &date_minute, &rendered);
        self.enqueue(&entry, wait)
    }

    /// Formatted entry point: renders `message` (already expanded by the
    /// caller — this crate has no C-style variadic trampoline) through the
    /// configured layout, truncating with a `...` marker on overflow.
    #[allow(clippy::too_many_arguments)]
    pub fn log_format(
        &self,
        level: Level,
        wait: MaxWait,
        file: Option<&str>,
        line: Option<u32>,
        function: Option<&str>,
        message: &str,
    ) -> bool {
        if !self.level_enabled(level) {
            return false;
        }
        let cfg = &self.shared.config;
        let mut buf = self.shared.free_list.acquire();

        let now = self.shared.clock.tick(TickResolution::Millisecond);
        let (offset_minutes, _) = self.shared.clock.timezone();
        let bdt = RealTimeClock::localtime(cfg.local_time, offset_minutes, now.seconds);
        let time = RecordTime::from_broken_down(bdt, now.nanoseconds, offset_minutes);
        let date_minute = self.date_minute_for(now);

        let stamp_id = cfg
            .timestamp_id
            .then(|| format::stamp_id(now.seconds, now.nanoseconds));
        let record = Record {
            level,
            message,
            file,
            line,
            function,
            pid: std::process::id(),
            tid: thread_id(),
            stamp_id,
        };
        let rendered = format::render_into(cfg, &time, &date_minute, &record);

        buf.clear();
        buf.extend_from_slice(&encode_entry(level, &date_minute, rendered.as_bytes()));
        let ok = self.enqueue(&buf, wait);
        self.shared.free_list.release(buf);
        ok
    }

    fn date_minute_for(&self, tick: Tick) -> String {
        let dt = chrono::Utc
            .timestamp_opt(tick.seconds, tick.nanoseconds)
            .single()
            .unwrap_or_else(|| chrono::Utc.timestamp_opt(0, 0).single().unwrap());
        format::date_minute_string(dt, self.shared.config.rolling_time)
    }

    /// Reserve a ring slot for `entry`, honoring `wait`'s retry policy,
    /// then wake the consumer thread.
    fn enqueue(&self, entry: &[u8], wait: MaxWait) -> bool {
        let deadline = match wait {
            MaxWait::Millis(ms) => Some(Instant::now() + Duration::from_millis(ms)),
            _ => None,
        };
        loop {
            match self
                .shared
                .ring
                .write(entry.len(), |dst| dst.copy_from_slice(entry))
            {
                WriteOutcome::Written => {
                    self.shared.wake.notify_one();
                    return true;
                }
                WriteOutcome::Fatal => return false,
                WriteOutcome::Again => {
                    match wait {
                        MaxWait::Nowait => return false,
                        MaxWait::Infinite => {}
                        MaxWait::Millis(_) => {
                            if Instant::now() >= deadline.unwrap() {
                                return false;
                            }
                        }
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    pub fn ident(&self) -> &str {
        &self.shared.config.ident
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// `(message_count, round_count)`, the two monotonically increasing
    /// counters tracked for this logger.
    pub fn log_messages(&self) -> (u64, u64) {
        (
            self.shared.message_count.load(Ordering::Relaxed),
            self.shared.round_count.load(Ordering::Relaxed),
        )
    }

    pub fn timezone(&self) -> (i32, String) {
        self.shared.clock.timezone()
    }

    pub fn daylight(&self) -> bool {
        self.shared.clock.daylight()
    }

    pub fn tick(&self, resolution: TickResolution) -> Tick {
        self.shared.clock.tick(resolution)
    }

    pub fn local_time(&self, timestamp: i64) -> BrokenDownTime {
        let (offset, _) = self.shared.clock.timezone();
        RealTimeClock::localtime(self.shared.config.local_time, offset, timestamp)
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        *self.shared.shutdown.lock() = true;
        self.shared.wake.notify_one();
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        if let Some(shm) = &self.shared.shm {
            let _ = crate::shm::ring::unlink(shm.name());
        }
    }
}

fn consumer_loop(shared: Arc<Shared>) {
    loop {
        let shutting_down = {
            let mut guard = shared.shutdown.lock();
            if !*guard {
                shared.wake.wait_for(&mut guard, Duration::from_secs(1));
            }
            *guard
        };
        drain_all(&shared);
        if shutting_down {
            return;
        }
    }
}

fn drain_all(shared: &Shared) {
    shared.ring.read_batch(usize::MAX, |payload| {
        dispatch(shared, payload);
        ReadDecision::Consume
    });
}

/// Fan out one entry to every enabled sink, in a fixed order: stdout,
/// syslog, shared-memory ring, rolling file (skipped if the
/// shared-memory write already succeeded).
fn dispatch(shared: &Shared, entry: &[u8]) {
    let (level, date_minute, payload) = decode_entry(entry);

    if shared.config.appender.contains(Appender::STDOUT) {
        let _ = std::io::stdout().lock().write_all(payload);
    }

    if let Some(syslog) = &shared.syslog {
        syslog.log(level, &String::from_utf8_lossy(payload));
    }

    let shm_ok = shared
        .shm
        .as_ref()
        .map(|shm| matches!(shm.write(payload), ShmWriteOutcome::Written))
        .unwrap_or(false);

    if !shm_ok {
        if let Some(file) = &shared.file {
            let _ = file.lock().write_dated(date_minute, payload);
        }
    }

    let prev = shared.message_count.fetch_add(1, Ordering::Relaxed);
    if prev == u64::MAX {
        shared.round_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::Appender as AppenderBits;

    fn clock() -> Arc<RealTimeClock> {
        Arc::new(RealTimeClock::start())
    }

    #[test]
    fn level_gating_rejects_below_configured_level() {
        let mut cfg = LoggerConfig::named("app");
        cfg.log_level = Level::Warn;
        cfg.appender = AppenderBits::STDOUT;
        let logger = Logger::create(cfg, clock(), 1).unwrap();
        assert!(!logger.level_enabled(Level::Info));
        assert!(logger.level_enabled(Level::Warn));
        assert!(logger.level_enabled(Level::Error));
    }

    #[test]
    fn nowait_drops_on_full_ring_without_blocking() {
        let mut cfg = LoggerConfig::named("app");
        cfg.appender = AppenderBits::STDOUT;
        cfg.queue_length = 2;
        cfg.max_msg_size = 512;
        let logger = Logger::create(cfg, clock(), 1).unwrap();
        // Drive many nowait sends; none should hang even if some are
        // dropped under backpressure before the consumer catches up.
        let mut accepted = 0;
        for i in 0..200 {
            if logger.log_message(Level::Info, MaxWait::Nowait, format!("m{i}").as_bytes()) {
                accepted += 1;
            }
        }
        assert!(accepted > 0);
    }

    #[test]
    fn message_counter_advances_with_successful_sends() {
        let mut cfg = LoggerConfig::named("app");
        cfg.appender = AppenderBits::STDOUT;
        let logger = Logger::create(cfg, clock(), 7).unwrap();
        for i in 0..10 {
            assert!(logger.log_message(Level::Info, MaxWait::Infinite, format!("m{i}").as_bytes()));
        }
        // Give the consumer thread a moment to drain.
        std::thread::sleep(Duration::from_millis(50));
        let (count, _) = logger.log_messages();
        assert_eq!(count, 10);
    }

    #[test]
    fn id_and_ident_are_retained() {
        let cfg = LoggerConfig::named("svc");
        let logger = Logger::create(cfg, clock(), 42).unwrap();
        assert_eq!(logger.ident(), "svc");
        assert_eq!(logger.id(), 42);
    }
}
