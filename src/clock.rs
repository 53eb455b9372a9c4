//! Real-time clock: aligned wall-clock ticks, timezone/DST resolution, and
//! localtime decomposition.
//!
//! A background thread refreshes a shared "last tick" value so hot-path
//! readers never pay for a syscall, woken by a `parking_lot::Condvar` on
//! shutdown rather than blocking on a raw OS mutex. Timestamp decomposition
//! itself is delegated to `chrono`.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Resolution at which [`RealTimeClock::tick`] aligns its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResolution {
    Second,
    Millisecond,
}

impl TickResolution {
    fn nanos(self) -> i64 {
        match self {
            TickResolution::Second => 1_000_000_000,
            TickResolution::Millisecond => 1_000_000,
        }
    }
}

/// A wall-clock reading at some resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub seconds: i64,
    pub nanoseconds: u32,
}

/// Year/month/day/hour/minute/second/weekday decomposition of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenDownTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// 0 = Sunday, matching the conventional C `tm_wday` layout.
    pub weekday: u32,
}

struct ClockInner {
    last_tick_nanos: AtomicI64,
    shutdown: Mutex<bool>,
    cv: Condvar,
}

/// Background-refreshed wall-clock source.
///
/// A dedicated thread periodically aligns `now()` down to the millisecond
/// and stores it atomically; concurrent readers get a coarse but monotonic
/// snapshot with no syscall on the hot path.
pub struct RealTimeClock {
    inner: Arc<ClockInner>,
    handle: Option<JoinHandle<()>>,
}

fn now_nanos() -> i64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    d.as_nanos() as i64
}

impl RealTimeClock {
    /// Start the background refresh thread, aligning at millisecond
    /// resolution (the finest the public `tick` API exposes).
    pub fn start() -> Self {
        let inner = Arc::new(ClockInner {
            last_tick_nanos: AtomicI64::new(now_nanos()),
            shutdown: Mutex::new(false),
            cv: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || {
            let mut guard = worker_inner.shutdown.lock();
            loop {
                let timed_out = worker_inner
                    .cv
                    .wait_for(&mut guard, Duration::from_millis(1))
                    .timed_out();
                if *guard {
                    break;
                }
                if timed_out {
                    worker_inner
                        .last_tick_nanos
                        .store(now_nanos(), Ordering::Relaxed);
                }
            }
        });

        RealTimeClock {
            inner,
            handle: Some(handle),
        }
    }

    /// Aligned wall-clock snapshot at the requested resolution.
    pub fn tick(&self, resolution: TickResolution) -> Tick {
        let nanos = self.inner.last_tick_nanos.load(Ordering::Relaxed);
        let align = resolution.nanos();
        let aligned = (nanos / align) * align;
        Tick {
            seconds: aligned / 1_000_000_000,
            nanoseconds: (aligned % 1_000_000_000) as u32,
        }
    }

    /// `(offset_minutes, "+HHMM")` for the local timezone, evaluated at the
    /// current instant (DST transitions shift the offset across calls).
    pub fn timezone(&self) -> (i32, String) {
        let offset_seconds = Local::now().offset().local_minus_utc();
        let offset_minutes = offset_seconds / 60;
        let sign = if offset_minutes < 0 { '-' } else { '+' };
        let abs_minutes = offset_minutes.abs();
        (
            offset_minutes,
            format!("{sign}{:02}{:02}", abs_minutes / 60, abs_minutes % 60),
        )
    }

    /// Whether the local timezone currently observes daylight saving.
    /// Approximated by comparing the current UTC offset against the offset
    /// six months from now: if they differ, the zone observes DST and we are
    /// currently in the shifted period when the offset is larger to the east
    /// (ahead) of the non-DST baseline.
    pub fn daylight(&self) -> bool {
        let now = Local::now();
        let six_months = now + chrono::Duration::days(182);
        now.offset().local_minus_utc() != six_months.offset().local_minus_utc()
    }

    /// Decompose `timestamp` (Unix seconds) into calendar fields, either in
    /// UTC or shifted by `offset_minutes` (as returned by [`Self::timezone`]).
    pub fn localtime(use_local: bool, offset_minutes: i32, timestamp: i64) -> BrokenDownTime {
        let dt: DateTime<Utc> = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
        let shifted = if use_local {
            dt + chrono::Duration::minutes(offset_minutes as i64)
        } else {
            dt
        };
        BrokenDownTime {
            year: shifted.year(),
            month: shifted.month(),
            day: shifted.day(),
            hour: shifted.hour(),
            minute: shifted.minute(),
            second: shifted.second(),
            weekday: shifted.weekday().num_days_from_sunday(),
        }
    }
}

impl Drop for RealTimeClock {
    fn drop(&mut self) {
        *self.inner.shutdown.lock() = true;
        self.inner.cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic_nondecreasing() {
        let clock = RealTimeClock::start();
        let first = clock.tick(TickResolution::Millisecond);
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.tick(TickResolution::Millisecond);
        let first_nanos = first.seconds * 1_000_000_000 + first.nanoseconds as i64;
        let second_nanos = second.seconds * 1_000_000_000 + second.nanoseconds as i64;
        assert!(second_nanos >= first_nanos);
    }

    #[test]
    fn tick_second_resolution_zeroes_subsecond() {
        let clock = RealTimeClock::start();
        let t = clock.tick(TickResolution::Second);
        assert_eq!(t.nanoseconds, 0);
    }

    #[test]
    fn timezone_offset_formats_sign() {
        let clock = RealTimeClock::start();
        let (_, formatted) = clock.timezone();
        assert!(formatted.starts_with('+') || formatted.starts_with('-'));
        assert_eq!(formatted.len(), 5);
    }

    #[test]
    fn localtime_decomposes_known_epoch() {
        // 2024-01-02 03:04:05 UTC
        let bdt = RealTimeClock::localtime(false, 0, 1704164645);
        assert_eq!(bdt.year, 2024);
        assert_eq!(bdt.month, 1);
        assert_eq!(bdt.day, 2);
        assert_eq!(bdt.hour, 3);
        assert_eq!(bdt.minute, 4);
        assert_eq!(bdt.second, 5);
    }

    #[test]
    fn localtime_applies_offset() {
        let utc = RealTimeClock::localtime(false, 0, 1704164645);
        let shifted = RealTimeClock::localtime(true, 60, 1704164645); // +1h
        assert_eq!(shifted.hour, (utc.hour + 1) % 24);
    }

    #[test]
    fn drop_joins_background_thread() {
        let clock = RealTimeClock::start();
        drop(clock);
        // reaching here without hanging demonstrates the shutdown signal
        // woke the background thread and the join completed.
    }
}
