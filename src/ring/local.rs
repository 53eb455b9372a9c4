//! Bounded in-process byte ring.
//!
//! A fixed-capacity byte arena holding variable-size entries, each prefixed
//! by a length header, with separate producer/consumer locks so writers and
//! the single drain thread never contend on the same mutex. Offsets are
//! monotonically increasing `u64` byte counters rather than a modular
//! `2*L` scheme: `readable = w_total - r_total` and `writable = L -
//! readable` give the same full/empty disambiguation without the modular
//! bookkeeping, and in practice never overflow within a process lifetime.
//!
//! One lock guards the producer-side offset arithmetic, one guards the
//! consumer-side, and both use `try_lock` so a contended ring reports back
//! pressure (`WriteOutcome::Again` / `ReadOutcome::Again`) instead of
//! blocking a producer thread on log statements.

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size, in bytes, of the length header prefixed to every entry. Chosen to
/// match `size_t` on a 64-bit host.
const HDR_SIZE: usize = 8;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Outcome of [`BoundedRing::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was written.
    Written,
    /// The ring is contended or does not currently have room; the caller may
    /// retry per its configured `max_wait_ms` policy.
    Again,
    /// The entry can never fit in this ring no matter how much drains —
    /// `payload_len` exceeds the ring's capacity.
    Fatal,
}

/// Decision returned by the callback passed to [`BoundedRing::read_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDecision {
    /// The entry was handled; advance past it.
    Consume,
    /// Leave the entry in place (e.g. a sink is temporarily unable to accept
    /// it) and stop draining for this call.
    Pause,
}

/// Outcome of [`BoundedRing::read_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// An entry was inspected; the bool reports whether it was consumed.
    Next(bool),
    /// Nothing to read, or the consumer lock was contended.
    Again,
}

struct Producer {
    w_total: u64,
}

struct Consumer {
    r_total: u64,
}

/// A fixed-capacity byte ring holding variable-length, self-delimited
/// entries. Safe for any number of producer threads and any number of
/// consumer threads, though the logger only ever runs one of each.
pub struct BoundedRing {
    capacity: usize,
    buf: UnsafeCell<Vec<u8>>,
    r_total: AtomicU64,
    w_total: AtomicU64,
    producer: Mutex<Producer>,
    consumer: Mutex<Consumer>,
}

// SAFETY: all access to `buf` happens only while holding `producer` (for the
// region being written) or `consumer` (for the region being read), and the
// two never alias: the producer only ever writes into bytes already counted
// as "writable" by the atomic offsets, the consumer only ever reads bytes
// already counted as "readable". The `AtomicU64` pair is the single source of
// truth both sides synchronize through (Acquire/Release below).
unsafe impl Sync for BoundedRing {}
unsafe impl Send for BoundedRing {}

impl BoundedRing {
    /// Create a ring of at least `capacity_bytes`, rounded up to a multiple
    /// of the entry header size so every wrap boundary lands on a header
    /// boundary (see the wrap handling in `write`).
    pub fn new(capacity_bytes: usize) -> Self {
        let capacity = align_up(capacity_bytes.max(HDR_SIZE), HDR_SIZE);
        BoundedRing {
            capacity,
            buf: UnsafeCell::new(vec![0u8; capacity]),
            r_total: AtomicU64::new(0),
            w_total: AtomicU64::new(0),
            producer: Mutex::new(Producer { w_total: 0 }),
            consumer: Mutex::new(Consumer { r_total: 0 }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently occupied by unread entries (including their headers
    /// and any wrap padding).
    pub fn readable(&self) -> usize {
        let w = self.w_total.load(Ordering::Acquire);
        let r = self.r_total.load(Ordering::Acquire);
        (w - r) as usize
    }

    /// Bytes currently free for a new entry.
    pub fn writable(&self) -> usize {
        self.capacity - self.readable()
    }

    fn buf_mut(&self) -> &mut [u8] {
        // SAFETY: see the `unsafe impl Sync` justification above.
        unsafe { &mut *self.buf.get() }
    }

    fn write_header(buf: &mut [u8], at: usize, len: u64) {
        buf[at..at + HDR_SIZE].copy_from_slice(&len.to_le_bytes());
    }

    fn read_header(buf: &[u8], at: usize) -> u64 {
        let mut raw = [0u8; HDR_SIZE];
        raw.copy_from_slice(&buf[at..at + HDR_SIZE]);
        u64::from_le_bytes(raw)
    }

    /// Reserve space for an entry of `payload_len` bytes and hand the caller
    /// a scratch slice to fill via `fill`. `fill` receives exactly
    /// `payload_len` bytes and must write all of them (an oversize-message
    /// truncation decision, if any, happens before this call — see
    /// `format::assemble`).
    pub fn write(&self, payload_len: usize, fill: impl FnOnce(&mut [u8])) -> WriteOutcome {
        let aligned = align_up(HDR_SIZE + payload_len, HDR_SIZE);
        if aligned > self.capacity {
            return WriteOutcome::Fatal;
        }

        let mut producer = match self.producer.try_lock() {
            Some(guard) => guard,
            None => return WriteOutcome::Again,
        };

        let r = self.r_total.load(Ordering::Acquire);
        let readable = (producer.w_total - r) as usize;
        let writable = self.capacity - readable;

        let p = (producer.w_total as usize) % self.capacity;
        let tail = self.capacity - p;
        // Stay in place whenever the tail gap is large enough; only wrap
        // when it is strictly smaller than what this entry needs.
        let wrap_cost = if tail < aligned { tail } else { 0 };
        let total_cost = aligned + wrap_cost;

        if total_cost > writable {
            return WriteOutcome::Again;
        }

        let buf = self.buf_mut();
        let write_at = if wrap_cost > 0 {
            // Sentinel: a zero-length header at the old tail tells the
            // reader "nothing more fits before the physical end, wrap".
            Self::write_header(buf, p, 0);
            0
        } else {
            p
        };

        Self::write_header(buf, write_at, payload_len as u64);
        fill(&mut buf[write_at + HDR_SIZE..write_at + HDR_SIZE + payload_len]);
        let pad_start = write_at + HDR_SIZE + payload_len;
        let pad_end = write_at + aligned;
        if pad_end > pad_start {
            buf[pad_start..pad_end].fill(0);
        }

        producer.w_total += (wrap_cost + aligned) as u64;
        self.w_total.store(producer.w_total, Ordering::Release);
        WriteOutcome::Written
    }

    /// Inspect the oldest unread entry, if any, and let `cb` decide whether
    /// to consume it. Returns `Again` if the consumer lock is contended or
    /// the ring is currently empty.
    pub fn read_next(&self, cb: impl FnOnce(&[u8]) -> ReadDecision) -> ReadOutcome {
        let mut consumer = match self.consumer.try_lock() {
            Some(guard) => guard,
            None => return ReadOutcome::Again,
        };

        let buf = self.buf_mut();
        loop {
            let w = self.w_total.load(Ordering::Acquire);
            if consumer.r_total == w {
                return ReadOutcome::Again;
            }

            let p = (consumer.r_total as usize) % self.capacity;
            let len = Self::read_header(buf, p);
            if len == 0 {
                // Wrap sentinel: skip the unused tail and retry at offset 0.
                let tail = self.capacity - p;
                consumer.r_total += tail as u64;
                self.r_total.store(consumer.r_total, Ordering::Release);
                continue;
            }

            let aligned = align_up(HDR_SIZE + len as usize, HDR_SIZE);
            let payload = &buf[p + HDR_SIZE..p + HDR_SIZE + len as usize];
            return match cb(payload) {
                ReadDecision::Consume => {
                    consumer.r_total += aligned as u64;
                    self.r_total.store(consumer.r_total, Ordering::Release);
                    ReadOutcome::Next(true)
                }
                ReadDecision::Pause => ReadOutcome::Next(false),
            };
        }
    }

    /// Drain up to `max_entries` via repeated [`Self::read_next`], stopping
    /// early on an empty ring, a paused entry, or consumer contention.
    /// Returns the number of entries actually consumed.
    pub fn read_batch(
        &self,
        max_entries: usize,
        mut cb: impl FnMut(&[u8]) -> ReadDecision,
    ) -> usize {
        let mut consumed = 0;
        for _ in 0..max_entries {
            match self.read_next(|payload| cb(payload)) {
                ReadOutcome::Next(true) => consumed += 1,
                ReadOutcome::Next(false) | ReadOutcome::Again => break,
            }
        }
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_str(ring: &BoundedRing, s: &str) -> WriteOutcome {
        ring.write(s.len(), |dst| dst.copy_from_slice(s.as_bytes()))
    }

    fn read_string(ring: &BoundedRing) -> Option<String> {
        let mut out = None;
        ring.read_next(|payload| {
            out = Some(String::from_utf8_lossy(payload).into_owned());
            ReadDecision::Consume
        });
        out
    }

    #[test]
    fn round_trips_single_entry() {
        let ring = BoundedRing::new(256);
        assert_eq!(write_str(&ring, "hello"), WriteOutcome::Written);
        assert_eq!(read_string(&ring).as_deref(), Some("hello"));
        assert_eq!(ring.readable(), 0);
    }

    #[test]
    fn fifo_ordering_preserved() {
        let ring = BoundedRing::new(1024);
        for i in 0..20 {
            assert_eq!(write_str(&ring, &format!("msg-{i}")), WriteOutcome::Written);
        }
        for i in 0..20 {
            assert_eq!(read_string(&ring), Some(format!("msg-{i}")));
        }
    }

    #[test]
    fn oversize_entry_is_fatal() {
        let ring = BoundedRing::new(64);
        let payload = vec![0u8; 1024];
        let outcome = ring.write(payload.len(), |dst| dst.copy_from_slice(&payload));
        assert_eq!(outcome, WriteOutcome::Fatal);
    }

    #[test]
    fn full_ring_reports_again() {
        let ring = BoundedRing::new(32); // room for one 16-byte entry plus header slack
        let payload = vec![b'x'; 16];
        assert_eq!(
            ring.write(payload.len(), |dst| dst.copy_from_slice(&payload)),
            WriteOutcome::Written
        );
        let second = ring.write(payload.len(), |dst| dst.copy_from_slice(&payload));
        assert_eq!(second, WriteOutcome::Again);
    }

    #[test]
    fn readable_plus_writable_equals_capacity() {
        let ring = BoundedRing::new(256);
        write_str(&ring, "abc");
        assert_eq!(ring.readable() + ring.writable(), ring.capacity());
        read_string(&ring);
        assert_eq!(ring.readable() + ring.writable(), ring.capacity());
    }

    #[test]
    fn wrap_around_preserves_fifo_order() {
        // Small ring forces the writer to wrap partway through the run.
        let ring = BoundedRing::new(64);
        let mut expected = Vec::new();
        for i in 0..50 {
            let msg = format!("m{i}");
            loop {
                match write_str(&ring, &msg) {
                    WriteOutcome::Written => {
                        expected.push(msg.clone());
                        break;
                    }
                    WriteOutcome::Again => {
                        // Drain one to make room, as the logger's consumer
                        // thread would under backpressure.
                        let got = read_string(&ring).expect("ring reported Again but was empty");
                        assert_eq!(got, expected.remove(0));
                    }
                    WriteOutcome::Fatal => panic!("entry should always fit"),
                }
            }
        }
        while !expected.is_empty() {
            let got = read_string(&ring).expect("entry missing during drain");
            assert_eq!(got, expected.remove(0));
        }
    }

    #[test]
    fn pause_leaves_entry_for_next_call() {
        let ring = BoundedRing::new(256);
        write_str(&ring, "held-back");
        let outcome = ring.read_next(|_| ReadDecision::Pause);
        assert_eq!(outcome, ReadOutcome::Next(false));
        assert_eq!(ring.readable() > 0, true);
        assert_eq!(read_string(&ring).as_deref(), Some("held-back"));
    }

    #[test]
    fn empty_ring_reports_again() {
        let ring = BoundedRing::new(256);
        assert_eq!(
            ring.read_next(|_| ReadDecision::Consume),
            ReadOutcome::Again
        );
    }

    #[test]
    fn read_batch_stops_at_empty() {
        let ring = BoundedRing::new(1024);
        for i in 0..5 {
            write_str(&ring, &format!("e{i}"));
        }
        let mut seen = Vec::new();
        let consumed = ring.read_batch(10, |payload| {
            seen.push(String::from_utf8_lossy(payload).into_owned());
            ReadDecision::Consume
        });
        assert_eq!(consumed, 5);
        assert_eq!(seen, vec!["e0", "e1", "e2", "e3", "e4"]);
    }
}
