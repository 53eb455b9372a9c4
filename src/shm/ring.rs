//! The cross-process variable-entry ring buffer.
//!
//! The entry write/read protocol mirrors [`crate::ring::local`] (zero-length
//! header as a wrap sentinel, header-aligned entries) — only the locks
//! (robust, process-shared) and the offset representation (kept literally
//! `modulo 2L` to match the on-wire header layout, rather than the
//! unbounded monotonic counters the in-process ring uses) differ.
//!
//! `read_offset`/`write_offset` are plain `AtomicU64`s: a native atomic
//! load/store already gives a well-defined cross-process read of the
//! offset on every platform Rust supports shared memory on, so no
//! additional per-offset mutex is needed.

use super::robust::{RobustMutex, Semaphore, WaitTimeout};
use super::token;
use crate::error::{FerrologError, Result};
use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

const HDR_SIZE: u64 = 8;

fn align_up(n: u64, align: u64) -> u64 {
    ((n + align - 1) / align) * align
}

/// Outcome of a single write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmWriteOutcome {
    Written,
    /// The writer lock is held elsewhere, or there is not enough free
    /// space right now; the caller should retry.
    Again,
    /// The entry can never fit in this ring regardless of contention.
    Fatal,
}

/// Outcome of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmReadOutcome {
    /// `true` if an entry was consumed and the read cursor advanced,
    /// `false` if the callback asked to pause and leave it in place.
    Next(bool),
    /// The reader lock is held elsewhere, or the ring is empty.
    Again,
}

/// Outcome of waiting on the ring's semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Fixed-size header placed at the start of the mapping, immediately
/// followed by the `Length`-byte payload ring.
#[repr(C)]
struct ShmHeader {
    mapped_size: AtomicU64,
    magic: AtomicU64,
    cipher: AtomicU64,
    semaphore: Semaphore,
    read_lock: RobustMutex,
    write_lock: RobustMutex,
    write_offset: AtomicU64,
    read_offset: AtomicU64,
    length: AtomicU64,
}

/// A shared-memory ring buffer, either freshly created or attached to an
/// existing segment left behind by another process.
pub struct ShmRing {
    header: *mut ShmHeader,
    buffer: *mut u8,
    map_len: usize,
    length: u64,
    name: String,
    created: bool,
}

unsafe impl Send for ShmRing {}
unsafe impl Sync for ShmRing {}

impl ShmRing {
    /// Create or attach to a POSIX shared-memory segment named `name`
    /// holding a ring of `payload_len` bytes, authenticated with `token`
    /// (`None` disables authentication on a fresh create).
    pub fn create_or_attach(name: &str, payload_len: u64, token: Option<u64>) -> Result<Self> {
        let header_len = std::mem::size_of::<ShmHeader>() as u64;
        let map_len = align_up(header_len + payload_len, 4096);
        let cname = CString::new(name)
            .map_err(|e| FerrologError::ResourceOpen(format!("invalid shm name {name}: {e}")))?;

        let (fd, created) = Self::open_or_attach_fd(&cname)
            .map_err(|e| FerrologError::ResourceOpen(format!("shm_open {name}: {e}")))?;

        if created {
            let rc = unsafe { libc::ftruncate(fd, map_len as libc::off_t) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(FerrologError::ResourceOpen(format!(
                    "ftruncate {name}: {err}"
                )));
            }
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len as libc::size_t,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if addr == libc::MAP_FAILED {
            return Err(FerrologError::ResourceOpen(format!(
                "mmap {name}: {}",
                io::Error::last_os_error()
            )));
        }

        let header = addr as *mut ShmHeader;
        let buffer = unsafe { (addr as *mut u8).add(header_len as usize) };

        if created {
            unsafe {
                ptr::write_bytes(addr as *mut u8, 0, map_len as usize);
                RobustMutex::init(ptr::addr_of_mut!((*header).read_lock))
                    .map_err(|e| FerrologError::ResourceOpen(e.to_string()))?;
                RobustMutex::init(ptr::addr_of_mut!((*header).write_lock))
                    .map_err(|e| FerrologError::ResourceOpen(e.to_string()))?;
                Semaphore::init(ptr::addr_of_mut!((*header).semaphore))
                    .map_err(|e| FerrologError::ResourceOpen(e.to_string()))?;
                (*header).mapped_size.store(map_len, Ordering::Relaxed);
                (*header).length.store(payload_len, Ordering::Relaxed);
                (*header).write_offset.store(0, Ordering::Relaxed);
                (*header).read_offset.store(0, Ordering::Relaxed);

                let magic = token::generate_magic();
                (*header).magic.store(magic, Ordering::Relaxed);
                let cipher = match token {
                    Some(t) => token::encipher(magic, t),
                    None => 0,
                };
                (*header).cipher.store(cipher, Ordering::Relaxed);
            }
        } else {
            let stored_len = unsafe { (*header).length.load(Ordering::Relaxed) };
            if stored_len != payload_len {
                unsafe { libc::munmap(addr, map_len as libc::size_t) };
                return Err(FerrologError::ResourceOpen(format!(
                    "{name}: size mismatch (existing {stored_len}, requested {payload_len})"
                )));
            }
            let cipher = unsafe { (*header).cipher.load(Ordering::Relaxed) };
            let magic = unsafe { (*header).magic.load(Ordering::Relaxed) };
            if !token::verify(cipher, magic, token) {
                unsafe { libc::munmap(addr, map_len as libc::size_t) };
                return Err(FerrologError::TokenMismatch(name.to_string()));
            }
        }

        Ok(ShmRing {
            header,
            buffer,
            map_len: map_len as usize,
            length: payload_len,
            name: name.to_string(),
            created,
        })
    }

    fn open_or_attach_fd(name: &CString) -> io::Result<(libc::c_int, bool)> {
        let fd = unsafe {
            libc::shm_open(
                name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o600,
            )
        };
        if fd >= 0 {
            return Ok((fd, true));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(err);
        }
        let fd = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o600) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((fd, false))
    }

    /// Name of the POSIX shared-memory object backing this ring.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this call created the segment, as opposed to attaching to
    /// one left behind by another process.
    pub fn created(&self) -> bool {
        self.created
    }

    fn header(&self) -> &ShmHeader {
        unsafe { &*self.header }
    }

    fn buf_mut(&self, offset: u64, len: u64) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.buffer.add(offset as usize), len as usize) }
    }

    fn buf(&self, offset: u64, len: u64) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.buffer.add(offset as usize), len as usize) }
    }

    /// Write one entry, reserving `payload.len()` bytes and copying it in
    /// under the writer lock, then posting the semaphore on success.
    pub fn write(&self, payload: &[u8]) -> ShmWriteOutcome {
        let l = self.length;
        let aligned = align_up(HDR_SIZE + payload.len() as u64, HDR_SIZE);
        if aligned > l {
            return ShmWriteOutcome::Fatal;
        }

        let acquired = unsafe { self.header().write_lock.try_lock() };
        match acquired {
            Ok(true) => {}
            Ok(false) => return ShmWriteOutcome::Again,
            Err(_) => return ShmWriteOutcome::Again,
        }

        let ro = self.header().read_offset.load(Ordering::Acquire);
        let wo = self.header().write_offset.load(Ordering::Acquire);
        let wrap = ro / l != wo / l;
        let r = ro % l;
        let w = wo % l;
        let readable = if wrap { l + w - r } else { w - r };
        let writable = l - readable;

        let tail = l - w;
        let wrap_cost = if tail < aligned { tail } else { 0 };
        let total = aligned + wrap_cost;
        if total > writable {
            unsafe { self.header().write_lock.unlock() };
            return ShmWriteOutcome::Again;
        }

        let write_at = if wrap_cost > 0 {
            self.write_header(w, 0);
            0
        } else {
            w
        };
        self.write_header(write_at, payload.len() as u64);
        self.buf_mut(write_at + HDR_SIZE, payload.len() as u64)
            .copy_from_slice(payload);

        let new_wo = (wo + wrap_cost + aligned) % (2 * l);
        self.header().write_offset.store(new_wo, Ordering::Release);
        unsafe { self.header().write_lock.unlock() };

        let _ = unsafe { self.header().semaphore.post() };
        ShmWriteOutcome::Written
    }

    /// Attempt to read and consume (or peek and pause) the next entry.
    pub fn read_next(&self, cb: impl FnOnce(&[u8]) -> bool) -> ShmReadOutcome {
        let l = self.length;
        let acquired = unsafe { self.header().read_lock.try_lock() };
        match acquired {
            Ok(true) => {}
            Ok(false) => return ShmReadOutcome::Again,
            Err(_) => return ShmReadOutcome::Again,
        }

        let outcome = loop {
            let wo = self.header().write_offset.load(Ordering::Acquire);
            let ro = self.header().read_offset.load(Ordering::Acquire);
            if ro == wo {
                break ShmReadOutcome::Again;
            }
            let p = ro % l;
            let entry_len = self.read_header(p);
            if entry_len == 0 {
                let tail = l - p;
                let new_ro = (ro + tail) % (2 * l);
                self.header().read_offset.store(new_ro, Ordering::Release);
                continue;
            }
            let aligned = align_up(HDR_SIZE + entry_len, HDR_SIZE);
            let payload = self.buf(p + HDR_SIZE, entry_len);
            if cb(payload) {
                let new_ro = (ro + aligned) % (2 * l);
                self.header().read_offset.store(new_ro, Ordering::Release);
                break ShmReadOutcome::Next(true);
            } else {
                break ShmReadOutcome::Next(false);
            }
        };

        unsafe { self.header().read_lock.unlock() };
        outcome
    }

    /// Drain up to `max_entries`, stopping early on `Again` or a paused
    /// callback. Returns the number of entries actually consumed.
    pub fn read_batch(&self, max_entries: usize, mut cb: impl FnMut(&[u8]) -> bool) -> usize {
        let mut consumed = 0;
        while consumed < max_entries {
            match self.read_next(&mut cb) {
                ShmReadOutcome::Next(true) => consumed += 1,
                _ => break,
            }
        }
        consumed
    }

    /// Block (per `timeout`) until the semaphore is posted by a writer.
    pub fn wait(&self, timeout: WaitTimeout) -> WaitOutcome {
        match unsafe { self.header().semaphore.wait(timeout) } {
            Ok(true) => WaitOutcome::Signaled,
            _ => WaitOutcome::TimedOut,
        }
    }

    fn write_header(&self, offset: u64, len: u64) {
        self.buf_mut(offset, HDR_SIZE).copy_from_slice(&len.to_le_bytes());
    }

    fn read_header(&self, offset: u64) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.buf(offset, HDR_SIZE));
        u64::from_le_bytes(bytes)
    }
}

impl Drop for ShmRing {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.header as *mut libc::c_void, self.map_len as libc::size_t);
        }
    }
}

/// Unlink (remove) a named shared-memory segment. Safe to call even if no
/// process currently has it mapped; existing mappings remain valid until
/// their last holder drops.
pub fn unlink(name: &str) -> io::Result<()> {
    let cname = CString::new(name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
    if rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::ENOENT) {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
