//! Process-shared robust mutex and counting semaphore, built directly on
//! `libc` pthread calls.
//!
//! A `pthread_mutex_t` configured `PTHREAD_PROCESS_SHARED |
//! PTHREAD_MUTEX_ROBUST` so that a holder which crashes while holding the
//! lock leaves it recoverable (the next locker gets `EOWNERDEAD`, calls
//! `pthread_mutex_consistent`, and proceeds). The semaphore is built from a
//! second such mutex plus a process-shared condition variable and a plain
//! counter, rather than a POSIX named semaphore, so its own lock benefits
//! from the same crash-recovery path.
//!
//! No existing crate safely exposes `PTHREAD_MUTEX_ROBUST` placed inside
//! an arbitrary shared mapping, so this is hand-rolled `unsafe` code
//! operating on raw `libc` types, justifying the `libc` dependency.

use std::io;
use std::mem::MaybeUninit;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long a waiter is willing to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Return immediately if the resource is unavailable.
    NoWait,
    /// Block forever.
    Infinite,
    /// Block for at most this long.
    Millis(u64),
}

fn check(err: i32) -> io::Result<()> {
    if err == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(err))
    }
}

fn deadline_from_now(timeout: Duration) -> libc::timespec {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let at = now + timeout;
    libc::timespec {
        tv_sec: at.as_secs() as libc::time_t,
        tv_nsec: at.subsec_nanos() as libc::c_long,
    }
}

/// A `pthread_mutex_t` initialized process-shared and robust. Must live
/// inside memory shared across the processes that use it (typically a
/// `mmap`ped region) and must never be moved once initialized.
#[repr(C)]
pub struct RobustMutex {
    inner: libc::pthread_mutex_t,
}

impl RobustMutex {
    /// Initialize the mutex in place at `place`.
    ///
    /// # Safety
    /// `place` must point to valid, writable shared memory large enough
    /// for `RobustMutex` and must outlive every process using it.
    pub unsafe fn init(place: *mut RobustMutex) -> io::Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
        let mut attr = attr.assume_init();
        check(libc::pthread_mutexattr_setpshared(
            &mut attr,
            libc::PTHREAD_PROCESS_SHARED,
        ))?;
        check(libc::pthread_mutexattr_setrobust(
            &mut attr,
            libc::PTHREAD_MUTEX_ROBUST,
        ))?;
        let result = check(libc::pthread_mutex_init(
            std::ptr::addr_of_mut!((*place).inner),
            &attr,
        ));
        libc::pthread_mutexattr_destroy(&mut attr);
        result
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn raw(&self) -> *mut libc::pthread_mutex_t {
        std::ptr::addr_of!(self.inner) as *mut _
    }

    /// Block until the lock is acquired, recovering automatically from a
    /// prior holder that crashed while holding it.
    ///
    /// # Safety
    /// `self` must be a live, initialized `RobustMutex`.
    pub unsafe fn lock(&self) -> io::Result<()> {
        loop {
            match libc::pthread_mutex_lock(self.raw()) {
                0 => return Ok(()),
                libc::EOWNERDEAD => {
                    self.make_consistent_and_unlock();
                    continue;
                }
                e => return Err(io::Error::from_raw_os_error(e)),
            }
        }
    }

    /// Non-blocking lock attempt. Returns `Ok(false)` if currently held.
    ///
    /// # Safety
    /// `self` must be a live, initialized `RobustMutex`.
    pub unsafe fn try_lock(&self) -> io::Result<bool> {
        loop {
            match libc::pthread_mutex_trylock(self.raw()) {
                0 => return Ok(true),
                libc::EBUSY => return Ok(false),
                libc::EOWNERDEAD => {
                    self.make_consistent_and_unlock();
                    continue;
                }
                e => return Err(io::Error::from_raw_os_error(e)),
            }
        }
    }

    /// # Safety
    /// `self` must be a live, initialized `RobustMutex` currently locked by
    /// the calling thread.
    pub unsafe fn unlock(&self) {
        libc::pthread_mutex_unlock(self.raw());
    }

    unsafe fn make_consistent_and_unlock(&self) {
        libc::pthread_mutex_consistent(self.raw());
        libc::pthread_mutex_unlock(self.raw());
    }
}

/// A counting semaphore built from a robust mutex plus a process-shared
/// condition variable, matching `shmmap_semaphore_t` rather than a POSIX
/// named semaphore.
#[repr(C)]
pub struct Semaphore {
    lock: libc::pthread_mutex_t,
    nonzero: libc::pthread_cond_t,
    count: i64,
}

impl Semaphore {
    /// Initialize the semaphore in place at `place` with an initial count
    /// of zero.
    ///
    /// # Safety
    /// `place` must point to valid, writable shared memory large enough
    /// for `Semaphore` and must outlive every process using it.
    pub unsafe fn init(place: *mut Semaphore) -> io::Result<()> {
        let mut mattr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(libc::pthread_mutexattr_init(mattr.as_mut_ptr()))?;
        let mut mattr = mattr.assume_init();
        check(libc::pthread_mutexattr_setpshared(
            &mut mattr,
            libc::PTHREAD_PROCESS_SHARED,
        ))?;
        check(libc::pthread_mutexattr_setrobust(
            &mut mattr,
            libc::PTHREAD_MUTEX_ROBUST,
        ))?;
        check(libc::pthread_mutex_init(
            std::ptr::addr_of_mut!((*place).lock),
            &mattr,
        ))?;
        libc::pthread_mutexattr_destroy(&mut mattr);

        let mut cattr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check(libc::pthread_condattr_init(cattr.as_mut_ptr()))?;
        let mut cattr = cattr.assume_init();
        check(libc::pthread_condattr_setpshared(
            &mut cattr,
            libc::PTHREAD_PROCESS_SHARED,
        ))?;
        let result = check(libc::pthread_cond_init(
            std::ptr::addr_of_mut!((*place).nonzero),
            &cattr,
        ));
        libc::pthread_condattr_destroy(&mut cattr);
        (*place).count = 0;
        result
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn lock_raw(&self) -> *mut libc::pthread_mutex_t {
        std::ptr::addr_of!(self.lock) as *mut _
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn cond_raw(&self) -> *mut libc::pthread_cond_t {
        std::ptr::addr_of!(self.nonzero) as *mut _
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn count_raw(&self) -> *mut i64 {
        std::ptr::addr_of!(self.count) as *mut _
    }

    unsafe fn lock_guarded(&self) -> io::Result<()> {
        loop {
            match libc::pthread_mutex_lock(self.lock_raw()) {
                0 => return Ok(()),
                libc::EOWNERDEAD => {
                    libc::pthread_mutex_consistent(self.lock_raw());
                    libc::pthread_mutex_unlock(self.lock_raw());
                    continue;
                }
                e => return Err(io::Error::from_raw_os_error(e)),
            }
        }
    }

    /// Increment the count and wake one waiter, if any.
    ///
    /// # Safety
    /// `self` must be a live, initialized `Semaphore`.
    pub unsafe fn post(&self) -> io::Result<()> {
        self.lock_guarded()?;
        *self.count_raw() += 1;
        if *self.count_raw() == 1 {
            libc::pthread_cond_signal(self.cond_raw());
        }
        libc::pthread_mutex_unlock(self.lock_raw());
        Ok(())
    }

    /// Wait for the count to be positive, then decrement it. Returns
    /// `Ok(true)` if acquired, `Ok(false)` on a [`WaitTimeout::NoWait`] or
    /// [`WaitTimeout::Millis`] timeout.
    ///
    /// # Safety
    /// `self` must be a live, initialized `Semaphore`.
    pub unsafe fn wait(&self, timeout: WaitTimeout) -> io::Result<bool> {
        self.lock_guarded()?;
        let result = loop {
            if *self.count_raw() > 0 {
                *self.count_raw() -= 1;
                break Ok(true);
            }
            match timeout {
                WaitTimeout::NoWait => break Ok(false),
                WaitTimeout::Infinite => {
                    let err = libc::pthread_cond_wait(self.cond_raw(), self.lock_raw());
                    if err == libc::EOWNERDEAD {
                        libc::pthread_mutex_consistent(self.lock_raw());
                        continue;
                    }
                    if err != 0 {
                        break Err(io::Error::from_raw_os_error(err));
                    }
                }
                WaitTimeout::Millis(ms) => {
                    let deadline = deadline_from_now(Duration::from_millis(ms));
                    let err =
                        libc::pthread_cond_timedwait(self.cond_raw(), self.lock_raw(), &deadline);
                    match err {
                        0 => continue,
                        libc::ETIMEDOUT => break Ok(false),
                        libc::EOWNERDEAD => {
                            libc::pthread_mutex_consistent(self.lock_raw());
                            continue;
                        }
                        e => break Err(io::Error::from_raw_os_error(e)),
                    }
                }
            }
        };
        libc::pthread_mutex_unlock(self.lock_raw());
        result
    }
}
