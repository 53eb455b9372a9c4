//! Thin syslog sink, dispatched to alongside stdout and the rolling file.
//!
//! A direct `libc::syslog` call (the `"%s"`-format trick sidesteps Rust's
//! lack of C variadic calls) rather than a dedicated syslog crate, since
//! `libc` is already part of the dependency set for the shared-memory ring.

use crate::levels::Level;
use std::ffi::CString;
use std::sync::Once;

fn priority_for(level: Level) -> Option<libc::c_int> {
    match level {
        Level::Fatal => Some(libc::LOG_EMERG),
        Level::Error => Some(libc::LOG_ERR),
        Level::Warn => Some(libc::LOG_WARNING),
        Level::Info => Some(libc::LOG_INFO),
        Level::Debug => Some(libc::LOG_DEBUG),
        Level::Trace | Level::All | Level::Off => None,
    }
}

static OPEN_ONCE: Once = Once::new();

/// A handle to the process-wide syslog connection, opened under `ident`.
/// `openlog` is process-global in POSIX, so only the first `Syslog::open`
/// call in a process actually calls it; later loggers share that
/// connection under their own ident prefix embedded in each message.
pub struct Syslog {
    ident: String,
}

impl Syslog {
    pub fn open(ident: &str) -> Self {
        OPEN_ONCE.call_once(|| {
            let leaked: &'static CString =
                Box::leak(Box::new(CString::new("ferrolog").unwrap()));
            unsafe {
                libc::openlog(leaked.as_ptr(), libc::LOG_PID | libc::LOG_CONS, libc::LOG_USER);
            }
        });
        Syslog {
            ident: ident.to_string(),
        }
    }

    /// Emit `message` at the syslog priority mapped from `level`. Returns
    /// `false` (a no-op) for `Trace`/`All`/`Off`, which have no syslog
    /// priority per the dispatch table.
    pub fn log(&self, level: Level, message: &str) -> bool {
        let Some(priority) = priority_for(level) else {
            return false;
        };
        let sanitized: String = message.chars().filter(|&c| c != '\0').collect();
        let Ok(msg) = CString::new(format!("[{}] {sanitized}", self.ident)) else {
            return false;
        };
        unsafe {
            let fmt = b"%s\0";
            libc::syslog(priority, fmt.as_ptr() as *const libc::c_char, msg.as_ptr());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_and_all_have_no_priority() {
        assert!(priority_for(Level::Trace).is_none());
        assert!(priority_for(Level::All).is_none());
        assert!(priority_for(Level::Off).is_none());
    }

    #[test]
    fn severe_levels_map_to_known_priorities() {
        assert_eq!(priority_for(Level::Fatal), Some(libc::LOG_EMERG));
        assert_eq!(priority_for(Level::Error), Some(libc::LOG_ERR));
        assert_eq!(priority_for(Level::Warn), Some(libc::LOG_WARNING));
        assert_eq!(priority_for(Level::Info), Some(libc::LOG_INFO));
        assert_eq!(priority_for(Level::Debug), Some(libc::LOG_DEBUG));
    }
}
