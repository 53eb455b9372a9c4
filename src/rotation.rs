//! Rolling file appender.
//!
//! A rotation check decides whether the current file needs to change (the
//! date bucket moved, or the configured size ceiling was reached), then
//! rotation proceeds in one of two modes — append mode cycles through a
//! fixed set of numbered files and deletes whichever one it is about to
//! reuse, shift mode renames the whole chain up by one slot and drops the
//! oldest. The file handle tracks its own byte offset in memory rather
//! than stat'ing the file on every write.

use crate::config::LoggerConfig;
use crate::error::{FerrologError, Result};
use crate::levels::RollingTimeUnit;
use chrono::{Local, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Substitute `<IDENT>`, `<PID>`, and `<DATE>` in a name pattern. `<DATE>` is
/// left as a marker (`\u{0}DATE\u{0}`) for [`split_on_date`] to locate rather
/// than expanded here, since its expansion depends on the rolling time unit
/// and changes at every rotation.
fn substitute_ident_pid(pattern: &str, ident: &str, pid: u32) -> String {
    pattern
        .replace("<IDENT>", ident)
        .replace("<PID>", &pid.to_string())
}

/// Split a name (with `<IDENT>`/`<PID>` already substituted) at its first
/// `<DATE>` token into `(before, Some(after))`, or `(whole, None)` if the
/// pattern never named a date component.
fn split_on_date(name: &str) -> (String, Option<String>) {
    match name.find("<DATE>") {
        Some(pos) => {
            let before = name[..pos].to_string();
            let after = name[pos + "<DATE>".len()..].to_string();
            (before, Some(after))
        }
        None => (name.to_string(), None),
    }
}

fn ensure_trailing_separator(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// The date-minute bucket for "now", used only to pick the file to open
/// before any record has passed through the producer — once logging
/// starts, every rotation decision uses the record's own embedded
/// date-minute string instead (see [`RollingFileAppender::write_dated`]),
/// so this must format identically to [`crate::format::date_minute_string`]
/// or the very first write would see a spurious bucket change.
fn date_tag(unit: RollingTimeUnit, local_time: bool) -> String {
    let now = if local_time {
        Local::now().with_timezone(&Utc)
    } else {
        Utc::now()
    };
    crate::format::date_minute_string(now, unit)
}

/// Append ".N" directly to the full path's file name, rather than before
/// the extension.
fn numbered(path: &Path, n: usize) -> PathBuf {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    path.with_file_name(format!("{name}.{n}"))
}

/// A single rolling log file, rotated by size and/or by date-minute bucket.
pub struct RollingFileAppender {
    name_base: String,
    date_suffix: Option<String>,
    rolling_time: RollingTimeUnit,
    local_time: bool,
    max_file_size: u64,
    max_file_count: usize,
    rolling_append: bool,
    append_file_no: usize,
    current_path: PathBuf,
    current_date_tag: Option<String>,
    file: File,
    offset_bytes: u64,
}

impl RollingFileAppender {
    /// Open (creating if needed) the rolling file described by `config`.
    pub fn open(config: &LoggerConfig) -> Result<Self> {
        let resolved = substitute_ident_pid(&config.name_prefix, &config.ident, std::process::id());
        let (before, date_suffix) = split_on_date(&resolved);
        let path_prefix = ensure_trailing_separator(&config.path_prefix);
        let name_base = format!("{path_prefix}{before}");

        let max_file_count = config.max_file_count.max(1);
        let max_file_size = config.max_file_size.max(1);
        let rolling_time = config.rolling_time;
        let local_time = config.local_time;

        let tag =
            (rolling_time != RollingTimeUnit::None).then(|| date_tag(rolling_time, local_time));
        let suffix = date_suffix.as_deref().unwrap_or("");
        let path = match tag.as_deref() {
            Some(tag) => PathBuf::from(format!("{name_base}{tag}{suffix}")),
            None if date_suffix.is_some() => PathBuf::from(format!("{name_base}0{suffix}")),
            None => PathBuf::from(&name_base),
        };
        let (file, len) = Self::open_existing_or_create(&path)
            .map_err(|e| FerrologError::ResourceOpen(format!("{}: {e}", path.display())))?;

        Ok(RollingFileAppender {
            name_base,
            date_suffix,
            rolling_time,
            local_time,
            max_file_size,
            max_file_count,
            rolling_append: config.rolling_append,
            append_file_no: 0,
            current_path: path,
            current_date_tag: tag,
            file,
            offset_bytes: len,
        })
    }

    fn path_for_tag(&self, tag: Option<&str>) -> PathBuf {
        let suffix = self.date_suffix.as_deref().unwrap_or("");
        match tag {
            Some(tag) => PathBuf::from(format!("{}{tag}{suffix}", self.name_base)),
            None if self.date_suffix.is_some() => {
                // No rolling-time policy but the pattern still named a date
                // slot: fill it with a literal "0".
                PathBuf::from(format!("{}0{suffix}", self.name_base))
            }
            None => PathBuf::from(&self.name_base),
        }
    }

    fn open_existing_or_create(path: &Path) -> io::Result<(File, u64)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok((file, len))
    }

    /// Switch to the file for `tag`, the date-minute bucket a producer
    /// already computed for the record about to be written.
    fn switch_to_period(&mut self, tag: &str) -> Result<()> {
        let path = self.path_for_tag(Some(tag));
        let (file, len) = Self::open_existing_or_create(&path)
            .map_err(|e| FerrologError::ResourceOpen(format!("{}: {e}", path.display())))?;
        self.file = file;
        self.offset_bytes = len;
        self.current_path = path;
        self.current_date_tag = Some(tag.to_string());
        Ok(())
    }

    /// Cycle to a fresh file per the configured rotation mode.
    fn rotate(&mut self) -> Result<()> {
        if self.rolling_append {
            self.append_file_no = (self.append_file_no + 1) % self.max_file_count;
            let next_path = if self.append_file_no == 0 {
                self.current_path.clone()
            } else {
                numbered(&self.current_path, self.append_file_no)
            };
            let _ = fs::remove_file(&next_path);
            let (file, _) = Self::open_existing_or_create(&next_path)
                .map_err(|e| FerrologError::ResourceOpen(format!("{}: {e}", next_path.display())))?;
            self.file = file;
            self.current_path = next_path;
            self.offset_bytes = 0;
        } else {
            for i in (1..self.max_file_count).rev() {
                let from = if i == 1 {
                    self.current_path.clone()
                } else {
                    numbered(&self.current_path, i - 1)
                };
                if from.exists() {
                    let to = numbered(&self.current_path, i);
                    if to.exists() {
                        let _ = fs::remove_file(&to);
                    }
                    let _ = fs::rename(&from, &to);
                }
            }
            let _ = fs::remove_file(&self.current_path);
            let (file, _) = Self::open_existing_or_create(&self.current_path).map_err(|e| {
                FerrologError::ResourceOpen(format!("{}: {e}", self.current_path.display()))
            })?;
            self.file = file;
            self.offset_bytes = 0;
        }
        Ok(())
    }

    /// Apply the date/size rotation check for an upcoming write of
    /// `upcoming_len` bytes tagged `date_minute`, then leave `self.file`
    /// ready to receive it. `date_minute` is the bucket the producer
    /// computed when the record was created, not the wall-clock time at
    /// which the consumer happens to drain it — under a queue backlog
    /// those can disagree, and the record's own stamp wins.
    fn prepare_for_write(&mut self, date_minute: &str, upcoming_len: usize) -> Result<()> {
        if self.rolling_time != RollingTimeUnit::None
            && self.current_date_tag.as_deref() != Some(date_minute)
        {
            self.switch_to_period(date_minute)?;
        }
        if self.offset_bytes + upcoming_len as u64 > self.max_file_size {
            self.rotate()?;
        }
        Ok(())
    }

    /// Write `buf`, rotating first if `date_minute` (the producer's
    /// already-computed date-minute bucket) or the size ceiling demands it.
    pub fn write_dated(&mut self, date_minute: &str, buf: &[u8]) -> io::Result<usize> {
        self.prepare_for_write(date_minute, buf.len())
            .map_err(|e| io::Error::other(e.to_string()))?;
        let written = self.file.write(buf)?;
        self.offset_bytes += written as u64;
        Ok(written)
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }
}

impl Write for RollingFileAppender {
    /// Size-only rotation check, for callers with no per-record date-minute
    /// to hand in (tests, and any caller outside the dispatch path). The
    /// logger's dispatch loop uses [`Self::write_dated`] instead, since it
    /// always has one.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.prepare_for_write("", buf.len())
            .map_err(|e| io::Error::other(e.to_string()))?;
        let written = self.file.write(buf)?;
        self.offset_bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::Appender;

    fn base_config(dir: &Path) -> LoggerConfig {
        let mut cfg = LoggerConfig::named("app");
        cfg.path_prefix = dir.to_string_lossy().into_owned();
        cfg.name_prefix = "app.log".to_string();
        cfg.appender = Appender::ROLLING_FILE;
        cfg.max_file_size = 64;
        cfg.max_file_count = 3;
        cfg
    }

    #[test]
    fn substitutes_ident_and_pid() {
        let resolved = substitute_ident_pid("<IDENT>-<PID>.log", "svc", 4242);
        assert_eq!(resolved, "svc-4242.log");
    }

    #[test]
    fn splits_on_date_token() {
        let (before, after) = split_on_date("app.<DATE>.log");
        assert_eq!(before, "app.");
        assert_eq!(after.as_deref(), Some(".log"));
    }

    #[test]
    fn no_date_token_keeps_whole_name() {
        let (before, after) = split_on_date("app.log");
        assert_eq!(before, "app.log");
        assert_eq!(after, None);
    }

    #[test]
    fn opens_base_file_without_date_policy() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = base_config(dir.path());
        let appender = RollingFileAppender::open(&cfg).unwrap();
        assert_eq!(appender.current_path(), dir.path().join("app.log"));
    }

    #[test]
    fn append_mode_cycles_through_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.rolling_append = true;
        cfg.max_file_size = 16;
        cfg.max_file_count = 3;
        let mut appender = RollingFileAppender::open(&cfg).unwrap();

        let chunk = vec![b'x'; 10];
        for _ in 0..6 {
            appender.write_all(&chunk).unwrap();
        }

        // appendfileno cycles 0 -> 1 -> 2 -> 0 ...; base path is reused when
        // it wraps back to 0, numbered paths otherwise.
        assert!(dir.path().join("app.log.1").exists() || dir.path().join("app.log.2").exists());
    }

    #[test]
    fn shift_mode_renames_chain_and_bounds_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.rolling_append = false;
        cfg.max_file_size = 8;
        cfg.max_file_count = 3;
        let mut appender = RollingFileAppender::open(&cfg).unwrap();

        let chunk = vec![b'y'; 10];
        for _ in 0..8 {
            appender.write_all(&chunk).unwrap();
        }

        let mut count = 0;
        for entry in fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            if name.to_string_lossy().starts_with("app.log") {
                count += 1;
            }
        }
        assert!(count <= cfg.max_file_count);
        assert!(dir.path().join("app.log").exists());
    }

    #[test]
    fn date_rotation_switches_file_on_bucket_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.name_prefix = "app.<DATE>.log".to_string();
        cfg.rolling_time = RollingTimeUnit::Year;
        let appender = RollingFileAppender::open(&cfg).unwrap();
        let year = Utc::now().format("%Y").to_string();
        assert_eq!(
            appender.current_path(),
            dir.path().join(format!("app.{year}.log"))
        );
    }
}
