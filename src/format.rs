//! Record assembly for the `Dated` and `Plain` layouts.
//!
//! The date-minute string used for file-rotation comparisons is computed
//! once per record at the configured rolling-time resolution. The message
//! body is assembled by concatenating fixed pieces in a fixed order —
//! stamp id, color escape, timestamp, level, ident, location, pid/tid,
//! color reset, message, trailing newline — into a `String`, with `chrono`
//! doing every time computation instead of hand-rolled calendar math.

use crate::config::LoggerConfig;
use crate::levels::{DateFormat, Layout, Level};
use chrono::{Datelike, Timelike};

/// Per-level ANSI color code: bright variants for the more severe levels,
/// dim ones for chatter.
fn level_color_code(level: Level) -> &'static str {
    match level {
        Level::Fatal => "41;97", // white on red
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "36",
        Level::Trace => "90",
        Level::Off | Level::All => "0",
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `("+HHMM", "+HH:MM")` pair derived from an offset in minutes, the two
/// punctuation styles the six date formats mix and match.
fn tz_compact(offset_minutes: i32) -> String {
    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let abs = offset_minutes.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 60, abs % 60)
}

fn subsecond_suffix(nanos: u32, unit: crate::config::SubSecondUnit) -> String {
    use crate::config::SubSecondUnit;
    match unit {
        SubSecondUnit::Seconds => String::new(),
        SubSecondUnit::Millis => format!(".{:03}", nanos / 1_000_000),
        SubSecondUnit::Micros => format!(".{:06}", nanos / 1_000),
    }
}

/// A fully decomposed instant, enough to render any of the six date
/// formats without re-deriving calendar fields per format.
pub struct RecordTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanosecond: u32,
    pub weekday: u32,
    pub offset_minutes: i32,
}

impl RecordTime {
    pub fn from_broken_down(
        bdt: crate::clock::BrokenDownTime,
        nanosecond: u32,
        offset_minutes: i32,
    ) -> Self {
        RecordTime {
            year: bdt.year,
            month: bdt.month,
            day: bdt.day,
            hour: bdt.hour,
            minute: bdt.minute,
            second: bdt.second,
            nanosecond,
            weekday: bdt.weekday,
            offset_minutes,
        }
    }
}

/// Render the full timestamp per the chosen [`DateFormat`], matching the
/// six `snprintf` patterns in `clog_format_datetime`.
pub fn render_datetime(t: &RecordTime, fmt: DateFormat, unit: crate::config::SubSecondUnit) -> String {
    let tz_compact = tz_compact(t.offset_minutes);
    let sub = subsecond_suffix(t.nanosecond, unit);

    match fmt {
        DateFormat::Rfc3339 => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{sub}{}:{}",
            t.year,
            t.month,
            t.day,
            t.hour,
            t.minute,
            t.second,
            &tz_compact[..3],
            &tz_compact[3..]
        ),
        DateFormat::Iso8601 => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{sub}{}:{}",
            t.year,
            t.month,
            t.day,
            t.hour,
            t.minute,
            t.second,
            &tz_compact[..3],
            &tz_compact[3..]
        ),
        DateFormat::Universal => format!(
            "{} {} {:02} {:02}:{:02}:{:02}{sub} UTC {:04}",
            WEEKDAYS[t.weekday as usize],
            MONTHS[(t.month - 1) as usize],
            t.day,
            t.hour,
            t.minute,
            t.second,
            t.year
        ),
        DateFormat::Rfc2822 => format!(
            "{}, {:02} {} {:04} {:02}:{:02}:{:02}{sub} {tz_compact}",
            WEEKDAYS[t.weekday as usize],
            t.day,
            MONTHS[(t.month - 1) as usize],
            t.year,
            t.hour,
            t.minute,
            t.second
        ),
        DateFormat::Numeric2 => format!(
            "{:04}{:02}{:02}-{:02}{:02}{:02}{sub}{tz_compact}",
            t.year, t.month, t.day, t.hour, t.minute, t.second
        ),
        DateFormat::Numeric1 => format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{sub}{tz_compact}",
            t.year, t.month, t.day, t.hour, t.minute, t.second
        ),
    }
}

/// A single log record's logical fields, gathered by the logger before
/// formatting.
pub struct Record<'a> {
    pub level: Level,
    pub message: &'a str,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
    pub function: Option<&'a str>,
    pub pid: u32,
    pub tid: u64,
    pub stamp_id: Option<String>,
}

/// Assemble a `Dated`-layout line. Does not truncate — callers apply
/// `maxMsgSize` truncation to the assembled string, per the
/// formatted-entry-point contract.
pub fn assemble_dated(cfg: &LoggerConfig, time: &RecordTime, record: &Record) -> String {
    let mut out = String::new();

    if cfg.timestamp_id {
        if let Some(id) = &record.stamp_id {
            out.push_str(id);
            out.push(' ');
        }
    }

    if cfg.color_style {
        out.push_str("\x1b[");
        out.push_str(level_color_code(record.level));
        out.push('m');
    }

    out.push_str(&render_datetime(time, cfg.date_format, cfg.time_unit));
    out.push(' ');

    out.push_str(record.level.tag());
    out.push(' ');

    if !cfg.hide_ident && !cfg.ident.is_empty() {
        out.push('<');
        out.push_str(&cfg.ident);
        out.push_str("> ");
    }

    if cfg.file_line_no {
        if let (Some(file), Some(line)) = (record.file, record.line) {
            out.push('(');
            out.push_str(file);
            out.push(':');
            out.push_str(&line.to_string());
            if cfg.function {
                if let Some(function) = record.function {
                    out.push_str("::");
                    out.push_str(function);
                }
            }
            out.push_str(") ");
        }
    }

    if cfg.process_id {
        out.push('[');
        out.push_str(&record.pid.to_string());
        if cfg.thread_no {
            out.push('/');
            out.push_str(&record.tid.to_string());
        }
        out.push_str("] ");
    }

    if cfg.color_style {
        out.push_str("\x1b[0m");
    }

    out.push_str(record.message);

    if cfg.auto_wrap_line && !record.message.ends_with('\n') {
        out.push('\n');
    }

    out
}

/// Assemble a `Plain`-layout line: just the minute-resolution date-prefix
/// and the raw message, with no level/ident/color.
pub fn assemble_plain(cfg: &LoggerConfig, date_minute: &str, record: &Record) -> String {
    let mut out = String::new();
    if !date_minute.is_empty() {
        out.push_str(date_minute);
        out.push(' ');
    }
    out.push_str(record.message);
    if cfg.auto_wrap_line && !record.message.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Render according to the configured layout, then truncate to
/// `max_msg_size` bytes, replacing the last three bytes with `...` when the
/// rendered record is larger. The sentinel may split a multi-byte UTF-8
/// sequence; that is an accepted tradeoff for bounded output size.
pub fn render_into(
    cfg: &LoggerConfig,
    time: &RecordTime,
    date_minute: &str,
    record: &Record,
) -> String {
    let rendered = match cfg.layout {
        Layout::Dated => assemble_dated(cfg, time, record),
        Layout::Plain => assemble_plain(cfg, date_minute, record),
    };
    truncate_with_ellipsis(rendered, cfg.clamped_max_msg_size())
}

/// Truncate `s` to at most `max_len` bytes, replacing the final three bytes
/// with `...` if truncation was necessary.
pub fn truncate_with_ellipsis(mut s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let cut = max_len.saturating_sub(3);
    s.truncate(cut);
    s.push_str("...");
    s
}

/// `"{seconds.nanoseconds}"` stamp id.
pub fn stamp_id(seconds: i64, nanoseconds: u32) -> String {
    format!("{seconds}.{nanoseconds}")
}

/// Compute the date-minute string at `unit` resolution from a timestamp,
/// matching `clog_format_datetime`'s per-rolling-unit `snprintf` patterns.
pub fn date_minute_string(dt: chrono::DateTime<chrono::Utc>, unit: crate::levels::RollingTimeUnit) -> String {
    use crate::levels::RollingTimeUnit;
    match unit {
        RollingTimeUnit::None => String::new(),
        RollingTimeUnit::Min1 => dt.format("%Y%m%d-%H%M").to_string(),
        RollingTimeUnit::Min5 | RollingTimeUnit::Min10 | RollingTimeUnit::Min30 => {
            let bucket = unit.minute_bucket();
            let minute = (dt.minute() / bucket) * bucket;
            format!(
                "{:04}{:02}{:02}-{:02}{:02}",
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                minute
            )
        }
        RollingTimeUnit::Hour => dt.format("%Y%m%d-%H").to_string(),
        RollingTimeUnit::Day => dt.format("%Y%m%d").to_string(),
        RollingTimeUnit::Month => dt.format("%Y%m").to_string(),
        RollingTimeUnit::Year => dt.format("%Y").to_string(),
    }
}
