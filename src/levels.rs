//! Log level, layout, date-format, rolling-time-unit and appender-bitset
//! enums, plus their case-insensitive string converters.
//!
//! Case-insensitive `from_str` associated functions follow the same shape
//! throughout, generalized from tracing's five-level `Level` to a ten-value
//! ordered scale.

use std::fmt;

/// Ordered log level. `Off` admits nothing; `All` admits everything.
///
/// Ordering follows discriminant order directly, so gating is a plain `<=`
/// comparison (see [`Level::admits`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Off = 0,
    Fatal = 4,
    Error = 5,
    Warn = 6,
    Info = 7,
    Debug = 8,
    Trace = 9,
    All = 10,
}

impl Level {
    /// Whether a message at `self` is admitted by a logger configured at
    /// `logger_level`: `self <= logger_level` and `logger_level != Off`.
    pub fn admits(self, logger_level: Level) -> bool {
        logger_level != Level::Off && self <= logger_level
    }

    /// Short tag used in the `Dated` layout (`OFF`, `FATAL`, … `ALL`).
    pub fn tag(self) -> &'static str {
        match self {
            Level::Off => "OFF",
            Level::Fatal => "FATAL",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
            Level::All => "ALL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Level {
    type Err = crate::error::FerrologError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFF" => Ok(Level::Off),
            "FATAL" => Ok(Level::Fatal),
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            "ALL" => Ok(Level::All),
            other => Err(crate::error::FerrologError::Configuration(format!(
                "invalid log level: '{other}'"
            ))),
        }
    }
}

/// Record layout: the amount of structure added around the raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Raw payload with a minute-resolution date prefix, used for rotation
    /// bookkeeping only — no level, no color, no ident.
    Plain,
    /// Full timestamp, level tag, optional ident/location/pid/color/newline.
    #[default]
    Dated,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layout::Plain => "plain",
            Layout::Dated => "dated",
        })
    }
}

impl std::str::FromStr for Layout {
    type Err = crate::error::FerrologError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Layout::Plain),
            "dated" => Ok(Layout::Dated),
            other => Err(crate::error::FerrologError::Configuration(format!(
                "invalid layout: '{other}'"
            ))),
        }
    }
}

/// One of the six named timestamp encodings a `Dated` record may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    #[default]
    Rfc3339,
    Iso8601,
    Rfc2822,
    Universal,
    /// `YYYYMMDDhhmmss±zzzz`
    Numeric1,
    /// `YYYYMMDD-hhmmss±zzzz`
    Numeric2,
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DateFormat::Rfc3339 => "rfc3339",
            DateFormat::Iso8601 => "iso8601",
            DateFormat::Rfc2822 => "rfc2822",
            DateFormat::Universal => "universal",
            DateFormat::Numeric1 => "numeric1",
            DateFormat::Numeric2 => "numeric2",
        })
    }
}

impl std::str::FromStr for DateFormat {
    type Err = crate::error::FerrologError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rfc3339" | "rfc-3339" => Ok(DateFormat::Rfc3339),
            "iso8601" | "iso-8601" => Ok(DateFormat::Iso8601),
            "rfc2822" | "rfc-2822" => Ok(DateFormat::Rfc2822),
            "universal" => Ok(DateFormat::Universal),
            "numeric1" | "numeric-1" => Ok(DateFormat::Numeric1),
            "numeric2" | "numeric-2" => Ok(DateFormat::Numeric2),
            other => Err(crate::error::FerrologError::Configuration(format!(
                "invalid date format: '{other}'"
            ))),
        }
    }
}

/// Resolution of the "date-minute" string used to pick the current rolling
/// file and to decide whether a new file must be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollingTimeUnit {
    #[default]
    None,
    Min1,
    Min5,
    Min10,
    Min30,
    Hour,
    Day,
    Month,
    Year,
}

impl RollingTimeUnit {
    /// `chrono` format string used to build the "date-minute" string at this
    /// resolution, coarsest components only (no seconds: rotation never
    /// needs sub-minute precision).
    pub fn format_str(self) -> &'static str {
        match self {
            RollingTimeUnit::None => "",
            RollingTimeUnit::Min1 => "%Y%m%d%H%M",
            RollingTimeUnit::Min5 | RollingTimeUnit::Min10 | RollingTimeUnit::Min30 => {
                "%Y%m%d%H%M"
            }
            RollingTimeUnit::Hour => "%Y%m%d%H",
            RollingTimeUnit::Day => "%Y%m%d",
            RollingTimeUnit::Month => "%Y%m",
            RollingTimeUnit::Year => "%Y",
        }
    }

    /// Bucket width in minutes for the 5/10/30-minute policies; `0` for
    /// everything else (those derive their bucket from the format string
    /// alone).
    pub fn minute_bucket(self) -> u32 {
        match self {
            RollingTimeUnit::Min5 => 5,
            RollingTimeUnit::Min10 => 10,
            RollingTimeUnit::Min30 => 30,
            _ => 0,
        }
    }
}

impl fmt::Display for RollingTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RollingTimeUnit::None => "none",
            RollingTimeUnit::Min1 => "1m",
            RollingTimeUnit::Min5 => "5m",
            RollingTimeUnit::Min10 => "10m",
            RollingTimeUnit::Min30 => "30m",
            RollingTimeUnit::Hour => "hour",
            RollingTimeUnit::Day => "day",
            RollingTimeUnit::Month => "month",
            RollingTimeUnit::Year => "year",
        })
    }
}

impl std::str::FromStr for RollingTimeUnit {
    type Err = crate::error::FerrologError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(RollingTimeUnit::None),
            "1m" | "1min" | "minute" => Ok(RollingTimeUnit::Min1),
            "5m" | "5min" => Ok(RollingTimeUnit::Min5),
            "10m" | "10min" => Ok(RollingTimeUnit::Min10),
            "30m" | "30min" => Ok(RollingTimeUnit::Min30),
            "hour" | "hourly" => Ok(RollingTimeUnit::Hour),
            "day" | "daily" => Ok(RollingTimeUnit::Day),
            "month" | "monthly" => Ok(RollingTimeUnit::Month),
            "year" | "yearly" => Ok(RollingTimeUnit::Year),
            other => Err(crate::error::FerrologError::Configuration(format!(
                "invalid rolling-time unit: '{other}'"
            ))),
        }
    }
}

/// Bitset of enabled sinks. Hand-rolled rather than pulled in from the
/// `bitflags` crate: four bits is not worth the dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Appender(u8);

impl Appender {
    pub const STDOUT: Appender = Appender(0b0001);
    pub const SYSLOG: Appender = Appender(0b0010);
    pub const ROLLING_FILE: Appender = Appender(0b0100);
    pub const SHMMAP: Appender = Appender(0b1000);
    pub const NONE: Appender = Appender(0);

    pub fn contains(self, other: Appender) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Appender) -> Appender {
        Appender(self.0 | other.0)
    }
}

impl std::ops::BitOr for Appender {
    type Output = Appender;
    fn bitor(self, rhs: Appender) -> Appender {
        self.union(rhs)
    }
}

impl fmt::Display for Appender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Appender::STDOUT) {
            parts.push("stdout");
        }
        if self.contains(Appender::SYSLOG) {
            parts.push("syslog");
        }
        if self.contains(Appender::ROLLING_FILE) {
            parts.push("rollingfile");
        }
        if self.contains(Appender::SHMMAP) {
            parts.push("shmmap");
        }
        f.write_str(&parts.join("|"))
    }
}

impl std::str::FromStr for Appender {
    type Err = crate::error::FerrologError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = Appender::NONE;
        for part in s.split('|') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            bits = bits.union(match part.to_ascii_lowercase().as_str() {
                "stdout" => Appender::STDOUT,
                "syslog" => Appender::SYSLOG,
                "rollingfile" | "rolling_file" | "rolling-file" => Appender::ROLLING_FILE,
                "shmmap" | "shm" => Appender::SHMMAP,
                other => {
                    return Err(crate::error::FerrologError::Configuration(format!(
                        "invalid appender: '{other}'"
                    )));
                }
            });
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn level_ordering_is_off_to_all() {
        assert!(Level::Off < Level::Fatal);
        assert!(Level::Fatal < Level::Error);
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
        assert!(Level::Trace < Level::All);
    }

    #[test]
    fn level_admits_respects_off() {
        assert!(!Level::Fatal.admits(Level::Off));
        assert!(Level::Fatal.admits(Level::Fatal));
        assert!(Level::Error.admits(Level::Info));
        assert!(!Level::Info.admits(Level::Error));
        assert!(Level::Trace.admits(Level::All));
    }

    #[test]
    fn level_round_trips_case_insensitive() {
        for lvl in [
            Level::Off,
            Level::Fatal,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
            Level::All,
        ] {
            let s = lvl.to_string();
            assert_eq!(Level::from_str(&s).unwrap(), lvl);
            assert_eq!(Level::from_str(&s.to_lowercase()).unwrap(), lvl);
        }
    }

    #[test]
    fn layout_round_trips() {
        assert_eq!(Layout::from_str("Dated").unwrap(), Layout::Dated);
        assert_eq!(Layout::from_str("PLAIN").unwrap(), Layout::Plain);
        assert!(Layout::from_str("bogus").is_err());
    }

    #[test]
    fn date_format_round_trips() {
        for fmt in [
            DateFormat::Rfc3339,
            DateFormat::Iso8601,
            DateFormat::Rfc2822,
            DateFormat::Universal,
            DateFormat::Numeric1,
            DateFormat::Numeric2,
        ] {
            let s = fmt.to_string();
            assert_eq!(DateFormat::from_str(&s).unwrap(), fmt);
        }
    }

    #[test]
    fn rolling_time_unit_round_trips() {
        for unit in [
            RollingTimeUnit::None,
            RollingTimeUnit::Min1,
            RollingTimeUnit::Min5,
            RollingTimeUnit::Min10,
            RollingTimeUnit::Min30,
            RollingTimeUnit::Hour,
            RollingTimeUnit::Day,
            RollingTimeUnit::Month,
            RollingTimeUnit::Year,
        ] {
            let s = unit.to_string();
            assert_eq!(RollingTimeUnit::from_str(&s).unwrap(), unit);
        }
    }

    #[test]
    fn appender_bitset_round_trips() {
        let combo = Appender::STDOUT | Appender::ROLLING_FILE;
        assert!(combo.contains(Appender::STDOUT));
        assert!(combo.contains(Appender::ROLLING_FILE));
        assert!(!combo.contains(Appender::SYSLOG));
        let s = combo.to_string();
        let parsed = Appender::from_str(&s).unwrap();
        assert_eq!(parsed, combo);
    }

    #[test]
    fn appender_from_str_rejects_unknown() {
        assert!(Appender::from_str("stdout|bogus").is_err());
    }
}
