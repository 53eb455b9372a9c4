//! Plain configuration record consumed by [`crate::manager::LoggerManager`].
//!
//! This is deliberately a dumb value type: an INI-style config-file parser
//! is out of scope. Tests and callers build it directly rather than going
//! through a parser.

use crate::levels::{Appender, DateFormat, Layout, Level, RollingTimeUnit};

/// Default seed string used to derive the shared-memory token when the
/// caller does not supply `magic_key`.
pub const DEFAULT_MAGIC_KEY: &str = "ferrolog";

/// Time-unit granularity carried in a record's sub-second precision field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubSecondUnit {
    #[default]
    Seconds,
    Millis,
    Micros,
}

/// Per-logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub ident: String,
    pub magic_key: String,
    pub max_msg_size: usize,
    pub queue_length: usize,
    pub max_concurrents: usize,
    pub appender: Appender,
    pub path_prefix: String,
    pub name_prefix: String,
    pub shm_log_file: String,
    pub rolling_time: RollingTimeUnit,
    pub max_file_size: u64,
    pub max_file_count: usize,
    pub rolling_append: bool,
    pub log_level: Level,
    pub layout: Layout,
    pub date_format: DateFormat,
    pub time_unit: SubSecondUnit,
    pub local_time: bool,
    pub color_style: bool,
    pub timestamp_id: bool,
    pub file_line_no: bool,
    pub function: bool,
    pub process_id: bool,
    pub thread_no: bool,
    pub auto_wrap_line: bool,
    pub hide_ident: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            ident: String::new(),
            magic_key: DEFAULT_MAGIC_KEY.to_string(),
            max_msg_size: 4_000,
            queue_length: 512,
            max_concurrents: 128,
            appender: Appender::STDOUT,
            path_prefix: String::new(),
            name_prefix: String::new(),
            shm_log_file: String::new(),
            rolling_time: RollingTimeUnit::None,
            max_file_size: 16 * 1024 * 1024,
            max_file_count: 10,
            rolling_append: false,
            log_level: Level::Debug,
            layout: Layout::Dated,
            date_format: DateFormat::Rfc3339,
            time_unit: SubSecondUnit::Seconds,
            local_time: false,
            color_style: false,
            timestamp_id: false,
            file_line_no: false,
            function: false,
            process_id: false,
            thread_no: false,
            auto_wrap_line: false,
            hide_ident: false,
        }
    }
}

impl LoggerConfig {
    /// A config for `ident`, otherwise at defaults.
    pub fn named(ident: impl Into<String>) -> Self {
        LoggerConfig {
            ident: ident.into(),
            ..Default::default()
        }
    }

    /// Clamp `max_msg_size` into the 512..=32640 range usable for the
    /// per-logger formatting buffer.
    pub fn clamped_max_msg_size(&self) -> usize {
        self.max_msg_size.clamp(512, 32_640)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.max_msg_size, 4_000);
        assert_eq!(cfg.queue_length, 512);
        assert_eq!(cfg.max_concurrents, 128);
        assert_eq!(cfg.appender, Appender::STDOUT);
        assert_eq!(cfg.max_file_size, 16 * 1024 * 1024);
        assert_eq!(cfg.max_file_count, 10);
        assert!(!cfg.rolling_append);
        assert_eq!(cfg.log_level, Level::Debug);
        assert_eq!(cfg.layout, Layout::Dated);
        assert_eq!(cfg.date_format, DateFormat::Rfc3339);
    }

    #[test]
    fn named_sets_ident_only() {
        let cfg = LoggerConfig::named("app");
        assert_eq!(cfg.ident, "app");
        assert_eq!(cfg.max_msg_size, 4_000);
    }

    #[test]
    fn clamps_out_of_range_msg_size() {
        let mut cfg = LoggerConfig::named("app");
        cfg.max_msg_size = 10;
        assert_eq!(cfg.clamped_max_msg_size(), 512);
        cfg.max_msg_size = 100_000;
        assert_eq!(cfg.clamped_max_msg_size(), 32_640);
    }
}
