// Rolling-file rotation boundaries: size-triggered rotation bounded to a
// fixed numbered-file sequence.

use ferrolog::{Appender, Level, LoggerConfig, MaxWait};
use std::fs;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn append_mode_rotates_and_bounds_file_count() {
    let dir = TempDir::new().unwrap();

    let mut cfg = LoggerConfig::named("rotate");
    cfg.appender = Appender::ROLLING_FILE;
    cfg.path_prefix = dir.path().to_str().unwrap().to_string();
    cfg.name_prefix = "rotate.log".to_string();
    cfg.log_level = Level::Info;
    cfg.rolling_append = true;
    cfg.max_file_size = 64;
    cfg.max_file_count = 3;

    let logger = ferrolog::Logger::create(
        cfg,
        std::sync::Arc::new(ferrolog::RealTimeClock::start()),
        1,
    )
    .unwrap();

    for i in 0..40 {
        let line = format!("line-{i:03}-padding-to-trigger-rotation-soon");
        logger.log_message(Level::Info, MaxWait::Infinite, line.as_bytes());
    }

    drop(logger);
    thread::sleep(Duration::from_millis(100));

    let rotated: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("rotate.log"))
        .collect();

    // Append mode cycles through exactly `max_file_count` names
    // (base, base.1, base.2, ...) and never grows past that set.
    assert!(
        rotated.len() <= 3,
        "expected at most 3 files (max_file_count), found {rotated:?}"
    );
    assert!(rotated.iter().any(|n| n == "rotate.log"));
}
