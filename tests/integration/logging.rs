//! Integration test for file logging.
//!
//! Environment variables used:
//! - LOG_MODE: "stdout" (default) or "file"
//! - LOG_LEVEL: log level ("trace", "debug", "info", "warn", "error"); default is "info"
//! - LOG_FILE_PATH: when using file mode, the path of the log file
//!   Refer to `src/logging/mod.rs` for more details.
use chrono::Utc;
use queue_manager::logging::{compute_rolled_file_path, setup_logging};
use serial_test::serial;
use std::{env, path::Path, thread, time::Duration};

// The global logger can only be installed once per test binary, so both
// the first install and the rejected second one are checked here.
#[test]
#[serial]
fn test_setup_logging_file_mode_creates_log_file() {
    let temp_log_dir = tempfile::tempdir().unwrap();
    let base = temp_log_dir
        .path()
        .join("nested")
        .join("test_queue_manager.log");
    env::set_var("LOG_MODE", "file");
    env::set_var("LOG_LEVEL", "debug");
    env::set_var("LOG_FILE_PATH", &base);

    setup_logging().unwrap();
    log::info!("integration log line");
    // Sleep for logger to flush
    thread::sleep(Duration::from_millis(200));

    let date_str = Utc::now().format("%Y-%m-%d").to_string();
    let expected_path = compute_rolled_file_path(base.to_str().unwrap(), &date_str);
    assert!(
        Path::new(&expected_path).exists(),
        "Expected log file {} does not exist",
        expected_path
    );

    let second = setup_logging();
    assert!(second.is_err(), "a second logger must be rejected");

    env::remove_var("LOG_MODE");
    env::remove_var("LOG_LEVEL");
    env::remove_var("LOG_FILE_PATH");
}
