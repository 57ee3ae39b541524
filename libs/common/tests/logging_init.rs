//! Logging initialisation tests
//!
//! Runs in its own test binary so the global subscriber is installed exactly once.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use common::logging::{self, LogConfig, LogFormat};

#[test]
fn test_init_reload_and_double_init() {
    std::env::remove_var("RUST_LOG");

    let config = LogConfig {
        component: "logging-test".to_string(),
        level: "warn".to_string(),
        format: LogFormat::Text,
        ansi: false,
    };
    logging::init_with_config(&config).unwrap();
    assert_eq!(logging::get_log_level(), "warn");

    logging::set_log_level("info,voltage_dnp3=debug").unwrap();
    assert_eq!(logging::get_log_level(), "info,voltage_dnp3=debug");

    assert!(logging::set_log_level("voltage_dnp3=notalevel").is_err());
    assert_eq!(logging::get_log_level(), "info,voltage_dnp3=debug");

    // A second global subscriber is refused
    assert!(logging::init("debug").is_err());
}
