//! Shared helpers for the voltage-dnp3 workspace
//!
//! Provides the ambient functions every crate in the workspace relies on:
//! - logging initialisation (`tracing-subscriber`)
//! - layered configuration loading (`figment`)

pub mod config_loader;
pub mod logging;

pub use config_loader::{load_config_from_file, load_layered_config, ConfigLoadError};
pub use logging::{LogConfig, LogFormat};
