//! Credvault Common
//!
//! Common utilities shared by the credvault crates:
//! - Component-based structured logging with instance ID context
//! - Logging configuration backed by env_logger

pub mod logging;

pub use logging::{Component, LogLevel, Logger, LoggingConfig};
