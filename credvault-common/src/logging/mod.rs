// Logging utilities for the credvault engine
//
// This module provides:
// - Component-based structured logging
// - Instance ID tracking through logger inheritance
// - Credential path tagging for per-credential tracing
// - A small serde-friendly configuration that initializes env_logger
//
// Loggers never receive plaintext or key material; callers pass names,
// key identifiers and counts only.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Component {
    Vault,
    Encryption,
    KeyRotation,
    Certificates,
    Writer,
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Vault => "Vault",
            Component::Encryption => "Encryption",
            Component::KeyRotation => "KeyRotation",
            Component::Certificates => "Certificates",
            Component::Writer => "Writer",
        }
    }
}

// Display helpers to avoid prefix String allocations
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Vault => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

struct MaybeCredentialDisplay<'a>(Option<&'a str>);

impl Display for MaybeCredentialDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(path) = self.0 {
            write!(f, "|credential={path}")
        } else {
            Ok(())
        }
    }
}

/// A component-specific logger that carries the instance ID
#[derive(Clone, Debug)]
pub struct Logger {
    component: Component,
    instance_id: String,
    parent_component: Option<Component>,
    credential_path: Option<String>,
}

impl Logger {
    /// Create a new root logger for a component and instance ID
    pub fn new_root(component: Component, instance_id: &str) -> Self {
        Self {
            component,
            instance_id: instance_id.to_string(),
            parent_component: None,
            credential_path: None,
        }
    }

    /// Create a child logger with the same instance ID but a different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            instance_id: self.instance_id.clone(),
            parent_component: Some(self.component),
            credential_path: self.credential_path.clone(),
        }
    }

    /// Create a logger tagged with a credential name
    pub fn with_credential_path(&self, path: impl Into<String>) -> Self {
        Self {
            component: self.component,
            instance_id: self.instance_id.clone(),
            parent_component: self.parent_component,
            credential_path: Some(path.into()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn credential_path(&self) -> Option<&str> {
        self.credential_path.as_deref()
    }

    fn prefix(&self) -> String {
        format!(
            "{}{}",
            ComponentPrefixDisplay {
                parent: self.parent_component,
                component: self.component,
            },
            MaybeCredentialDisplay(self.credential_path()),
        )
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "[{}][{}{}] {}",
                self.instance_id,
                ComponentPrefixDisplay {
                    parent: self.parent_component,
                    component: self.component
                },
                MaybeCredentialDisplay(self.credential_path()),
                args
            );
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log an info message using fmt::Arguments
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!(
                "[{}][{}{}] {}",
                self.instance_id,
                ComponentPrefixDisplay {
                    parent: self.parent_component,
                    component: self.component
                },
                MaybeCredentialDisplay(self.credential_path()),
                args
            );
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!(
                "[{}][{}{}] {}",
                self.instance_id,
                ComponentPrefixDisplay {
                    parent: self.parent_component,
                    component: self.component
                },
                MaybeCredentialDisplay(self.credential_path()),
                args
            );
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!(
                "[{}][{}{}] {}",
                self.instance_id,
                ComponentPrefixDisplay {
                    parent: self.parent_component,
                    component: self.component
                },
                MaybeCredentialDisplay(self.credential_path()),
                args
            );
        }
    }
}

/// Log levels understood by [`LoggingConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    #[serde(default)]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::default_info()
    }
}

impl LoggingConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            timestamps: true,
        }
    }

    /// Info level with timestamps, the production default
    pub fn default_info() -> Self {
        Self::new(LogLevel::Info)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Install the global env_logger.
    ///
    /// Returns false when a logger was already installed (tests call this
    /// repeatedly).
    pub fn apply(&self) -> bool {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.level.to_level_filter());
        if !self.timestamps {
            builder.format_timestamp(None);
        }
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_includes_parent_and_credential() {
        let root = Logger::new_root(Component::Writer, "vault-1");
        let child = root
            .with_component(Component::Encryption)
            .with_credential_path("/team/db-password");

        assert_eq!(child.instance_id(), "vault-1");
        assert_eq!(
            child.prefix(),
            "Writer.Encryption|credential=/team/db-password"
        );
    }

    #[test]
    fn test_vault_parent_is_not_repeated() {
        let root = Logger::new_root(Component::Vault, "vault-1");
        let child = root.with_component(Component::KeyRotation);
        assert_eq!(child.prefix(), "KeyRotation");
    }

    #[test]
    fn test_logging_config_serde() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","timestamps":false}"#).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.timestamps);
        assert_eq!(config.level.to_level_filter(), log::LevelFilter::Debug);
    }
}
