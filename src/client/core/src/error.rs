//! Error handling for the Roster reconciliation core.
//!
//! This module provides:
//! - Machine-readable error codes for every reconciliation failure mode
//! - Severity classification driving the log level
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! Propagation policy: reconciliation-layer errors are isolated per event.
//! A malformed or orphaned event is dropped and logged; it never corrupts
//! the store or halts processing of subsequent events.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by the presentation layer for
/// programmatic handling (e.g. surfacing a non-blocking toast on storage
/// failures while silently counting dropped events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Reconciliation errors (1000-1099)
    MalformedEvent,
    UnknownEntityReference,
    OrphanBufferOverflow,

    // Storage errors (2000-2099)
    StorageCreateFailed,
    StorageUpdateFailed,

    // Channel / session errors (3000-3099)
    ChannelClosed,
    SessionTerminated,

    // Configuration errors (5000-5099)
    ConfigurationError,

    // Internal errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::MalformedEvent => 1000,
            Self::UnknownEntityReference => 1001,
            Self::OrphanBufferOverflow => 1002,

            Self::StorageCreateFailed => 2000,
            Self::StorageUpdateFailed => 2001,

            Self::ChannelClosed => 3000,
            Self::SessionTerminated => 3001,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Dropped events are not: the stream has already moved past them.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageCreateFailed | Self::StorageUpdateFailed)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "reconciliation",
            2000..=2099 => "storage",
            3000..=3099 => "session",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected per-event drops (malformed, orphaned)
    Low,
    /// Operational issues (buffer overflow, storage failures)
    Medium,
    /// System errors (closed channels, configuration, bugs)
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MalformedEvent | ErrorCode::UnknownEntityReference => Self::Low,

            ErrorCode::OrphanBufferOverflow
            | ErrorCode::StorageCreateFailed
            | ErrorCode::StorageUpdateFailed => Self::Medium,

            ErrorCode::ChannelClosed
            | ErrorCode::SessionTerminated
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the reconciliation core.
#[derive(Error, Debug)]
pub struct CoreError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Human-readable message
    message: Cow<'static, str>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl CoreError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            message: message.into(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Event whose entity id cannot be derived.
    pub fn malformed_event(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MalformedEvent,
            format!("event has no derivable entity id: {}", detail.into()),
        )
    }

    /// Child-group event referencing an entity that is not in the store.
    pub fn unknown_entity(entity_id: impl fmt::Display, group: &'static str) -> Self {
        Self::new(
            ErrorCode::UnknownEntityReference,
            format!("{} event references unknown entity {}", group, entity_id),
        )
    }

    /// Orphan buffer for an entity is full; the event is dropped.
    pub fn orphan_buffer_overflow(entity_id: impl fmt::Display, capacity: usize) -> Self {
        Self::new(
            ErrorCode::OrphanBufferOverflow,
            format!(
                "orphan buffer full for entity {} (capacity {})",
                entity_id, capacity
            ),
        )
    }

    /// Persistence failed to create a record.
    pub fn storage_create_failed(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StorageCreateFailed,
            format!("storage create failed: {}", detail.into()),
        )
    }

    /// Persistence failed to update a record.
    pub fn storage_update_failed(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StorageUpdateFailed,
            format!("storage update failed: {}", detail.into()),
        )
    }

    /// A source channel or the consumer loop has gone away.
    pub fn channel_closed(kind: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ChannelClosed,
            format!("change source channel closed: {}", kind),
        )
    }

    /// The owning session has been torn down.
    pub fn session_terminated() -> Self {
        Self::new(ErrorCode::SessionTerminated, "session has been torn down")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at the level implied by its severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    source = ?self.source,
                    "core error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    "core error"
                );
            }
            ErrorSeverity::Low => {
                debug!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    "event dropped"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "roster_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::malformed_event(error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(error: config::ConfigError) -> Self {
        let message = match &error {
            config::ConfigError::NotFound(_) => "required configuration not found",
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                "configuration file is invalid"
            }
            _ => "configuration error occurred",
        };
        Self::configuration(message).with_source(error)
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CoreError>() {
            Ok(core_error) => core_error,
            Err(error) => Self::internal(error.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::StorageCreateFailed.is_retryable());
        assert!(!ErrorCode::MalformedEvent.is_retryable());
        assert!(!ErrorCode::UnknownEntityReference.is_retryable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(ErrorCode::MalformedEvent.category(), "reconciliation");
        assert_eq!(ErrorCode::StorageCreateFailed.category(), "storage");
        assert_eq!(ErrorCode::SessionTerminated.category(), "session");
        assert_eq!(ErrorCode::ConfigurationError.category(), "configuration");
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::MalformedEvent),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::StorageCreateFailed),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::SessionTerminated),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_error_display() {
        let error = CoreError::unknown_entity("abc-123", "shirt");
        let display = format!("{}", error);
        assert!(display.contains("UnknownEntityReference"));
        assert!(display.contains("abc-123"));
    }

    #[test]
    fn test_error_source_chain() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let error = CoreError::from(json_err);
        assert_eq!(error.code(), ErrorCode::MalformedEvent);
        assert!(std::error::Error::source(&error).is_some());
    }
}
