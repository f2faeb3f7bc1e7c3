//! Error taxonomy shared across the extraction, comparison, and validation
//! pipeline.
//!
//! Every fallible operation in this crate returns [`CoreError`]. Each variant
//! carries an [`ErrorContext`] (operation/component/attempt/correlation id)
//! so a caller several layers up — the retry helper, the degradation helper,
//! the observability sink — can attribute a failure without re-parsing a
//! message string.

use std::fmt;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Coarse error category, independent of the human-readable message. Used by
/// [`crate::retry::RetryConfig::retryable_kinds`] to decide whether a given
/// failure is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Authentication,
    Timeout,
    Protocol,
    Validation,
    Configuration,
}

/// Operational severity, distinct from the comparison engine's difference
/// severity — this describes how urgently an operator should look at the
/// failure, not how serious a data-model mismatch is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Attribution attached to every [`CoreError`] variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub component: Option<String>,
    pub attempt: Option<u32>,
    #[serde(default = "Value::default")]
    pub metadata: Value,
    pub correlation_id: String,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: None,
            component: None,
            attempt: None,
            metadata: Value::Null,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            component: Some(component.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// The crate-wide error type.
///
/// Variants map onto the taxonomy every component is specified against:
/// connection/authentication/timeout failures come from a [`crate::hook::Hook`]
/// implementation or the transport beneath it; protocol errors come from a
/// hook returning a response this crate cannot make sense of; validation
/// errors come from the [`crate::validator::Validator`] or the comparison
/// engines; configuration errors come from loading a [`crate::hook::DeviceConfig`]
/// or a [`crate::requirement::RequirementDocument`].
#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    #[error("connection failed: {message}")]
    #[diagnostic(
        code(tr181::connection),
        help("verify the device endpoint is reachable; this error is retryable")
    )]
    Connection {
        message: String,
        context: ErrorContext,
        #[source]
        cause: Option<Box<CoreError>>,
    },

    #[error("authentication failed: {message}")]
    #[diagnostic(
        code(tr181::authentication),
        help("check the configured credentials; this error is not retryable")
    )]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("operation timed out: {message}")]
    #[diagnostic(
        code(tr181::timeout),
        help("the deadline may be too short for this transport, or the device is unresponsive")
    )]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    #[error("protocol error: {message}")]
    #[diagnostic(code(tr181::protocol))]
    Protocol {
        message: String,
        context: ErrorContext,
        /// Whether the protocol violation looks transient (malformed
        /// response on an otherwise healthy connection) versus permanent
        /// (the device doesn't support the operation at all).
        transient: bool,
    },

    #[error("validation failed: {message}")]
    #[diagnostic(code(tr181::validation))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("configuration error: {message}")]
    #[diagnostic(code(tr181::configuration))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

impl CoreError {
    pub fn connection(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Connection {
            message: message.into(),
            context,
            cause: None,
        }
    }

    pub fn connection_with_cause(
        message: impl Into<String>,
        context: ErrorContext,
        cause: CoreError,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            context,
            cause: Some(Box::new(cause)),
        }
    }

    pub fn authentication(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Authentication {
            message: message.into(),
            context,
        }
    }

    pub fn timeout(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Timeout {
            message: message.into(),
            context,
        }
    }

    pub fn protocol(message: impl Into<String>, context: ErrorContext, transient: bool) -> Self {
        Self::Protocol {
            message: message.into(),
            context,
            transient,
        }
    }

    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Validation {
            message: message.into(),
            context,
        }
    }

    pub fn configuration(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Configuration {
            message: message.into(),
            context,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Connection { .. } => Severity::Medium,
            Self::Authentication { .. } => Severity::High,
            Self::Timeout { .. } => Severity::Medium,
            Self::Protocol { transient, .. } => {
                if *transient {
                    Severity::Medium
                } else {
                    Severity::High
                }
            }
            Self::Validation { .. } => Severity::Low,
            Self::Configuration { .. } => Severity::Critical,
        }
    }

    /// Whether this error is, by default, worth retrying — independent of
    /// whatever [`crate::retry::RetryConfig::retryable_kinds`] a caller
    /// configures. Connection/timeout failures and transient protocol
    /// errors are retryable; authentication, configuration, and validation
    /// failures are not (retrying them would just reproduce the same
    /// outcome).
    pub fn is_retryable_by_default(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Protocol { transient, .. } => *transient,
            Self::Authentication { .. } | Self::Validation { .. } | Self::Configuration { .. } => {
                false
            }
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Connection { context, .. }
            | Self::Authentication { context, .. }
            | Self::Timeout { context, .. }
            | Self::Protocol { context, .. }
            | Self::Validation { context, .. }
            | Self::Configuration { context, .. } => context,
        }
    }

    pub fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Connection { context, .. }
            | Self::Authentication { context, .. }
            | Self::Timeout { context, .. }
            | Self::Protocol { context, .. }
            | Self::Validation { context, .. }
            | Self::Configuration { context, .. } => context,
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.context_mut().attempt = Some(attempt);
        self
    }

    /// Attach a record of prior retry attempts to the error's metadata,
    /// called once retries are exhausted so the final error reflects the
    /// whole attempt history rather than just the last failure.
    #[must_use]
    pub fn with_attempt_history(mut self, history: &[AttemptRecord]) -> Self {
        let attempts: Vec<Value> = history
            .iter()
            .map(|record| {
                serde_json::json!({
                    "attempt": record.attempt,
                    "delay_ms": record.delay.as_millis() as u64,
                    "error": record.error,
                })
            })
            .collect();
        self.context_mut().metadata = serde_json::json!({ "attempts": attempts });
        self
    }
}

/// A single retry attempt, kept for diagnostics once retries are exhausted.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub delay: std::time::Duration,
    pub error: String,
}

/// Minimal structured snapshot of an error, suitable for embedding in an
/// observability event's `context` field without pulling in the whole
/// [`CoreError`] (which isn't `Clone`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for ErrorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.kind, self.severity, self.message)
    }
}

impl From<&CoreError> for ErrorSnapshot {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            severity: err.severity(),
            message: err.to_string(),
            correlation_id: err.context().correlation_id.clone(),
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable_by_default() {
        let err = CoreError::connection("refused", ErrorContext::new("connect", "cwmp"));
        assert!(err.is_retryable_by_default());
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn authentication_errors_are_not_retryable() {
        let err = CoreError::authentication("bad credentials", ErrorContext::default());
        assert!(!err.is_retryable_by_default());
        assert_eq!(err.severity(), Severity::High);
    }

    #[test]
    fn transient_protocol_errors_are_retryable_permanent_ones_are_not() {
        let transient = CoreError::protocol("malformed response", ErrorContext::default(), true);
        assert!(transient.is_retryable_by_default());

        let permanent =
            CoreError::protocol("unsupported operation", ErrorContext::default(), false);
        assert!(!permanent.is_retryable_by_default());
        assert_eq!(permanent.severity(), Severity::High);
    }

    #[test]
    fn with_attempt_history_embeds_metadata() {
        let history = vec![AttemptRecord {
            attempt: 1,
            delay: std::time::Duration::from_millis(250),
            error: "timed out".to_string(),
        }];
        let err =
            CoreError::timeout("deadline exceeded", ErrorContext::default()).with_attempt_history(&history);
        assert!(err.context().metadata["attempts"].is_array());
    }
}
