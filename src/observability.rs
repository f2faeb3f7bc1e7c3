//! Structured observability events (§4.10), dual-emitted as both a typed
//! [`ObservabilityEvent`] fed to an installable [`EventSink`] and a
//! `tracing` span/event, generalized to the categories this crate's
//! pipeline actually produces.

use std::any::type_name;
use std::fs::File;
use std::io::{self, Result as IoResult, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::Mutex as ParkingMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use crate::errors::{CoreError, ErrorContext};

/// Where in the pipeline an [`ObservabilityEvent`] originated (§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservabilityCategory {
    Extraction,
    Comparison,
    Validation,
    Connection,
    Performance,
    Configuration,
    Error,
    Audit,
}

impl ObservabilityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Comparison => "comparison",
            Self::Validation => "validation",
            Self::Connection => "connection",
            Self::Performance => "performance",
            Self::Configuration => "configuration",
            Self::Error => "error",
            Self::Audit => "audit",
        }
    }
}

/// A single structured observability event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservabilityEvent {
    pub timestamp: DateTime<Utc>,
    pub category: ObservabilityCategory,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ObservabilityEvent {
    pub fn new(category: ObservabilityCategory, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            component: component.into(),
            correlation_id: None,
            message: message.into(),
            context: Value::Null,
            duration_ms: None,
            success: None,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for ObservabilityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.timestamp.to_rfc3339(),
            self.category.as_str(),
            self.component,
            self.message
        )
    }
}

/// Abstraction over an output target that consumes [`ObservabilityEvent`]s.
/// Implementations are allowed to perform blocking I/O, since the volume
/// this crate produces (one event per extraction/comparison/validation
/// step, not per parameter) doesn't warrant offloading to a blocking pool.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &ObservabilityEvent) -> IoResult<()>;

    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Plain-text stdout sink.
#[derive(Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &ObservabilityEvent) -> IoResult<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{event}")?;
        stdout.flush()
    }
}

/// In-memory sink for tests and snapshotting.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<ParkingMutex<Vec<ObservabilityEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ObservabilityEvent> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &ObservabilityEvent) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// JSON Lines sink for machine-readable structured logging — one JSON
/// object per line, for log aggregation and automated assertions.
pub struct JsonLinesSink {
    handle: Box<dyn Write + Send + Sync>,
    pretty: bool,
}

impl JsonLinesSink {
    pub fn new(handle: Box<dyn Write + Send + Sync>) -> Self {
        Self { handle, pretty: false }
    }

    pub fn with_pretty_print(handle: Box<dyn Write + Send + Sync>) -> Self {
        Self { handle, pretty: true }
    }

    pub fn to_stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn to_file(path: impl AsRef<Path>) -> IoResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl EventSink for JsonLinesSink {
    fn handle(&mut self, event: &ObservabilityEvent) -> IoResult<()> {
        let json = if self.pretty {
            event.to_json_pretty()
        } else {
            event.to_json_string()
        }
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.handle, "{json}")?;
        self.handle.flush()
    }

    fn name(&self) -> String {
        if self.pretty {
            "JsonLinesSink(pretty)".to_string()
        } else {
            "JsonLinesSink".to_string()
        }
    }
}

/// Process-wide sink slot. Installed once: §5's "shared resources" note
/// says the sink is not swappable mid-operation, so a second
/// [`install_sink`] call is rejected rather than silently replacing the
/// first sink underneath in-flight work.
static SINK: OnceLock<Mutex<Box<dyn EventSink>>> = OnceLock::new();

/// Install the process-wide sink. Returns an error if a sink was already
/// installed.
pub fn install_sink(sink: Box<dyn EventSink>) -> Result<(), CoreError> {
    SINK.set(Mutex::new(sink)).map_err(|_| {
        CoreError::configuration(
            "an observability sink is already installed",
            ErrorContext::new("install_sink", "observability"),
        )
    })
}

pub fn is_sink_installed() -> bool {
    SINK.get().is_some()
}

/// Emit an event to the installed sink (if any) and as a `tracing` event.
/// Never fails the caller's operation: a sink I/O failure is logged via
/// `tracing::warn!` rather than propagated.
pub fn emit(event: ObservabilityEvent) {
    emit_tracing(&event);
    if let Some(sink) = SINK.get() {
        let mut guard = sink.lock().expect("observability sink lock poisoned");
        if let Err(err) = guard.handle(&event) {
            tracing::warn!(error = %err, "observability sink failed to handle event");
        }
    }
}

fn emit_tracing(event: &ObservabilityEvent) {
    tracing::info!(
        category = event.category.as_str(),
        component = %event.component,
        correlation_id = event.correlation_id.as_deref().unwrap_or(""),
        duration_ms = event.duration_ms,
        success = event.success,
        "{}",
        event.message
    );
}

/// Run `fut` inside a `tracing` span for `operation`, and emit a start event
/// plus an end event (with elapsed `duration_ms` and `success`) once it
/// resolves — the span helper described in §4.10 "dual-emit as structured
/// events and spans".
pub async fn traced<T>(
    category: ObservabilityCategory,
    component: &str,
    operation: &str,
    correlation_id: Option<String>,
    fut: impl std::future::Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    let span = tracing::info_span!("operation", category = category.as_str(), component, operation);

    let mut start_event = ObservabilityEvent::new(category, component, format!("{operation} started"));
    if let Some(id) = &correlation_id {
        start_event = start_event.with_correlation_id(id.clone());
    }
    emit(start_event);

    let started = std::time::Instant::now();
    let result = fut.instrument(span).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let success = result.is_ok();
    let message = if success {
        format!("{operation} completed")
    } else {
        format!("{operation} failed")
    };
    let mut end_event = ObservabilityEvent::new(category, component, message)
        .with_duration_ms(duration_ms)
        .with_success(success);
    if let Some(id) = correlation_id {
        end_event = end_event.with_correlation_id(id);
    }
    emit(end_event);

    result
}
