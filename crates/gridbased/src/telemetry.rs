//! Structured telemetry initialisation for the service host.
//!
//! Every event passing the configured filter is written twice: to stderr in
//! the configured format, and as one formatted line into the shared
//! [`LogRingBuffer`] served by the log endpoint.

use std::fmt;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::field::{Field, Visit};
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, fmt as tracing_fmt};

use gridbase_config::Config;

use crate::logbuf::LogRingBuffer;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Field whose value is stored as exception text, one entry per line.
pub const TRACE_FIELD: &str = "trace";

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on the first call.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// installed subscriber, so `buffer` is only wired in by the first caller.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or another
/// subscriber is already installed.
pub fn initialise(
    config: &Config,
    buffer: Arc<LogRingBuffer>,
) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config, buffer))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config, buffer: Arc<LogRingBuffer>) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config, buffer)?;
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Composes the filter, the stderr mirror and the ring-buffer layer.
fn build_subscriber(
    config: &Config,
    buffer: Arc<LogRingBuffer>,
) -> Result<impl Subscriber + Send + Sync + 'static, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let stderr = tracing_fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        // Colour only on interactive terminals.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(tracing_fmt::time::UtcTime::rfc_3339());
    let stderr_layer = if config.log_format().is_json() {
        stderr.json().flatten_event(true).boxed()
    } else {
        stderr.compact().boxed()
    };

    Ok(tracing_subscriber::registry()
        .with(RingBufferLayer::new(buffer))
        .with(stderr_layer)
        .with(filter))
}

/// Layer appending every event to a [`LogRingBuffer`].
///
/// Lines read `<rfc3339> [<thread>] <LEVEL> <target> - <message> <k=v ...>`.
#[derive(Debug, Clone)]
pub struct RingBufferLayer {
    buffer: Arc<LogRingBuffer>,
}

impl RingBufferLayer {
    #[must_use]
    pub fn new(buffer: Arc<LogRingBuffer>) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for RingBufferLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "-".to_owned());
        let current = thread::current();
        let thread_name = current.name().unwrap_or("unnamed");

        let mut line = format!(
            "{timestamp} [{thread_name}] {:<5} {} - {}",
            metadata.level().as_str(),
            metadata.target(),
            visitor.message
        );
        for (name, value) in &visitor.fields {
            line.push(' ');
            line.push_str(name);
            line.push('=');
            line.push_str(value);
        }
        self.buffer.append(line, visitor.trace.as_deref());
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    trace: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_owned());
    }
}

impl LineVisitor {
    fn record(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            TRACE_FIELD => self.trace = Some(value),
            name => self.fields.push((name, value)),
        }
    }
}
