//! Metrics for the ESP AT driver.
//!
//! Every metric the driver emits is declared here as a const [`Metric`] so
//! names stay consistent between the emitting code and dashboards. The driver
//! calls the `metrics` macros directly; with no recorder installed they cost
//! nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use espat_metrics::{describe_metrics, metric_defs};
//!
//! describe_metrics();
//! metrics::counter!(metric_defs::COMMANDS_SENT.name).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use espat_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const BYTES: Metric = Metric::counter("espat.example.bytes")
///     .with_description("Example byte counter")
///     .with_unit(Unit::Bytes)
///     .with_labels(&["link"]);
///
/// assert_eq!(BYTES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "espat.command.sent").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new counter metric.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the driver.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Command Engine
    // ========================================================================

    /// Commands written to the transport.
    pub const COMMANDS_SENT: Metric = Metric::counter("espat.command.sent")
        .with_description("AT commands written to the transport")
        .with_unit(Unit::Count);

    /// Commands that ended in a latched error.
    pub const COMMAND_FAILURES: Metric = Metric::counter("espat.command.failures")
        .with_description("AT commands that ended in an error")
        .with_unit(Unit::Count)
        .with_labels(&["error"]);

    /// Unsolicited notices absorbed by the reader loop.
    pub const NOTICES: Metric = Metric::counter("espat.notice.received")
        .with_description("Unsolicited link notices absorbed while waiting for replies")
        .with_unit(Unit::Count)
        .with_labels(&["kind"]);

    /// Tokens that matched nothing.
    pub const GARBAGE_TOKENS: Metric = Metric::counter("espat.reader.garbage_tokens")
        .with_description("Tokens that were neither expected, terminal, nor notices")
        .with_unit(Unit::Count);

    /// Reads that timed out with no bytes at all.
    pub const SILENCE_RETRIES: Metric = Metric::counter("espat.reader.silence_retries")
        .with_description("Reads that returned no bytes before the timeout")
        .with_unit(Unit::Count);

    // ========================================================================
    // Data Plane
    // ========================================================================

    /// Payload bytes acknowledged by the chip.
    pub const BYTES_SENT: Metric = Metric::counter("espat.link.bytes_sent")
        .with_description("Payload bytes acknowledged by the send handshake")
        .with_unit(Unit::Bytes);

    /// Payload bytes pulled from the chip.
    pub const BYTES_RECEIVED: Metric = Metric::counter("espat.link.bytes_received")
        .with_description("Payload bytes pulled from link buffers")
        .with_unit(Unit::Bytes);

    /// Send handshakes missing a confirmation.
    pub const SEND_FAILURES: Metric = Metric::counter("espat.link.send_failures")
        .with_description("Send handshakes missing the prompt, the echo, or SEND OK")
        .with_unit(Unit::Count);

    /// Pulls that returned fewer bytes than advertised.
    pub const SHORT_READS: Metric = Metric::counter("espat.link.short_reads")
        .with_description("Pulls that returned fewer bytes than the reply header advertised")
        .with_unit(Unit::Count);

    /// Links opened.
    pub const LINKS_OPENED: Metric = Metric::counter("espat.link.opened")
        .with_description("Links opened")
        .with_unit(Unit::Count)
        .with_labels(&["protocol"]);

    /// Links closed by the host.
    pub const LINKS_CLOSED: Metric = Metric::counter("espat.link.closed")
        .with_description("Links closed by the host")
        .with_unit(Unit::Count)
        .with_labels(&["mode"]);

    /// Size of each successful pull.
    pub const PULL_SIZE: Metric = Metric::histogram("espat.link.pull_size_bytes")
        .with_description("Bytes returned by each successful pull")
        .with_unit(Unit::Bytes);

    /// Links currently marked connected.
    pub const ACTIVE_LINKS: Metric = Metric::gauge("espat.link.active")
        .with_description("Links currently marked connected")
        .with_unit(Unit::Count);

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &COMMANDS_SENT,
        &COMMAND_FAILURES,
        &NOTICES,
        &GARBAGE_TOKENS,
        &SILENCE_RETRIES,
        &BYTES_SENT,
        &BYTES_RECEIVED,
        &SEND_FAILURES,
        &SHORT_READS,
        &LINKS_OPENED,
        &LINKS_CLOSED,
        &PULL_SIZE,
        &ACTIVE_LINKS,
    ];
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus recorder serving `/metrics` on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
