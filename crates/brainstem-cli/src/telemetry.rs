//! Logging and span export for the host binary.
//!
//! Console output is always on and filtered by `RUST_LOG` (default
//! `info`); `BRAINSTEM_LOG_FORMAT=json` switches it to newline-delimited
//! JSON for log shippers.  Span export is opt-in: when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` points at a collector, every span from
//! the driver and nodes is forwarded over OTLP/HTTP.
//!
//! The decision core is synchronous and single-threaded, so this process
//! has no async runtime to drive a batching span pipeline.  Spans leave
//! through the blocking exporter instead, which trades a little latency on
//! the tick path for a pipeline with nothing to poll.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("BRAINSTEM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Handle to the installed pipeline.
///
/// Keep it alive for the whole program and call [`Telemetry::shutdown`] on
/// the way out (dropping it does the same) so the final spans reach the
/// collector.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

/// Install the global `tracing` subscriber.
///
/// Must be called once, before the first tick; later calls would fail to
/// set the global subscriber.
pub fn init(service_name: &str) -> Telemetry {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = otlp_provider(service_name);
    let span_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer()
            .with_tracer(p.tracer("brainstem"))
            .boxed()
    });
    let console_layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(span_layer)
        .with(console_layer)
        .init();

    Telemetry { provider }
}

impl Telemetry {
    /// Flush pending spans and tear the exporter down.
    ///
    /// A no-op when no collector was configured.
    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[brainstem] span exporter shutdown failed: {e}");
            }
        }
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.flush();
    }
}

/// The OTLP provider, when a collector endpoint is configured.
fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[brainstem] OTLP exporter unavailable: {e}");
            return None;
        }
    };

    Some(
        SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .with_simple_exporter(exporter)
            .build(),
    )
}
