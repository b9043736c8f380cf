//! Logging, tracing and metrics for the server.
//!
//! Console logging through `tracing_subscriber::fmt` is always on, filtered by
//! `RUST_LOG` (default `info`). Set `LOG_FORMAT=json` for one JSON object per
//! line instead of the multi-line pretty format.
//!
//! Everything else is opt-in through cargo features and exported with
//! OpenTelemetry:
//!
//! - `tracing`: spans for every request and for store reservations inside
//!   `hilo`.
//! - `metrics`: `requests`, `ids_issued`, `errors` and `request_duration`,
//!   each with a `method` attribute (`next_id` or `next_ids`).
//! - `honeycomb`: OTLP/gRPC export to Honeycomb, configured by
//!   `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT` and
//!   `HONEYCOMB_COMPRESSION`.
//! - `stdout`: periodic export to standard output, handy locally.
//!
//! Exporters need at least one of `tracing` or `metrics`, and both exporters
//! may be enabled together:
//!
//! ```bash
//! cargo run --features tracing,metrics,honeycomb,stdout
//! ```
//!
//! Events emitted inside a span are exported as span events; events outside
//! any span only reach the console.

#[cfg(all(
    feature = "honeycomb",
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!(
    "The 'honeycomb' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(any(
    all(feature = "metrics", feature = "stdout"),
    all(feature = "tracing", any(feature = "stdout", feature = "honeycomb"))
))]
const EXPORT_INTERVAL: core::time::Duration = core::time::Duration::from_secs(5);

/// Providers that must be flushed and shut down before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics, reporting failures on stderr since
    /// the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

fn json_logs() -> bool {
    std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"))
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder("hilo")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let console = if json_logs() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_line_number(true)
            .with_target(false)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
            .with_file(true)
            .pretty()
            .boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(console)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("hilo")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

/// Honeycomb export settings, read from the environment.
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
struct Honeycomb {
    metadata: MetadataMap,
    endpoint: String,
    compression: Compression,
}

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
impl Honeycomb {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?.parse().context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?.parse().context("invalid dataset")?,
        );

        Ok(Self {
            metadata,
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression: Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?,
        })
    }
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let honeycomb = Honeycomb::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(honeycomb.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(honeycomb.compression)
            .with_endpoint(honeycomb.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(all(feature = "tracing", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let honeycomb = Honeycomb::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(honeycomb.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(honeycomb.compression)
            .with_endpoint(honeycomb.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static IDS_ISSUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total gRPC id requests")
            .build(),
    );

    let _ = IDS_ISSUED.set(
        meter
            .u64_counter("ids_issued")
            .with_description("Total ids handed out")
            .build(),
    );

    let _ = ERRORS.set(
        meter
            .u64_counter("errors")
            .with_description("Requests that failed, by status code")
            .build(),
    );

    let _ = REQUEST_DURATION_MS.set(
        meter
            .f64_histogram("request_duration")
            .with_unit("ms")
            .with_description("End-to-end request duration")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests(method: &'static str) {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests(_method: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_ids_issued(method: &'static str, count: u64) {
    if let Some(counter) = IDS_ISSUED.get() {
        counter.add(count, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_ids_issued(_method: &'static str, _count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_errors(method: &'static str, code: tonic::Code) {
    if let Some(counter) = ERRORS.get() {
        counter.add(
            1,
            &[
                KeyValue::new("method", method),
                KeyValue::new("code", code.description()),
            ],
        );
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_errors(_method: &'static str, _code: tonic::Code) {}

#[cfg(feature = "metrics")]
pub fn record_request_duration(method: &'static str, duration_ms: f64) {
    if let Some(histogram) = REQUEST_DURATION_MS.get() {
        histogram.record(duration_ms, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_request_duration(_method: &'static str, _duration_ms: f64) {}
