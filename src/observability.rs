//! Tracing and metrics wiring.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use prometheus::Histogram;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

use crate::config::Config;

pub struct Metrics {
    pub http_duration_histogram: Histogram,
    pub db_duration_histogram: Histogram,
}

/// Registers the request and query duration histograms with the default
/// Prometheus registry, which the /metrics endpoint gathers from.
pub fn setup_metrics() -> anyhow::Result<Metrics> {
    let http_duration_histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("http_server_duration", "HTTP request duration")
            .namespace("inventory_api")
            .buckets(prometheus::exponential_buckets(0.005, 2.0, 10)?),
    )?;

    let db_duration_histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("db_query_duration", "Database query duration")
            .namespace("inventory_api")
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 10)?),
    )?;

    prometheus::default_registry().register(Box::new(http_duration_histogram.clone()))?;
    prometheus::default_registry().register(Box::new(db_duration_histogram.clone()))?;

    Ok(Metrics {
        http_duration_histogram,
        db_duration_histogram,
    })
}

/// Initializes the tracing subscriber with an OTLP span exporter and a fmt
/// layer. The returned provider must stay alive for spans to keep flowing.
pub fn setup_tracing(config: &Config) -> anyhow::Result<SdkTracerProvider> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let batch_processor = BatchSpanProcessor::builder(exporter).build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(batch_processor)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![
                    KeyValue::new("service.name", config.service_name.clone()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])
                .build(),
        )
        .build();

    let tracer = provider.tracer(config.service_name.to_string());
    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Registry::default()
        .with(env_filter)
        .with(telemetry_layer)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(provider)
}
