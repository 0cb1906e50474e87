//! Tracing subscribers used by the mockend binary.
use opentelemetry::sdk::trace::BatchConfig;
use opentelemetry::{global, KeyValue};

use opentelemetry::sdk::propagation::TraceContextPropagator;
use opentelemetry::sdk::{trace, Resource};
use opentelemetry_otlp::WithExportConfig;
use tracing::level_filters::LevelFilter;
use tracing_bunyan_formatter::JsonStorageLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use crate::error::{Error, Result};

pub const SERVICE_NAME: &str = "mockend";

/// Default endpoint of a local OTLP collector
pub const OTLP_ENDPOINT: &str = "http://localhost:4317/v1/traces";

fn configuration_error(err: impl std::fmt::Display) -> Error {
    Error::Configuration {
        reason: format!("Failed to initialize tracing: {}", err),
    }
}

/// Human readable logs on stdout, filtered through `RUST_LOG` (`info` when unset)
pub fn initialize_fmt_subscriber() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(configuration_error)
}

/// Exports spans to the OTLP collector listening at `exporter_endpoint`
pub fn initialize_otlp_subscriber(exporter_endpoint: &str) -> Result<()> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(exporter_endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            trace::config().with_resource(Resource::new(vec![KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                SERVICE_NAME.to_string(),
            )])),
        )
        .with_batch_config(BatchConfig::default().with_max_queue_size(1024 * 1024))
        .install_batch(opentelemetry::runtime::Tokio)
        .map_err(configuration_error)?;

    let subscriber = Registry::default();
    let tracing_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    global::set_text_map_propagator(TraceContextPropagator::new());

    subscriber
        .with(LevelFilter::INFO)
        .with(tracing_layer)
        .with(JsonStorageLayer)
        .try_init()
        .map_err(configuration_error)
}
