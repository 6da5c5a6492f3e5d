//! Tracing subscriber and optional OpenTelemetry export.

use miette::{IntoDiagnostic, WrapErr};
use opentelemetry::InstrumentationScope;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing::{debug, info};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Format, TracingConfig};

/// Filter used when `RUST_LOG` isn't set.
const DEFAULT_FILTER: &str = "bitbucket_snarfer=debug";

/// Builds a layer that exports spans over OTLP/HTTP. The exporter endpoint is taken from the
/// standard `OTEL_EXPORTER_OTLP_*` environment variables.
fn otlp_layer() -> miette::Result<OpenTelemetryLayer<Registry, SdkTracer>> {
    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .build()
        .into_diagnostic()
        .wrap_err("building otlp http exporter failed")?;
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(env!("CARGO_PKG_NAME"))
                .build(),
        )
        .build();
    let scope = InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .build();
    let tracer = provider.tracer_with_scope(scope);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or a global subscriber is already set.
pub fn try_init(tracing: &TracingConfig) -> miette::Result<()> {
    let telemetry_layer = if tracing.enabled {
        Some(otlp_layer()?)
    } else {
        None
    };

    let registry = tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()));

    match tracing.format {
        Format::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        Format::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        Format::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    }
    .into_diagnostic()
    .wrap_err("could not init registry")?;

    debug!(format = ?tracing.format, otlp = tracing.enabled, "tracing initialized");
    info!(version = env!("CARGO_PKG_VERSION"), "starting");

    Ok(())
}
