use crate::config::{LogFormat, TelemetryConfig};
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    logs::SdkLoggerProvider,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::SdkTracerProvider,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE: &str = "golfchat-server";

/// Owns the OpenTelemetry providers; [`TelemetryGuard::shutdown`] flushes them.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    /// Flushes and shuts down every provider that was installed.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down tracer provider");
        }
        if let Some(provider) = self.meter_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down meter provider");
        }
        if let Some(provider) = self.logger_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to shut down logger provider");
        }
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into())
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("tonic=warn".parse()?)
        .add_directive("h2=warn".parse()?))
}

/// Initializes the tracing subscriber and, when an OTLP endpoint is configured,
/// the OpenTelemetry trace, metric and log pipelines.
///
/// # Errors
/// Returns an error if an exporter cannot be built or a filter directive is invalid.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let registry = Registry::default().with(env_filter()?);

    let mut guard = TelemetryGuard::default();

    let (otel_layer, log_bridge) = if let Some(endpoint) = &config.otlp_endpoint {
        let resource = Resource::builder()
            .with_attributes(vec![
                KeyValue::new(SERVICE_NAME, SERVICE),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            ])
            .build();

        global::set_text_map_propagator(TraceContextPropagator::new());

        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(
                opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).build()?,
            )
            .build();
        let tracer = opentelemetry::trace::TracerProvider::tracer(&tracer_provider, SERVICE);
        global::set_tracer_provider(tracer_provider.clone());

        let metric_exporter =
            opentelemetry_otlp::MetricExporter::builder().with_tonic().with_endpoint(endpoint).build()?;
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(PeriodicReader::builder(metric_exporter).build())
            .build();
        global::set_meter_provider(meter_provider.clone());

        let logger_provider = SdkLoggerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(
                opentelemetry_otlp::LogExporter::builder().with_tonic().with_endpoint(endpoint).build()?,
            )
            .build();
        let log_bridge = OpenTelemetryTracingBridge::new(&logger_provider);

        guard.tracer_provider = Some(tracer_provider);
        guard.meter_provider = Some(meter_provider);
        guard.logger_provider = Some(logger_provider);

        (Some(OpenTelemetryLayer::new(tracer)), Some(log_bridge))
    } else {
        (None, None)
    };

    let registry = registry.with(otel_layer).with(log_bridge);

    match config.log_format {
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
    }

    Ok(guard)
}
