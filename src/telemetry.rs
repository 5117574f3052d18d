//! Telemetry and structured logging for conversion jobs.

use crate::job::{ConversionJob, JobStatus};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};

const TRACER_NAME: &str = "convert-server";

/// Jobs slower than this are logged as warnings.
pub const SLOW_JOB_THRESHOLD_MS: i64 = 5000;

/// Records telemetry for a completed or failed job.
///
/// Emits one OpenTelemetry span carrying the job id, kind, status, duration,
/// output size and page count, plus matching `tracing` events.
pub fn record_conversion_telemetry(job: &ConversionJob) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("conversion_job");

    span.set_attribute(KeyValue::new("job_id", job.job_id.clone()));
    span.set_attribute(KeyValue::new("kind", job.kind.to_string()));
    span.set_attribute(KeyValue::new("status", job.status.to_string()));
    span.set_attribute(KeyValue::new("input_bytes", job.input_bytes as i64));

    if let Some(output_bytes) = job.output_bytes {
        span.set_attribute(KeyValue::new("output_bytes", output_bytes as i64));
    }
    if let Some(pages) = job.pages {
        span.set_attribute(KeyValue::new("pages", pages as i64));
    }

    if let Some(duration_ms) = job.processing_duration_ms() {
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));

        info!(
            job_id = %job.job_id,
            kind = %job.kind,
            duration_ms = duration_ms,
            status = %job.status,
            output_bytes = job.output_bytes,
            pages = job.pages,
            "Conversion job finished"
        );

        if duration_ms > SLOW_JOB_THRESHOLD_MS {
            warn!(
                job_id = %job.job_id,
                duration_ms = duration_ms,
                "Conversion exceeded performance threshold ({}ms)",
                SLOW_JOB_THRESHOLD_MS
            );
        }
    }

    if job.status == JobStatus::Failed {
        if let Some(ref error) = job.error {
            span.set_attribute(KeyValue::new("error", error.clone()));
            warn!(
                job_id = %job.job_id,
                kind = %job.kind,
                error = %error,
                "Conversion job failed"
            );
        }
    }

    span.end();
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`). `LOG_FORMAT=json`
/// switches the formatter to one JSON object per line.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initializes OpenTelemetry with an OTLP exporter.
///
/// Reads `OTEL_EXPORTER_OTLP_ENDPOINT` (default `http://localhost:4317`) and
/// `OTEL_SERVICE_NAME` (default `convert-server`).
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| TRACER_NAME.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

/// Flushes buffered spans on shutdown.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
