use anyhow::Context as _;
use opentelemetry::trace::TraceId;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info";

/// Shape of the log lines written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// One JSON object per line, for log collectors
    Json,
}

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> Option<TraceId> {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    match tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
    {
        TraceId::INVALID => None,
        valid => Some(valid),
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("invalid log filter")
}

#[cfg(feature = "telemetry")]
fn init_tracer_provider() -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};

    let otlp_endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL")
        .context("an OTLP collector must be configured via OPENTELEMETRY_ENDPOINT_URL")?;

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("failed to create OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name("pubsubplus-operator")
                .build(),
        )
        .build())
}

/// Install the global tracing subscriber
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let (compact, json) = match format {
        LogFormat::Compact => (Some(fmt::layer().compact()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    let collector = Registry::default()
        .with(env_filter()?)
        .with(compact)
        .with(json);

    #[cfg(feature = "telemetry")]
    let collector = {
        use opentelemetry::trace::TracerProvider as _;
        let provider = init_tracer_provider()?;
        let tracer = provider.tracer("pubsubplus-operator");
        // the global provider keeps the exporter alive
        opentelemetry::global::set_tracer_provider(provider);
        collector.with(tracing_opentelemetry::layer().with_tracer(tracer))
    };

    tracing::subscriber::set_global_default(collector)
        .context("a global tracing subscriber is already installed")
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn no_trace_id_outside_an_otel_span() {
        assert_eq!(get_trace_id(), None);
    }

    #[test]
    fn log_format_parses_from_flag_values() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("compact", true), Ok(LogFormat::Compact));
        assert!(LogFormat::from_str("yaml", true).is_err());
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }

    #[test]
    fn default_filter_is_valid() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
