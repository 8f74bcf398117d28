//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use parley_types::config::LoggingConfig;
//!
//! parley_observe::tracing_setup::init_tracing(&LoggingConfig::default(), 0).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

use parley_types::config::{LogFormat, LoggingConfig};

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Filter directive for a CLI verbosity count.
///
/// `-v` raises Parley's own crates to debug, `-vv` to trace; otherwise the
/// configured directive is used as-is.
pub fn filter_directive(configured: &str, verbosity: u8) -> String {
    match verbosity {
        0 => configured.to_string(),
        1 => format!("{configured},parley=debug,parley_core=debug,parley_infra=debug,parley_api=debug"),
        _ => format!("{configured},parley=trace,parley_core=trace,parley_infra=trace,parley_api=trace"),
    }
}

/// Initialize the global tracing subscriber.
///
/// - `RUST_LOG` wins when set; otherwise the directive comes from
///   [`filter_directive`].
/// - `LogFormat::Json` emits one JSON object per event, for log shippers.
/// - `otel = true` additionally bridges spans to OpenTelemetry using a stdout
///   exporter (swap the exporter for OTLP in production).
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global subscriber
/// has already been set.
pub fn init_tracing(
    config: &LoggingConfig,
    verbosity: u8,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directive(&config.filter, verbosity))?,
    };

    let (text_layer, json_layer) = match config.format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            ),
        ),
    };

    let otel_layer = if config.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("parley");

        // Store the provider for shutdown and register it globally.
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Stderr subscriber for events emitted before [`init_tracing`] runs, such as
/// configuration loading. Warnings and errors only.
pub fn bootstrap_dispatch() -> tracing::Dispatch {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .finish()
        .into()
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call even when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
