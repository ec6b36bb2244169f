//! Global tracing subscriber for the `lectern` binary.
//!
//! Logs go to stderr so `--json` command output on stdout stays parseable.
//! Spans can additionally be exported through OpenTelemetry (stdout
//! exporter), which is useful for profiling slow deck conversions.
//!
//! ```no_run
//! use lectern_observe::tracing_setup::{TracingOptions, init_tracing};
//!
//! let _guard = init_tracing(TracingOptions { verbosity: 1, ..Default::default() }).unwrap();
//! tracing::info!("ready");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOptions {
    /// Number of `-v` flags. Ignored when `RUST_LOG` is set.
    pub verbosity: u8,
    pub format: LogFormat,
    pub otel: bool,
}

/// Keeps the span exporter alive. Dropping it flushes pending spans.
#[must_use = "dropping the guard stops span export"]
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("warning: span exporter shutdown failed: {e}");
            }
        }
    }
}

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,lectern=info,lectern_core=info,lectern_infra=info,lectern_api=info",
        1 => "info,lectern=debug,lectern_core=debug,lectern_infra=debug,lectern_api=debug",
        _ => "debug,lectern_core=trace,lectern_infra=trace",
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(options: TracingOptions) -> Result<TracingGuard, TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.verbosity)));

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(options.format)];

    let provider = options.otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        layers.push(
            tracing_opentelemetry::layer()
                .with_tracer(provider.tracer("lectern"))
                .boxed(),
        );
        opentelemetry::global::set_tracer_provider(provider.clone());
        provider
    });

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(TracingGuard { provider })
}

fn fmt_layer(format: LogFormat) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
    }
}
