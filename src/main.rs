//! Observa Demo Exporter
//!
//! Creates the metrics declared in a configuration file, drives them with
//! synthetic updates and serves the result on a Prometheus endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │  Update loop │───▶│  Performers  │◀───│ PrometheusBackend │◀── GET /metrics
//! │  (interval)  │    │ (local state)│    │ (collect on scrape)│
//! └──────────────┘    └──────────────┘    └──────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use observa::meter::{MeterProvider, MetricHandle, MetricOption};
use observa::{
    Attributes, CallbackResult, Error, MetricsConfig, ObserveOption, PrometheusBackend, Result,
};

/// Configuration used when no file is given.
const DEMO_CONFIG: &str = r#"
instrument: observa-demo
instrumentVersion: v0.1.0
attributes:
  service: demo
metrics:
  - name: demo_requests_total
    kind: counter
    help: Synthetic requests handled
  - name: demo_inflight_requests
    kind: up_down_counter
    help: Synthetic requests in flight
  - name: demo_queue_depth
    kind: gauge
    help: Synthetic queue depth
  - name: demo_request_duration_seconds
    kind: histogram
    help: Synthetic request duration
    unit: s
    buckets: [0.1, 0.25, 0.5, 1.0]
"#;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Observa demo exporter - observable metrics served over Prometheus
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics configuration file (YAML, or JSON with a .json extension)
    #[arg(long, env = "OBSERVA_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between synthetic updates
    #[arg(long, env = "UPDATE_INTERVAL_SECONDS", default_value = "5")]
    interval_seconds: u64,

    /// Number of update rounds before exiting (0 runs until interrupted)
    #[arg(long, env = "ITERATIONS", default_value = "0")]
    iterations: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9464")]
    metrics_addr: String,

    /// Print the exposition text after every update round
    #[arg(long, env = "PRINT_METRICS")]
    print: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = match &args.config {
        Some(path) => MetricsConfig::from_file(path)?,
        None => MetricsConfig::from_yaml_str(DEMO_CONFIG)?,
    };

    info!("Starting Observa demo exporter");
    info!(
        "  Instrument: {}@{}",
        config.instrument, config.instrument_version
    );
    info!("  Metrics: {}", config.metrics.len());
    info!("  Update interval: {}s", args.interval_seconds);

    let backend = match config.collect_timeout() {
        Some(timeout) => PrometheusBackend::with_collect_timeout(timeout),
        None => PrometheusBackend::new(),
    }
    .map_err(|e| Error::Config(format!("Prometheus backend setup failed: {}", e)))?;
    let backend = Arc::new(backend);

    let provider = MeterProvider::new(backend.clone());
    let meter = provider.meter(config.meter_option());
    let handles = config.build(&meter)?;

    let started = Instant::now();
    let _uptime = meter.gauge(
        "observa_demo_uptime_seconds",
        MetricOption::new()
            .with_help("Seconds since the exporter started")
            .with_unit("s")
            .with_callback(move |ctx| {
                ctx.check()?;
                Ok(Some(CallbackResult::new(started.elapsed().as_secs_f64())))
            }),
    )?;

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let server_backend = backend.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, server_backend).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut interval = tokio::time::interval(Duration::from_secs(args.interval_seconds.max(1)));
    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        tick += 1;
        drive(&handles, tick);

        if args.print {
            match backend.encode_text() {
                Ok(text) => println!("{}", text),
                Err(e) => warn!("Failed to encode metrics: {}", e),
            }
        }
        info!(tick, callback_errors = backend.callback_errors(), "Update round complete");

        if args.iterations > 0 && tick >= args.iterations {
            break;
        }
    }

    server.abort();
    info!("Exporter shutdown complete");
    Ok(())
}

/// Apply one round of synthetic updates.
fn drive(handles: &[MetricHandle], tick: u64) {
    let parity = if tick % 2 == 0 { "even" } else { "odd" };
    let options = [ObserveOption::new(Attributes::new().with("parity", parity))];

    for handle in handles {
        match handle {
            MetricHandle::Counter(counter) => counter.inc(&options),
            MetricHandle::UpDownCounter(counter) => {
                if tick % 3 == 0 {
                    counter.dec(&options);
                } else {
                    counter.inc(&options);
                }
            }
            MetricHandle::Gauge(gauge) => gauge.set((tick % 10) as f64, &options),
            MetricHandle::Histogram(histogram) => {
                histogram.record(((tick % 7) as f64 + 1.0) / 10.0, &options)
            }
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tokio=warn"] {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {}: {}", directive, e),
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, backend: Arc<PrometheusBackend>) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let backend = backend.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(&backend, req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}

fn respond(backend: &PrometheusBackend, path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match backend.encode_text() {
            Ok(body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                with_status(StatusCode::INTERNAL_SERVER_ERROR, "encoding failed")
            }
        },
        "/healthz" | "/livez" | "/readyz" => with_status(StatusCode::OK, "ok"),
        _ => with_status(StatusCode::NOT_FOUND, "not found"),
    }
}

fn with_status(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
