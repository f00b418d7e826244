use std::{
    sync::{Mutex, OnceLock, PoisonError},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use customer_crud_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_INSTALL_GUARD: Mutex<()> = Mutex::new(());
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_FILTER: &str = "info,sqlx=warn";

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty output outside production, JSON lines in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let base = tracing_fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339());
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.environment {
        Environment::Development | Environment::Test => registry
            .with(base.event_format(tracing_fmt::format().pretty()))
            .try_init()?,
        Environment::Production => registry.with(base.json()).try_init()?,
    }

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once and returns its handle on every call.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let _guard = METRICS_INSTALL_GUARD
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE.set(handle.clone()).ok();

    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    describe_counter!(
        "customer_commands_total",
        "Count of customer commands executed, labelled by kind and result"
    );
    describe_counter!(
        "customer_queries_total",
        "Count of customer read requests, labelled by kind and result"
    );
    describe_counter!(
        "projection_events_applied_total",
        "Count of domain events applied to the customer read model"
    );
    START_TIME.get_or_init(Instant::now);

    Ok(handle)
}

/// Renders the recorder output followed by the build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    body.push_str("# TYPE app_build_info gauge\n");
    body.push_str(&format!(
        "app_build_info{{version=\"{BUILD_VERSION}\",git=\"{}\"}} 1\n",
        build_git_sha()
    ));

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    body.push_str("# TYPE app_uptime_seconds gauge\n");
    body.push_str(&format!("app_uptime_seconds {uptime}\n"));

    body
}
