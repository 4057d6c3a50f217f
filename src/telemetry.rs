//! Global tracing subscriber setup and metric descriptions.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

pub const SYNC_CYCLES_TOTAL: &str = "incident_sync_cycles_total";
pub const SYNC_FAILURES_TOTAL: &str = "incident_sync_failures_total";
pub const SYNC_CYCLE_DURATION_MS: &str = "incident_sync_cycle_duration_ms";
pub const OPEN_INCIDENTS: &str = "incident_open_incidents";
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "notifications_dropped_total";
pub const NOTIFICATIONS_SOUND_PLAYED_TOTAL: &str = "notifications_sound_played_total";
pub const NOTIFICATIONS_REDIRECTS_TOTAL: &str = "notifications_redirects_total";

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` macros (sqlx, reqwest)
/// into the tracing pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: Failed to install log tracer bridge: {}. `log::` records will not reach the subscriber.",
                err
            );
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: Failed to set global tracing subscriber: {}. Default subscriber remains in effect.",
            err
        );
    }

    describe_metrics();

    Ok(())
}

/// Register descriptions for the metrics emitted by the sync and notification paths.
pub fn describe_metrics() {
    describe_counter!(SYNC_CYCLES_TOTAL, "Completed reconciliation cycles");
    describe_counter!(
        SYNC_FAILURES_TOTAL,
        "Reconciliation cycles aborted by a remote or cache failure"
    );
    describe_histogram!(
        SYNC_CYCLE_DURATION_MS,
        Unit::Milliseconds,
        "Wall time of one reconciliation cycle"
    );
    describe_gauge!(OPEN_INCIDENTS, "Open incidents seen in the latest cycle");
    describe_counter!(
        NOTIFICATIONS_DROPPED_TOTAL,
        "Sound or redirect requests dropped, labelled by reason"
    );
    describe_counter!(
        NOTIFICATIONS_SOUND_PLAYED_TOTAL,
        "Sounds handed to the operating system"
    );
    describe_counter!(
        NOTIFICATIONS_REDIRECTS_TOTAL,
        "Incident pages opened in the browser"
    );
}
