use crate::infra::audit::{AuditEventType, AuditLogger, AuditObserver};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use motor_core::{
    ClockConfig, ClockStats, Command, CommandKind, MotorSession, NoiseSource, SeededNoise,
    SessionConfig, SessionHandle, SessionObserver, SessionSnapshot, SimulationClock, SubmitError,
    TimeBase, MAX_SPEED_RPM,
};
use motor_io::auth::AuthConfig;
use motor_io::bridge::{run_bridge, BridgeConfig, BridgeError};
use motor_io::metrics::{record_snapshot, MetricsObserver};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to open audit log {}: {source}", path.display())]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("{0} thread panicked")]
    ThreadPanic(&'static str),
}

/// Fans session events out to metrics and, when enabled, the audit trail.
struct RuntimeObserver {
    metrics: MetricsObserver,
    audit: Option<AuditObserver>,
}

impl RuntimeObserver {
    fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
        if let Some(audit) = &self.audit {
            audit.record(event_type, details);
        }
    }
}

impl SessionObserver for RuntimeObserver {
    fn on_submitted(&self, command: &Command) {
        self.metrics.on_submitted(command);
        if let Some(audit) = &self.audit {
            audit.on_submitted(command);
        }
    }

    fn on_rejected(&self, kind: CommandKind, operator: &str, error: &SubmitError) {
        self.metrics.on_rejected(kind, operator, error);
        if let Some(audit) = &self.audit {
            audit.on_rejected(kind, operator, error);
        }
    }

    fn on_resolved(&self, command: &Command) {
        info!(
            id = command.id,
            command = %command.kind,
            status = ?command.status,
            operator = %command.operator,
            response_time_ms = ?command.response_time,
            "Command resolved"
        );
        self.metrics.on_resolved(command);
        if let Some(audit) = &self.audit {
            audit.on_resolved(command);
        }
    }

    fn on_tick(&self, snapshot: &SessionSnapshot) {
        self.metrics.on_tick(snapshot);
    }

    fn on_emergency_reset(&self, operator: &str) {
        if let Some(audit) = &self.audit {
            audit.on_emergency_reset(operator);
        }
    }

    fn on_control_changed(&self, enabled: bool, operator: &str) {
        info!(enabled, %operator, "Control gate changed");
        if let Some(audit) = &self.audit {
            audit.on_control_changed(enabled, operator);
        }
    }
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let observer = Arc::new(RuntimeObserver {
        metrics: MetricsObserver,
        audit: init_audit(config.audit_path.as_deref(), timebase)?,
    });
    observer.record(
        AuditEventType::SessionStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "bridge_enabled": config.bridge_enabled,
            "metrics_enabled": metrics_enabled,
            "tick_ms": config.tick_period.as_millis() as u64,
            "seed": config.seed,
            "control_enabled": config.control_enabled,
        }),
    );

    let session_config = SessionConfig {
        control_enabled: config.control_enabled,
        ..SessionConfig::default()
    };
    let noise: Box<dyn NoiseSource> = match config.seed {
        Some(seed) => {
            info!(seed, "Using seeded noise");
            Box::new(SeededNoise::from_seed(seed))
        }
        None => Box::new(SeededNoise::from_entropy()),
    };
    let handle = SessionHandle::new(MotorSession::new(session_config, noise), timebase)
        .with_observer(observer.clone());
    record_snapshot(&handle.snapshot());

    let stop = Arc::new(AtomicBool::new(false));

    let clock_config = ClockConfig {
        tick_period: config.tick_period,
        ..ClockConfig::default()
    };
    info!(
        tick_ms = clock_config.tick_period.as_millis() as u64,
        max_speed_rpm = MAX_SPEED_RPM,
        control_enabled = config.control_enabled,
        "Starting simulation clock"
    );

    let clock_handle = {
        let handle = handle.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut clock = SimulationClock::new(handle, clock_config);
            clock.run(&stop);
            clock.stats().clone()
        })
    };

    let updater_handle = telemetry::start_metrics_updater(handle.clone(), Arc::clone(&stop));

    let bridge_handle = if config.bridge_enabled {
        let handle = handle.clone();
        let stop = Arc::clone(&stop);
        let bridge_config = build_bridge_config(&config);
        info!(addr = %bridge_config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || {
            let result = run_bridge(handle, bridge_config, Arc::clone(&stop));
            if let Err(e) = &result {
                error!(error = %e, "Bridge failed, shutting down");
                stop.store(true, Ordering::Relaxed);
            }
            result
        }))
    } else {
        info!("Bridge disabled");
        None
    };

    info!("motor-sim running");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let deadline = Instant::now() + Duration::from_secs(seconds);
        while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
        }
        stop.store(true, Ordering::Relaxed);
    }

    let stats = clock_handle
        .join()
        .map_err(|_| AppError::ThreadPanic("simulation clock"))?;
    let _ = updater_handle.join();
    let bridge_result = match bridge_handle {
        Some(h) => h.join().map_err(|_| AppError::ThreadPanic("bridge"))?,
        None => Ok(()),
    };

    shutdown(&observer, &handle, &stats);
    bridge_result.map_err(AppError::from)
}

fn shutdown(observer: &RuntimeObserver, handle: &SessionHandle, stats: &ClockStats) {
    let snapshot = handle.snapshot();
    info!(
        ticks_executed = stats.ticks_executed,
        ticks_late = stats.ticks_late,
        commands_resolved = stats.commands_resolved,
        max_lateness_us = stats.max_lateness_us,
        final_speed_rpm = snapshot.motor.current_speed,
        emergency_active = snapshot.flags.emergency_active,
        "Run complete"
    );
    observer.record(
        AuditEventType::SessionShutdown,
        serde_json::json!({
            "ticks_executed": stats.ticks_executed,
            "ticks_late": stats.ticks_late,
            "commands_resolved": stats.commands_resolved,
            "final_state": snapshot.motor,
        }),
    );
}

fn build_bridge_config(config: &RuntimeConfig) -> BridgeConfig {
    BridgeConfig {
        bind_addr: config.bind_addr.clone(),
        publish_interval: config.publish_interval,
        auth: AuthConfig {
            enabled: config.auth_secret.is_some(),
            secret: config.auth_secret.clone().unwrap_or_default().into_bytes(),
            max_age_secs: config.auth_max_age_secs,
        },
        require_handshake: config.bridge_require_handshake,
        default_operator: config.operator.clone(),
    }
}

fn init_audit(path: Option<&Path>, timebase: TimeBase) -> Result<Option<AuditObserver>, AppError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let logger = AuditLogger::new(path).map_err(|source| AppError::Audit {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(AuditObserver::new(logger, timebase)))
}
