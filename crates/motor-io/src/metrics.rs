//! Prometheus metrics for the motor simulator.
//!
//! Motor gauges are refreshed from session snapshots; command counters
//! are fed by [`MetricsObserver`], which plugs into the session handle.

use motor_core::{tags, Command, CommandKind, CommandStatus, SessionObserver, SessionSnapshot, SubmitError};
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register<M>(metric: M) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    if let Err(e) = REGISTRY.register(Box::new(metric.clone())) {
        tracing::warn!(error = %e, "metric registration failed");
    }
    metric
}

fn gauge(tag: tags::Tag, help: &str) -> Gauge {
    register(Gauge::new(tag.metric, help).expect("static gauge definition"))
}

// ============================================================================
// Simulation Metrics
// ============================================================================

/// Physics ticks executed
pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new("motorsim_ticks_total", "Physics ticks executed")
            .expect("static counter definition"),
    )
});

/// Commands by kind and outcome (submitted, rejected, executed, failed)
pub static COMMANDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register(
        IntCounterVec::new(
            Opts::new("motorsim_commands_total", "Commands by kind and outcome"),
            &["command", "outcome"],
        )
        .expect("static counter definition"),
    )
});

/// Simulated command response time in milliseconds
pub static RESPONSE_TIME_MS: LazyLock<Histogram> = LazyLock::new(|| {
    register(
        Histogram::with_opts(
            HistogramOpts::new(
                "motorsim_command_response_time_ms",
                "Simulated command response time in milliseconds",
            )
            .buckets(vec![60.0, 80.0, 100.0, 125.0, 150.0, 200.0, 250.0]),
        )
        .expect("static histogram definition"),
    )
});

/// Commands waiting for their response delay
pub static PENDING_COMMANDS: LazyLock<Gauge> = LazyLock::new(|| {
    register(
        Gauge::new(
            "motorsim_pending_commands",
            "Commands waiting for their response delay",
        )
        .expect("static gauge definition"),
    )
});

// ============================================================================
// Safety Metrics
// ============================================================================

/// Safety flags (1 = safe, 0 = fault), labelled by flag
pub static SAFETY_FLAGS: LazyLock<GaugeVec> = LazyLock::new(|| {
    register(
        GaugeVec::new(
            Opts::new("motorsim_safety_flag", "Safety flags (1=safe, 0=fault)"),
            &["flag"],
        )
        .expect("static gauge definition"),
    )
});

pub static EMERGENCY_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    register(
        Gauge::new(
            "motorsim_emergency_active",
            "Emergency stop latched (1=active)",
        )
        .expect("static gauge definition"),
    )
});

pub static CONTROL_ENABLED: LazyLock<Gauge> = LazyLock::new(|| {
    register(
        Gauge::new("motorsim_control_enabled", "External control gate (1=enabled)")
            .expect("static gauge definition"),
    )
});

// ============================================================================
// Motor State Metrics
// ============================================================================

pub static MOTOR_SPEED_RPM: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::CURRENT_SPEED, "Current motor speed in RPM"));

pub static MOTOR_TARGET_RPM: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::TARGET_SPEED, "Target motor speed in RPM"));

pub static MOTOR_LOAD_PCT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::LOAD, "Motor load in percent"));

pub static MOTOR_TEMP_C: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::TEMPERATURE, "Motor temperature in Celsius"));

pub static MOTOR_VOLTAGE_V: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::VOLTAGE, "Supply voltage in volts"));

pub static MOTOR_CURRENT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::CURRENT, "Motor current (scaled by 1000)"));

pub static MOTOR_POWER_KW: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::POWER, "Motor power in kilowatts"));

pub static MOTOR_VIBRATION: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::VIBRATION, "Vibration in mm/s"));

pub static OPERATING_HOURS: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::OPERATING_HOURS, "Accumulated operating hours"));

pub static HEALTH_SCORE: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::HEALTH_SCORE, "Health score (0-100)"));

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Connected bridge clients
pub static BRIDGE_CLIENTS: LazyLock<Gauge> = LazyLock::new(|| {
    register(
        Gauge::new("motorsim_bridge_clients", "Connected bridge clients")
            .expect("static gauge definition"),
    )
});

/// Command messages refused for a zero or non-increasing sequence
pub static SEQUENCE_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "motorsim_sequence_rejections_total",
            "Command messages refused due to out-of-order sequence",
        )
        .expect("static counter definition"),
    )
});

/// Authentication failures for control messages
pub static AUTH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "motorsim_auth_failures_total",
            "Control messages refused due to invalid auth tokens",
        )
        .expect("static counter definition"),
    )
});

/// Missing authentication tokens when required
pub static AUTH_MISSING: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "motorsim_auth_missing_total",
            "Control messages refused due to missing auth tokens",
        )
        .expect("static counter definition"),
    )
});

// ============================================================================
// Recording
// ============================================================================

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Copy one snapshot into the gauges.
pub fn record_snapshot(snapshot: &SessionSnapshot) {
    let motor = &snapshot.motor;
    MOTOR_SPEED_RPM.set(motor.current_speed);
    MOTOR_TARGET_RPM.set(motor.target_speed);
    MOTOR_LOAD_PCT.set(motor.load);
    MOTOR_TEMP_C.set(motor.temperature);
    MOTOR_VOLTAGE_V.set(motor.voltage);
    MOTOR_CURRENT.set(motor.current);
    MOTOR_POWER_KW.set(motor.power);
    MOTOR_VIBRATION.set(motor.vibration);
    OPERATING_HOURS.set(motor.operating_hours);
    HEALTH_SCORE.set(f64::from(snapshot.diagnostics.health_score));

    let safety = &snapshot.safety;
    for (name, value) in [
        ("emergency_stop", safety.emergency_stop),
        ("safety_interlock", safety.safety_interlock),
        ("overload_protection", safety.overload_protection),
        ("temperature_protection", safety.temperature_protection),
        ("vibration_protection", safety.vibration_protection),
        ("power_supply_status", safety.power_supply_status),
    ] {
        SAFETY_FLAGS.with_label_values(&[name]).set(flag(value));
    }
    EMERGENCY_ACTIVE.set(flag(snapshot.flags.emergency_active));
    CONTROL_ENABLED.set(flag(snapshot.flags.control_enabled));
    PENDING_COMMANDS.set(snapshot.pending_commands as f64);
}

fn count_command(kind: CommandKind, outcome: &str) {
    COMMANDS.with_label_values(&[kind.as_str(), outcome]).inc();
}

/// Feeds the command counters and tick gauges from session events.
#[derive(Debug, Default)]
pub struct MetricsObserver;

impl SessionObserver for MetricsObserver {
    fn on_submitted(&self, command: &Command) {
        count_command(command.kind, "submitted");
    }

    fn on_rejected(&self, kind: CommandKind, _operator: &str, _error: &SubmitError) {
        count_command(kind, "rejected");
    }

    fn on_resolved(&self, command: &Command) {
        let outcome = match command.status {
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
            CommandStatus::Pending => return,
        };
        count_command(command.kind, outcome);
        if let Some(ms) = command.response_time {
            RESPONSE_TIME_MS.observe(ms);
        }
    }

    fn on_tick(&self, snapshot: &SessionSnapshot) {
        TICKS_EXECUTED.inc();
        record_snapshot(snapshot);
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error").with_status_code(500)
                    } else {
                        let response = Response::from_data(buffer);
                        match tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            encoder.format_type().as_bytes(),
                        ) {
                            Ok(header) => response.with_header(header),
                            Err(()) => response,
                        }
                    }
                }
                "/health" => Response::from_string("OK"),
                // Ready once the physics clock has ticked
                "/ready" if TICKS_EXECUTED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = RESPONSE_TIME_MS.get_sample_count();
    let _ = PENDING_COMMANDS.get();
    let _ = EMERGENCY_ACTIVE.get();
    let _ = CONTROL_ENABLED.get();
    let _ = BRIDGE_CLIENTS.get();
    let _ = SEQUENCE_REJECTIONS.get();
    let _ = AUTH_FAILURES.get();
    let _ = AUTH_MISSING.get();
    for kind in CommandKind::ALL {
        for outcome in ["submitted", "rejected", "executed", "failed"] {
            let _ = COMMANDS.with_label_values(&[kind.as_str(), outcome]);
        }
    }
    let _ = &*SAFETY_FLAGS;
    let _ = HEALTH_SCORE.get();
}
