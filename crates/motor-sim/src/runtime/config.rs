use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub tick_period: Duration,
    pub publish_interval: Duration,
    /// Fixed seed for reproducible noise; entropy when absent.
    pub seed: Option<u64>,
    pub control_enabled: bool,
    pub operator: String,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub auth_secret: Option<String>,
    pub auth_max_age_secs: u64,
    pub bridge_require_handshake: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            bind_addr: "127.0.0.1:7000".to_string(),
            bridge_enabled: true,
            tick_period: Duration::from_secs(2),
            publish_interval: Duration::from_millis(100),
            seed: None,
            control_enabled: true,
            operator: "bridge".to_string(),
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
            auth_secret: None,
            auth_max_age_secs: 300,
            bridge_require_handshake: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Unknown flags and unparseable values are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            let mut consumed = value.is_some();
            match (args[i].as_str(), value) {
                ("--run-seconds", Some(v)) => cfg.run_seconds = v.parse::<u64>().ok(),
                ("--bind", Some(v)) => cfg.bind_addr = v.clone(),
                ("--tick-ms", Some(v)) => {
                    if let Ok(ms) = v.parse::<u64>() {
                        cfg.tick_period = Duration::from_millis(ms.max(1));
                    }
                }
                ("--publish-ms", Some(v)) => {
                    if let Ok(ms) = v.parse::<u64>() {
                        cfg.publish_interval = Duration::from_millis(ms.max(1));
                    }
                }
                ("--seed", Some(v)) => cfg.seed = v.parse::<u64>().ok(),
                ("--operator", Some(v)) => cfg.operator = v.clone(),
                ("--log-dir", Some(v)) => cfg.log_dir = Some(PathBuf::from(v)),
                ("--metrics-addr", Some(v)) => cfg.metrics_addr = Some(v.clone()),
                ("--audit-log", Some(v)) => cfg.audit_path = Some(PathBuf::from(v)),
                ("--auth-secret", Some(v)) => cfg.auth_secret = Some(v.clone()),
                ("--auth-max-age", Some(v)) => cfg.auth_max_age_secs = v.parse().unwrap_or(300),
                (flag, _) => {
                    consumed = false;
                    match flag {
                        "--no-bridge" => cfg.bridge_enabled = false,
                        "--control-disabled" => cfg.control_enabled = false,
                        "--json-logs" => cfg.json_logs = true,
                        "--require-handshake" => cfg.bridge_require_handshake = true,
                        "--help" | "-h" => {
                            cfg.show_help = true;
                            break;
                        }
                        _ => {}
                    }
                }
            }
            i += if consumed { 2 } else { 1 };
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"motor-sim - Industrial motor control simulator

USAGE:
    motor-sim [OPTIONS]

OPTIONS:
    --bind <ADDR>           Bridge TCP bind address [default: 127.0.0.1:7000]
    --no-bridge             Disable the TCP bridge (standalone simulation)
    --run-seconds <SECS>    Run for a fixed duration then exit
    --tick-ms <MS>          Physics tick period in milliseconds [default: 2000]
    --publish-ms <MS>       Bridge state publish interval [default: 100]
    --seed <N>              Seed the noise generator for a reproducible run
    --control-disabled      Start with the external control gate closed
    --operator <NAME>       Operator recorded for unnamed bridge clients [default: bridge]
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <PATH>        Also write daily-rolling log files to this directory
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    --auth-secret <STR>     Shared secret for HMAC operator tokens
    --auth-max-age <SECS>   Maximum age for auth tokens in seconds [default: 300]
    --require-handshake     Require a protocol handshake before accepting control messages
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,motor_core=trace)

EXAMPLES:
    # Basic run with metrics
    motor-sim --metrics-addr 0.0.0.0:9090

    # Reproducible fast run with an audit trail
    motor-sim --seed 42 --tick-ms 200 --audit-log /var/log/motor-sim/audit.jsonl

    # Short test run
    motor-sim --run-seconds 10 --no-bridge
"#
        );
    }
}
