use crate::safety::SetpointError;
use crate::state::{MotorState, AMBIENT_TEMP_C};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    SpeedSet,
    EmergencyStop,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Start,
        CommandKind::Stop,
        CommandKind::SpeedSet,
        CommandKind::EmergencyStop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SpeedSet => "speed_set",
            Self::EmergencyStop => "emergency_stop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command type '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One operator command as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Wall-clock submission time, Unix milliseconds.
    pub timestamp: u64,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub status: CommandStatus,
    /// Milliseconds, set once the command resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

/// Why a submission was refused before entering the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("control is disabled")]
    ControlDisabled,
    #[error("emergency stop is active")]
    EmergencyActive,
    #[error("{kind} requires a value")]
    MissingValue { kind: CommandKind },
    #[error(transparent)]
    InvalidValue(#[from] SetpointError),
}

/// Tunables of the command pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    pub base_success: f64,
    /// Subtracted from `start` when the motor is hotter than `hot_start_temp_c`.
    pub hot_start_penalty: f64,
    pub hot_start_temp_c: f64,
    /// Subtracted from `speed_set` when load exceeds `heavy_load_pct`.
    pub heavy_load_penalty: f64,
    pub heavy_load_pct: f64,
    pub base_latency_ms: f64,
    pub network_latency_ms: (f64, f64),
    pub history_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_success: 0.90,
            hot_start_penalty: 0.10,
            hot_start_temp_c: 80.0,
            heavy_load_penalty: 0.05,
            heavy_load_pct: 90.0,
            base_latency_ms: 50.0,
            network_latency_ms: (10.0, 40.0),
            history_capacity: 20,
        }
    }
}

/// Probability that `kind` executes given the state at resolution time.
pub fn success_probability(
    kind: CommandKind,
    state: &MotorState,
    emergency_active: bool,
    config: &ExecutorConfig,
) -> f64 {
    match kind {
        CommandKind::EmergencyStop => 1.0,
        _ if emergency_active => 0.0,
        CommandKind::Start if state.temperature > config.hot_start_temp_c => {
            config.base_success - config.hot_start_penalty
        }
        CommandKind::SpeedSet if state.load > config.heavy_load_pct => {
            config.base_success - config.heavy_load_penalty
        }
        _ => config.base_success,
    }
}

/// Command-specific part of the response time, in milliseconds.
pub fn processing_time_ms(kind: CommandKind, value: Option<f64>, state: &MotorState) -> f64 {
    match kind {
        CommandKind::Start => 20.0 + (state.temperature - AMBIENT_TEMP_C) * 0.5,
        CommandKind::Stop => 10.0 + state.current_speed * 0.01,
        CommandKind::SpeedSet => {
            let target = value.unwrap_or(state.current_speed);
            15.0 + (target - state.current_speed).abs() * 0.02
        }
        CommandKind::EmergencyStop => 5.0,
    }
}
