//! Command pipeline: admission, deferred resolution, state mutation.
//!
//! A command is admitted (or refused) synchronously and recorded as
//! `pending`. Its response time is fixed at admission; once that much
//! session time has passed, [`CommandExecutor::resolve_due`] draws the
//! outcome against the state *at resolution*, so an emergency stop that
//! lands first makes every older pending command fail.

use crate::command::{
    processing_time_ms, success_probability, Command, CommandKind, CommandStatus, ExecutorConfig,
    SubmitError,
};
use crate::history::CommandHistory;
use crate::noise::NoiseSource;
use crate::safety::{SessionFlags, Setpoint};
use crate::state::{MotorParams, MotorState};
use crate::timebase::Timestamp;
use log::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub value: Option<f64>,
    pub operator: String,
}

impl CommandRequest {
    pub fn new(kind: CommandKind, operator: impl Into<String>) -> Self {
        Self {
            kind,
            value: None,
            operator: operator.into(),
        }
    }

    pub fn speed_set(value: f64, operator: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::SpeedSet,
            value: Some(value),
            operator: operator.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCommand {
    command: Command,
    due_us: u64,
    response_time_ms: f64,
}

#[derive(Debug)]
pub struct CommandExecutor {
    config: ExecutorConfig,
    next_id: u64,
    pending: Vec<PendingCommand>,
    history: CommandHistory,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            next_id: 1,
            pending: Vec::new(),
            history: CommandHistory::new(config.history_capacity),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Admit a command. Never blocks and never mutates motor state.
    pub fn submit(
        &mut self,
        request: CommandRequest,
        state: &MotorState,
        flags: SessionFlags,
        params: &MotorParams,
        at: Timestamp,
        noise: &mut dyn NoiseSource,
    ) -> Result<Command, SubmitError> {
        let kind = request.kind;
        if kind != CommandKind::EmergencyStop {
            if !flags.control_enabled {
                return Err(SubmitError::ControlDisabled);
            }
            if flags.emergency_active {
                return Err(SubmitError::EmergencyActive);
            }
        }

        let value = match kind {
            CommandKind::SpeedSet => {
                let raw = request.value.ok_or(SubmitError::MissingValue { kind })?;
                Some(Setpoint::new(raw).validate(params.max_speed_rpm)?.value())
            }
            _ => None,
        };

        let (net_lo, net_hi) = self.config.network_latency_ms;
        let response_time_ms = self.config.base_latency_ms
            + processing_time_ms(kind, value, state)
            + noise.sample(net_lo, net_hi);

        let command = Command {
            id: self.next_id,
            kind,
            timestamp: at.unix_ms,
            operator: request.operator,
            value,
            status: CommandStatus::Pending,
            response_time: None,
        };
        self.next_id += 1;

        debug!(
            "command {} ({}) admitted, resolves in {:.1} ms",
            command.id, kind, response_time_ms
        );

        self.history.record(command.clone());
        self.pending.push(PendingCommand {
            command: command.clone(),
            due_us: at.plus_ms(response_time_ms).monotonic_us,
            response_time_ms,
        });
        Ok(command)
    }

    /// Resolve every pending command due at or before `at`, oldest due
    /// first. Returns the resolved commands in resolution order.
    pub fn resolve_due(
        &mut self,
        state: &mut MotorState,
        emergency_active: &mut bool,
        params: &MotorParams,
        at: Timestamp,
        noise: &mut dyn NoiseSource,
    ) -> Vec<Command> {
        let mut due: Vec<PendingCommand> = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due_us <= at.monotonic_us {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|p| (p.due_us, p.command.id));

        let mut resolved = Vec::with_capacity(due.len());
        for entry in due {
            let mut command = entry.command;
            let probability =
                success_probability(command.kind, state, *emergency_active, &self.config);
            let succeeded = match command.kind {
                CommandKind::EmergencyStop => true,
                _ => noise.sample(0.0, 1.0) < probability,
            };

            if succeeded {
                apply(&command, state, emergency_active, params);
                command.status = CommandStatus::Executed;
                info!(
                    "command {} ({}) executed in {:.1} ms",
                    command.id, command.kind, entry.response_time_ms
                );
            } else {
                command.status = CommandStatus::Failed;
                warn!(
                    "command {} ({}) failed (p={:.2})",
                    command.id, command.kind, probability
                );
            }
            command.response_time = Some(entry.response_time_ms);
            self.history.update(&command);
            resolved.push(command);
        }
        resolved
    }

    /// Monotonic due time of the earliest pending command.
    pub fn next_due_us(&self) -> Option<u64> {
        self.pending.iter().map(|p| p.due_us).min()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }
}

fn apply(
    command: &Command,
    state: &mut MotorState,
    emergency_active: &mut bool,
    params: &MotorParams,
) {
    match command.kind {
        CommandKind::Start => {
            state.is_running = true;
            state.current_speed = 0.0;
            state.load = params.base_load * 100.0;
            state.power = 0.0;
            state.current = 0.0;
            state.temperature = state.temperature.max(params.ambient_temp_c);
        }
        CommandKind::Stop => state.halt(),
        CommandKind::SpeedSet => {
            if let Some(value) = command.value {
                state.target_speed = value.clamp(0.0, params.max_speed_rpm);
            }
        }
        CommandKind::EmergencyStop => {
            *emergency_active = true;
            state.halt();
        }
    }
}
