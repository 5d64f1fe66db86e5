use crate::command::{Command, ExecutorConfig, SubmitError};
use crate::diagnostics::{assess, Diagnostics};
use crate::executor::{CommandExecutor, CommandRequest};
use crate::history::CommandHistory;
use crate::noise::NoiseSource;
use crate::physics::advance;
use crate::safety::{evaluate, SafetyLimits, SafetyStatus, SessionFlags};
use crate::state::{MotorParams, MotorState};
use crate::timebase::Timestamp;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub motor: MotorParams,
    pub limits: SafetyLimits,
    pub executor: ExecutorConfig,
    pub control_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            motor: MotorParams::default(),
            limits: SafetyLimits::default(),
            executor: ExecutorConfig::default(),
            control_enabled: true,
        }
    }
}

/// Externally measured values that override the simulation.
///
/// Every field is optional; absent and non-finite fields are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(default)]
    pub current_speed: Option<f64>,
    #[serde(default)]
    pub load: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub power: Option<f64>,
    #[serde(default)]
    pub vibration: Option<f64>,
}

/// Everything a collaborator needs to render one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub tick_count: u64,
    pub motor: MotorState,
    pub safety: SafetyStatus,
    pub flags: SessionFlags,
    pub diagnostics: Diagnostics,
    pub pending_commands: usize,
}

/// Single motor, single writer.
///
/// All mutation goes through `&mut self`; sharing across threads is the
/// job of [`crate::sync::SessionHandle`].
pub struct MotorSession {
    config: SessionConfig,
    state: MotorState,
    flags: SessionFlags,
    safety: SafetyStatus,
    diagnostics: Diagnostics,
    executor: CommandExecutor,
    noise: Box<dyn NoiseSource>,
    tick_count: u64,
}

impl MotorSession {
    pub fn new(config: SessionConfig, noise: Box<dyn NoiseSource>) -> Self {
        let state = MotorState::at_rest(&config.motor);
        let flags = SessionFlags {
            control_enabled: config.control_enabled,
            emergency_active: false,
        };
        Self {
            safety: evaluate(&state, flags, &config.limits),
            diagnostics: assess(&state),
            executor: CommandExecutor::new(config.executor),
            state,
            flags,
            config,
            noise,
            tick_count: 0,
        }
    }

    /// One simulation step: physics, then safety and diagnostics.
    pub fn tick(&mut self, dt: Duration) -> SessionSnapshot {
        self.state = advance(
            &self.state,
            &self.config.motor,
            self.flags.emergency_active,
            dt.as_secs_f64(),
            self.noise.as_mut(),
        );
        self.tick_count += 1;
        self.refresh();
        self.snapshot()
    }

    pub fn submit(&mut self, request: CommandRequest, at: Timestamp) -> Result<Command, SubmitError> {
        self.executor.submit(
            request,
            &self.state,
            self.flags,
            &self.config.motor,
            at,
            self.noise.as_mut(),
        )
    }

    pub fn resolve_due(&mut self, at: Timestamp) -> Vec<Command> {
        let resolved = self.executor.resolve_due(
            &mut self.state,
            &mut self.flags.emergency_active,
            &self.config.motor,
            at,
            self.noise.as_mut(),
        );
        if !resolved.is_empty() {
            self.refresh();
        }
        resolved
    }

    /// Clear the emergency flag. The motor stays stopped until a `start`
    /// executes. Returns false if no emergency was active.
    pub fn reset_emergency(&mut self) -> bool {
        if !self.flags.emergency_active {
            return false;
        }
        self.flags.emergency_active = false;
        self.refresh();
        info!("emergency stop reset");
        true
    }

    pub fn set_control_enabled(&mut self, enabled: bool) {
        if self.flags.control_enabled != enabled {
            info!("control {}", if enabled { "enabled" } else { "disabled" });
        }
        self.flags.control_enabled = enabled;
        self.refresh();
    }

    /// Overlay measured values, clamped to the state invariants.
    ///
    /// Drive fields (speed, load, power, current) only apply while the
    /// motor is running and no emergency is latched.
    pub fn apply_reading(&mut self, reading: &Reading) {
        let params = &self.config.motor;
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());

        let drive = [reading.current_speed, reading.load, reading.power, reading.current];
        if self.flags.emergency_active || !self.state.is_running {
            // A stopped motor stays at rest until a `start` executes.
            if drive.iter().any(|v| finite(*v).is_some()) {
                warn!(
                    "ignoring drive readings while motor is {}",
                    if self.flags.emergency_active { "emergency stopped" } else { "stopped" }
                );
            }
        } else {
            if let Some(speed) = finite(reading.current_speed) {
                self.state.current_speed = speed.clamp(0.0, params.max_speed_rpm).round();
            }
            if let Some(load) = finite(reading.load) {
                self.state.load = load.clamp(0.0, 100.0);
            }
            if let Some(power) = finite(reading.power) {
                self.state.power = power.max(0.0);
            }
            if let Some(current) = finite(reading.current) {
                self.state.current = current.max(0.0);
            }
        }
        if let Some(temp) = finite(reading.temperature) {
            self.state.temperature = temp.max(params.ambient_temp_c);
        }
        if let Some(voltage) = finite(reading.voltage) {
            self.state.voltage = voltage.max(0.0);
        }
        if let Some(vibration) = finite(reading.vibration) {
            self.state.vibration = vibration.max(0.0);
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        self.safety = evaluate(&self.state, self.flags, &self.config.limits);
        self.diagnostics = assess(&self.state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tick_count: self.tick_count,
            motor: self.state,
            safety: self.safety,
            flags: self.flags,
            diagnostics: self.diagnostics,
            pending_commands: self.executor.pending_len(),
        }
    }

    pub fn state(&self) -> &MotorState {
        &self.state
    }

    pub fn safety(&self) -> &SafetyStatus {
        &self.safety
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn history(&self) -> &CommandHistory {
        self.executor.history()
    }

    pub fn next_due_us(&self) -> Option<u64> {
        self.executor.next_due_us()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
