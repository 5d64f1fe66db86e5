use crate::state::MotorState;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Operator speed setpoint. Only a `Setpoint<Validated>` can reach the
/// motor state.
#[derive(Debug, Clone, Copy)]
pub struct Setpoint<State = Unvalidated> {
    value: f64,
    _state: PhantomData<State>,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SetpointError {
    #[error("setpoint {requested} is not a finite number")]
    NonFinite { requested: f64 },
}

impl Setpoint<Unvalidated> {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            _state: PhantomData,
        }
    }

    /// Out-of-range values are clamped into `[0, max_speed_rpm]`, never
    /// rejected. Only NaN and infinities fail.
    pub fn validate(self, max_speed_rpm: f64) -> Result<Setpoint<Validated>, SetpointError> {
        if !self.value.is_finite() {
            return Err(SetpointError::NonFinite {
                requested: self.value,
            });
        }
        Ok(Setpoint {
            value: self.value.clamp(0.0, max_speed_rpm),
            _state: PhantomData,
        })
    }
}

impl Setpoint<Validated> {
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Trip thresholds for the protection flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyLimits {
    /// Scaled current proxy, see [`MotorState::current`].
    pub max_current: f64,
    pub max_load_pct: f64,
    pub max_temp_c: f64,
    pub max_vibration_mm_s: f64,
    pub min_voltage_v: f64,
    pub max_voltage_v: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_current: 50_000.0,
            max_load_pct: 95.0,
            max_temp_c: 85.0,
            max_vibration_mm_s: 5.0,
            min_voltage_v: 432.0,
            max_voltage_v: 528.0,
        }
    }
}

/// Session-level inputs to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFlags {
    pub control_enabled: bool,
    pub emergency_active: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            control_enabled: true,
            emergency_active: false,
        }
    }
}

/// Each flag is `true` when the condition is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyStatus {
    pub emergency_stop: bool,
    pub safety_interlock: bool,
    pub overload_protection: bool,
    pub temperature_protection: bool,
    pub vibration_protection: bool,
    pub power_supply_status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFault {
    EmergencyStop,
    InterlockOpen,
    Overload,
    OverTemperature,
    Vibration,
    PowerSupply,
}

impl SafetyFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmergencyStop => "emergency_stop",
            Self::InterlockOpen => "interlock_open",
            Self::Overload => "overload",
            Self::OverTemperature => "over_temperature",
            Self::Vibration => "vibration",
            Self::PowerSupply => "power_supply",
        }
    }
}

impl SafetyStatus {
    pub fn all_clear(&self) -> bool {
        self.faults().is_empty()
    }

    pub fn faults(&self) -> Vec<SafetyFault> {
        [
            (self.emergency_stop, SafetyFault::EmergencyStop),
            (self.safety_interlock, SafetyFault::InterlockOpen),
            (self.overload_protection, SafetyFault::Overload),
            (self.temperature_protection, SafetyFault::OverTemperature),
            (self.vibration_protection, SafetyFault::Vibration),
            (self.power_supply_status, SafetyFault::PowerSupply),
        ]
        .into_iter()
        .filter_map(|(ok, fault)| (!ok).then_some(fault))
        .collect()
    }
}

/// Derive the protection flags. Pure: no history, no transitions.
pub fn evaluate(state: &MotorState, flags: SessionFlags, limits: &SafetyLimits) -> SafetyStatus {
    SafetyStatus {
        emergency_stop: !flags.emergency_active,
        safety_interlock: flags.control_enabled,
        overload_protection: state.current < limits.max_current && state.load < limits.max_load_pct,
        temperature_protection: state.temperature < limits.max_temp_c,
        vibration_protection: state.vibration < limits.max_vibration_mm_s,
        power_supply_status: (limits.min_voltage_v..=limits.max_voltage_v).contains(&state.voltage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_state_is_all_clear() {
        let status = evaluate(
            &MotorState::default(),
            SessionFlags::default(),
            &SafetyLimits::default(),
        );
        assert!(status.all_clear());
    }

    #[test]
    fn emergency_flag_is_inverted() {
        let flags = SessionFlags {
            control_enabled: true,
            emergency_active: true,
        };
        let status = evaluate(&MotorState::default(), flags, &SafetyLimits::default());
        assert!(!status.emergency_stop);
        assert_eq!(status.faults(), vec![SafetyFault::EmergencyStop]);
    }

    #[test]
    fn thresholds_are_strict() {
        let limits = SafetyLimits::default();
        let state = MotorState {
            load: 95.0,
            temperature: 85.0,
            vibration: 5.0,
            ..MotorState::default()
        };
        let status = evaluate(&state, SessionFlags::default(), &limits);
        assert!(!status.overload_protection);
        assert!(!status.temperature_protection);
        assert!(!status.vibration_protection);

        let state = MotorState {
            current: 50_000.0,
            ..MotorState::default()
        };
        assert!(!evaluate(&state, SessionFlags::default(), &limits).overload_protection);
    }

    #[test]
    fn voltage_band_is_inclusive() {
        let limits = SafetyLimits::default();
        for (voltage, ok) in [(431.9, false), (432.0, true), (528.0, true), (528.1, false)] {
            let state = MotorState {
                voltage,
                ..MotorState::default()
            };
            let status = evaluate(&state, SessionFlags::default(), &limits);
            assert_eq!(status.power_supply_status, ok, "voltage {voltage}");
        }
    }

    #[test]
    fn interlock_follows_control_gate() {
        let flags = SessionFlags {
            control_enabled: false,
            emergency_active: false,
        };
        let status = evaluate(&MotorState::default(), flags, &SafetyLimits::default());
        assert!(!status.safety_interlock);
    }

    #[test]
    fn setpoint_clamps_out_of_range() {
        assert_eq!(Setpoint::new(4500.0).validate(3000.0).unwrap().value(), 3000.0);
        assert_eq!(Setpoint::new(-20.0).validate(3000.0).unwrap().value(), 0.0);
        assert_eq!(Setpoint::new(1234.5).validate(3000.0).unwrap().value(), 1234.5);
    }

    #[test]
    fn setpoint_rejects_nan() {
        let res = Setpoint::new(f64::NAN).validate(3000.0);
        assert!(matches!(res, Err(SetpointError::NonFinite { .. })));
        let res = Setpoint::new(f64::INFINITY).validate(3000.0);
        assert!(matches!(res, Err(SetpointError::NonFinite { .. })));
    }
}
