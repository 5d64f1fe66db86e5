//! Condition monitoring derived from the motor state.
//!
//! Vibration bands follow ISO 10816 (good below 2.8 mm/s, unacceptable
//! above 7.1 mm/s). Wear is a function of operating hours only, so the
//! result is as pure as the safety flags.

use crate::state::MotorState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Good,
    Warning,
    Critical,
    MaintenanceDue,
}

impl MaintenanceStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Good => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::MaintenanceDue => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// 0-100.
    pub health_score: u8,
    pub maintenance: MaintenanceStatus,
    /// 0-1.
    pub bearing_wear: f64,
    /// 0-1.
    pub oil_degradation: f64,
}

pub fn assess(state: &MotorState) -> Diagnostics {
    let bearing_wear = (state.operating_hours * 0.0001).clamp(0.0, 1.0);
    let oil_degradation = (state.operating_hours * 0.00005 + bearing_wear * 0.01).clamp(0.0, 1.0);

    let score = state.efficiency * 0.40
        + vibration_health(state.vibration) * 0.25
        + temperature_health(state.temperature) * 0.20
        + (100.0 - bearing_wear * 50.0) * 0.10
        + (100.0 - oil_degradation * 50.0) * 0.05;

    Diagnostics {
        health_score: score.clamp(0.0, 100.0) as u8,
        maintenance: maintenance_status(state),
        bearing_wear,
        oil_degradation,
    }
}

fn vibration_health(vibration: f64) -> f64 {
    if vibration < 2.8 {
        100.0
    } else if vibration < 7.1 {
        100.0 - (vibration - 2.8) * 8.0
    } else {
        0.0
    }
}

fn temperature_health(temperature: f64) -> f64 {
    if temperature < 70.0 {
        100.0
    } else if temperature < 85.0 {
        100.0 - (temperature - 70.0) * 2.0
    } else if temperature < 95.0 {
        70.0 - (temperature - 85.0) * 4.0
    } else {
        0.0
    }
}

fn maintenance_status(state: &MotorState) -> MaintenanceStatus {
    if state.efficiency < 75.0 || state.vibration > 6.0 || state.temperature > 90.0 {
        MaintenanceStatus::Critical
    } else if state.efficiency < 80.0 || state.vibration > 4.5 || state.temperature > 80.0 {
        MaintenanceStatus::Warning
    } else if state.operating_hours > 1000.0 {
        MaintenanceStatus::MaintenanceDue
    } else {
        MaintenanceStatus::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_motor_is_healthy() {
        let diag = assess(&MotorState::default());
        // 92*0.4 + 25 + 20 + 10 + 5
        assert_eq!(diag.health_score, 96);
        assert_eq!(diag.maintenance, MaintenanceStatus::Good);
        assert_eq!(diag.bearing_wear, 0.0);
    }

    #[test]
    fn hot_and_shaking_is_critical() {
        let state = MotorState {
            temperature: 92.0,
            vibration: 5.0,
            ..MotorState::default()
        };
        let diag = assess(&state);
        assert_eq!(diag.maintenance, MaintenanceStatus::Critical);
        assert_eq!(diag.health_score, 80);
    }

    #[test]
    fn warning_band() {
        let state = MotorState {
            vibration: 4.8,
            ..MotorState::default()
        };
        assert_eq!(assess(&state).maintenance, MaintenanceStatus::Warning);
    }

    #[test]
    fn hours_drive_maintenance_due() {
        let state = MotorState {
            operating_hours: 1200.0,
            ..MotorState::default()
        };
        let diag = assess(&state);
        assert_eq!(diag.maintenance, MaintenanceStatus::MaintenanceDue);
        assert!((diag.bearing_wear - 0.12).abs() < 1e-9);
    }
}
