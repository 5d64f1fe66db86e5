use serde::{Deserialize, Serialize};

pub const MAX_SPEED_RPM: f64 = 3000.0;
pub const AMBIENT_TEMP_C: f64 = 22.0;
pub const NOMINAL_VOLTAGE_V: f64 = 480.0;

/// Physical constants of the simulated motor.
///
/// The defaults reproduce the dashboard's motor model; tests and the
/// runtime only ever override the rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorParams {
    pub max_speed_rpm: f64,
    /// RPM per second while below the setpoint.
    pub accel_rpm_per_s: f64,
    /// RPM per second while above the setpoint.
    pub decel_rpm_per_s: f64,
    /// Lower bound of the load ratio while running.
    pub base_load: f64,
    /// Torque at full load, in Nm.
    pub torque_per_load_nm: f64,
    /// Fixed conversion efficiency (ratio, not percent).
    pub efficiency: f64,
    pub heating_factor: f64,
    /// Temperature shed per tick, in °C.
    pub cooling_step_c: f64,
    pub ambient_temp_c: f64,
    pub nominal_voltage_v: f64,
    /// Upper bound of the load-ratio jitter.
    pub load_jitter: f64,
    /// Upper bound of the vibration jitter, in mm/s.
    pub vibration_jitter: f64,
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            max_speed_rpm: MAX_SPEED_RPM,
            accel_rpm_per_s: 150.0,
            decel_rpm_per_s: 200.0,
            base_load: 0.05,
            torque_per_load_nm: 50.0,
            efficiency: 0.92,
            heating_factor: 0.1,
            cooling_step_c: 0.5,
            ambient_temp_c: AMBIENT_TEMP_C,
            nominal_voltage_v: NOMINAL_VOLTAGE_V,
            load_jitter: 0.1,
            vibration_jitter: 0.5,
        }
    }
}

/// Mechanical, electrical and thermal state of the single motor.
///
/// `current` is a scaled proxy (`watts / volts * 1000`), not SI amperes.
/// The overload threshold in [`crate::safety::SafetyLimits`] uses the same
/// scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorState {
    pub is_running: bool,
    pub current_speed: f64,
    pub target_speed: f64,
    /// Percent, 0-100.
    pub load: f64,
    pub temperature: f64,
    pub voltage: f64,
    pub current: f64,
    /// kW.
    pub power: f64,
    /// Percent.
    pub efficiency: f64,
    /// mm/s.
    pub vibration: f64,
    pub operating_hours: f64,
}

impl MotorState {
    /// Rest state at session start.
    pub fn at_rest(params: &MotorParams) -> Self {
        Self {
            is_running: false,
            current_speed: 0.0,
            target_speed: 0.0,
            load: 0.0,
            temperature: params.ambient_temp_c,
            voltage: params.nominal_voltage_v,
            current: 0.0,
            power: 0.0,
            efficiency: round_to(params.efficiency * 100.0, 1),
            vibration: 0.0,
            operating_hours: 0.0,
        }
    }

    /// Zero the drive outputs and mark the motor stopped.
    ///
    /// Shared by `stop`, `emergency_stop` and the emergency hold in the
    /// physics step. Setpoint, temperature and hours are left untouched.
    pub fn halt(&mut self) {
        self.is_running = false;
        self.current_speed = 0.0;
        self.load = 0.0;
        self.power = 0.0;
        self.current = 0.0;
    }

    /// Whether the speed invariants hold for the given ceiling.
    pub fn speeds_in_range(&self, max_speed_rpm: f64) -> bool {
        (0.0..=max_speed_rpm).contains(&self.current_speed)
            && (0.0..=max_speed_rpm).contains(&self.target_speed)
    }
}

impl Default for MotorState {
    fn default() -> Self {
        Self::at_rest(&MotorParams::default())
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
