use crate::noise::NoiseSource;
use crate::state::{round_to, MotorParams, MotorState};
use std::f64::consts::PI;

/// Advance the motor by `dt_s` seconds.
///
/// A stopped motor is returned unchanged. While the emergency flag is set
/// the drive outputs are held at zero regardless of the setpoint.
pub fn advance(
    state: &MotorState,
    params: &MotorParams,
    emergency_active: bool,
    dt_s: f64,
    noise: &mut dyn NoiseSource,
) -> MotorState {
    if emergency_active {
        let mut held = *state;
        held.halt();
        return held;
    }
    if !state.is_running {
        return *state;
    }

    let max_speed = params.max_speed_rpm;
    let target = state.target_speed.clamp(0.0, max_speed);
    let speed = next_speed(state.current_speed, target, params, dt_s);

    let speed_ratio = speed / max_speed;
    let target_ratio = target / max_speed;
    let jitter = noise.sample(0.0, params.load_jitter);
    let load_ratio = (speed_ratio * 0.8 + target_ratio * 0.2 + jitter)
        .min(1.0)
        .max(params.base_load);

    let torque_nm = load_ratio * params.torque_per_load_nm;
    let power_w = 2.0 * PI * speed * torque_nm / 60.0;
    let power_kw = power_w / 1000.0;

    let temperature = (state.temperature
        + power_kw * (1.0 - params.efficiency) * params.heating_factor
        - params.cooling_step_c)
        .max(params.ambient_temp_c);

    let current = if state.voltage > 0.0 {
        power_w / state.voltage * 1000.0
    } else {
        0.0
    };

    let vibration = ((speed / 1000.0) * 2.0
        + load_ratio * 0.5
        + noise.sample(0.0, params.vibration_jitter))
    .max(0.0);

    MotorState {
        is_running: true,
        current_speed: speed,
        target_speed: target,
        load: round_to(load_ratio * 100.0, 1),
        temperature: round_to(temperature, 1).max(params.ambient_temp_c),
        voltage: state.voltage,
        current: round_to(current, 1),
        power: round_to(power_kw, 2),
        efficiency: round_to(params.efficiency * 100.0, 1),
        vibration: round_to(vibration, 2),
        operating_hours: state.operating_hours + dt_s / 3600.0,
    }
}

/// Rate-limited move toward the setpoint, rounded to whole RPM.
fn next_speed(current: f64, target: f64, params: &MotorParams, dt_s: f64) -> f64 {
    let next = if current < target {
        (current + params.accel_rpm_per_s * dt_s).min(target)
    } else if current > target {
        (current - params.decel_rpm_per_s * dt_s).max(target)
    } else {
        current
    };
    round_to(next, 0).clamp(0.0, params.max_speed_rpm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{Quiet, SeededNoise};

    fn running(current: f64, target: f64) -> MotorState {
        MotorState {
            is_running: true,
            current_speed: current,
            target_speed: target,
            load: 5.0,
            ..MotorState::default()
        }
    }

    #[test]
    fn stopped_motor_does_not_drift() {
        let params = MotorParams::default();
        let state = MotorState {
            temperature: 60.0,
            target_speed: 1500.0,
            ..MotorState::default()
        };
        let next = advance(&state, &params, false, 2.0, &mut SeededNoise::from_seed(3));
        assert_eq!(next, state);
    }

    #[test]
    fn accelerates_at_150_rpm_per_second() {
        let params = MotorParams::default();
        let mut state = running(0.0, 3000.0);
        let mut speeds = Vec::new();
        for _ in 0..11 {
            state = advance(&state, &params, false, 2.0, &mut Quiet);
            speeds.push(state.current_speed);
        }
        assert_eq!(speeds[0], 300.0);
        assert_eq!(speeds[1], 600.0);
        assert_eq!(speeds[9], 3000.0);
        assert_eq!(speeds[10], 3000.0);
    }

    #[test]
    fn decelerates_at_200_rpm_per_second_without_overshoot() {
        let params = MotorParams::default();
        let state = running(1000.0, 700.0);
        let next = advance(&state, &params, false, 2.0, &mut Quiet);
        assert_eq!(next.current_speed, 700.0);

        let state = running(1000.0, 0.0);
        let next = advance(&state, &params, false, 2.0, &mut Quiet);
        assert_eq!(next.current_speed, 600.0);
    }

    #[test]
    fn quiet_trajectory_values() {
        let params = MotorParams::default();
        let state = running(1500.0, 1500.0);
        let next = advance(&state, &params, false, 2.0, &mut Quiet);

        // load = 0.5*0.8 + 0.5*0.2 = 0.5 -> torque 25 Nm
        assert_eq!(next.load, 50.0);
        let power_w = 2.0 * PI * 1500.0 * 25.0 / 60.0;
        assert_eq!(next.power, round_to(power_w / 1000.0, 2));
        assert_eq!(next.current, round_to(power_w / 480.0 * 1000.0, 1));
        assert_eq!(next.vibration, 3.25);
        // 3.93 kW * 0.08 * 0.1 = 0.03 heat vs 0.5 cooling: stays at ambient
        assert_eq!(next.temperature, 22.0);
        assert!((next.operating_hours - 2.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn load_never_below_base() {
        let params = MotorParams::default();
        let next = advance(&running(0.0, 0.0), &params, false, 2.0, &mut Quiet);
        assert_eq!(next.load, 5.0);
        assert_eq!(next.power, 0.0);
    }

    #[test]
    fn temperature_relaxes_toward_ambient() {
        let params = MotorParams::default();
        let mut state = running(0.0, 0.0);
        state.temperature = 23.0;
        let next = advance(&state, &params, false, 2.0, &mut Quiet);
        assert_eq!(next.temperature, 22.5);
        let next = advance(&next, &params, false, 2.0, &mut Quiet);
        assert_eq!(next.temperature, 22.0);
        let next = advance(&next, &params, false, 2.0, &mut Quiet);
        assert_eq!(next.temperature, 22.0);
    }

    #[test]
    fn emergency_holds_outputs_at_zero() {
        let params = MotorParams::default();
        let state = running(2400.0, 3000.0);
        let next = advance(&state, &params, true, 2.0, &mut Quiet);
        assert!(!next.is_running);
        assert_eq!(next.current_speed, 0.0);
        assert_eq!(next.power, 0.0);
        assert_eq!(next.target_speed, 3000.0);
        assert_eq!(advance(&next, &params, true, 2.0, &mut Quiet), next);
    }
}
