#[cfg(test)]
mod proptest_motor {
    use crate::noise::SeededNoise;
    use crate::physics::advance;
    use crate::safety::{evaluate, SafetyLimits, SessionFlags, Setpoint};
    use crate::state::{MotorParams, MotorState};
    use proptest::prelude::*;

    fn running_state() -> impl Strategy<Value = MotorState> {
        (
            0.0f64..=3000.0,
            0.0f64..=3000.0,
            22.0f64..=120.0,
            0.0f64..=100.0,
            400.0f64..=560.0,
        )
            .prop_map(|(current, target, temperature, load, voltage)| MotorState {
                is_running: true,
                current_speed: current.round(),
                target_speed: target,
                temperature,
                load,
                voltage,
                ..MotorState::default()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Property: speed stays in range and approaches the setpoint without overshoot
        #[test]
        fn speed_bounded_and_monotone_toward_target(
            start in running_state(),
            seed in any::<u64>(),
            ticks in 1usize..40,
        ) {
            let params = MotorParams::default();
            let mut noise = SeededNoise::from_seed(seed);
            let mut state = start;
            for _ in 0..ticks {
                let prev = state;
                state = advance(&prev, &params, false, 2.0, &mut noise);
                prop_assert!(state.speeds_in_range(params.max_speed_rpm));
                let before = (prev.current_speed - prev.target_speed).abs();
                let after = (state.current_speed - state.target_speed).abs();
                // one RPM of slack for integer rounding of the speed
                prop_assert!(after <= before + 1.0, "moved away: {} -> {}", before, after);
                prop_assert!((state.current_speed - prev.current_speed).abs() <= 401.0);
            }
        }

        // Property: temperature never drops below ambient
        #[test]
        fn temperature_floor(start in running_state(), seed in any::<u64>(), ticks in 1usize..60) {
            let params = MotorParams::default();
            let mut noise = SeededNoise::from_seed(seed);
            let mut state = start;
            for _ in 0..ticks {
                state = advance(&state, &params, false, 2.0, &mut noise);
                prop_assert!(state.temperature >= params.ambient_temp_c);
                prop_assert!(state.load >= 5.0 && state.load <= 100.0);
                prop_assert!(state.vibration >= 0.0);
            }
        }

        // Property: a stopped motor is a fixed point of the physics step
        #[test]
        fn stopped_is_fixed_point(mut start in running_state(), seed in any::<u64>()) {
            start.is_running = false;
            let params = MotorParams::default();
            let next = advance(&start, &params, false, 2.0, &mut SeededNoise::from_seed(seed));
            prop_assert_eq!(next, start);
        }

        // Property: emergency forces the motor stopped whatever the setpoint
        #[test]
        fn emergency_dominates(start in running_state(), seed in any::<u64>()) {
            let params = MotorParams::default();
            let next = advance(&start, &params, true, 2.0, &mut SeededNoise::from_seed(seed));
            prop_assert!(!next.is_running);
            prop_assert_eq!(next.current_speed, 0.0);
            prop_assert_eq!(next.power, 0.0);
        }

        // Property: identical inputs always give identical safety flags
        #[test]
        fn safety_is_deterministic(
            state in running_state(),
            control_enabled in any::<bool>(),
            emergency_active in any::<bool>(),
        ) {
            let flags = SessionFlags { control_enabled, emergency_active };
            let limits = SafetyLimits::default();
            prop_assert_eq!(evaluate(&state, flags, &limits), evaluate(&state, flags, &limits));
        }

        // Property: any finite setpoint validates into range
        #[test]
        fn finite_setpoints_clamped(value in -1.0e6f64..1.0e6) {
            let validated = Setpoint::new(value).validate(3000.0);
            prop_assert!(validated.is_ok());
            let v = validated.unwrap().value();
            prop_assert!((0.0..=3000.0).contains(&v));
        }
    }
}
