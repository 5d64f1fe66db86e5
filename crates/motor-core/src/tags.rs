/// Names one observable quantity across the snapshot JSON and the
/// Prometheus exposition.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub unit: &'static str,
}

pub const CURRENT_SPEED: Tag = Tag {
    key: "currentSpeed",
    metric: "motorsim_speed_rpm",
    unit: "rpm",
};

pub const TARGET_SPEED: Tag = Tag {
    key: "targetSpeed",
    metric: "motorsim_target_speed_rpm",
    unit: "rpm",
};

pub const LOAD: Tag = Tag {
    key: "load",
    metric: "motorsim_load_percent",
    unit: "%",
};

pub const TEMPERATURE: Tag = Tag {
    key: "temperature",
    metric: "motorsim_temperature_celsius",
    unit: "°C",
};

pub const VOLTAGE: Tag = Tag {
    key: "voltage",
    metric: "motorsim_voltage_volts",
    unit: "V",
};

pub const CURRENT: Tag = Tag {
    key: "current",
    metric: "motorsim_current_scaled",
    unit: "mA",
};

pub const POWER: Tag = Tag {
    key: "power",
    metric: "motorsim_power_kilowatts",
    unit: "kW",
};

pub const VIBRATION: Tag = Tag {
    key: "vibration",
    metric: "motorsim_vibration_mm_per_second",
    unit: "mm/s",
};

pub const OPERATING_HOURS: Tag = Tag {
    key: "operatingHours",
    metric: "motorsim_operating_hours",
    unit: "h",
};

pub const HEALTH_SCORE: Tag = Tag {
    key: "healthScore",
    metric: "motorsim_health_score",
    unit: "%",
};

pub const MOTOR_TAGS: &[Tag] = &[
    CURRENT_SPEED,
    TARGET_SPEED,
    LOAD,
    TEMPERATURE,
    VOLTAGE,
    CURRENT,
    POWER,
    VIBRATION,
    OPERATING_HOURS,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MotorState;

    #[test]
    fn motor_tag_keys_match_snapshot_fields() {
        let json = serde_json::to_value(MotorState::default()).unwrap();
        for tag in MOTOR_TAGS {
            assert!(json.get(tag.key).is_some(), "missing field {}", tag.key);
        }
    }
}
