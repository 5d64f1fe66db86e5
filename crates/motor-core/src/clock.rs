use crate::safety::SafetyFault;
use crate::sync::SessionHandle;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct ClockConfig {
    pub tick_period: Duration,
    /// Upper bound on how long the loop sleeps, so commands submitted from
    /// other threads are picked up promptly.
    pub poll_interval: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(2),
            poll_interval: Duration::from_millis(5),
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ClockStats {
    pub ticks_executed: u64,
    /// Ticks that fired more than one full period late.
    pub ticks_late: u64,
    pub commands_resolved: u64,
    pub max_lateness_us: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub ticked: bool,
    pub resolved: usize,
}

/// Drives the session: a physics tick every `tick_period`, command
/// resolution whenever something is due. Timing is best effort.
pub struct SimulationClock {
    handle: SessionHandle,
    config: ClockConfig,
    stats: ClockStats,
    next_tick: Option<Instant>,
    last_faults: Vec<SafetyFault>,
}

impl SimulationClock {
    pub fn new(handle: SessionHandle, config: ClockConfig) -> Self {
        Self {
            handle,
            config,
            stats: ClockStats::default(),
            next_tick: None,
            last_faults: Vec::new(),
        }
    }

    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            self.step(now);

            let mut wake = now + self.config.poll_interval;
            if let Some(next_tick) = self.next_tick {
                wake = wake.min(next_tick);
            }
            if let Some(due_us) = self.handle.next_due_us() {
                wake = wake.min(self.handle.timebase().instant_at(due_us));
            }
            let now = Instant::now();
            if wake > now {
                thread::sleep(wake - now);
            }
        }
    }

    /// One scheduling pass at `now`: resolve due commands, then tick if
    /// the period has elapsed. The first call only anchors the schedule.
    pub fn step(&mut self, now: Instant) -> StepOutcome {
        let resolved = self.handle.resolve_due().len();
        self.stats.commands_resolved += resolved as u64;

        let period = self.config.tick_period;
        let next_tick = match self.next_tick {
            Some(t) => t,
            None => {
                self.next_tick = Some(now + period);
                return StepOutcome {
                    ticked: false,
                    resolved,
                };
            }
        };
        if now < next_tick {
            return StepOutcome {
                ticked: false,
                resolved,
            };
        }

        let lateness = now.duration_since(next_tick);
        self.stats.max_lateness_us = self.stats.max_lateness_us.max(lateness.as_micros() as u64);
        self.next_tick = if lateness > period {
            self.stats.ticks_late += 1;
            warn!(
                "simulation tick {} ms late, re-anchoring schedule",
                lateness.as_millis()
            );
            Some(now + period)
        } else {
            Some(next_tick + period)
        };

        let snapshot = self.handle.tick(period);
        self.stats.ticks_executed += 1;
        debug!(
            "tick {}: speed={} rpm target={} rpm temp={} C load={}%",
            snapshot.tick_count,
            snapshot.motor.current_speed,
            snapshot.motor.target_speed,
            snapshot.motor.temperature,
            snapshot.motor.load
        );

        let faults = snapshot.safety.faults();
        if faults != self.last_faults {
            for fault in faults.iter().filter(|f| !self.last_faults.contains(f)) {
                warn!("safety fault raised: {}", fault.as_str());
            }
            self.last_faults = faults;
        }

        StepOutcome {
            ticked: true,
            resolved,
        }
    }

    pub fn stats(&self) -> &ClockStats {
        &self.stats
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::executor::CommandRequest;
    use crate::noise::Quiet;
    use crate::session::{MotorSession, SessionConfig};
    use crate::timebase::TimeBase;
    use std::sync::Arc;

    fn clock(period_ms: u64) -> SimulationClock {
        let session = MotorSession::new(SessionConfig::default(), Box::new(Quiet));
        let handle = SessionHandle::new(session, TimeBase::new());
        SimulationClock::new(
            handle,
            ClockConfig {
                tick_period: Duration::from_millis(period_ms),
                poll_interval: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn ticks_on_period_boundaries() {
        let mut clock = clock(2_000);
        let t0 = Instant::now();
        assert!(!clock.step(t0).ticked);
        assert!(!clock.step(t0 + Duration::from_millis(1_999)).ticked);
        assert!(clock.step(t0 + Duration::from_millis(2_000)).ticked);
        assert!(!clock.step(t0 + Duration::from_millis(3_000)).ticked);
        assert!(clock.step(t0 + Duration::from_millis(4_100)).ticked);
        assert_eq!(clock.stats().ticks_executed, 2);
        assert_eq!(clock.stats().ticks_late, 0);
        assert_eq!(clock.handle().snapshot().tick_count, 2);
    }

    #[test]
    fn late_tick_reanchors_instead_of_bursting() {
        let mut clock = clock(2_000);
        let t0 = Instant::now();
        clock.step(t0);
        let late = t0 + Duration::from_millis(7_000);
        assert!(clock.step(late).ticked);
        assert_eq!(clock.stats().ticks_late, 1);
        assert!(!clock.step(late + Duration::from_millis(10)).ticked);
        assert!(clock.step(late + Duration::from_millis(2_000)).ticked);
        assert_eq!(clock.stats().ticks_executed, 2);
    }

    #[test]
    fn run_resolves_commands_between_ticks() {
        let mut clock = clock(60_000);
        let handle = clock.handle().clone();
        handle
            .submit(CommandRequest::new(CommandKind::EmergencyStop, "ops"))
            .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clock = Arc::clone(&stop);
        let worker = thread::spawn(move || {
            clock.run(&stop_clock);
            clock.stats().clone()
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.snapshot().flags.emergency_active && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        stop.store(true, Ordering::Relaxed);
        let stats = worker.join().unwrap();

        assert!(handle.snapshot().flags.emergency_active);
        assert_eq!(stats.commands_resolved, 1);
        assert_eq!(stats.ticks_executed, 0);
    }
}
