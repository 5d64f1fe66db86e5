use crate::command::{Command, CommandKind, SubmitError};
use crate::executor::CommandRequest;
use crate::session::{MotorSession, Reading, SessionSnapshot};
use crate::timebase::{TimeBase, Timestamp};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Receives session events after the session lock has been released.
///
/// Implementations run on whichever thread triggered the event (clock or
/// bridge) and must not block.
pub trait SessionObserver: Send + Sync {
    fn on_submitted(&self, _command: &Command) {}
    fn on_rejected(&self, _kind: CommandKind, _operator: &str, _error: &SubmitError) {}
    fn on_resolved(&self, _command: &Command) {}
    fn on_tick(&self, _snapshot: &SessionSnapshot) {}
    fn on_emergency_reset(&self, _operator: &str) {}
    fn on_control_changed(&self, _enabled: bool, _operator: &str) {}
}

/// Cloneable handle serializing every access to one [`MotorSession`].
///
/// The tick, command resolution and operator requests all take the same
/// lock, so read-modify-write cycles on the motor state never interleave.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<MotorSession>>,
    timebase: TimeBase,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl SessionHandle {
    pub fn new(session: MotorSession, timebase: TimeBase) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            timebase,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn timebase(&self) -> TimeBase {
        self.timebase
    }

    fn lock(&self) -> MutexGuard<'_, MotorSession> {
        // A panic while holding the lock cannot leave the session half
        // written: every mutation assigns whole values.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a command; returns as soon as it is pending.
    pub fn submit(&self, request: CommandRequest) -> Result<Command, SubmitError> {
        let kind = request.kind;
        let operator = request.operator.clone();
        let at = self.timebase.stamp();
        let result = self.lock().submit(request, at);
        if let Some(observer) = &self.observer {
            match &result {
                Ok(command) => observer.on_submitted(command),
                Err(err) => observer.on_rejected(kind, &operator, err),
            }
        }
        result
    }

    pub fn resolve_due(&self) -> Vec<Command> {
        self.resolve_at(self.timebase.stamp())
    }

    pub fn resolve_at(&self, at: Timestamp) -> Vec<Command> {
        let resolved = self.lock().resolve_due(at);
        if let Some(observer) = &self.observer {
            for command in &resolved {
                observer.on_resolved(command);
            }
        }
        resolved
    }

    pub fn tick(&self, dt: Duration) -> SessionSnapshot {
        let snapshot = self.lock().tick(dt);
        if let Some(observer) = &self.observer {
            observer.on_tick(&snapshot);
        }
        snapshot
    }

    pub fn reset_emergency(&self, operator: &str) -> bool {
        let cleared = self.lock().reset_emergency();
        if cleared {
            if let Some(observer) = &self.observer {
                observer.on_emergency_reset(operator);
            }
        }
        cleared
    }

    pub fn set_control_enabled(&self, enabled: bool, operator: &str) {
        self.lock().set_control_enabled(enabled);
        if let Some(observer) = &self.observer {
            observer.on_control_changed(enabled, operator);
        }
    }

    pub fn apply_reading(&self, reading: &Reading) -> SessionSnapshot {
        let mut session = self.lock();
        session.apply_reading(reading);
        session.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn history(&self) -> Vec<Command> {
        self.lock().history().to_vec()
    }

    /// Monotonic due time of the earliest pending command.
    pub fn next_due_us(&self) -> Option<u64> {
        self.lock().next_due_us()
    }
}
