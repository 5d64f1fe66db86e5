pub mod clock;
pub mod command;
pub mod diagnostics;
pub mod executor;
pub mod history;
pub mod noise;
pub mod physics;
pub mod safety;
mod safety_proptest;
pub mod session;
pub mod state;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use clock::{ClockConfig, ClockStats, SimulationClock, StepOutcome};
pub use command::{
    Command, CommandKind, CommandStatus, ExecutorConfig, SubmitError, UnknownCommand,
};
pub use diagnostics::{Diagnostics, MaintenanceStatus};
pub use executor::{CommandExecutor, CommandRequest};
pub use history::CommandHistory;
pub use noise::{NoiseSource, Quiet, SeededNoise};
pub use physics::advance;
pub use safety::{
    evaluate, SafetyFault, SafetyLimits, SafetyStatus, SessionFlags, Setpoint, SetpointError,
    Unvalidated, Validated,
};
pub use session::{MotorSession, Reading, SessionConfig, SessionSnapshot};
pub use state::{MotorParams, MotorState, AMBIENT_TEMP_C, MAX_SPEED_RPM, NOMINAL_VOLTAGE_V};
pub use sync::{SessionHandle, SessionObserver};
pub use timebase::{TimeBase, Timestamp};
