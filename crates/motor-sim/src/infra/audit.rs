//! Operator audit trail.
//!
//! One JSON object per line for every command submitted, refused or
//! resolved, plus session start/stop and gate changes. Written by the
//! runtime only; the simulation core keeps no durable state.

use motor_core::{Command, CommandKind, SessionObserver, SubmitError, TimeBase};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionStart,
    SessionShutdown,
    /// Command admitted as pending
    CommandSubmitted,
    /// Command refused at submission
    CommandRejected,
    /// Pending command executed or failed
    CommandResolved,
    EmergencyReset,
    ControlChanged,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in milliseconds
    pub unix_ms: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open `path` in append mode, creating parent directories.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_ms: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_ms,
            event_type,
            details,
        })
    }
}

/// Session observer that appends every operator-visible event.
pub struct AuditObserver {
    logger: AuditLogger,
    timebase: TimeBase,
}

impl AuditObserver {
    pub fn new(logger: AuditLogger, timebase: TimeBase) -> Self {
        Self { logger, timebase }
    }

    pub fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
        let at = self.timebase.stamp();
        if let Err(e) = self
            .logger
            .log_event(at.monotonic_us, at.unix_ms, event_type, details)
        {
            warn!(error = %e, ?event_type, "Failed to write audit entry");
        }
    }

    fn record_command(&self, event_type: AuditEventType, command: &Command) {
        match serde_json::to_value(command) {
            Ok(details) => self.record(event_type, details),
            Err(e) => warn!(error = %e, "Failed to encode command for audit"),
        }
    }
}

impl SessionObserver for AuditObserver {
    fn on_submitted(&self, command: &Command) {
        self.record_command(AuditEventType::CommandSubmitted, command);
    }

    fn on_rejected(&self, kind: CommandKind, operator: &str, error: &SubmitError) {
        self.record(
            AuditEventType::CommandRejected,
            serde_json::json!({
                "type": kind.as_str(),
                "operator": operator,
                "reason": error.to_string(),
            }),
        );
    }

    fn on_resolved(&self, command: &Command) {
        self.record_command(AuditEventType::CommandResolved, command);
    }

    fn on_emergency_reset(&self, operator: &str) {
        self.record(
            AuditEventType::EmergencyReset,
            serde_json::json!({ "operator": operator }),
        );
    }

    fn on_control_changed(&self, enabled: bool, operator: &str) {
        self.record(
            AuditEventType::ControlChanged,
            serde_json::json!({ "enabled": enabled, "operator": operator }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motor_core::{CommandRequest, MotorSession, Quiet, SessionConfig, SessionHandle, Timestamp};
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn read_entries(path: &Path) -> Vec<AuditEntry> {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_audit_logger_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let logger = AuditLogger::new(&path).unwrap();

        logger
            .log_event(
                1000,
                1704067200000,
                AuditEventType::SessionStart,
                serde_json::json!({"version": "0.1.0"}),
            )
            .unwrap();

        logger
            .log_event(
                2000,
                1704067201000,
                AuditEventType::ControlChanged,
                serde_json::json!({"enabled": false}),
            )
            .unwrap();

        let entries = read_entries(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp_us, 1000);
        assert_eq!(entries[1].event_type, AuditEventType::ControlChanged);
    }

    #[test]
    fn test_observer_records_command_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let timebase = TimeBase::new();
        let observer = Arc::new(AuditObserver::new(AuditLogger::new(&path).unwrap(), timebase));

        let session = MotorSession::new(SessionConfig::default(), Box::new(Quiet));
        let handle = SessionHandle::new(session, timebase).with_observer(observer);

        handle
            .submit(CommandRequest::new(motor_core::CommandKind::EmergencyStop, "dana"))
            .unwrap();
        handle.resolve_at(Timestamp {
            monotonic_us: u64::MAX / 2,
            unix_ms: 0,
        });
        handle
            .submit(CommandRequest::new(motor_core::CommandKind::Start, "dana"))
            .unwrap_err();
        assert!(handle.reset_emergency("dana"));

        let kinds: Vec<AuditEventType> = read_entries(&path).iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventType::CommandSubmitted,
                AuditEventType::CommandResolved,
                AuditEventType::CommandRejected,
                AuditEventType::EmergencyReset,
            ]
        );
        let entries = read_entries(&path);
        assert_eq!(entries[1].details["status"], "executed");
        assert_eq!(entries[2].details["reason"], "emergency stop is active");
    }
}
