use motor_core::SessionHandle;
use motor_io::metrics::{init_metrics, record_snapshot, serve_metrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Refresh gauges between ticks so commands and readings show up promptly.
pub fn start_metrics_updater(
    handle: SessionHandle,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            record_snapshot(&handle.snapshot());
            thread::sleep(Duration::from_millis(200));
        }
    })
}
