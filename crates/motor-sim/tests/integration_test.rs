use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn sim_binary() -> String {
    // Prefer the test-built binary when available to avoid extra cargo builds.
    std::env::var("CARGO_BIN_EXE_motor-sim").unwrap_or_else(|_| {
        let candidates = [
            "../../target/release/motor-sim",
            "target/release/motor-sim",
            "../../target/debug/motor-sim",
            "target/debug/motor-sim",
        ];
        for candidate in candidates {
            if std::path::Path::new(candidate).exists() {
                return candidate.to_string();
            }
        }
        panic!("Failed to locate motor-sim binary. Expected CARGO_BIN_EXE_motor-sim or a build in target/.");
    })
}

struct SimProcess {
    child: Child,
    addr: String,
}

impl SimProcess {
    fn start(extra_args: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .expect("Failed to bind ephemeral port for integration test");
        let bind_addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        drop(listener);

        let child = Command::new(sim_binary())
            .args(["--bind", &bind_addr, "--tick-ms", "200", "--seed", "11"])
            .args(extra_args)
            .stdout(Stdio::null())
            .spawn()
            .expect("Failed to start motor-sim");

        // Loop until port is open (up to 5s)
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if TcpStream::connect(&bind_addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        Self {
            child,
            addr: bind_addr,
        }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(&self.addr).expect("Failed to connect to motor-sim");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Client { stream, reader }
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn send(&mut self, msg: Value) {
        writeln!(self.stream, "{}", msg).unwrap();
    }

    fn next(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Skip state frames until a message of `msg_type` arrives.
    fn next_of(&mut self, msg_type: &str) -> Value {
        loop {
            let msg = self.next();
            if msg["type"] == msg_type {
                return msg;
            }
        }
    }

    fn wait_for_state(&mut self, timeout: Duration, pred: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let msg = self.next();
            if msg["type"] == "state" && pred(&msg) {
                return msg;
            }
        }
        panic!("state condition not reached within {:?}", timeout);
    }
}

#[test]
fn test_state_stream_shape() {
    let sim = SimProcess::start(&[]);
    let mut client = sim.connect();

    let state = client.next_of("state");
    assert_eq!(state["protocol_version"]["major"], 1);
    assert_eq!(state["motor"]["isRunning"], false);
    assert_eq!(state["motor"]["voltage"], 480.0);
    assert_eq!(state["flags"]["controlEnabled"], true);
    assert_eq!(state["safety"]["emergencyStop"], true);

    let next = client.next_of("state");
    assert!(next["sequence"].as_u64().unwrap() > state["sequence"].as_u64().unwrap());
}

#[test]
fn test_emergency_stop_latches_and_blocks_start() {
    let sim = SimProcess::start(&[]);
    let mut client = sim.connect();
    client.next_of("state");

    client.send(serde_json::json!({
        "type": "command",
        "protocol_version": { "major": 1, "minor": 0 },
        "sequence": 1,
        "command": "emergency_stop",
        "operator": "it-operator"
    }));
    let ack = client.next_of("ack");
    assert_eq!(ack["accepted"], true);
    assert_eq!(ack["command"]["status"], "pending");
    assert_eq!(ack["command"]["operator"], "it-operator");

    let state = client.wait_for_state(Duration::from_secs(5), |s| {
        s["flags"]["emergencyActive"] == true
    });
    assert_eq!(state["safety"]["emergencyStop"], false);
    assert_eq!(state["motor"]["isRunning"], false);

    client.send(serde_json::json!({
        "type": "command",
        "sequence": 2,
        "command": "start"
    }));
    let refused = client.next_of("ack");
    assert_eq!(refused["accepted"], false);
    assert_eq!(refused["error"], "emergency stop is active");

    client.send(serde_json::json!({ "type": "reset_emergency", "operator": "it-operator" }));
    let reset = client.next_of("ack");
    assert_eq!(reset["accepted"], true);
    client.wait_for_state(Duration::from_secs(5), |s| {
        s["flags"]["emergencyActive"] == false
    });
}

#[test]
fn test_speed_setpoint_is_clamped_and_bounded() {
    let sim = SimProcess::start(&[]);
    let mut client = sim.connect();
    client.next_of("state");

    client.send(serde_json::json!({ "type": "command", "sequence": 1, "command": "start" }));
    assert_eq!(client.next_of("ack")["accepted"], true);

    client.send(serde_json::json!({
        "type": "command",
        "sequence": 2,
        "command": "speed_set",
        "value": 5000.0
    }));
    let ack = client.next_of("ack");
    assert_eq!(ack["accepted"], true);
    assert_eq!(ack["command"]["value"], 3000.0);

    // Whatever the random outcomes, speeds stay in range.
    let deadline = Instant::now() + Duration::from_millis(1500);
    while Instant::now() < deadline {
        let msg = client.next();
        if msg["type"] != "state" {
            continue;
        }
        let speed = msg["motor"]["currentSpeed"].as_f64().unwrap();
        let target = msg["motor"]["targetSpeed"].as_f64().unwrap();
        assert!((0.0..=3000.0).contains(&speed), "speed {speed} out of range");
        assert!((0.0..=3000.0).contains(&target), "target {target} out of range");
    }

    client.send(serde_json::json!({ "type": "history" }));
    let history = client.next_of("history");
    let commands = history["commands"].as_array().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["type"], "speed_set");
    assert_ne!(commands[0]["status"], "pending");
}

#[test]
fn test_timed_run_writes_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.jsonl");

    let status = Command::new(sim_binary())
        .args([
            "--no-bridge",
            "--run-seconds",
            "1",
            "--tick-ms",
            "100",
            "--audit-log",
            audit.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .status()
        .expect("Failed to run motor-sim");
    assert!(status.success());

    let content = std::fs::read_to_string(&audit).unwrap();
    let events: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event_type"], "session_start");
    let last = events.last().unwrap();
    assert_eq!(last["event_type"], "session_shutdown");
    assert!(last["details"]["ticks_executed"].as_u64().unwrap() >= 5);
}
