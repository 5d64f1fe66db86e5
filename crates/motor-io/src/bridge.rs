use crate::auth::{AuthConfig, TokenValidator};
use crate::metrics::{AUTH_FAILURES, AUTH_MISSING, BRIDGE_CLIENTS, SEQUENCE_REJECTIONS};
use crate::protocol::{
    AckMsg, CommandMsg, ControlMsg, ErrorMsg, HelloMsg, HistoryMsg, IncomingMessage,
    ResetEmergencyMsg, StateMsg,
};
use motor_core::{CommandKind, CommandRequest, SessionHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// How often an idle accept loop re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: String,
    pub publish_interval: Duration,
    pub auth: AuthConfig,
    pub require_handshake: bool,
    /// Recorded on commands from clients that name no operator.
    pub default_operator: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            publish_interval: Duration::from_millis(100),
            auth: AuthConfig::default(),
            require_handshake: false,
            default_operator: "bridge".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start bridge runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
struct InboundState {
    last_sequence: Option<u64>,
    handshake_seen: bool,
    capabilities: Vec<String>,
    client_id: Option<String>,
}

impl InboundState {
    fn accept_sequence(&mut self, sequence: u64) -> bool {
        if sequence == 0 {
            warn!("Command sequence missing or zero");
            return false;
        }
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                warn!(sequence, last_sequence = last, "Out-of-order command sequence");
                return false;
            }
        }
        self.last_sequence = Some(sequence);
        true
    }

    fn note_handshake(&mut self, hello: &HelloMsg) {
        self.handshake_seen = true;
        self.capabilities = hello.capabilities.clone();
        self.client_id = hello.client_id.clone().filter(|id| !id.is_empty());
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Reply {
    Ack(AckMsg),
    History(HistoryMsg),
    Error(ErrorMsg),
}

/// Turns inbound lines into session calls; shared by every connection.
struct Dispatcher {
    handle: SessionHandle,
    validator: Option<TokenValidator>,
    require_handshake: bool,
    default_operator: String,
}

impl Dispatcher {
    fn new(handle: SessionHandle, config: &BridgeConfig) -> Self {
        let validator = if config.auth.enabled {
            Some(TokenValidator::from_config(&config.auth))
        } else {
            None
        };
        Self {
            handle,
            validator,
            require_handshake: config.require_handshake,
            default_operator: config.default_operator.clone(),
        }
    }

    fn handle_line(&self, line: &str, inbound: &mut InboundState) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let reply = match IncomingMessage::parse(trimmed) {
            Ok(msg) => self.handle_message(msg, inbound)?,
            Err(e) => {
                warn!(error = %e, "Unparseable bridge message");
                Reply::Error(ErrorMsg::new(e.to_string()))
            }
        };
        encode(&reply)
    }

    fn handle_message(&self, msg: IncomingMessage, inbound: &mut InboundState) -> Option<Reply> {
        let version = msg.protocol_version();
        if !version.is_supported() {
            warn!(
                major = version.major,
                minor = version.minor,
                "Unsupported protocol version"
            );
            return None;
        }

        match msg {
            IncomingMessage::Hello(hello) => {
                inbound.note_handshake(&hello);
                info!(
                    client_id = ?hello.client_id,
                    capabilities = ?hello.capabilities,
                    "Bridge handshake received"
                );
                None
            }
            IncomingMessage::Command(cmd) => Some(Reply::Ack(self.handle_command(cmd, inbound))),
            IncomingMessage::ResetEmergency(reset) => {
                Some(Reply::Ack(self.handle_reset(reset, inbound)))
            }
            IncomingMessage::Control(control) => {
                Some(Reply::Ack(self.handle_control(control, inbound)))
            }
            IncomingMessage::Reading(reading) => {
                let snapshot = self.handle.apply_reading(&reading.reading);
                debug!(
                    speed = snapshot.motor.current_speed,
                    temperature = snapshot.motor.temperature,
                    "Reading applied"
                );
                None
            }
            IncomingMessage::History(_) => {
                Some(Reply::History(HistoryMsg::new(self.handle.history())))
            }
        }
    }

    fn check_handshake(&self, inbound: &InboundState) -> Result<(), String> {
        if self.require_handshake && !inbound.handshake_seen {
            warn!("Control message received before handshake");
            return Err("handshake required".to_string());
        }
        Ok(())
    }

    /// Operator to record: the token's when auth is on, else the claimed one.
    fn authorize(
        &self,
        token: Option<&str>,
        claimed: Option<String>,
        inbound: &InboundState,
    ) -> Result<String, String> {
        let Some(validator) = &self.validator else {
            return Ok(claimed
                .filter(|op| !op.is_empty())
                .or_else(|| inbound.client_id.clone())
                .unwrap_or_else(|| self.default_operator.clone()));
        };
        match token {
            Some(token) => match validator.validate(token) {
                Ok(claims) => Ok(claims.operator),
                Err(e) => {
                    warn!(error = %e, "Invalid auth token");
                    AUTH_FAILURES.inc();
                    Err(e.to_string())
                }
            },
            None => {
                warn!("Missing auth token");
                AUTH_MISSING.inc();
                Err("missing auth token".to_string())
            }
        }
    }

    fn handle_command(&self, msg: CommandMsg, inbound: &mut InboundState) -> AckMsg {
        const REQUEST: &str = "command";
        let sequence = Some(msg.sequence);

        if let Err(reason) = self.check_handshake(inbound) {
            return AckMsg::rejected(REQUEST, sequence, reason);
        }
        if !inbound.accept_sequence(msg.sequence) {
            SEQUENCE_REJECTIONS.inc();
            return AckMsg::rejected(REQUEST, sequence, "out-of-order sequence");
        }
        let operator = match self.authorize(msg.auth_token.as_deref(), msg.operator, inbound) {
            Ok(operator) => operator,
            Err(reason) => return AckMsg::rejected(REQUEST, sequence, reason),
        };
        let kind: CommandKind = match msg.command.parse() {
            Ok(kind) => kind,
            Err(e) => return AckMsg::rejected(REQUEST, sequence, format!("{e}")),
        };

        let request = CommandRequest {
            kind,
            value: msg.value,
            operator,
        };
        match self.handle.submit(request) {
            Ok(command) => {
                debug!(id = command.id, command = %kind, "Command accepted");
                AckMsg::accepted(REQUEST, sequence, Some(command))
            }
            Err(e) => {
                info!(command = %kind, error = %e, "Command refused");
                AckMsg::rejected(REQUEST, sequence, e.to_string())
            }
        }
    }

    fn handle_reset(&self, msg: ResetEmergencyMsg, inbound: &InboundState) -> AckMsg {
        const REQUEST: &str = "reset_emergency";
        if let Err(reason) = self.check_handshake(inbound) {
            return AckMsg::rejected(REQUEST, None, reason);
        }
        let operator = match self.authorize(msg.auth_token.as_deref(), msg.operator, inbound) {
            Ok(operator) => operator,
            Err(reason) => return AckMsg::rejected(REQUEST, None, reason),
        };
        if self.handle.reset_emergency(&operator) {
            info!(%operator, "Emergency stop reset from bridge");
            AckMsg::accepted(REQUEST, None, None)
        } else {
            AckMsg::rejected(REQUEST, None, "no emergency stop is active")
        }
    }

    fn handle_control(&self, msg: ControlMsg, inbound: &InboundState) -> AckMsg {
        const REQUEST: &str = "control";
        if let Err(reason) = self.check_handshake(inbound) {
            return AckMsg::rejected(REQUEST, None, reason);
        }
        let operator = match self.authorize(msg.auth_token.as_deref(), msg.operator, inbound) {
            Ok(operator) => operator,
            Err(reason) => return AckMsg::rejected(REQUEST, None, reason),
        };
        self.handle.set_control_enabled(msg.enabled, &operator);
        AckMsg::accepted(REQUEST, None, None)
    }

    fn state_line(&self, sequence: u64) -> Option<String> {
        let at = self.handle.timebase().stamp();
        encode(&StateMsg::new(sequence, at, self.handle.snapshot()))
    }
}

fn encode<T: Serialize>(msg: &T) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(error = %e, "Failed to encode bridge message");
            None
        }
    }
}

/// Run the bridge on its own tokio runtime until `stop` is set.
pub fn run_bridge(
    handle: SessionHandle,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) -> Result<(), BridgeError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("motor-bridge")
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        serve(listener, handle, config, stop).await;
        Ok(())
    })
}

/// Accept clients on an already bound listener until `stop` is set.
pub async fn serve(
    listener: TcpListener,
    handle: SessionHandle,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) {
    info!(
        addr = ?listener.local_addr().ok(),
        auth = config.auth.enabled,
        require_handshake = config.require_handshake,
        "Bridge listening"
    );

    let dispatcher = Arc::new(Dispatcher::new(handle, &config));
    let mut clients = tokio::task::JoinSet::new();

    while !stop.load(Ordering::Relaxed) {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    clients.spawn(serve_client(
                        stream,
                        addr,
                        Arc::clone(&dispatcher),
                        config.publish_interval,
                        Arc::clone(&stop),
                    ));
                }
                Err(err) => warn!(error = %err, "Bridge accept error"),
            },
            _ = tokio::time::sleep(STOP_POLL) => {}
        }
    }

    while clients.join_next().await.is_some() {}
    info!("Bridge stopped");
}

#[instrument(skip_all, fields(client = %addr))]
async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    publish_interval: Duration,
    stop: Arc<AtomicBool>,
) {
    info!("Bridge client connected");
    BRIDGE_CLIENTS.inc();

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut publish = tokio::time::interval(publish_interval);
    publish.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut inbound = InboundState::default();
    let mut state_sequence: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        let outgoing = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatcher.handle_line(&line, &mut inbound),
                Ok(None) => {
                    info!("Bridge client disconnected");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    break;
                }
            },
            _ = publish.tick() => {
                state_sequence = state_sequence.wrapping_add(1);
                dispatcher.state_line(state_sequence)
            }
        };

        if let Some(mut text) = outgoing {
            text.push('\n');
            if let Err(err) = writer.write_all(text.as_bytes()).await {
                warn!(error = %err, "Bridge write error");
                break;
            }
        }
    }

    BRIDGE_CLIENTS.dec();
}
