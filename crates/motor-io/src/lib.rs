pub mod auth;
pub mod bridge;
pub mod metrics;
pub mod protocol;

pub use auth::{AuthConfig, AuthError, OperatorClaims, TokenValidator};
pub use bridge::{run_bridge, serve, BridgeConfig, BridgeError};
pub use metrics::{init_metrics, record_snapshot, serve_metrics, MetricsObserver};
pub use protocol::{AckMsg, IncomingMessage, ParseError, ProtocolVersion, StateMsg};
