pub mod audio;
pub mod bridge;
pub mod call;
pub mod client;
pub mod config;
pub mod errors;
pub mod proto;
pub mod routes;
pub mod state;
pub mod wire;

// Re-export commonly used items for convenience
pub use call::{CallOrchestrator, CallSession, CallState, LatencyMetrics, ServerMessage, UiEvent};
pub use client::{CallTransport, CloseMode, StreamingCall, WsCallTransport};
pub use config::{CallConfig, ServerConfig};
pub use errors::{BridgeError, CallError, TransportError};
pub use state::AppState;
