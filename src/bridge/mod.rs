//! Server-side bridging: WebSocket JSON in, gRPC protobuf out

pub mod connection;
pub mod enums;
pub mod queue;
pub mod redact;
pub mod upstream;

pub use connection::{translate_frame, ws_bridge_handler};
pub use queue::PushableQueue;
pub use redact::RedactingLogger;
