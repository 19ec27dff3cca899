//! Client-side access to the bridge

pub mod transport;

pub use transport::{
    CallTransport, CloseMode, StreamingCall, StubCall, WsCallTransport, parse_server_message,
};
