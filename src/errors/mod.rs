//! Error types for the voicebridge crate
//!
//! Each boundary gets its own error enum:
//! - `BridgeError` - server-side WebSocket/gRPC bridging failures
//! - `TransportError` - client-side streaming call failures
//! - `CallError` - call orchestration failures surfaced to the caller
//! - `AudioError` - TTS player collaborator failures (logged, never fatal)

use thiserror::Error;

/// Returned by `PushableQueue::push` after the queue has been closed.
///
/// This is an expected race during call teardown (a frame arriving after
/// CALL_END), so callers typically log it at info level and move on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stream is closed")]
pub struct QueueClosed;

/// Server-side bridging errors
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Upstream gRPC channel could not be established
    #[error("upstream connection failed: {0}")]
    ConnectionFailed(String),

    /// The upstream call returned an error status
    #[error("upstream gRPC error: {0}")]
    Upstream(#[from] tonic::Status),

    /// Invalid endpoint or metadata configuration
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Client-side transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call config carried no usable auth token
    #[error("no token provided")]
    MissingToken,

    /// The socket did not reach OPEN within the bounded wait
    #[error("WebSocket open timeout")]
    OpenTimeout,

    /// Underlying socket failure
    #[error("WebSocket error: {0}")]
    Socket(String),

    /// Send attempted after the transport was closed
    #[error("transport closed")]
    Closed,

    /// Outbound frame could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Call orchestration errors
#[derive(Debug, Error)]
pub enum CallError {
    /// `start_call` invoked while not in IDLE
    #[error("call is not idle")]
    NotIdle,

    /// No virtual-agent greeting arrived within the bounded wait
    #[error("VA greeting timeout - no prompt received")]
    GreetingTimeout,

    /// The server event channel closed before the call completed
    #[error("server event channel closed")]
    EventChannelClosed,

    /// Transport failure during a state transition
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session actor is gone
    #[error("call session terminated")]
    SessionTerminated,
}

/// TTS player collaborator errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("playback error: {0}")]
    Playback(String),
}
