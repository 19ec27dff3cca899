//! Call lifecycle state and server message types

use serde::Serialize;

use crate::proto::StreamingSpeechInferResponse;

/// Lifecycle of one voice call.
///
/// IDLE -> CALL_START (greeting stream open) -> AUDIO_STREAMING (duplex) ->
/// CALL_END (goodbye stream) -> ENDED. ENDED is absorbing; a fatal upstream
/// error jumps straight there from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Idle,
    CallStart,
    AudioStreaming,
    CallEnd,
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallState::Idle => "IDLE",
            CallState::CallStart => "CALL_START",
            CallState::AudioStreaming => "AUDIO_STREAMING",
            CallState::CallEnd => "CALL_END",
            CallState::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// One message delivered by the bridge over the client WebSocket
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Response(StreamingSpeechInferResponse),
    Error {
        error: String,
        details: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            details: None,
        }
    }

    pub fn error_with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            details: Some(details.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }
}

/// A [`ServerMessage`] stamped with the local receive time, as surfaced to
/// whoever is observing the call (UI, logs, tests).
#[derive(Debug, Clone)]
pub struct UiEvent {
    pub message: ServerMessage,
    /// Unix epoch milliseconds at the moment the orchestrator saw the message
    pub server_timestamp: u64,
}
