//! Client-side call lifecycle: state machine, session actor, metrics

pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use metrics::{DialogueMetrics, LatencyMetrics, now_ms};
pub use orchestrator::{CallEvent, CallOrchestrator, GREETING_TIMEOUT, MIC_DEBOUNCE, PlaybackReport};
pub use session::{CallCommand, CallSession};
pub use state::{CallState, ServerMessage, UiEvent};
