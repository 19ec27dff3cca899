//! Prompt playback seam
//!
//! The orchestrator only needs four operations from a playback backend:
//! play a WAV/PCM prompt to completion, cut playback immediately, report
//! whether audio is currently audible, and release the device. Actual audio
//! output lives behind this trait so the call logic is testable without a
//! sound device.

use async_trait::async_trait;

use crate::errors::AudioError;

#[async_trait]
pub trait TtsPlayer: Send + Sync {
    /// Play one prompt payload, resolving when playback finishes or is
    /// stopped. `stop_all` from another task must interrupt a pending play.
    async fn play_wav_bytes(&self, bytes: &[u8]) -> Result<(), AudioError>;

    /// Stop any in-flight playback and drop queued audio
    fn stop_all(&self);

    /// Whether audio is currently being played out
    fn is_playing(&self) -> bool;

    /// Release the backend; playback is impossible afterwards
    async fn close(&self);
}

/// Discards audio instantly. Used when no playback backend is attached and
/// as the no-op default in tests that do not exercise timing.
#[derive(Debug, Default)]
pub struct NullTts;

#[async_trait]
impl TtsPlayer for NullTts {
    async fn play_wav_bytes(&self, _bytes: &[u8]) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop_all(&self) {}

    fn is_playing(&self) -> bool {
        false
    }

    async fn close(&self) {}
}
