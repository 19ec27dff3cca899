//! Call session actor
//!
//! [`CallSession`] wraps a [`CallOrchestrator`] in its own task and exposes
//! a command handle. The task owns all mutable call state; callers interact
//! through the command channel only, so mic capture, UI code, and control
//! flows never contend on a lock. The run loop multiplexes commands, call
//! events (server messages and playback completions), and the mic debounce
//! deadline.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::audio::TtsPlayer;
use crate::call::metrics::LatencyMetrics;
use crate::call::orchestrator::{CallEvent, CallOrchestrator};
use crate::call::state::{CallState, UiEvent};
use crate::client::CallTransport;
use crate::config::CallConfig;
use crate::errors::CallError;

const COMMAND_BUFFER_SIZE: usize = 64;

pub enum CallCommand {
    Start {
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    End {
        reply: oneshot::Sender<Result<LatencyMetrics, CallError>>,
    },
    MicChunk(Vec<u8>),
    Metrics {
        reply: oneshot::Sender<LatencyMetrics>,
    },
    State {
        reply: oneshot::Sender<CallState>,
    },
    Duration {
        reply: oneshot::Sender<Option<f64>>,
    },
    Shutdown,
}

/// Handle to a running call task
pub struct CallSession {
    cmd_tx: mpsc::Sender<CallCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl CallSession {
    /// Spawn the call task. UI events stream out on `ui_tx`.
    pub fn spawn(
        cfg: CallConfig,
        transport: Arc<dyn CallTransport>,
        tts: Arc<dyn TtsPlayer>,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let orch = CallOrchestrator::new(cfg, transport, tts, ui_tx);
        let task = tokio::spawn(run(orch, cmd_rx));
        Self { cmd_tx, task }
    }

    pub async fn start(&self) -> Result<(), CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::Start { reply }).await?;
        rx.await.map_err(|_| CallError::SessionTerminated)?
    }

    pub async fn end(&self) -> Result<LatencyMetrics, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::End { reply }).await?;
        rx.await.map_err(|_| CallError::SessionTerminated)?
    }

    /// Queue one captured mic chunk
    pub async fn mic_chunk(&self, chunk: Vec<u8>) -> Result<(), CallError> {
        self.send(CallCommand::MicChunk(chunk)).await
    }

    pub async fn metrics(&self) -> Result<LatencyMetrics, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::Metrics { reply }).await?;
        rx.await.map_err(|_| CallError::SessionTerminated)
    }

    pub async fn state(&self) -> Result<CallState, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::State { reply }).await?;
        rx.await.map_err(|_| CallError::SessionTerminated)
    }

    pub async fn duration(&self) -> Result<Option<f64>, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::Duration { reply }).await?;
        rx.await.map_err(|_| CallError::SessionTerminated)
    }

    /// Stop the task, tearing down whatever is still open
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(CallCommand::Shutdown).await;
        let _ = self.task.await;
    }

    async fn send(&self, cmd: CallCommand) -> Result<(), CallError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| CallError::SessionTerminated)
    }
}

enum Step {
    Command(CallCommand),
    Event(CallEvent),
    Flush,
    Quit,
}

async fn run(mut orch: CallOrchestrator, mut cmd_rx: mpsc::Receiver<CallCommand>) {
    loop {
        // The flush arm only exists while a debounce window is armed
        let step = match orch.flush_deadline() {
            Some(deadline) => tokio::select! {
                cmd = cmd_rx.recv() => cmd.map(Step::Command).unwrap_or(Step::Quit),
                ev = orch.next_event() => ev.map(Step::Event).unwrap_or(Step::Quit),
                _ = tokio::time::sleep_until(deadline) => Step::Flush,
            },
            None => tokio::select! {
                cmd = cmd_rx.recv() => cmd.map(Step::Command).unwrap_or(Step::Quit),
                ev = orch.next_event() => ev.map(Step::Event).unwrap_or(Step::Quit),
            },
        };

        match step {
            Step::Command(CallCommand::Start { reply }) => {
                let _ = reply.send(orch.start_call().await);
            }
            Step::Command(CallCommand::End { reply }) => {
                let _ = reply.send(orch.end_call().await);
            }
            Step::Command(CallCommand::MicChunk(chunk)) => {
                if let Err(e) = orch.send_audio_chunk(chunk).await {
                    warn!(error = %e, "mic chunk dropped");
                }
            }
            Step::Command(CallCommand::Metrics { reply }) => {
                let _ = reply.send(orch.latency_metrics().clone());
            }
            Step::Command(CallCommand::State { reply }) => {
                let _ = reply.send(orch.state());
            }
            Step::Command(CallCommand::Duration { reply }) => {
                let _ = reply.send(orch.call_duration());
            }
            Step::Command(CallCommand::Shutdown) | Step::Quit => {
                orch.close_all().await;
                break;
            }
            Step::Event(ev) => {
                if let Err(e) = orch.handle_event(ev).await {
                    warn!(error = %e, "event handling failed");
                }
            }
            Step::Flush => {
                if let Err(e) = orch.flush_mic_buf().await {
                    warn!(error = %e, "mic flush failed");
                }
            }
        }
    }
}
