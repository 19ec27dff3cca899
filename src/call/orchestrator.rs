//! Call orchestration
//!
//! [`CallOrchestrator`] drives the full life of one virtual-agent call over
//! three upstream streams: a greeting stream (CALL_START), any number of
//! duplex audio streams (one per user turn), and a goodbye stream
//! (CALL_END). All server messages from every stream arrive on a single
//! internal channel and are dispatched through [`CallOrchestrator::handle_server`],
//! which also stamps them with a receive time and forwards them to the UI
//! channel.
//!
//! Turn shape: caller audio streams up with a 40 ms merge window; an
//! END_OF_INPUT event finishes the user turn (stream half-closed, further
//! mic audio suppressed until the agent answers); the agent response either
//! allows barge-in (mic stays hot during playback) or not. A fatal error
//! from any stream moves the call to ENDED, which is absorbing.
//!
//! Prompt playback runs on its own task so server events keep flowing while
//! audio is in flight; a barge-in must be able to cut a prompt off
//! mid-playback. Each queued batch of prompts reports back as a
//! [`CallEvent::Playback`] once it has finished (or been stopped), and the
//! completion handler settles the playback metrics and reopens the audio
//! stream where the turn calls for it.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::TtsPlayer;
use crate::call::metrics::{DialogueMetrics, LatencyMetrics, now_ms};
use crate::call::state::{CallState, ServerMessage, UiEvent};
use crate::client::{CallTransport, CloseMode, StreamingCall};
use crate::config::{CallConfig, CCAI_CONFIG_ID, DEFAULT_CLIENT_ID, FIXED_SAMPLE_RATE};
use crate::errors::CallError;
use crate::proto::{
    self, InferInsightResponse, Prompt, RecognitionResult, StreamingSpeechInferResponse,
    VirtualAgentResult,
};
use crate::wire::{
    CaseFrame, ConsumerInfoFrame, EnumCode, Frame, InputEventFrame, InsightConfigFrame,
    OutputAudioFrame, RecognitionConfigFrame, StreamingConfigFrame, VoiceFrame,
};

/// Bound on waiting for the first virtual-agent prompt after CALL_START
pub const GREETING_TIMEOUT: Duration = Duration::from_secs(30);

/// Mic chunks arriving within this window are merged into one upstream frame
pub const MIC_DEBOUNCE: Duration = Duration::from_millis(40);

/// Something the orchestrator task must react to: a message from a stream,
/// or a finished prompt playback batch
pub enum CallEvent {
    Server(ServerMessage),
    Playback(PlaybackReport),
}

/// One batch of prompts handed to the playback task
struct PlaybackJob {
    /// Prompts surviving dedup, played in order
    prompts: Vec<Prompt>,
    /// Dialogue the batch belongs to, `None` for the greeting
    dialogue: Option<usize>,
    greeting: bool,
    finished: bool,
    bargeable: bool,
    /// Previous dialogue eligible for silence gap 1, captured at queue time
    gap1_prev: Option<usize>,
    generation: u64,
}

/// Completion record of a playback batch
pub struct PlaybackReport {
    job: PlaybackJob,
    /// When the first audio prompt actually started playing
    started: Option<u64>,
    played_bytes: u64,
    elapsed: f64,
    finished_at: u64,
}

pub struct CallOrchestrator {
    cfg: CallConfig,
    transport: Arc<dyn CallTransport>,
    tts: Arc<dyn TtsPlayer>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    leg_id: Uuid,

    state: CallState,
    events_tx: mpsc::UnboundedSender<ServerMessage>,
    events_rx: mpsc::UnboundedReceiver<ServerMessage>,

    call_start_rpc: Option<Box<dyn StreamingCall>>,
    audio_rpc: Option<Box<dyn StreamingCall>>,
    // Half-closed audio streams still delivering the agent's answer; their
    // sockets stay open until close_all
    retired: Vec<Box<dyn StreamingCall>>,

    got_greeting: bool,
    initial_prompts_played: bool,
    awaiting_va_after_eoi: bool,
    played_prompt_keys: HashSet<String>,

    latency: LatencyMetrics,
    // Index into latency.dialogues
    cur_dlg: Option<usize>,
    dlg_num: u32,

    call_start_time: Option<u64>,
    call_end_time: Option<u64>,

    mic_buf: Vec<Vec<u8>>,
    flush_deadline: Option<Instant>,

    playback_tx: mpsc::UnboundedSender<PlaybackReport>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackReport>,
    playback_active: bool,
    pending_playback: VecDeque<PlaybackJob>,
    // Bumped on stop; in-flight and queued jobs from older generations
    // fall silent
    playback_gen: Arc<AtomicU64>,
}

impl CallOrchestrator {
    pub fn new(
        cfg: CallConfig,
        transport: Arc<dyn CallTransport>,
        tts: Arc<dyn TtsPlayer>,
        ui_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            transport,
            tts,
            ui_tx,
            leg_id: Uuid::new_v4(),
            state: CallState::Idle,
            events_tx,
            events_rx,
            call_start_rpc: None,
            audio_rpc: None,
            retired: Vec::new(),
            got_greeting: false,
            initial_prompts_played: false,
            awaiting_va_after_eoi: false,
            played_prompt_keys: HashSet::new(),
            latency: LatencyMetrics::default(),
            cur_dlg: None,
            dlg_num: 0,
            call_start_time: None,
            call_end_time: None,
            mic_buf: Vec::new(),
            flush_deadline: None,
            playback_tx,
            playback_rx,
            playback_active: false,
            pending_playback: VecDeque::new(),
            playback_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn latency_metrics(&self) -> &LatencyMetrics {
        &self.latency
    }

    /// Call duration in seconds; `None` before the call starts. Keeps
    /// ticking until the call ends, then freezes.
    pub fn call_duration(&self) -> Option<f64> {
        if self.state == CallState::Idle {
            return None;
        }
        let start = self.call_start_time?;
        let end = self.call_end_time.unwrap_or_else(now_ms);
        Some(end.saturating_sub(start) as f64 / 1000.0)
    }

    /// Receive the next server message or playback completion; `None` when
    /// every sender is gone
    pub async fn next_event(&mut self) -> Option<CallEvent> {
        tokio::select! {
            msg = self.events_rx.recv() => msg.map(CallEvent::Server),
            report = self.playback_rx.recv() => report.map(CallEvent::Playback),
        }
    }

    /// Dispatch one event from [`CallOrchestrator::next_event`]
    pub async fn handle_event(&mut self, event: CallEvent) -> Result<(), CallError> {
        match event {
            CallEvent::Server(msg) => self.handle_server(msg).await,
            CallEvent::Playback(report) => self.finish_playback(report).await,
        }
    }

    /// Deadline of the pending mic flush, if one is armed
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    /// Start the call: open the greeting stream, wait for the first
    /// virtual-agent prompt (bounded), then enter duplex audio streaming.
    pub async fn start_call(&mut self) -> Result<(), CallError> {
        if self.state != CallState::Idle {
            return Err(CallError::NotIdle);
        }

        self.state = CallState::CallStart;
        let t0 = now_ms();
        self.call_start_time = Some(t0);
        self.latency.call_start = Some(t0);
        self.latency.call_start_request = Some(t0);
        info!(leg_id = %self.leg_id, conversation_id = %self.cfg.conversation_id, "call start");

        let rpc = self
            .open_stream(CloseMode::Complete, false, Some(proto::event_type::CALL_START))
            .await?;
        self.call_start_rpc = Some(rpc);

        // Greeting gate: the wait for the agent's first word is bounded,
        // the wait for its prompts to finish playing is not
        let deadline = Instant::now() + GREETING_TIMEOUT;
        while !self.got_greeting {
            let event = match tokio::time::timeout_at(deadline, self.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(CallError::EventChannelClosed),
                Err(_) => {
                    warn!(leg_id = %self.leg_id, "no greeting prompt within {GREETING_TIMEOUT:?}");
                    return Err(CallError::GreetingTimeout);
                }
            };
            self.handle_event(event).await?;
            if self.state == CallState::Ended {
                return Err(CallError::SessionTerminated);
            }
        }
        while !self.initial_prompts_played {
            let Some(event) = self.next_event().await else {
                return Err(CallError::EventChannelClosed);
            };
            self.handle_event(event).await?;
            if self.state == CallState::Ended {
                return Err(CallError::SessionTerminated);
            }
        }

        if let Some(rpc) = self.call_start_rpc.take() {
            let _ = rpc.close_stream().await;
            rpc.close();
        }

        self.state = CallState::AudioStreaming;
        self.flush_mic_buf().await?;
        self.start_audio_streaming().await?;
        Ok(())
    }

    /// End the call: flush, half-close the audio stream, run the goodbye
    /// stream, tear everything down. Safe to call in any state; outside of
    /// active streaming it only returns the metrics snapshot.
    pub async fn end_call(&mut self) -> Result<LatencyMetrics, CallError> {
        if self.state != CallState::AudioStreaming {
            return Ok(self.latency.clone());
        }

        self.state = CallState::CallEnd;
        self.record_call_end(now_ms());
        info!(leg_id = %self.leg_id, "call end");

        self.cancel_playback();
        self.flush_mic_buf().await?;

        if let Some(rpc) = self.audio_rpc.take() {
            let _ = rpc.close_stream().await;
            rpc.close();
        }

        // Goodbye stream is best effort; teardown proceeds either way
        match self
            .open_stream(CloseMode::CallEnd, false, Some(proto::event_type::CALL_END))
            .await
        {
            Ok(rpc) => {
                let _ = rpc.close_stream().await;
                rpc.close();
            }
            Err(e) => warn!(leg_id = %self.leg_id, error = %e, "goodbye stream failed"),
        }

        self.close_all().await;
        Ok(self.latency.clone())
    }

    /// Dispatch one server message: stamp and forward to the UI, then route
    /// recognition results and virtual-agent results to their handlers.
    /// Errors terminate the call.
    pub async fn handle_server(&mut self, msg: ServerMessage) -> Result<(), CallError> {
        let stamp = now_ms();
        let _ = self.ui_tx.send(UiEvent {
            message: msg.clone(),
            server_timestamp: stamp,
        });

        let rsp = match msg {
            ServerMessage::Error { error, details } => {
                warn!(leg_id = %self.leg_id, %error, details = ?details, "fatal stream error");
                self.cancel_playback();
                self.state = CallState::Ended;
                self.record_call_end(stamp);
                self.close_all().await;
                return Ok(());
            }
            ServerMessage::Response(rsp) => rsp,
        };

        if let Some(insight) = rsp.infer_insight_response {
            if let Some(rec) = insight.recognition_result {
                self.handle_asr(&rec, stamp).await?;
            }
            if let Some(va) = insight.virtual_agent_result {
                self.handle_va(&va).await?;
            }
        }
        Ok(())
    }

    /// Recognition events: dialogue timing, barge-in, end-of-turn
    async fn handle_asr(&mut self, rec: &RecognitionResult, stamp: u64) -> Result<(), CallError> {
        let i = self.ensure_dialogue();

        if rec.response_event == proto::response_event::EVENT_START_OF_INPUT {
            let d = &mut self.latency.dialogues[i];
            d.start_of_input.get_or_insert(stamp);
            if d.bargeinable {
                d.barge_in_start = Some(stamp);
                self.cancel_playback();
                self.flush_mic_buf().await?;
            }
        }

        // Latency is measured on the first event observed with playback over
        let d = &mut self.latency.dialogues[i];
        if let Some(t0) = d.barge_in_start
            && !self.tts.is_playing()
        {
            d.barge_in_latency = Some(now_ms().saturating_sub(t0) as f64 / 1000.0);
            d.barge_in_start = None;
        }

        if !rec.is_final && !rec.alternatives.is_empty() && d.first_interim_received.is_none() {
            d.first_interim_received = Some(stamp);
        }

        if rec.is_final && rec.result_end_time.is_some() {
            d.final_recognition_received = Some(stamp);
            if let Some(first) = d.first_interim_received {
                d.interim_playout_length = Some(stamp.saturating_sub(first) as f64 / 1000.0);
            }
        }

        if rec.response_event == proto::response_event::EVENT_END_OF_INPUT {
            let d = &mut self.latency.dialogues[i];
            d.end_of_input = Some(stamp);
            if let Some(start) = d.start_of_input {
                d.customer_utterance_length = Some(stamp.saturating_sub(start) as f64 / 1000.0);
            }
            self.finalize_user_turn().await;
        }
        Ok(())
    }

    /// Virtual-agent prompts: greeting handshake, barge-in arming, playback
    /// queueing. Playback itself proceeds on its own task so later events,
    /// barge-in above all, are not blocked behind it.
    async fn handle_va(&mut self, va: &VirtualAgentResult) -> Result<(), CallError> {
        self.got_greeting = true;
        self.awaiting_va_after_eoi = false;

        if self.state == CallState::AudioStreaming && self.audio_rpc.is_none() {
            self.start_audio_streaming().await?;
        }

        let is_chunk = va.response_type == proto::va_response_type::RESPONSE_CHUNK;
        let bargeable = va.prompts.iter().any(|p| p.bargein);

        if !self.initial_prompts_played {
            let stamp = now_ms();
            self.latency.call_start_response.get_or_insert(stamp);
            if let Some(req) = self.latency.call_start_request {
                self.latency
                    .call_start_latency
                    .get_or_insert(stamp.saturating_sub(req) as f64 / 1000.0);
            }
            self.queue_playback(&va.prompts, true, true, false, None);
            return Ok(());
        }

        let finished = !is_chunk || va.prompts.iter().any(|p| p.is_final);
        let i = self.ensure_dialogue();

        if bargeable {
            // Mic must go hot immediately, even mid-prompt
            self.latency.dialogues[i].bargeinable = true;
            if self.audio_rpc.is_none() {
                self.start_audio_streaming().await?;
            }
            self.queue_playback(&va.prompts, false, finished, true, None);
        } else {
            self.latency.dialogues[i].bargeinable = false;
            let gap1_prev = self.latency.dialogues.len().checked_sub(2);
            self.queue_playback(&va.prompts, false, finished, false, gap1_prev);
        }
        Ok(())
    }

    /// Queue one batch of prompts for playback, deduplicating by normalized
    /// text. At most one batch plays at a time; the rest wait their turn.
    fn queue_playback(
        &mut self,
        prompts: &[Prompt],
        greeting: bool,
        finished: bool,
        bargeable: bool,
        gap1_prev: Option<usize>,
    ) {
        let mut fresh = Vec::new();
        for p in prompts {
            let key = {
                let normalized = p.text.trim().to_lowercase();
                if normalized.is_empty() {
                    format!("{}", now_ms())
                } else {
                    normalized
                }
            };
            if self.played_prompt_keys.insert(key) {
                fresh.push(p.clone());
            }
        }

        let job = PlaybackJob {
            prompts: fresh,
            dialogue: self.cur_dlg,
            greeting,
            finished,
            bargeable,
            gap1_prev,
            generation: self.playback_gen.load(Ordering::SeqCst),
        };
        if self.playback_active {
            self.pending_playback.push_back(job);
        } else {
            self.spawn_playback(job);
        }
    }

    fn spawn_playback(&mut self, job: PlaybackJob) {
        self.playback_active = true;
        let tts = Arc::clone(&self.tts);
        let generation = Arc::clone(&self.playback_gen);
        let reports = self.playback_tx.clone();
        let leg_id = self.leg_id;
        tokio::spawn(async move {
            let mut started = None;
            let mut played_bytes = 0u64;
            for p in &job.prompts {
                if p.audio_content.is_empty() {
                    continue;
                }
                // A barge-in silences the rest of the batch
                if generation.load(Ordering::SeqCst) != job.generation {
                    break;
                }
                started.get_or_insert_with(now_ms);
                played_bytes += p.audio_content.len() as u64;
                if let Err(e) = tts.play_wav_bytes(&p.audio_content).await {
                    warn!(leg_id = %leg_id, error = %e, "prompt playback failed");
                }
            }
            let finished_at = now_ms();
            let elapsed = match started {
                Some(t0) => finished_at.saturating_sub(t0) as f64 / 1000.0,
                None => 0.0,
            };
            let _ = reports.send(PlaybackReport {
                job,
                started,
                played_bytes,
                elapsed,
                finished_at,
            });
        });
    }

    /// Settle a finished playback batch: playback metrics, silence gaps,
    /// prompt echoes, and the stream reopening the turn calls for.
    async fn finish_playback(&mut self, report: PlaybackReport) -> Result<(), CallError> {
        self.playback_active = false;
        let PlaybackReport {
            job,
            started,
            played_bytes,
            elapsed,
            finished_at,
        } = report;

        if let Some(i) = job.dialogue {
            let d = &mut self.latency.dialogues[i];
            if let Some(t0) = started {
                d.first_prompt_byte_received.get_or_insert(t0);
                d.first_playback_start.get_or_insert(t0);
            }
            d.total_prompt_playback_time += elapsed;
            if played_bytes > 0 {
                d.prompt_bytes = Some(d.prompt_bytes.unwrap_or(0) + played_bytes);
            }
        }
        if job.greeting && played_bytes > 0 {
            self.latency.greeting_prompt_bytes =
                Some(self.latency.greeting_prompt_bytes.unwrap_or(0) + played_bytes);
            self.latency.greeting_playback_time =
                Some(self.latency.greeting_playback_time.unwrap_or(0.0) + elapsed);
        }

        // Echo played text to the UI as synthetic responses
        for p in &job.prompts {
            if p.text.is_empty() {
                continue;
            }
            let stamp = now_ms();
            let echo = StreamingSpeechInferResponse {
                message_id: format!("echo-{stamp}"),
                status: 0,
                infer_insight_response: Some(InferInsightResponse {
                    recognition_result: None,
                    virtual_agent_result: Some(VirtualAgentResult {
                        prompts: vec![p.clone()],
                        response_type: 0,
                    }),
                }),
            };
            let _ = self.ui_tx.send(UiEvent {
                message: ServerMessage::Response(echo),
                server_timestamp: stamp,
            });
        }

        if job.greeting {
            self.initial_prompts_played = true;
            // Still CALL_START here, so this is a no-op until duplex mode
            self.start_audio_streaming().await?;
            self.start_next_playback();
            return Ok(());
        }

        if job.bargeable {
            if job.finished {
                self.start_audio_streaming().await?;
            }
        } else {
            if let (Some(prev_idx), Some(i)) = (job.gap1_prev, job.dialogue) {
                let prev_eoi = self.latency.dialogues[prev_idx].end_of_input;
                let first_byte = self.latency.dialogues[i].first_prompt_byte_received;
                if let (Some(eoi), Some(byte)) = (prev_eoi, first_byte) {
                    self.latency.dialogues[prev_idx].silence_gap1 =
                        Some(byte.saturating_sub(eoi) as f64 / 1000.0);
                }
            }

            self.start_audio_streaming().await?;
            if let Some(i) = job.dialogue {
                let d = &mut self.latency.dialogues[i];
                if let Some(eoi) = d.end_of_input
                    && job.finished
                {
                    d.silence_gap2 = Some(finished_at.saturating_sub(eoi) as f64 / 1000.0);
                }
            }
        }
        self.start_next_playback();
        Ok(())
    }

    fn start_next_playback(&mut self) {
        let current = self.playback_gen.load(Ordering::SeqCst);
        while let Some(job) = self.pending_playback.pop_front() {
            if job.generation == current {
                self.spawn_playback(job);
                return;
            }
        }
    }

    /// Stop whatever is playing and drop everything queued behind it
    fn cancel_playback(&mut self) {
        self.playback_gen.fetch_add(1, Ordering::SeqCst);
        self.pending_playback.clear();
        self.tts.stop_all();
    }

    /// Buffer one mic chunk; arms the debounce flush on the first chunk of
    /// a window. Chunks are dropped while the call is not streaming, while
    /// an answer is pending after end-of-input, or while a non-barge-in
    /// prompt is playing.
    pub async fn send_audio_chunk(&mut self, chunk: Vec<u8>) -> Result<(), CallError> {
        if self.state != CallState::AudioStreaming || self.awaiting_va_after_eoi {
            return Ok(());
        }
        let bargeinable = self
            .cur_dlg
            .map(|i| self.latency.dialogues[i].bargeinable)
            .unwrap_or(false);
        if self.tts.is_playing() && !bargeinable {
            return Ok(());
        }

        if self.audio_rpc.is_none() {
            self.start_audio_streaming().await?;
        }

        self.mic_buf.push(chunk);
        if self.flush_deadline.is_none() {
            self.flush_deadline = Some(Instant::now() + MIC_DEBOUNCE);
        }
        Ok(())
    }

    /// Merge all buffered chunks into one upstream audio frame. Outside of
    /// active streaming the buffer is discarded.
    pub async fn flush_mic_buf(&mut self) -> Result<(), CallError> {
        self.flush_deadline = None;
        if self.audio_rpc.is_none() || self.state != CallState::AudioStreaming {
            self.mic_buf.clear();
            return Ok(());
        }
        if self.mic_buf.is_empty() {
            return Ok(());
        }

        let total: usize = self.mic_buf.iter().map(Vec::len).sum();
        let mut merged = Vec::with_capacity(total);
        for chunk in self.mic_buf.drain(..) {
            merged.extend_from_slice(&chunk);
        }

        let frame = Frame {
            message_id: Some(format!("mic-{}", now_ms())),
            stream_speech_request: Some(CaseFrame {
                case: "audioContent".into(),
                value: BASE64.encode(&merged).into(),
            }),
            ..Default::default()
        };
        if let Some(rpc) = self.audio_rpc.as_ref() {
            rpc.send(frame, false).await?;
        }
        if let Some(i) = self.cur_dlg {
            self.latency.dialogues[i].audio_chunks_sent += 1;
        }
        debug!(leg_id = %self.leg_id, bytes = total, "mic flush");
        Ok(())
    }

    /// Open a fresh duplex audio stream and start a new dialogue. No-op
    /// outside AUDIO_STREAMING or when a stream is already live.
    async fn start_audio_streaming(&mut self) -> Result<(), CallError> {
        if self.state != CallState::AudioStreaming || self.audio_rpc.is_some() {
            return Ok(());
        }
        let rpc = self.open_stream(CloseMode::Complete, true, None).await?;
        self.audio_rpc = Some(rpc);
        self.start_new_dialogue();
        Ok(())
    }

    /// End the user's turn: half-close the audio stream but keep the socket
    /// alive so the agent's answer still arrives; suppress mic audio until
    /// it does.
    async fn finalize_user_turn(&mut self) {
        self.awaiting_va_after_eoi = true;
        if let Some(rpc) = self.audio_rpc.take() {
            let _ = rpc.close_stream().await;
            self.retired.push(rpc);
        }
    }

    /// Open a stream and send its two mandatory config frames
    async fn open_stream(
        &mut self,
        close_mode: CloseMode,
        interim_results: bool,
        event_type: Option<i32>,
    ) -> Result<Box<dyn StreamingCall>, CallError> {
        let rpc = self
            .transport
            .start_call(&self.cfg, close_mode, self.events_tx.clone())
            .await?;

        rpc.send(
            Frame {
                streaming_config: Some(StreamingConfigFrame {
                    config: Some(RecognitionConfigFrame {
                        encoding: Some(EnumCode::Name("LINEAR16".into())),
                        sample_rate_hertz: Some(FIXED_SAMPLE_RATE),
                        language_code: Some(self.cfg.language.clone()),
                    }),
                    interim_results: Some(interim_results),
                }),
                ..Default::default()
            },
            true,
        )
        .await?;

        rpc.send(
            Frame {
                streaming_insight_config: Some(InsightConfigFrame {
                    client_id: Some(DEFAULT_CLIENT_ID.into()),
                    org_id: Some(self.cfg.org_id.clone()),
                    conversation_id: Some(self.cfg.conversation_id.clone()),
                    ccai_config_id: Some(CCAI_CONFIG_ID.into()),
                    virtual_agent_id: Some(self.cfg.virtual_agent_id.clone()),
                    role: Some(EnumCode::Num(1)),
                    request_type: Some(EnumCode::Num(1)),
                    consumer_info: Some(ConsumerInfoFrame {
                        wxcc_cluster_id: Some(self.cfg.wxcc_cluster_id.clone()),
                        user_agent: Some(self.cfg.user_agent.clone()),
                    }),
                }),
                input_event: event_type.map(|t| InputEventFrame {
                    event_type: EnumCode::Num(t as i64),
                }),
                output_audio_config: Some(OutputAudioFrame {
                    audio_encoding: Some(EnumCode::Num(proto::output_encoding::MULAW as i64)),
                    sample_rate_hertz: Some(8000),
                    voice: Some(VoiceFrame {
                        language_code: Some("en-US".into()),
                        name: None,
                        gender: None,
                    }),
                }),
                ..Default::default()
            },
            true,
        )
        .await?;

        Ok(rpc)
    }

    fn ensure_dialogue(&mut self) -> usize {
        match self.cur_dlg {
            Some(i) => i,
            None => {
                self.start_new_dialogue();
                self.latency.dialogues.len() - 1
            }
        }
    }

    fn start_new_dialogue(&mut self) {
        self.dlg_num += 1;
        self.latency
            .dialogues
            .push(DialogueMetrics::new(self.dlg_num));
        self.cur_dlg = Some(self.latency.dialogues.len() - 1);
    }

    fn record_call_end(&mut self, ts: u64) {
        self.call_end_time.get_or_insert(ts);
        self.latency.call_end.get_or_insert(ts);
    }

    /// Tear down every stream and playback; the call is ENDED afterwards
    pub async fn close_all(&mut self) {
        if let Some(rpc) = self.call_start_rpc.take() {
            rpc.close();
        }
        if let Some(rpc) = self.audio_rpc.take() {
            rpc.close();
        }
        for rpc in self.retired.drain(..) {
            rpc.close();
        }
        self.cancel_playback();
        self.tts.close().await;
        self.record_call_end(now_ms());
        self.state = CallState::Ended;
        self.mic_buf.clear();
        self.flush_deadline = None;
    }
}
