//! Per-connection WebSocket <-> gRPC bridging
//!
//! Each WebSocket connection owns at most one upstream bidirectional gRPC
//! call, created lazily when the first frame carrying `metadata.token`
//! arrives. Inbound JSON frames are translated into typed requests and
//! pushed onto the request queue; a background task forwards upstream
//! responses back over the socket as JSON.
//!
//! Failure taxonomy:
//! - malformed JSON / missing token: error frame + close 1008, not retried
//! - upstream gRPC error: `{error, details}` frame with the status code
//!   embedded, then close 1011
//! - `inputEvent.eventType == CALL_END`: queue closed, socket closed 1000,
//!   idempotent against racing frames
//! - push after queue close ("late frame"): logged at info and swallowed

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::enums::{
    map_event_type, map_input_audio_encoding, map_output_audio_encoding, map_request_type,
    map_role,
};
use crate::bridge::queue::PushableQueue;
use crate::bridge::redact::{RedactingLogger, describe_frame, describe_request, describe_response};
use crate::bridge::upstream::{connect_channel, open_stream, status_to_error_frame};
use crate::call::now_ms;
use crate::proto::{
    self, ConsumerInfo, InputEvent, OutputAudioConfig, RecognitionConfig, StreamSpeechRequest,
    StreamingInsightConfig, StreamingRecognitionConfig, StreamingSpeechInferRequest,
    VoiceSelection,
};
use crate::state::AppState;
use crate::wire::{
    CLOSE_INTERNAL_ERROR, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, ErrorFrame, Frame,
};

/// Buffer size for the outbound route channel
const ROUTE_BUFFER_SIZE: usize = 256;

/// Outbound traffic for the sender task
enum BridgeRoute {
    /// A JSON payload to forward as a text frame
    Frame(String),
    /// Close the socket with the given code and reason
    Close { code: u16, reason: &'static str },
}

/// Translation failure for a single inbound frame; the connection survives
#[derive(Debug)]
pub struct InvalidAudio(pub String);

/// WebSocket upgrade handler for `GET /ws`
pub async fn ws_bridge_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Translate one inbound frame into the outbound request envelope.
///
/// Pure: decides the active union case by presence of exactly one known
/// key (cased audio first, mirroring the client's priority), maps
/// loosely-typed enum fields to protocol numbers, decodes base64 audio,
/// and normalizes the output audio config.
pub fn translate_frame(frame: &Frame) -> Result<StreamingSpeechInferRequest, InvalidAudio> {
    let mut request = StreamingSpeechInferRequest {
        message_id: frame
            .message_id
            .clone()
            .unwrap_or_else(|| format!("msg-{}", now_ms())),
        input_event: frame.input_event.as_ref().map(|e| InputEvent {
            event_type: map_event_type(&e.event_type),
        }),
        output_audio_config: frame.output_audio_config.as_ref().map(|out| {
            OutputAudioConfig {
                audio_encoding: out
                    .audio_encoding
                    .as_ref()
                    .map(map_output_audio_encoding)
                    .unwrap_or(proto::output_encoding::MULAW),
                sample_rate_hertz: 8000,
                voice: Some(VoiceSelection {
                    language_code: out
                        .voice
                        .as_ref()
                        .and_then(|v| v.language_code.clone())
                        .unwrap_or_else(|| "en-US".into()),
                    name: out
                        .voice
                        .as_ref()
                        .and_then(|v| v.name.clone())
                        .unwrap_or_default(),
                    gender: out
                        .voice
                        .as_ref()
                        .and_then(|v| v.gender.clone())
                        .unwrap_or_default(),
                }),
            }
        }),
        stream_speech_request: None,
    };

    if let Some(cased) = frame.stream_speech_request.as_ref()
        && cased.case == "audioContent"
        && !cased.value.is_null()
    {
        let encoded = cased
            .value
            .as_str()
            .ok_or_else(|| InvalidAudio("audioContent value is not a string".into()))?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| InvalidAudio(e.to_string()))?;
        request.stream_speech_request = Some(StreamSpeechRequest::AudioContent(bytes));
    } else if let Some(cfg) = frame.streaming_config.as_ref() {
        request.stream_speech_request =
            Some(StreamSpeechRequest::StreamingConfig(StreamingRecognitionConfig {
                config: cfg.config.as_ref().map(|c| RecognitionConfig {
                    encoding: c
                        .encoding
                        .as_ref()
                        .map(map_input_audio_encoding)
                        .unwrap_or(proto::audio_encoding::LINEAR16),
                    sample_rate_hertz: c.sample_rate_hertz.unwrap_or(16_000),
                    language_code: c.language_code.clone().unwrap_or_default(),
                }),
                interim_results: cfg.interim_results.unwrap_or(false),
            }));
    } else if let Some(cfg) = frame.streaming_insight_config.as_ref() {
        request.stream_speech_request = Some(StreamSpeechRequest::StreamingInsightConfig(
            StreamingInsightConfig {
                client_id: cfg.client_id.clone().unwrap_or_default(),
                org_id: cfg.org_id.clone().unwrap_or_default(),
                conversation_id: cfg.conversation_id.clone().unwrap_or_default(),
                ccai_config_id: cfg.ccai_config_id.clone().unwrap_or_default(),
                virtual_agent_id: cfg.virtual_agent_id.clone().unwrap_or_default(),
                role: cfg.role.as_ref().map(map_role).unwrap_or(0),
                request_type: cfg.request_type.as_ref().map(map_request_type).unwrap_or(0),
                consumer_info: cfg.consumer_info.as_ref().map(|ci| ConsumerInfo {
                    wxcc_cluster_id: ci.wxcc_cluster_id.clone().unwrap_or_default(),
                    user_agent: ci.user_agent.clone().unwrap_or_default(),
                }),
            },
        ));
    } else if let Some(close) = frame.close_stream {
        request.stream_speech_request = Some(StreamSpeechRequest::CloseStream(close));
    } else if let Some(text) = frame.text.as_ref() {
        request.stream_speech_request = Some(StreamSpeechRequest::Text(text.clone()));
    } else if let Some(encoded) = frame.audio_content.as_ref() {
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| InvalidAudio(e.to_string()))?;
        request.stream_speech_request = Some(StreamSpeechRequest::AudioContent(bytes));
    }

    Ok(request)
}

struct BridgeConn {
    log: Arc<RedactingLogger>,
    routes: mpsc::Sender<BridgeRoute>,
    default_host: String,
    requests: Option<PushableQueue<StreamingSpeechInferRequest>>,
    forward_task: Option<tokio::task::JoinHandle<()>>,
    audio_frames_seen: u64,
    closed: bool,
}

impl BridgeConn {
    async fn send_error(&self, frame: ErrorFrame) {
        let _ = self.routes.send(BridgeRoute::Frame(frame.to_json())).await;
    }

    async fn close_socket(&mut self, code: u16, reason: &'static str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.routes.send(BridgeRoute::Close { code, reason }).await;
    }

    /// Lazily establish the upstream call and start the response forward loop
    async fn init_upstream(&mut self, token: &str, host: &str) -> bool {
        let target = if host.is_empty() {
            self.default_host.clone()
        } else {
            host.to_string()
        };
        self.log.info(format!("init gRPC (host={target})"));

        let requests = PushableQueue::new();
        let stream = match connect_channel(&target).await {
            Ok(channel) => open_stream(channel, token, requests.clone()).await,
            Err(e) => Err(e),
        };
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                self.log.error(format!("upstream init failed: {e}"));
                self.send_error(ErrorFrame::with_details("Upstream unavailable", e.to_string()))
                    .await;
                self.close_socket(CLOSE_INTERNAL_ERROR, "gRPC error").await;
                return false;
            }
        };

        let routes = self.routes.clone();
        let log = Arc::clone(&self.log);
        self.forward_task = Some(tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(rsp)) => {
                        log.info(format!("<= gRPC response {}", describe_response(&rsp)));
                        let json = match serde_json::to_string(&rsp) {
                            Ok(json) => json,
                            Err(e) => {
                                log.error(format!("response serialization failed: {e}"));
                                continue;
                            }
                        };
                        if routes.send(BridgeRoute::Frame(json)).await.is_err() {
                            log.warn("WS closed - stop gRPC loop");
                            break;
                        }
                    }
                    Ok(None) => {
                        log.info("gRPC stream ended - WS remains open");
                        break;
                    }
                    Err(status) => {
                        log.error(format!(
                            "gRPC stream error -> ({:?}) {}",
                            status.code(),
                            status.message()
                        ));
                        let frame = status_to_error_frame(&status);
                        let _ = routes.send(BridgeRoute::Frame(frame.to_json())).await;
                        let _ = routes
                            .send(BridgeRoute::Close {
                                code: CLOSE_INTERNAL_ERROR,
                                reason: "gRPC error",
                            })
                            .await;
                        break;
                    }
                }
            }
        }));

        self.requests = Some(requests);
        true
    }

    /// Process one text frame. Returns false when the connection should end.
    async fn handle_frame(&mut self, raw: &str) -> bool {
        if self.closed {
            return false;
        }

        let frame: Frame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                self.send_error(ErrorFrame::new("Invalid JSON")).await;
                self.close_socket(CLOSE_PROTOCOL_ERROR, "Bad JSON").await;
                return false;
            }
        };

        if let Some(cfg) = frame.streaming_insight_config.as_ref() {
            self.log.set_ids(
                cfg.org_id.as_deref().unwrap_or(""),
                cfg.conversation_id.as_deref().unwrap_or(""),
            );
        }

        if self.requests.is_none() {
            let Some(metadata) = frame.metadata.as_ref() else {
                self.send_error(ErrorFrame::new("No token provided")).await;
                self.close_socket(CLOSE_PROTOCOL_ERROR, "No token").await;
                return false;
            };
            if metadata.token.is_empty() {
                self.send_error(ErrorFrame::new("No token provided")).await;
                self.close_socket(CLOSE_PROTOCOL_ERROR, "No token").await;
                return false;
            }
            let host = metadata.host.clone().unwrap_or_default();
            if !self.init_upstream(&metadata.token, &host).await {
                return false;
            }
        }

        if frame.ping.is_some() {
            return true;
        }

        let is_audio = frame.audio_content.is_some()
            || frame
                .stream_speech_request
                .as_ref()
                .is_some_and(|c| c.case == "audioContent");
        if is_audio {
            // Only the first audio frame is worth a log line
            if self.audio_frames_seen == 0 {
                self.log.info(format!("<= WS frame {}", describe_frame(&frame)));
            }
            self.audio_frames_seen += 1;
        } else {
            self.log.info(format!("<= WS frame {}", describe_frame(&frame)));
        }

        let request = match translate_frame(&frame) {
            Ok(request) => request,
            Err(InvalidAudio(details)) => {
                self.send_error(ErrorFrame::with_details("Invalid audioContent", details))
                    .await;
                return true;
            }
        };

        if !is_audio || self.audio_frames_seen == 1 {
            self.log
                .info(format!("=> gRPC request {}", describe_request(&request)));
        }

        let event_type = request.input_event.as_ref().map(|e| e.event_type);

        if let Some(requests) = self.requests.as_ref()
            && let Err(e) = requests.push(request)
        {
            // Calls may legitimately race a CALL_END against in-flight audio
            self.log.info(format!("late frame ignored - {e}"));
        }

        if event_type == Some(proto::event_type::CALL_END) {
            self.log.info("CALL_END - closing streams");
            if let Some(requests) = self.requests.as_ref() {
                requests.close();
            }
            self.close_socket(CLOSE_NORMAL, "CALL_END").await;
            return false;
        }

        true
    }

    fn shutdown(&mut self) {
        if let Some(requests) = self.requests.take() {
            requests.close();
        }
        // The forward task ends on its own once the response stream or the
        // route channel goes away.
        self.forward_task.take();
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let log = Arc::new(RedactingLogger::new());
    log.info("WS client connected");

    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<BridgeRoute>(ROUTE_BUFFER_SIZE);

    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            match route {
                BridgeRoute::Frame(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                BridgeRoute::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let mut conn = BridgeConn {
        log: Arc::clone(&log),
        routes: route_tx,
        default_host: state.config.upstream_endpoint.clone(),
        requests: None,
        forward_task: None,
        audio_frames_seen: 0,
        closed: false,
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !conn.handle_frame(text.as_str()).await {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "WS closed by client");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                debug!("binary frame ignored");
            }
            Err(e) => {
                warn!(error = %e, "WS receive error");
                break;
            }
        }
    }

    conn.shutdown();
    sender_task.abort();
    log.info("WS connection finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{
        CaseFrame, EnumCode, InputEventFrame, InsightConfigFrame, OutputAudioFrame,
        RecognitionConfigFrame, StreamingConfigFrame,
    };

    #[test]
    fn base64_audio_decodes_to_raw_bytes() {
        let payload = BASE64.encode([1u8, 2, 3, 4, 5]);
        let frame = Frame {
            stream_speech_request: Some(CaseFrame {
                case: "audioContent".into(),
                value: payload.into(),
            }),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        match request.stream_speech_request {
            Some(StreamSpeechRequest::AudioContent(bytes)) => {
                assert_eq!(bytes, vec![1, 2, 3, 4, 5]);
            }
            other => panic!("expected audioContent, got {other:?}"),
        }
    }

    #[test]
    fn top_level_audio_content_is_accepted() {
        let frame = Frame {
            audio_content: Some(BASE64.encode([9u8, 9])),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        assert!(matches!(
            request.stream_speech_request,
            Some(StreamSpeechRequest::AudioContent(ref b)) if b == &vec![9, 9]
        ));
    }

    #[test]
    fn invalid_base64_is_rejected_without_request() {
        let frame = Frame {
            audio_content: Some("!!! not base64 !!!".into()),
            ..Default::default()
        };
        assert!(translate_frame(&frame).is_err());
    }

    #[test]
    fn streaming_config_maps_encoding_and_interim() {
        let frame = Frame {
            streaming_config: Some(StreamingConfigFrame {
                config: Some(RecognitionConfigFrame {
                    encoding: Some(EnumCode::Name("MULAW".into())),
                    sample_rate_hertz: Some(8000),
                    language_code: Some("en-US".into()),
                }),
                interim_results: Some(true),
            }),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        match request.stream_speech_request {
            Some(StreamSpeechRequest::StreamingConfig(cfg)) => {
                assert!(cfg.interim_results);
                let rec = cfg.config.unwrap();
                assert_eq!(rec.encoding, proto::audio_encoding::MULAW);
                assert_eq!(rec.sample_rate_hertz, 8000);
                assert_eq!(rec.language_code, "en-US");
            }
            other => panic!("expected streamingConfig, got {other:?}"),
        }
    }

    #[test]
    fn insight_config_maps_role_and_request_type() {
        let frame = Frame {
            streaming_insight_config: Some(InsightConfigFrame {
                org_id: Some("org".into()),
                conversation_id: Some("conv".into()),
                role: Some(EnumCode::Name("CALLER".into())),
                request_type: Some(EnumCode::Name("VIRTUAL_AGENT".into())),
                ..Default::default()
            }),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        match request.stream_speech_request {
            Some(StreamSpeechRequest::StreamingInsightConfig(cfg)) => {
                assert_eq!(cfg.role, 1);
                assert_eq!(cfg.request_type, 1);
                assert_eq!(cfg.org_id, "org");
            }
            other => panic!("expected streamingInsightConfig, got {other:?}"),
        }
    }

    #[test]
    fn output_audio_config_is_normalized() {
        let frame = Frame {
            close_stream: Some(true),
            output_audio_config: Some(OutputAudioFrame {
                audio_encoding: None,
                sample_rate_hertz: Some(44_100),
                voice: None,
            }),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        let out = request.output_audio_config.unwrap();
        assert_eq!(out.audio_encoding, proto::output_encoding::MULAW);
        assert_eq!(out.sample_rate_hertz, 8000);
        assert_eq!(out.voice.unwrap().language_code, "en-US");
        assert!(matches!(
            request.stream_speech_request,
            Some(StreamSpeechRequest::CloseStream(true))
        ));
    }

    #[test]
    fn input_event_is_mapped_to_protocol_number() {
        let frame = Frame {
            input_event: Some(InputEventFrame {
                event_type: EnumCode::Name("CALL_END".into()),
            }),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        assert_eq!(
            request.input_event.unwrap().event_type,
            proto::event_type::CALL_END
        );
    }

    #[test]
    fn message_id_defaults_when_absent() {
        let frame = Frame {
            text: Some("hello".into()),
            ..Default::default()
        };
        let request = translate_frame(&frame).unwrap();
        assert!(request.message_id.starts_with("msg-"));

        let frame = Frame {
            message_id: Some("explicit".into()),
            text: Some("hello".into()),
            ..Default::default()
        };
        assert_eq!(translate_frame(&frame).unwrap().message_id, "explicit");
    }
}
