//! Client-side call transport
//!
//! A [`StreamingCall`] is one logical request/response stream to the bridge.
//! [`WsCallTransport`] implements it over a WebSocket opened lazily on the
//! first send (bounded by [`WS_OPEN_TIMEOUT`]): a writer task owns the sink
//! and drains an outbound channel, a reader task parses each text frame
//! into a [`ServerMessage`], and a heartbeat task sends `{"ping":1}` every
//! 30 seconds while the socket lives.
//!
//! Auth metadata (`{host, token}`) is injected into every outgoing frame
//! until the first explicitly-wrapped frame has gone out, and always when a
//! send requests it. A call started with an empty token never touches the
//! network: the caller gets a rejecting stub after a single error message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use crate::call::ServerMessage;
use crate::config::CallConfig;
use crate::errors::TransportError;
use crate::proto::StreamingSpeechInferResponse;
use crate::wire::{Frame, InputEventFrame, Metadata};

/// Bound on waiting for the WebSocket to open
pub const WS_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Heartbeat interval while the socket is open
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How the stream is terminated by [`StreamingCall::close_stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Send `{closeStream: true}`; the upstream call completes normally
    Complete,
    /// Send `{inputEvent: {eventType: CALL_END}}`; the bridge tears the
    /// whole connection down
    CallEnd,
}

/// One active request/response stream to the bridge
#[async_trait]
pub trait StreamingCall: Send + Sync {
    /// Send one frame. Metadata is attached when `include_meta` is set or
    /// no wrapped frame has been sent yet.
    async fn send(&self, frame: Frame, include_meta: bool) -> Result<(), TransportError>;

    /// Send the end-of-stream command for the configured [`CloseMode`].
    /// No-op once the call is closed.
    async fn close_stream(&self) -> Result<(), TransportError>;

    /// Drop the underlying socket immediately. Idempotent.
    fn close(&self);
}

/// Factory seam for opening calls; tests substitute a fake
#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn start_call(
        &self,
        cfg: &CallConfig,
        close_mode: CloseMode,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Box<dyn StreamingCall>, TransportError>;
}

/// WebSocket transport to the bridge
#[derive(Debug, Default)]
pub struct WsCallTransport;

#[async_trait]
impl CallTransport for WsCallTransport {
    async fn start_call(
        &self,
        cfg: &CallConfig,
        close_mode: CloseMode,
        events: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Box<dyn StreamingCall>, TransportError> {
        let cfg = match cfg.clone().validated() {
            Ok(cfg) => cfg,
            Err(_) => {
                let _ = events.send(ServerMessage::error("No token provided"));
                return Ok(Box::new(StubCall));
            }
        };

        Ok(Box::new(WsStreamingCall {
            ws_url: cfg.ws_url.clone(),
            events,
            metadata: Metadata {
                host: (!cfg.host.is_empty()).then(|| cfg.host.clone()),
                token: cfg.token,
            },
            close_mode,
            sent_first: AtomicBool::new(false),
            closed: Arc::new(AtomicBool::new(false)),
            conn: Mutex::new(None),
            connect_gate: tokio::sync::Mutex::new(()),
        }))
    }
}

/// Live call over a WebSocket. The socket is opened on the first send and
/// torn down by [`StreamingCall::close`].
pub struct WsStreamingCall {
    ws_url: String,
    events: mpsc::UnboundedSender<ServerMessage>,
    metadata: Metadata,
    close_mode: CloseMode,
    sent_first: AtomicBool,
    closed: Arc<AtomicBool>,
    /// Outbound channel to the writer task, `None` until connected
    conn: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    /// Serializes connection establishment
    connect_gate: tokio::sync::Mutex<()>,
}

impl WsStreamingCall {
    /// Outbound sender, connecting first if the socket is not open yet
    async fn out_tx(&self) -> Result<mpsc::UnboundedSender<WsMessage>, TransportError> {
        if let Some(tx) = self.conn.lock().clone() {
            return Ok(tx);
        }
        let _gate = self.connect_gate.lock().await;
        if let Some(tx) = self.conn.lock().clone() {
            return Ok(tx);
        }
        let tx = self.open_socket().await?;
        *self.conn.lock() = Some(tx.clone());
        Ok(tx)
    }

    /// Open the WebSocket and spawn the writer, reader, and heartbeat tasks
    async fn open_socket(&self) -> Result<mpsc::UnboundedSender<WsMessage>, TransportError> {
        let connect = connect_async(self.ws_url.as_str());
        let (socket, _response) = tokio::time::timeout(WS_OPEN_TIMEOUT, connect)
            .await
            .map_err(|_| TransportError::OpenTimeout)?
            .map_err(|e| TransportError::Socket(e.to_string()))?;

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

        // Writer task: owns the sink, drains the outbound channel
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let is_close = matches!(msg, WsMessage::Close(_));
                if sink.send(msg).await.is_err() {
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        // Reader task: JSON -> ServerMessage
        {
            let events = self.events.clone();
            let closed = Arc::clone(&self.closed);
            tokio::spawn(async move {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(WsMessage::Text(text)) => {
                            let _ = events.send(parse_server_message(text.as_str()));
                        }
                        Ok(WsMessage::Close(frame)) => {
                            if !closed.swap(true, Ordering::SeqCst) {
                                let details = frame
                                    .map(|f| {
                                        if f.reason.is_empty() {
                                            format!("code {}", u16::from(f.code))
                                        } else {
                                            f.reason.to_string()
                                        }
                                    })
                                    .unwrap_or_else(|| "no close frame".to_string());
                                let _ = events.send(ServerMessage::error_with_details(
                                    "WebSocket closed",
                                    details,
                                ));
                            }
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if !closed.swap(true, Ordering::SeqCst) {
                                let _ = events.send(ServerMessage::error_with_details(
                                    "WebSocket error",
                                    e.to_string(),
                                ));
                            }
                            break;
                        }
                    }
                }
                debug!("WS reader finished");
            });
        }

        // Heartbeat keeps intermediaries from idling the socket out
        {
            let out_tx = out_tx.clone();
            let closed = Arc::clone(&self.closed);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    if out_tx.send(WsMessage::Text(r#"{"ping":1}"#.into())).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(out_tx)
    }

    fn send_json(
        tx: &mpsc::UnboundedSender<WsMessage>,
        frame: &Frame,
    ) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(frame).map_err(|e| TransportError::Serialization(e.to_string()))?;
        tx.send(WsMessage::Text(json.into()))
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl StreamingCall for WsStreamingCall {
    async fn send(&self, mut frame: Frame, include_meta: bool) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let tx = self.out_tx().await?;
        if include_meta || !self.sent_first.load(Ordering::SeqCst) {
            frame.metadata = Some(self.metadata.clone());
        }
        if include_meta {
            self.sent_first.store(true, Ordering::SeqCst);
        }
        Self::send_json(&tx, &frame)
    }

    async fn close_stream(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        // Nothing to terminate on a call that never connected
        let Some(tx) = self.conn.lock().clone() else {
            return Ok(());
        };
        let mut frame = match self.close_mode {
            CloseMode::Complete => Frame {
                close_stream: Some(true),
                ..Default::default()
            },
            CloseMode::CallEnd => Frame {
                input_event: Some(InputEventFrame {
                    event_type: crate::wire::EnumCode::Num(
                        crate::proto::event_type::CALL_END as i64,
                    ),
                }),
                ..Default::default()
            },
        };
        frame.metadata = Some(self.metadata.clone());
        Self::send_json(&tx, &frame)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.conn.lock().clone() {
            let _ = tx.send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "Manual close".into(),
            })));
        }
    }
}

/// Rejecting stand-in handed out when a call cannot be opened (no token).
/// `send` always fails; closing is a no-op.
pub struct StubCall;

#[async_trait]
impl StreamingCall for StubCall {
    async fn send(&self, _frame: Frame, _include_meta: bool) -> Result<(), TransportError> {
        Err(TransportError::MissingToken)
    }

    async fn close_stream(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {}
}

/// Parse one inbound text frame. Frames with an `error` key become
/// [`ServerMessage::Error`], everything else must parse as a response.
pub fn parse_server_message(text: &str) -> ServerMessage {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable server frame");
            return ServerMessage::error_with_details("Bad server JSON", e.to_string());
        }
    };
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        let details = value
            .get("details")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return ServerMessage::Error {
            error: error.to_string(),
            details,
        };
    }
    match serde_json::from_value::<StreamingSpeechInferResponse>(value) {
        Ok(rsp) => ServerMessage::Response(rsp),
        Err(e) => ServerMessage::error_with_details("Bad server JSON", e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frames_become_error_messages() {
        let msg = parse_server_message(r#"{"error":"Upstream unavailable","details":"d"}"#);
        match msg {
            ServerMessage::Error { error, details } => {
                assert_eq!(error, "Upstream unavailable");
                assert_eq!(details.as_deref(), Some("d"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn response_frames_parse_into_typed_responses() {
        let msg = parse_server_message(
            r#"{"messageId":"m1","status":0,
                "inferInsightResponse":{"virtualAgentResult":{"prompts":[]}}}"#,
        );
        match msg {
            ServerMessage::Response(rsp) => {
                assert_eq!(rsp.message_id, "m1");
                assert!(rsp.infer_insight_response.is_some());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn garbage_becomes_bad_server_json() {
        assert!(parse_server_message("not json").is_error());
    }

    #[tokio::test]
    async fn stub_call_rejects_sends() {
        let stub = StubCall;
        assert!(matches!(
            stub.send(Frame::default(), true).await,
            Err(TransportError::MissingToken)
        ));
        assert!(stub.close_stream().await.is_ok());
        stub.close();
    }

    #[tokio::test]
    async fn empty_token_yields_stub_and_error_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cfg = CallConfig {
            ws_url: "ws://localhost:1/ws".into(),
            host: String::new(),
            token: "   ".into(),
            language: "en-US".into(),
            org_id: "o".into(),
            conversation_id: "c".into(),
            virtual_agent_id: "v".into(),
            wxcc_cluster_id: "w".into(),
            user_agent: "ua".into(),
        };
        let call = WsCallTransport
            .start_call(&cfg, CloseMode::Complete, tx)
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::Error { error, .. } => assert_eq!(error, "No token provided"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(call.send(Frame::default(), true).await.is_err());
    }

    #[tokio::test]
    async fn connect_is_deferred_until_first_send() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let cfg = CallConfig {
            ws_url: "ws://127.0.0.1:9/ws".into(),
            host: String::new(),
            token: "tok".into(),
            language: "en-US".into(),
            org_id: "o".into(),
            conversation_id: "c".into(),
            virtual_agent_id: "v".into(),
            wxcc_cluster_id: "w".into(),
            user_agent: "ua".into(),
        };
        // Opening the call never touches the network, so an unreachable
        // bridge is not noticed here
        let call = WsCallTransport
            .start_call(&cfg, CloseMode::Complete, tx)
            .await
            .unwrap();
        // The first send connects and surfaces the failure
        let err = call.send(Frame::default(), true).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Socket(_) | TransportError::OpenTimeout
        ));
        // Terminating a never-connected call is a quiet no-op
        assert!(call.close_stream().await.is_ok());
        call.close();
    }
}
