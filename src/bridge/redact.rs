//! Redaction-aware logging
//!
//! Audio payloads and bearer tokens never reach the logs in full: audio is
//! collapsed to its decoded byte length, tokens to a length-only
//! placeholder. Redaction operates on the typed frame/request/response
//! shapes rather than walking arbitrary JSON, so a payload field added to
//! the protocol later is invisible to the logs until it is redacted here
//! explicitly.

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::proto::{StreamSpeechRequest, StreamingSpeechInferRequest, StreamingSpeechInferResponse};
use crate::wire::Frame;

/// Length-only placeholder for a bearer token
pub fn redact_token(token: &str) -> String {
    format!("<redacted:{}chars>", token.len())
}

/// Decoded byte length of a base64 payload without allocating the output
pub fn base64_decoded_len(encoded: &str) -> usize {
    let trimmed = encoded.trim_end_matches('=');
    trimmed.len() * 3 / 4
}

/// Render an inbound WebSocket frame with token and audio fields collapsed
pub fn describe_frame(frame: &Frame) -> String {
    let mut clone = frame.clone();
    if let Some(metadata) = clone.metadata.as_mut() {
        metadata.token = redact_token(&metadata.token);
    }
    if let Some(audio) = clone.audio_content.as_mut() {
        *audio = format!("[bytes={}]", base64_decoded_len(audio));
    }
    if let Some(cased) = clone.stream_speech_request.as_mut()
        && cased.case == "audioContent"
        && let Some(value) = cased.value.as_str()
    {
        cased.value = format!("[bytes={}]", base64_decoded_len(value)).into();
    }
    serde_json::to_string(&clone).unwrap_or_else(|_| "<unserializable frame>".into())
}

/// Render an outbound gRPC request with any audio payload collapsed
pub fn describe_request(req: &StreamingSpeechInferRequest) -> String {
    let payload = match &req.stream_speech_request {
        Some(StreamSpeechRequest::AudioContent(bytes)) => {
            format!("audioContent[bytes={}]", bytes.len())
        }
        Some(StreamSpeechRequest::StreamingConfig(cfg)) => format!("streamingConfig({cfg:?})"),
        Some(StreamSpeechRequest::StreamingInsightConfig(cfg)) => {
            format!(
                "streamingInsightConfig(org={}, conversation={})",
                cfg.org_id, cfg.conversation_id
            )
        }
        Some(StreamSpeechRequest::Text(text)) => format!("text({text})"),
        Some(StreamSpeechRequest::CloseStream(v)) => format!("closeStream({v})"),
        None => "<empty>".into(),
    };
    format!(
        "messageId={} event={:?} {payload}",
        req.message_id,
        req.input_event.as_ref().map(|e| e.event_type)
    )
}

/// Render an inbound gRPC response with prompt audio collapsed
pub fn describe_response(rsp: &StreamingSpeechInferResponse) -> String {
    let mut value = match serde_json::to_value(rsp) {
        Ok(v) => v,
        Err(_) => return "<unserializable response>".into(),
    };
    // Prompt audio is the only payload field in the response shape; its
    // length comes from the typed message, the placeholder replaces the
    // serialized base64 at a fixed path.
    if let Some(insight) = rsp.infer_insight_response.as_ref()
        && let Some(va) = insight.virtual_agent_result.as_ref()
        && let Some(prompts) = value
            .pointer_mut("/inferInsightResponse/virtualAgentResult/prompts")
            .and_then(|p| p.as_array_mut())
    {
        for (prompt, typed) in prompts.iter_mut().zip(va.prompts.iter()) {
            if let Some(obj) = prompt.as_object_mut() {
                obj.insert(
                    "audioContent".into(),
                    format!("[bytes={}]", typed.audio_content.len()).into(),
                );
            }
        }
    }
    value.to_string()
}

struct LoggerInner {
    org_id: String,
    conversation_id: String,
    lines: Vec<String>,
}

/// Per-connection logger that tags every line with org/conversation ids,
/// mirrors to `tracing`, and keeps an in-memory transcript safe for export.
///
/// Callers are expected to pass already-redacted text (use the `describe_*`
/// helpers above for message payloads).
pub struct RedactingLogger {
    inner: Mutex<LoggerInner>,
}

impl Default for RedactingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactingLogger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LoggerInner {
                org_id: "unknown".into(),
                conversation_id: "unknown".into(),
                lines: Vec::new(),
            }),
        }
    }

    /// Tag subsequent lines once org/conversation ids are known
    pub fn set_ids(&self, org_id: &str, conversation_id: &str) {
        let mut inner = self.inner.lock();
        if !org_id.is_empty() {
            inner.org_id = org_id.to_string();
        }
        if !conversation_id.is_empty() {
            inner.conversation_id = conversation_id.to_string();
        }
    }

    fn push(&self, level: &str, message: &str) {
        let mut inner = self.inner.lock();
        let line = format!(
            "[orgId={}] [conversationId={}] {level}: {message}",
            inner.org_id, inner.conversation_id
        );
        inner.lines.push(line);
        match level {
            "WARN" => warn!(org_id = %inner.org_id, conversation_id = %inner.conversation_id, "{message}"),
            "ERR" => error!(org_id = %inner.org_id, conversation_id = %inner.conversation_id, "{message}"),
            _ => info!(org_id = %inner.org_id, conversation_id = %inner.conversation_id, "{message}"),
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.push("INFO", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.push("WARN", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.push("ERR", message.as_ref());
    }

    /// The joined, redacted log transcript
    pub fn transcript(&self) -> String {
        self.inner.lock().lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{
        InferInsightResponse, Prompt, VirtualAgentResult,
    };
    use crate::wire::{CaseFrame, Metadata};

    #[test]
    fn token_is_collapsed_to_length() {
        assert_eq!(redact_token("secret-token"), "<redacted:12chars>");
    }

    #[test]
    fn base64_length_accounts_for_padding() {
        // "AQID" decodes to 3 bytes, "AQIDBA==" to 4
        assert_eq!(base64_decoded_len("AQID"), 3);
        assert_eq!(base64_decoded_len("AQIDBA=="), 4);
    }

    #[test]
    fn frame_description_never_contains_the_token() {
        let frame = Frame {
            metadata: Some(Metadata {
                host: None,
                token: "super-secret".into(),
            }),
            stream_speech_request: Some(CaseFrame {
                case: "audioContent".into(),
                value: "AQIDBA==".into(),
            }),
            ..Default::default()
        };
        let described = describe_frame(&frame);
        assert!(!described.contains("super-secret"));
        assert!(described.contains("<redacted:12chars>"));
        assert!(described.contains("[bytes=4]"));
    }

    #[test]
    fn request_description_collapses_audio() {
        let req = StreamingSpeechInferRequest {
            message_id: "m1".into(),
            input_event: None,
            output_audio_config: None,
            stream_speech_request: Some(StreamSpeechRequest::AudioContent(vec![0u8; 320])),
        };
        let described = describe_request(&req);
        assert!(described.contains("messageId=m1"));
        assert!(described.contains("audioContent[bytes=320]"));
    }

    #[test]
    fn response_description_collapses_prompt_audio() {
        let rsp = StreamingSpeechInferResponse {
            message_id: "m".into(),
            status: 0,
            infer_insight_response: Some(InferInsightResponse {
                recognition_result: None,
                virtual_agent_result: Some(VirtualAgentResult {
                    prompts: vec![Prompt {
                        text: "Hi".into(),
                        audio_content: vec![0u8; 1024],
                        bargein: false,
                        is_final: true,
                    }],
                    response_type: 0,
                }),
            }),
        };
        let described = describe_response(&rsp);
        assert!(described.contains("[bytes=1024]"));
        assert!(described.contains("Hi"));
        assert!(!described.contains("AAAA"));
    }

    #[test]
    fn logger_transcript_is_tagged() {
        let log = RedactingLogger::new();
        log.set_ids("org-1", "conv-9");
        log.info("WS client connected");
        let transcript = log.transcript();
        assert!(transcript.contains("[orgId=org-1]"));
        assert!(transcript.contains("[conversationId=conv-9]"));
        assert!(transcript.contains("INFO: WS client connected"));
    }

    #[test]
    fn logger_records_every_level() {
        let log = RedactingLogger::new();
        log.info("a");
        log.warn("b");
        log.error("c");
        let transcript = log.transcript();
        assert!(transcript.contains("INFO: a"));
        assert!(transcript.contains("WARN: b"));
        assert!(transcript.contains("ERR: c"));
    }
}
