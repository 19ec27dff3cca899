//! WebSocket wire protocol (JSON frames)
//!
//! The browser client and the bridge speak JSON frames over a WebSocket.
//! Both sides share these types: the client serializes `Frame`s, the bridge
//! deserializes them and translates into typed gRPC requests.
//!
//! Inbound (client -> bridge), one known key per frame:
//! - `{metadata:{host,token}, ...}` wrapper - required on the first frame
//! - `{streamingConfig:{config:{encoding,sampleRateHertz,languageCode},interimResults}}`
//! - `{streamingInsightConfig:{...}}`
//! - `{streamSpeechRequest:{case:"audioContent",value:<base64>}}` or `{audioContent:<base64>}`
//! - `{text:"..."}`
//! - `{inputEvent:{eventType}}`
//! - `{closeStream:true}`
//! - `{ping:1}` - heartbeat, ignored by the bridge
//!
//! Outbound (bridge -> client): a JSON-serialized
//! [`StreamingSpeechInferResponse`](crate::proto::StreamingSpeechInferResponse)
//! or an [`ErrorFrame`].

use serde::{Deserialize, Serialize};

/// Normal closure after CALL_END
pub const CLOSE_NORMAL: u16 = 1000;
/// Protocol violation: malformed JSON or missing token
pub const CLOSE_PROTOCOL_ERROR: u16 = 1008;
/// Upstream gRPC failure surfaced to the client
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Loosely-typed enum field: clients may send the protocol number or the
/// symbolic name. Mapping to numeric values happens in [`crate::bridge::enums`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumCode {
    Num(i64),
    Name(String),
}

impl Default for EnumCode {
    fn default() -> Self {
        // Protocol enums reserve 0 for UNSPECIFIED
        EnumCode::Num(0)
    }
}

/// Auth metadata wrapper carried on the first frame of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub token: String,
}

/// A single WebSocket JSON frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_config: Option<StreamingConfigFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_insight_config: Option<InsightConfigFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_speech_request: Option<CaseFrame>,
    /// Top-level base64 audio payload (legacy alternative to the cased form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_event: Option<InputEventFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_config: Option<OutputAudioFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<u32>,
}

/// Explicitly-cased request payload: `{case:"audioContent", value:<base64>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFrame {
    pub case: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfigFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RecognitionConfigFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interim_results: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfigFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EnumCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightConfigFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ccai_config_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<EnumCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<EnumCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_info: Option<ConsumerInfoFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfoFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wxcc_cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputAudioFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_encoding: Option<EnumCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEventFrame {
    pub event_type: EnumCode,
}

/// Error frame surfaced to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }

    pub fn to_json(&self) -> String {
        // Struct of two strings cannot fail to serialize
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", self.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_unknown_case_keys_still_parses() {
        let frame: Frame = serde_json::from_str(
            r#"{"metadata":{"host":"https://h","token":"t"},
                "streamingConfig":{"config":{"encoding":"LINEAR16","sampleRateHertz":16000,
                "languageCode":"en-US"},"interimResults":true}}"#,
        )
        .unwrap();
        assert_eq!(frame.metadata.unwrap().token, "t");
        let cfg = frame.streaming_config.unwrap();
        assert_eq!(cfg.interim_results, Some(true));
        assert_eq!(
            cfg.config.unwrap().encoding,
            Some(EnumCode::Name("LINEAR16".into()))
        );
    }

    #[test]
    fn enum_code_accepts_numbers_and_names() {
        let frame: Frame =
            serde_json::from_str(r#"{"inputEvent":{"eventType":2}}"#).unwrap();
        assert_eq!(frame.input_event.unwrap().event_type, EnumCode::Num(2));

        let frame: Frame =
            serde_json::from_str(r#"{"inputEvent":{"eventType":"CALL_END"}}"#).unwrap();
        assert_eq!(
            frame.input_event.unwrap().event_type,
            EnumCode::Name("CALL_END".into())
        );
    }

    #[test]
    fn input_event_frame_defaults_to_unspecified() {
        assert_eq!(InputEventFrame::default().event_type, EnumCode::Num(0));
    }

    #[test]
    fn ping_frame_is_recognized() {
        let frame: Frame = serde_json::from_str(r#"{"ping":1}"#).unwrap();
        assert_eq!(frame.ping, Some(1));
    }

    #[test]
    fn serialized_frames_omit_empty_keys() {
        let frame = Frame {
            close_stream: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&frame).unwrap(), r#"{"closeStream":true}"#);
    }
}
