//! Speech-insight orchestrator gRPC message types
//!
//! Hand-maintained prost types for the bidirectional streaming RPC:
//!
//! ```protobuf
//! service SpeechInsightOrchestrator {
//!     rpc InferStreamingSpeechInsights(stream StreamingSpeechInferRequest)
//!         returns (stream StreamingSpeechInferResponse);
//! }
//! ```
//!
//! Response types additionally derive serde with protobuf-JSON field names
//! (camelCase, bytes as base64) because the bridge forwards them to the
//! WebSocket client as JSON and the client parses them back into the same
//! types.

use serde::{Deserialize, Serialize};

/// Full method path for the bidirectional streaming RPC
pub const INFER_STREAMING_PATH: &str =
    "/com.cisco.wcc.ccai.v1.SpeechInsightOrchestrator/InferStreamingSpeechInsights";

/// Recognition input audio encodings (subset the bridge accepts)
pub mod audio_encoding {
    pub const UNSPECIFIED: i32 = 0;
    pub const LINEAR16: i32 = 1;
    pub const MULAW: i32 = 3;
}

/// Synthesized output audio encodings
pub mod output_encoding {
    pub const LINEAR16: i32 = 1;
    pub const MULAW: i32 = 2;
    pub const ALAW: i32 = 3;
    pub const MP3: i32 = 4;
    pub const OGG_OPUS: i32 = 5;
}

/// Input event types carried alongside a request frame
pub mod event_type {
    pub const UNSPECIFIED: i32 = 0;
    pub const CALL_START: i32 = 1;
    pub const CALL_END: i32 = 2;
    pub const CUSTOM: i32 = 3;
    pub const NO_INPUT: i32 = 4;
    pub const START_OF_DTMF: i32 = 5;
    pub const STOP_STREAMING_RESPONSE: i32 = 6;
}

/// Recognition response events
pub mod response_event {
    pub const EVENT_UNSPECIFIED: i32 = 0;
    pub const EVENT_START_OF_INPUT: i32 = 1;
    pub const EVENT_END_OF_INPUT: i32 = 2;
    pub const EVENT_NO_MATCH: i32 = 3;
    pub const EVENT_NO_INPUT: i32 = 4;
}

/// Virtual-agent response types
pub mod va_response_type {
    pub const RESPONSE_UNSPECIFIED: i32 = 0;
    /// Marks a partial (chunked) response; a prompt with `final` set ends it
    pub const RESPONSE_CHUNK: i32 = 1;
}

/// Request envelope for the streaming RPC.
///
/// Exactly one oneof case is populated per frame, alongside the optional
/// `input_event` and `output_audio_config`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingSpeechInferRequest {
    #[prost(string, tag = "1")]
    pub message_id: String,
    #[prost(message, optional, tag = "2")]
    pub input_event: Option<InputEvent>,
    #[prost(message, optional, tag = "3")]
    pub output_audio_config: Option<OutputAudioConfig>,
    #[prost(oneof = "StreamSpeechRequest", tags = "4, 5, 6, 7, 8")]
    pub stream_speech_request: Option<StreamSpeechRequest>,
}

/// The discriminated request payload
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum StreamSpeechRequest {
    #[prost(message, tag = "4")]
    StreamingConfig(StreamingRecognitionConfig),
    #[prost(message, tag = "5")]
    StreamingInsightConfig(StreamingInsightConfig),
    #[prost(bytes, tag = "6")]
    AudioContent(Vec<u8>),
    #[prost(string, tag = "7")]
    Text(String),
    #[prost(bool, tag = "8")]
    CloseStream(bool),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputEvent {
    #[prost(int32, tag = "1")]
    pub event_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingRecognitionConfig {
    #[prost(message, optional, tag = "1")]
    pub config: Option<RecognitionConfig>,
    #[prost(bool, tag = "2")]
    pub interim_results: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecognitionConfig {
    #[prost(int32, tag = "1")]
    pub encoding: i32,
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,
    #[prost(string, tag = "3")]
    pub language_code: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingInsightConfig {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(string, tag = "3")]
    pub conversation_id: String,
    #[prost(string, tag = "4")]
    pub ccai_config_id: String,
    #[prost(string, tag = "5")]
    pub virtual_agent_id: String,
    #[prost(int32, tag = "6")]
    pub role: i32,
    #[prost(int32, tag = "7")]
    pub request_type: i32,
    #[prost(message, optional, tag = "8")]
    pub consumer_info: Option<ConsumerInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumerInfo {
    #[prost(string, tag = "1")]
    pub wxcc_cluster_id: String,
    #[prost(string, tag = "2")]
    pub user_agent: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputAudioConfig {
    #[prost(int32, tag = "1")]
    pub audio_encoding: i32,
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,
    #[prost(message, optional, tag = "3")]
    pub voice: Option<VoiceSelection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoiceSelection {
    #[prost(string, tag = "1")]
    pub language_code: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub gender: String,
}

/// Response envelope for the streaming RPC
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSpeechInferResponse {
    #[prost(string, tag = "1")]
    pub message_id: String,
    #[prost(int32, tag = "2")]
    pub status: i32,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infer_insight_response: Option<InferInsightResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferInsightResponse {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognition_result: Option<RecognitionResult>,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_agent_result: Option<VirtualAgentResult>,
}

/// ASR result carried by a response
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionResult {
    /// One of the `response_event` values
    #[prost(int32, tag = "1")]
    pub response_event: i32,
    #[prost(bool, tag = "2")]
    pub is_final: bool,
    #[prost(message, repeated, tag = "3")]
    pub alternatives: Vec<SpeechAlternative>,
    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_end_time: Option<PbDuration>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechAlternative {
    #[prost(string, tag = "1")]
    pub transcript: String,
    #[prost(float, tag = "2")]
    pub confidence: f32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct PbDuration {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// Virtual-agent result carried by a response
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualAgentResult {
    #[prost(message, repeated, tag = "1")]
    pub prompts: Vec<Prompt>,
    /// One of the `va_response_type` values
    #[prost(int32, tag = "2")]
    pub response_type: i32,
}

/// A single virtual-agent prompt: text plus optional synthesized audio
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prompt {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(bytes, tag = "2")]
    #[serde(with = "base64_bytes")]
    pub audio_content: Vec<u8>,
    /// Whether the caller may interrupt this prompt mid-playback
    #[prost(bool, tag = "3")]
    pub bargein: bool,
    /// Marks the last prompt of a chunked response
    #[prost(bool, tag = "4")]
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Serde adapter for protobuf-JSON bytes fields (base64 strings on the wire)
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_round_trips_through_protobuf_json() {
        let rsp = StreamingSpeechInferResponse {
            message_id: "m1".into(),
            status: 0,
            infer_insight_response: Some(InferInsightResponse {
                recognition_result: None,
                virtual_agent_result: Some(VirtualAgentResult {
                    prompts: vec![Prompt {
                        text: "Hello".into(),
                        audio_content: vec![1, 2, 3],
                        bargein: true,
                        is_final: false,
                    }],
                    response_type: va_response_type::RESPONSE_CHUNK,
                }),
            }),
        };

        let json = serde_json::to_value(&rsp).unwrap();
        assert_eq!(json["messageId"], "m1");
        let prompt = &json["inferInsightResponse"]["virtualAgentResult"]["prompts"][0];
        assert_eq!(prompt["text"], "Hello");
        // protobuf-JSON encodes bytes as base64
        assert_eq!(prompt["audioContent"], "AQID");
        assert_eq!(prompt["bargein"], true);

        let back: StreamingSpeechInferResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, rsp);
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let back: StreamingSpeechInferResponse =
            serde_json::from_str(r#"{"messageId":"x"}"#).unwrap();
        assert_eq!(back.message_id, "x");
        assert!(back.infer_insight_response.is_none());
    }
}
