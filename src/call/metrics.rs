//! Per-call latency accounting
//!
//! Timestamps are Unix epoch milliseconds; derived durations are seconds.
//! A dialogue is one user turn plus the virtual-agent response that follows
//! it. The dialogue list is append-only; fields fill in as events arrive and
//! absent measurements stay `None`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Current Unix time in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Metrics for a single dialogue (user turn + agent response)
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueMetrics {
    pub dialogue_number: u32,

    // ASR side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_of_input: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_interim_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_recognition_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_input: Option<u64>,

    // VA playback side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prompt_byte_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_playback_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_bytes: Option<u64>,
    /// Seconds spent playing prompts in this dialogue
    pub total_prompt_playback_time: f64,

    pub bargeinable: bool,
    pub audio_chunks_sent: u32,
    /// start-of-input to end-of-input, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_utterance_length: Option<f64>,
    /// first interim to final recognition, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interim_playout_length: Option<f64>,
    /// previous turn's end-of-input to this prompt's first byte, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_gap1: Option<f64>,
    /// end-of-input to playback completion of a finished response, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_gap2: Option<f64>,
    /// barge-in trigger to playback actually stopped, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barge_in_latency: Option<f64>,
    /// pending barge-in trigger; cleared once latency is recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barge_in_start: Option<u64>,
}

impl DialogueMetrics {
    pub fn new(dialogue_number: u32) -> Self {
        Self {
            dialogue_number,
            ..Default::default()
        }
    }
}

/// Call-level metrics: greeting timings plus the dialogue list
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_start_request: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_start_response: Option<u64>,
    /// request to first greeting prompt, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_start_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_end: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_prompt_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_playback_time: Option<f64>,

    pub dialogues: Vec<DialogueMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialogue_serializes_camel_case_and_skips_unset() {
        let mut d = DialogueMetrics::new(3);
        d.start_of_input = Some(1_000);
        d.customer_utterance_length = Some(1.5);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["dialogueNumber"], 3);
        assert_eq!(json["startOfInput"], 1_000);
        assert_eq!(json["customerUtteranceLength"], 1.5);
        assert!(json.get("endOfInput").is_none());
        assert!(json.get("bargeInLatency").is_none());
    }

    #[test]
    fn latency_metrics_default_has_empty_dialogue_list() {
        let m = LatencyMetrics::default();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["dialogues"], serde_json::json!([]));
        assert!(json.get("callStart").is_none());
    }
}
