//! Protocol enum mapping tables
//!
//! The WebSocket protocol accepts loosely-typed enum fields (symbolic name
//! or protocol number); the gRPC surface wants numeric values. Each mapper
//! is an exhaustive table with a warn-and-default path for unknown input -
//! a malformed enum must never tear down a live call.

use tracing::warn;

use crate::proto::{audio_encoding, event_type, output_encoding};
use crate::wire::EnumCode;

/// Participant role: 0 = IVR, 1 = CALLER, 2 = AGENT
pub fn map_role(role: &EnumCode) -> i32 {
    match role {
        EnumCode::Num(n) => *n as i32,
        EnumCode::Name(name) => match name.to_uppercase().as_str() {
            "IVR" => 0,
            "CALLER" => 1,
            "AGENT" => 2,
            other => {
                warn!(role = %other, "unknown role, defaulting to 0");
                0
            }
        },
    }
}

/// Request type: 0 = DEFAULT_UNSPECIFIED, 1 = VIRTUAL_AGENT, 2 = AGENT_ASSIST
pub fn map_request_type(request_type: &EnumCode) -> i32 {
    match request_type {
        EnumCode::Num(n) => *n as i32,
        EnumCode::Name(name) => match name.to_uppercase().as_str() {
            "DEFAULT_UNSPECIFIED" => 0,
            "VIRTUAL_AGENT" => 1,
            "AGENT_ASSIST" => 2,
            other => {
                warn!(request_type = %other, "unknown requestType, defaulting to 0");
                0
            }
        },
    }
}

/// Input event type, see [`crate::proto::event_type`]
pub fn map_event_type(value: &EnumCode) -> i32 {
    match value {
        EnumCode::Num(n) => *n as i32,
        EnumCode::Name(name) => match name.to_uppercase().as_str() {
            "UNSPECIFIED" => event_type::UNSPECIFIED,
            "CALL_START" => event_type::CALL_START,
            "CALL_END" => event_type::CALL_END,
            "CUSTOM" => event_type::CUSTOM,
            "NO_INPUT" => event_type::NO_INPUT,
            "START_OF_DTMF" => event_type::START_OF_DTMF,
            "STOP_STREAMING_RESPONSE" => event_type::STOP_STREAMING_RESPONSE,
            other => {
                warn!(event_type = %other, "unknown eventType, defaulting to 0");
                event_type::UNSPECIFIED
            }
        },
    }
}

/// Recognition input encoding, see [`crate::proto::audio_encoding`]
pub fn map_input_audio_encoding(encoding: &EnumCode) -> i32 {
    match encoding {
        EnumCode::Num(n) => *n as i32,
        EnumCode::Name(name) => match name.to_uppercase().as_str() {
            "LINEAR16" => audio_encoding::LINEAR16,
            "MULAW" => audio_encoding::MULAW,
            other => {
                warn!(encoding = %other, "unknown input encoding, defaulting to LINEAR16");
                audio_encoding::LINEAR16
            }
        },
    }
}

/// Synthesized output encoding, see [`crate::proto::output_encoding`].
///
/// The recognition-side MULAW value (3 on input, but 6 in some client
/// builds) occasionally leaks into this field; both remap to OUTPUT_MULAW.
pub fn map_output_audio_encoding(encoding: &EnumCode) -> i32 {
    match encoding {
        EnumCode::Num(n) => {
            let n = *n as i32;
            if (0..=5).contains(&n) {
                n
            } else if n == 6 {
                warn!(
                    encoding = n,
                    "numeric output audioEncoding out of range (MULAW expected), mapping to 2"
                );
                output_encoding::MULAW
            } else {
                warn!(encoding = n, "unknown numeric output audioEncoding, defaulting to MULAW");
                output_encoding::MULAW
            }
        }
        EnumCode::Name(name) => match name.to_uppercase().as_str() {
            "OUTPUT_LINEAR16" | "LINEAR16" => output_encoding::LINEAR16,
            "OUTPUT_MULAW" | "MULAW" => output_encoding::MULAW,
            "OUTPUT_ALAW" => output_encoding::ALAW,
            "OUTPUT_MP3" => output_encoding::MP3,
            "OGG_OPUS" => output_encoding::OGG_OPUS,
            other => {
                warn!(encoding = %other, "unknown output audioEncoding, defaulting to MULAW");
                output_encoding::MULAW
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> EnumCode {
        EnumCode::Name(s.into())
    }

    #[test]
    fn role_table() {
        assert_eq!(map_role(&name("IVR")), 0);
        assert_eq!(map_role(&name("caller")), 1);
        assert_eq!(map_role(&name("AGENT")), 2);
        assert_eq!(map_role(&name("bogus")), 0);
        assert_eq!(map_role(&EnumCode::Num(2)), 2);
    }

    #[test]
    fn request_type_table() {
        assert_eq!(map_request_type(&name("VIRTUAL_AGENT")), 1);
        assert_eq!(map_request_type(&name("AGENT_ASSIST")), 2);
        assert_eq!(map_request_type(&name("nope")), 0);
    }

    #[test]
    fn event_type_table() {
        assert_eq!(map_event_type(&name("CALL_START")), 1);
        assert_eq!(map_event_type(&name("CALL_END")), 2);
        assert_eq!(map_event_type(&name("STOP_STREAMING_RESPONSE")), 6);
        assert_eq!(map_event_type(&name("???")), 0);
        assert_eq!(map_event_type(&EnumCode::Num(5)), 5);
    }

    #[test]
    fn input_encoding_defaults_to_linear16() {
        assert_eq!(map_input_audio_encoding(&name("LINEAR16")), 1);
        assert_eq!(map_input_audio_encoding(&name("MULAW")), 3);
        assert_eq!(map_input_audio_encoding(&name("OPUS")), 1);
    }

    #[test]
    fn output_encoding_defaults_to_mulaw() {
        assert_eq!(map_output_audio_encoding(&name("OUTPUT_MP3")), 4);
        assert_eq!(map_output_audio_encoding(&name("LINEAR16")), 1);
        assert_eq!(map_output_audio_encoding(&name("unknown")), 2);
        assert_eq!(map_output_audio_encoding(&EnumCode::Num(6)), 2);
        assert_eq!(map_output_audio_encoding(&EnumCode::Num(99)), 2);
        assert_eq!(map_output_audio_encoding(&EnumCode::Num(5)), 5);
    }
}
