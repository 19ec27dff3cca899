//! Configuration
//!
//! Server configuration comes from environment variables (a `.env` file is
//! loaded in `main` before this runs) with CLI flags taking precedence.
//! Per-call parameters arrive from the client at call time as [`CallConfig`].

use crate::errors::TransportError;

/// Upstream used when the client does not name a host
pub const DEFAULT_UPSTREAM_ENDPOINT: &str =
    "https://ferrari-intg-insight-orchestrator.intg-us1.rtmslab.net";

/// Client identifier stamped on every insight config
pub const DEFAULT_CLIENT_ID: &str = "chatbot-ui";

/// CCAI configuration profile requested for every call
pub const CCAI_CONFIG_ID: &str = "NATIVE_ADVANCED_VIRTUAL_AGENT";

/// Default user agent reported in consumer info
pub const DEFAULT_USER_AGENT: &str = "Web-UI";

/// Capture sample rate for caller audio, Hertz
pub const FIXED_SAMPLE_RATE: i32 = 16_000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upstream gRPC endpoint used when a client omits `metadata.host`
    pub upstream_endpoint: String,
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("Invalid PORT value: {raw}"))?,
            Err(_) => 3001,
        };
        let upstream_endpoint = std::env::var("UPSTREAM_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_ENDPOINT.to_string());

        Ok(Self {
            host,
            port,
            upstream_endpoint,
        })
    }

    /// Server address in "host:port" form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Immutable per-call parameters supplied by the caller
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Bridge WebSocket URL, e.g. "ws://localhost:3001/ws"
    pub ws_url: String,
    /// Upstream host forwarded in `metadata.host`; empty means the bridge
    /// default
    pub host: String,
    /// Bearer token for the upstream call
    pub token: String,
    /// Recognition language, e.g. "en-US"
    pub language: String,
    pub org_id: String,
    pub conversation_id: String,
    pub virtual_agent_id: String,
    pub wxcc_cluster_id: String,
    pub user_agent: String,
}

impl CallConfig {
    /// Trim the token and reject calls that carry none
    pub fn validated(mut self) -> Result<Self, TransportError> {
        self.token = self.token.trim().to_string();
        if self.token.is_empty() {
            return Err(TransportError::MissingToken);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> CallConfig {
        CallConfig {
            ws_url: "ws://localhost:3001/ws".into(),
            host: String::new(),
            token: "  tok  ".into(),
            language: "en-US".into(),
            org_id: "org".into(),
            conversation_id: "conv".into(),
            virtual_agent_id: "va".into(),
            wxcc_cluster_id: "cluster".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }

    #[test]
    fn validated_trims_token() {
        let cfg = sample_config().validated().unwrap();
        assert_eq!(cfg.token, "tok");
    }

    #[test]
    fn validated_rejects_blank_token() {
        let mut cfg = sample_config();
        cfg.token = "   ".into();
        assert!(matches!(
            cfg.validated(),
            Err(TransportError::MissingToken)
        ));
    }
}
