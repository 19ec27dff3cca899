//! Upstream speech-insight gRPC client
//!
//! Opens the `InferStreamingSpeechInsights` bidirectional stream using
//! tonic's low-level `Grpc` client with a `ProstCodec`, feeding it a
//! [`PushableQueue`] as the request stream. The bearer token travels in the
//! call metadata, which covers every frame of the stream (one HTTP/2
//! request end to end).

use std::time::Duration;

use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status, Streaming};
use tracing::info;

use crate::bridge::queue::PushableQueue;
use crate::errors::BridgeError;
use crate::proto::{INFER_STREAMING_PATH, StreamingSpeechInferRequest, StreamingSpeechInferResponse};
use crate::wire::ErrorFrame;

/// Connect/request bounds for the upstream channel
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Establish a channel to the orchestrator endpoint.
///
/// TLS is driven by the URL scheme (tls-roots); `host` must carry one.
pub async fn connect_channel(host: &str) -> Result<Channel, BridgeError> {
    let endpoint = Endpoint::from_shared(host.to_string())
        .map_err(|e| BridgeError::ConfigurationError(format!("invalid endpoint {host}: {e}")))?
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Some(Duration::from_secs(30)));

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| BridgeError::ConnectionFailed(format!("gRPC connection failed: {e}")))?;

    info!(host = %host, "connected to insight orchestrator");
    Ok(channel)
}

/// Open the bidirectional streaming call.
///
/// The returned `Streaming` yields typed responses; requests flow through
/// the supplied queue until it is closed.
pub async fn open_stream(
    channel: Channel,
    token: &str,
    requests: PushableQueue<StreamingSpeechInferRequest>,
) -> Result<Streaming<StreamingSpeechInferResponse>, BridgeError> {
    let mut grpc = Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| BridgeError::ConnectionFailed(format!("service not ready: {e}")))?;

    let mut request = Request::new(requests);
    let bearer = format!("Bearer {token}")
        .parse()
        .map_err(|_| BridgeError::ConfigurationError("invalid token header value".into()))?;
    request.metadata_mut().insert("authorization", bearer);

    let codec: ProstCodec<StreamingSpeechInferRequest, StreamingSpeechInferResponse> =
        ProstCodec::default();
    let path = PathAndQuery::from_static(INFER_STREAMING_PATH);

    let response = grpc
        .streaming(request, path, codec)
        .await
        .map_err(BridgeError::Upstream)?;

    Ok(response.into_inner())
}

/// Surface an upstream status to the client as an `{error, details}` frame
/// with the gRPC code embedded.
pub fn status_to_error_frame(status: &Status) -> ErrorFrame {
    ErrorFrame::with_details(
        format!("gRPC {:?}: {}", status.code(), status.message()),
        status.message().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_embedded_in_the_error_frame() {
        let status = Status::unavailable("upstream down");
        let frame = status_to_error_frame(&status);
        assert!(frame.error.contains("Unavailable"));
        assert_eq!(frame.details.as_deref(), Some("upstream down"));
    }

    #[tokio::test]
    async fn malformed_endpoint_is_a_configuration_error() {
        let err = connect_channel("not a url").await.unwrap_err();
        assert!(matches!(err, BridgeError::ConfigurationError(_)));
    }
}
