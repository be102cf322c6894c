use thiserror::Error;

/// Decoding failure for an inbound frame. Connection loops log these and
/// drop the frame; a bad envelope never tears the connection down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    #[error("bad `{kind}` payload: {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
