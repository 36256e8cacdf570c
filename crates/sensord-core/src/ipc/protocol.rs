//! Wire protocol: framing and the response envelope.
//!
//! Every exchange is one length-prefixed frame in each direction:
//!
//! ```text
//! [u32 BE: len][UTF-8 bytes of len]
//! ```
//!
//! A request frame carries a bare category token (or the liveness probe);
//! a response frame carries a JSON [`ResponseEnvelope`] whose top-level
//! `Status` field is readable without knowing the payload shape.

use crate::config::IpcConfig;
use crate::error::{Result, SensordError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// `Status` value for a successful exchange.
pub const STATUS_OK: i64 = 1;

/// `Status` value for a failed exchange.
pub const STATUS_ERROR: i64 = 0;

/// Request token answered without consulting the telemetry provider.
pub const LIVENESS_PROBE: &str = "ping";

/// Uniform response document: `Status` plus an opaque payload or an error
/// description. Exactly one envelope is written per request, whatever
/// happened while serving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "Data", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Create a success envelope carrying a payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: STATUS_OK,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error envelope carrying a description.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Whether the exchange succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Serialize to wire bytes. A response must go out for every request,
    /// so an (unexpected) serialization failure degrades to a static
    /// error envelope instead of propagating.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self)
            .unwrap_or_else(|_| br#"{"Status":0,"Error":"response encoding failed"}"#.to_vec())
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > IpcConfig::MAX_MESSAGE_SIZE {
        return Err(SensordError::Validation {
            field: "frame".to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                len,
                IpcConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
