//! Client side of the telemetry channel.
//!
//! Connects to a server endpoint and performs one request/response
//! exchange at a time. Used by integration tests and by consumers that
//! want typed access instead of hand-rolling the framing.
//!
//! # Thread Safety
//!
//! The stream is behind a tokio `Mutex`, serializing exchanges from
//! concurrent tasks; the wire contract is one outstanding request per
//! connection.

use super::protocol::{read_frame, write_frame, ResponseEnvelope, LIVENESS_PROBE};
use crate::config::IpcConfig;
use crate::error::{Result, SensordError};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Client connection to a running telemetry server.
#[derive(Debug)]
pub struct TelemetryClient {
    stream: Mutex<UnixStream>,
    path: PathBuf,
}

impl TelemetryClient {
    /// Connect to the server socket at `path`.
    pub async fn connect(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stream = tokio::time::timeout(IpcConfig::CONNECT_TIMEOUT, UnixStream::connect(&path))
            .await
            .map_err(|_| SensordError::ConnectTimeout(IpcConfig::CONNECT_TIMEOUT))??;

        debug!("Client connected to {}", path.display());

        Ok(Self {
            stream: Mutex::new(stream),
            path,
        })
    }

    /// Send one request token and wait for its envelope.
    ///
    /// A connection the server has closed (idle expiry, shutdown) surfaces
    /// as [`SensordError::ConnectionClosed`], never as an envelope.
    pub async fn request(&self, token: &str) -> Result<ResponseEnvelope> {
        let mut stream = self.stream.lock().await;
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, token.as_bytes())
            .await
            .map_err(|_| SensordError::ConnectionClosed)?;

        let response_bytes = read_frame(&mut reader)
            .await
            .map_err(|_| SensordError::ConnectionClosed)?
            .ok_or(SensordError::ConnectionClosed)?;

        serde_json::from_slice(&response_bytes).map_err(|e| SensordError::Json {
            message: format!("Failed to parse response envelope: {}", e),
            source: Some(e),
        })
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<ResponseEnvelope> {
        self.request(LIVENESS_PROBE).await
    }

    /// The endpoint this client connected to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
