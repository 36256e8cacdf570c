//! Per-connection session state machine.
//!
//! A session moves `Open -> (Active <-> Idle) -> Closed`: it waits Idle
//! for the next request frame with the idle deadline and the server-wide
//! shutdown signal racing against the read, goes Active to dispatch and
//! answer exactly one request, then re-arms the deadline from the moment
//! the response write completed. Requests on one connection are strictly
//! FIFO with a single outstanding exchange.
//!
//! Every request produces exactly one [`ResponseEnvelope`]; unknown
//! categories, provider failures, and malformed tokens become `Status=0`
//! envelopes and leave the connection open. Only the idle deadline, a
//! client disconnect, a shutdown signal, or a transport write failure
//! close the session.

use super::protocol::{read_frame, write_frame, ResponseEnvelope, LIVENESS_PROBE};
use crate::error::{Result, SensordError};
use crate::telemetry::{Category, TelemetryProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{trace, warn};

/// Why a session reached Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The peer closed the connection.
    Disconnected,
    /// The idle deadline fired before the next request.
    IdleTimeout,
    /// The server broadcast a shutdown signal.
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "client disconnected"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// One accepted client connection, owned exclusively by its task.
pub(crate) struct Session {
    id: u64,
    stream: UnixStream,
    provider: Arc<dyn TelemetryProvider>,
    idle_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        stream: UnixStream,
        provider: Arc<dyn TelemetryProvider>,
        idle_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            provider,
            idle_timeout,
            shutdown_rx,
        }
    }

    /// Drive the session to completion. Dropping the stream on return is
    /// what severs the connection; an expired client observes the channel
    /// as broken, not a `Status=0` response.
    pub(crate) async fn run(self) -> Result<CloseReason> {
        let Session {
            id,
            mut stream,
            provider,
            idle_timeout,
            mut shutdown_rx,
        } = self;
        let (mut reader, mut writer) = stream.split();

        let mut idle_deadline = Instant::now() + idle_timeout;

        loop {
            // Idle: race the next request against the deadline and shutdown.
            let frame = tokio::select! {
                result = read_frame(&mut reader) => match result? {
                    Some(frame) => frame,
                    None => return Ok(CloseReason::Disconnected),
                },
                _ = sleep_until(idle_deadline) => return Ok(CloseReason::IdleTimeout),
                _ = shutdown_rx.changed() => return Ok(CloseReason::Shutdown),
            };

            // Active: one dispatch, one envelope.
            let envelope = dispatch(provider.as_ref(), &frame);
            trace!("Session {} answered with Status={}", id, envelope.status);
            write_frame(&mut writer, &envelope.encode()).await?;

            idle_deadline = Instant::now() + idle_timeout;
        }
    }
}

/// Turn one request frame into one response envelope.
///
/// This is the recovery boundary: nothing that goes wrong here escapes as
/// anything other than a `Status=0` envelope.
fn dispatch(provider: &dyn TelemetryProvider, raw: &[u8]) -> ResponseEnvelope {
    let token = match std::str::from_utf8(raw) {
        Ok(token) => token.trim(),
        Err(_) => return ResponseEnvelope::err("request is not valid UTF-8"),
    };

    if token == LIVENESS_PROBE {
        return ResponseEnvelope::ok(serde_json::json!({}));
    }

    let Some(category) = Category::parse(token) else {
        let err = SensordError::UnknownCategory {
            name: token.to_string(),
        };
        return ResponseEnvelope::err(err.to_string());
    };

    match provider.query(category) {
        Ok(data) => ResponseEnvelope::ok(data),
        Err(e) => {
            warn!("Provider query for {} failed: {}", category, e);
            ResponseEnvelope::err(e.to_string())
        }
    }
}
