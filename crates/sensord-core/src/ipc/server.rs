//! Unix-socket session server.
//!
//! `TelemetryServer` binds a named Unix domain socket endpoint, accepts
//! client connections concurrently, and spawns one [`Session`] task per
//! connection. The server is an explicit owned value with a
//! `start()`/`stop()` lifecycle; no global state.
//!
//! # Thread Safety
//!
//! The accept loop and every session run as spawned tokio tasks. The only
//! cross-task shared mutable structure is the session registry, a
//! mutex-guarded map mutated on accept and on session close; the telemetry
//! provider is shared via `Arc` and safe for concurrent queries.

use super::session::Session;
use crate::config::ServerConfig;
use crate::error::{Result, SensordError};
use crate::telemetry::TelemetryProvider;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::net::UnixListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Live session tasks keyed by session id. Entries are added on accept
/// and removed when the session task finishes.
type SessionRegistry = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

/// Channels and handles that exist only while the server is running.
struct RunningState {
    accept_shutdown_tx: oneshot::Sender<()>,
    session_shutdown_tx: watch::Sender<bool>,
    accept_handle: JoinHandle<()>,
    sessions: SessionRegistry,
}

/// The telemetry IPC server.
///
/// Lifecycle: `Stopped -> start() -> Running -> stop() -> Stopped`.
/// `start()` while running returns [`SensordError::AlreadyRunning`];
/// `stop()` while stopped is a no-op.
pub struct TelemetryServer {
    config: ServerConfig,
    provider: Arc<dyn TelemetryProvider>,
    running: Option<RunningState>,
}

impl TelemetryServer {
    /// Create a stopped server around a provider.
    pub fn new(provider: Arc<dyn TelemetryProvider>, config: ServerConfig) -> Self {
        Self {
            config,
            provider,
            running: None,
        }
    }

    /// The endpoint this server binds.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind the endpoint and begin accepting connections.
    ///
    /// Bind failures are fatal and surface here; a stale socket file from
    /// an unclean previous exit is removed before binding.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(SensordError::AlreadyRunning);
        }

        let path = self.config.socket_path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SensordError::Bind {
                path: path.clone(),
                source,
            })?;
        }
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| SensordError::Bind {
                path: path.clone(),
                source,
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|source| SensordError::Bind {
            path: path.clone(),
            source,
        })?;

        // Restrict the socket to the owning user.
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));

        info!("Telemetry server listening on {}", path.display());

        let (accept_shutdown_tx, accept_shutdown_rx) = oneshot::channel::<()>();
        let (session_shutdown_tx, session_shutdown_rx) = watch::channel(false);
        let sessions: SessionRegistry = Arc::new(Mutex::new(HashMap::new()));

        let accept_handle = tokio::spawn(accept_loop(
            listener,
            self.provider.clone(),
            self.config.clone(),
            accept_shutdown_rx,
            session_shutdown_rx,
            sessions.clone(),
        ));

        self.running = Some(RunningState {
            accept_shutdown_tx,
            session_shutdown_tx,
            accept_handle,
            sessions,
        });

        Ok(())
    }

    /// Stop accepting, broadcast close to every live session, and wait a
    /// bounded grace period before aborting stragglers (a session stuck in
    /// a blocking provider call must not hang shutdown).
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("stop() called on a stopped server");
            return;
        };

        let _ = running.accept_shutdown_tx.send(());
        let _ = running.session_shutdown_tx.send(true);

        if running.accept_handle.await.is_err() {
            warn!("Listener task panicked during shutdown");
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        let handles: Vec<(u64, JoinHandle<()>)> = {
            let mut registry = running.sessions.lock().unwrap();
            registry.drain().collect()
        };
        for (id, mut handle) in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("Session {} did not close within grace period, aborting", id);
                handle.abort();
            }
        }

        let _ = std::fs::remove_file(&self.config.socket_path);
        info!("Telemetry server stopped");
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.accept_shutdown_tx.send(());
            let _ = running.session_shutdown_tx.send(true);
            running.accept_handle.abort();
            for (_, handle) in running.sessions.lock().unwrap().drain() {
                handle.abort();
            }
            let _ = std::fs::remove_file(&self.config.socket_path);
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    provider: Arc<dyn TelemetryProvider>,
    config: ServerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
    session_shutdown_rx: watch::Receiver<bool>,
    sessions: SessionRegistry,
) {
    let mut next_session_id: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Listener shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        let active = {
                            let mut registry = sessions.lock().unwrap();
                            registry.retain(|_, handle| !handle.is_finished());
                            registry.len()
                        };
                        if active >= config.max_connections {
                            warn!(
                                "Rejecting connection: at max capacity ({})",
                                config.max_connections
                            );
                            continue;
                        }

                        next_session_id += 1;
                        let id = next_session_id;
                        let session = Session::new(
                            id,
                            stream,
                            provider.clone(),
                            config.idle_timeout,
                            session_shutdown_rx.clone(),
                        );
                        let registry = sessions.clone();

                        let handle = tokio::spawn(async move {
                            debug!("Session {} opened", id);
                            match session.run().await {
                                Ok(reason) => debug!("Session {} closed: {}", id, reason),
                                Err(e) => debug!("Session {} ended with error: {}", id, e),
                            }
                            registry.lock().unwrap().remove(&id);
                        });
                        sessions.lock().unwrap().insert(id, handle);
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::TelemetryClient;
    use crate::telemetry::Category;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fixed-payload provider for exercising the wire without sysinfo.
    struct StaticProvider;

    impl TelemetryProvider for StaticProvider {
        fn query(&self, category: Category) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"category": category.as_str(), "value": 42}))
        }
    }

    struct FailingProvider;

    impl TelemetryProvider for FailingProvider {
        fn query(&self, _category: Category) -> Result<serde_json::Value> {
            Err(SensordError::provider("sensor bus unavailable"))
        }
    }

    fn test_config(dir: &TempDir) -> ServerConfig {
        ServerConfig::new(dir.path().join("sensord-test.sock"))
    }

    async fn started_server(
        dir: &TempDir,
        provider: Arc<dyn TelemetryProvider>,
    ) -> TelemetryServer {
        let mut server = TelemetryServer::new(provider, test_config(dir));
        server.start().await.unwrap();
        server
    }

    #[tokio::test]
    async fn test_start_and_stop_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        assert!(server.is_running());
        assert!(server.socket_path().exists());

        server.stop().await;
        assert!(!server.is_running());
        assert!(!server.socket_path().exists());
    }

    #[tokio::test]
    async fn test_start_while_running_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        match server.start().await {
            Err(SensordError::AlreadyRunning) => {}
            other => panic!("Expected AlreadyRunning, got: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_while_stopped_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut server = TelemetryServer::new(Arc::new(StaticProvider), test_config(&dir));

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        let envelope = client.request("cpu").await.unwrap();

        assert!(envelope.is_ok());
        assert_eq!(
            envelope.data,
            Some(serde_json::json!({"category": "cpu", "value": 42}))
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_category_keeps_connection_open() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();

        let envelope = client.request("klsjflksjdf").await.unwrap();
        assert!(!envelope.is_ok());

        // The failed request did not cost us the session.
        let envelope = client.request("memory").await.unwrap();
        assert!(envelope.is_ok());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_provider_failure_is_status_zero() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(FailingProvider)).await;

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        let envelope = client.request("gpu").await.unwrap();

        assert!(!envelope.is_ok());
        assert!(envelope.error.unwrap().contains("sensor bus unavailable"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_idle_session_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).with_idle_timeout(Duration::from_millis(150));
        let mut server = TelemetryServer::new(Arc::new(StaticProvider), config);
        server.start().await.unwrap();

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        assert!(client.ping().await.unwrap().is_ok());

        tokio::time::sleep(Duration::from_millis(500)).await;

        // The server closed the connection; this is a transport failure,
        // not a Status=0 response.
        match client.ping().await {
            Err(SensordError::ConnectionClosed) => {}
            other => panic!("Expected ConnectionClosed, got: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_activity_inside_idle_window_keeps_session_alive() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).with_idle_timeout(Duration::from_millis(400));
        let mut server = TelemetryServer::new(Arc::new(StaticProvider), config);
        server.start().await.unwrap();

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert!(client.ping().await.unwrap().is_ok());
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_severs_live_sessions() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        assert!(client.ping().await.unwrap().is_ok());

        server.stop().await;

        assert!(client.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_server_restarts_after_stop() {
        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        server.stop().await;
        server.start().await.unwrap();

        let client = TelemetryClient::connect(server.socket_path()).await.unwrap();
        assert!(client.request("cpu").await.unwrap().is_ok());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_fifo_order() {
        use crate::ipc::protocol::{read_frame, write_frame, ResponseEnvelope};
        use tokio::net::UnixStream;

        let dir = TempDir::new().unwrap();
        let mut server = started_server(&dir, Arc::new(StaticProvider)).await;

        // Write two requests back-to-back on the raw stream; the session
        // serves one exchange at a time, so the responses come back in
        // request order.
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, b"cpu").await.unwrap();
        write_frame(&mut writer, b"memory").await.unwrap();

        let first: ResponseEnvelope =
            serde_json::from_slice(&read_frame(&mut reader).await.unwrap().unwrap()).unwrap();
        let second: ResponseEnvelope =
            serde_json::from_slice(&read_frame(&mut reader).await.unwrap().unwrap()).unwrap();

        assert_eq!(first.data.unwrap()["category"], "cpu");
        assert_eq!(second.data.unwrap()["category"], "memory");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_connection_cap_drops_excess_connections() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).with_max_connections(1);
        let mut server = TelemetryServer::new(Arc::new(StaticProvider), config);
        server.start().await.unwrap();

        let first = TelemetryClient::connect(server.socket_path()).await.unwrap();
        assert!(first.ping().await.unwrap().is_ok());

        // Accepted at the socket level, then dropped by the cap check.
        let second = TelemetryClient::connect(server.socket_path()).await.unwrap();
        assert!(second.ping().await.is_err());

        // The first session is unaffected.
        assert!(first.ping().await.unwrap().is_ok());

        server.stop().await;
    }
}
