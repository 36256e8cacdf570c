//! sensord core - session server and hardware telemetry provider.
//!
//! This crate provides the building blocks of the sensord daemon: a
//! Unix-socket session server with per-connection idle expiry, the
//! `Status`-envelope wire protocol, a connecting client, and a
//! sysinfo-backed telemetry provider for the `cpu`, `memory`, and `gpu`
//! categories. Unix-only: the transport is a Unix domain socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensord_core::{ServerConfig, SystemTelemetry, TelemetryClient, TelemetryServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sensord_core::Result<()> {
//!     let provider = Arc::new(SystemTelemetry::new());
//!     let mut server = TelemetryServer::new(provider, ServerConfig::default());
//!     server.start().await?;
//!
//!     let client = TelemetryClient::connect(server.socket_path()).await?;
//!     let envelope = client.request("cpu").await?;
//!     println!("Status={}", envelope.status);
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ipc;
pub mod telemetry;

// Re-export commonly used types
pub use config::{IpcConfig, ServerConfig, TelemetryConfig};
pub use error::{Result, SensordError};
pub use ipc::{
    read_frame, write_frame, ResponseEnvelope, TelemetryClient, TelemetryServer, LIVENESS_PROBE,
    STATUS_ERROR, STATUS_OK,
};
pub use telemetry::{
    create_gpu_monitor, Category, CoreUsage, CpuSnapshot, GpuInfo, GpuMonitor, GpuSnapshot,
    MemorySnapshot, NoOpGpuMonitor, NvidiaSmiMonitor, SystemTelemetry, TelemetryProvider,
};
