//! Local IPC: the session server, its wire protocol, and a client.
//!
//! Transport is a named Unix domain socket: process-local, duplex,
//! byte-stream, not network-routable. Frames are length-prefixed UTF-8
//! (`[u32 BE len][payload]`); requests carry a category token, responses
//! a JSON envelope with a top-level `Status` field.
//!
//! # Architecture
//!
//! - **Server**: binds the endpoint, accepts connections, spawns one
//!   session task per connection, owns start/stop lifecycle
//! - **Session**: per-connection request loop with idle expiry
//! - **Client**: connects and performs request/response exchanges
//! - **Protocol**: shared framing and envelope types used by both sides

pub mod client;
pub mod protocol;
pub mod server;

mod session;

pub use client::TelemetryClient;
pub use protocol::{
    read_frame, write_frame, ResponseEnvelope, LIVENESS_PROBE, STATUS_ERROR, STATUS_OK,
};
pub use server::TelemetryServer;
