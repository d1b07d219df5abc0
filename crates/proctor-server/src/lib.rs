//! Proctor Server
//!
//! Network front end for the `proctoring` core. Monitored exam clients
//! connect over TCP, attach to their session and stream newline-delimited
//! JSON ticks; warning alerts and the termination notice are pushed back on
//! the same connection.
//!
//! # Usage
//!
//! ```bash
//! # Built-in face detector, default thresholds
//! proctor-server --bind 0.0.0.0:7070
//!
//! # Config file plus environment overrides
//! PROCTOR_MAX_WARNINGS=3 proctor-server --config proctor.toml --vision off
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use server::{ProctorServer, ServerState, VisionSelection};
