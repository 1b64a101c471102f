//! Lockstep Mesh Library
//!
//! Deterministic lockstep synchronization for peer-to-peer real-time games.
//! Peers exchange tick-targeted input events, advance a shared simulation
//! only once every peer's inputs for a tick are known, and render a
//! speculative prediction in between.
//!
//! # Modules
//!
//! - `game` - World state, input events, event log and the deterministic simulator
//! - `net` - Wire packets, peer records and the transport seam
//! - `sync` - Tick scheduler, prediction, join handshake and the session tying them together

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod sync;
