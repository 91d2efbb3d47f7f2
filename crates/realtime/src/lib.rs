//! Realtime Channel: the Socket.IO-style connection to the BragerOne
//! backend's realtime endpoint.
//!
//! Retargeted from the teacher's bespoke node-hello WebSocket handshake
//! (`crates/node-sdk`) onto Engine.IO/Socket.IO packet framing, per
//! `examples/original_source/src/pybragerone/api/ws.py` (`RealtimeManager`):
//! connect with transport negotiation, join the default namespace, emit
//! module-subscription frames, forward named events to a dispatcher, and
//! reconnect forever with jittered exponential back-off, re-subscribing
//! (and letting the owning `sa_gateway::Gateway` re-bind and re-prime)
//! after every reconnect.

pub mod client;
pub mod error;
pub mod reconnect;

pub use client::{OnConnected, RealtimeChannel, RealtimeHeaders, TokenProvider};
pub use error::RealtimeError;
pub use reconnect::ReconnectBackoff;
