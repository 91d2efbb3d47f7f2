//! Wire types shared across the BragerOne client workspace: register
//! addressing, REST payload shapes, and the Engine.IO/Socket.IO realtime
//! framing. No I/O lives here, only data shapes and pure parsing.

pub mod address;
pub mod param;
pub mod realtime;
pub mod rest;

pub use address::{Address, Channel};
pub use param::{ParamMeta, ParamUpdate};
pub use realtime::{EnginePacketType, Frame, SocketEvent, SocketPacketType};
