//! Engine.IO / Socket.IO packet framing and the realtime event vocabulary.
//!
//! The backend's realtime endpoint speaks Engine.IO (transport-level
//! open/ping/pong) wrapping Socket.IO (namespace connect/disconnect/event)
//! framing, per `api/ws.py`'s `transports=["polling","websocket"]` handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine.IO packet type prefixes, as they appear at the start of every
/// frame sent over the websocket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl EnginePacketType {
    pub fn prefix(self) -> char {
        match self {
            EnginePacketType::Open => '0',
            EnginePacketType::Close => '1',
            EnginePacketType::Ping => '2',
            EnginePacketType::Pong => '3',
            EnginePacketType::Message => '4',
            EnginePacketType::Upgrade => '5',
            EnginePacketType::Noop => '6',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '0' => Some(EnginePacketType::Open),
            '1' => Some(EnginePacketType::Close),
            '2' => Some(EnginePacketType::Ping),
            '3' => Some(EnginePacketType::Pong),
            '4' => Some(EnginePacketType::Message),
            '5' => Some(EnginePacketType::Upgrade),
            '6' => Some(EnginePacketType::Noop),
            _ => None,
        }
    }
}

/// Socket.IO packet type prefixes, carried inside an Engine.IO `message`
/// (`4`) frame as the next character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl SocketPacketType {
    pub fn prefix(self) -> char {
        match self {
            SocketPacketType::Connect => '0',
            SocketPacketType::Disconnect => '1',
            SocketPacketType::Event => '2',
            SocketPacketType::Ack => '3',
            SocketPacketType::ConnectError => '4',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '0' => Some(SocketPacketType::Connect),
            '1' => Some(SocketPacketType::Disconnect),
            '2' => Some(SocketPacketType::Event),
            '3' => Some(SocketPacketType::Ack),
            '4' => Some(SocketPacketType::ConnectError),
            _ => None,
        }
    }
}

/// A decoded frame: the Engine.IO envelope plus, for `message` frames, the
/// Socket.IO packet type and payload text.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub engine: EnginePacketType,
    pub socket: Option<SocketPacketType>,
    pub payload: String,
}

impl Frame {
    /// Parses a raw text frame as received from the websocket transport.
    pub fn parse(text: &str) -> Option<Frame> {
        let mut chars = text.chars();
        let engine = EnginePacketType::from_prefix(chars.next()?)?;
        if engine != EnginePacketType::Message {
            return Some(Frame {
                engine,
                socket: None,
                payload: chars.as_str().to_string(),
            });
        }
        let rest = chars.as_str();
        let mut rest_chars = rest.chars();
        let socket = rest_chars.next().and_then(SocketPacketType::from_prefix);
        match socket {
            Some(_) => Some(Frame {
                engine,
                socket,
                payload: rest_chars.as_str().to_string(),
            }),
            None => Some(Frame {
                engine,
                socket: None,
                payload: rest.to_string(),
            }),
        }
    }

    /// Encodes an engine-level frame with no Socket.IO wrapper (ping/pong).
    pub fn encode_engine(engine: EnginePacketType, payload: &str) -> String {
        format!("{}{}", engine.prefix(), payload)
    }

    /// Encodes a namespace connect/disconnect frame (`40`/`41`), optionally
    /// carrying a JSON auth payload.
    pub fn encode_socket(socket: SocketPacketType, payload: &str) -> String {
        format!(
            "{}{}{}",
            EnginePacketType::Message.prefix(),
            socket.prefix(),
            payload
        )
    }

    /// Encodes a Socket.IO event frame: `42["event name", {..}]`.
    pub fn encode_event(event: &str, args: &[Value]) -> String {
        let mut arr = Vec::with_capacity(args.len() + 1);
        arr.push(Value::String(event.to_string()));
        arr.extend(args.iter().cloned());
        let body = serde_json::to_string(&Value::Array(arr)).unwrap_or_default();
        format!(
            "{}{}{}",
            EnginePacketType::Message.prefix(),
            SocketPacketType::Event.prefix(),
            body
        )
    }
}

/// Named realtime events forwarded verbatim to subscribers.
pub const EVENT_SNAPSHOT: &str = "snapshot";
pub const EVENT_APP_MODULES_PARAMETERS_CHANGE: &str = "app:modules:parameters:change";
pub const EVENT_MODULES_PARAMETERS_CHANGE: &str = "modules:parameters:change";
pub const EVENT_PARAMETERS_CHANGE: &str = "parameters:change";
pub const EVENT_TASK_CREATED: &str = "app:module:task:created";
pub const EVENT_TASK_STATUS_CHANGED: &str = "app:module:task:status:changed";
pub const EVENT_TASK_COMPLETED: &str = "app:module:task:completed";

pub const LISTEN_PARAMETERS: &str = "app:modules:parameters:listen";
pub const LISTEN_ACTIVITY_QUANTITY: &str = "app:modules:activity:quantity:listen";

/// Maps the backend's numeric event aliases to their canonical named form.
///
/// Per `api/ws.py`: `60` -> task status-changed, `61` -> task created,
/// `63` -> task completed. Callers must not depend on the numeric value
/// carrying independent meaning beyond this forwarding (see DESIGN.md).
pub fn numeric_event_alias(code: i64) -> Option<&'static str> {
    match code {
        60 => Some(EVENT_TASK_STATUS_CHANGED),
        61 => Some(EVENT_TASK_CREATED),
        63 => Some(EVENT_TASK_COMPLETED),
        _ => None,
    }
}

/// A decoded Socket.IO event: name plus its JSON argument array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketEvent {
    pub name: String,
    pub args: Vec<Value>,
}

impl SocketEvent {
    /// Parses a Socket.IO event frame's payload (`["name", arg0, arg1, ...]`).
    pub fn parse(payload: &str) -> Option<SocketEvent> {
        let value: Value = serde_json::from_str(payload).ok()?;
        let mut arr = match value {
            Value::Array(arr) => arr,
            _ => return None,
        };
        if arr.is_empty() {
            return None;
        }
        let head = arr.remove(0);
        let name = match head {
            Value::String(s) => s,
            Value::Number(n) => {
                let code = n.as_i64()?;
                numeric_event_alias(code)?.to_string()
            }
            _ => return None,
        };
        Some(SocketEvent { name, args: arr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_open_frame() {
        let frame = Frame::parse(r#"0{"sid":"abc"}"#).unwrap();
        assert_eq!(frame.engine, EnginePacketType::Open);
        assert_eq!(frame.payload, r#"{"sid":"abc"}"#);
    }

    #[test]
    fn parses_namespace_connect_frame() {
        let frame = Frame::parse(r#"40{"sid":"xyz"}"#).unwrap();
        assert_eq!(frame.engine, EnginePacketType::Message);
        assert_eq!(frame.socket, Some(SocketPacketType::Connect));
        assert_eq!(frame.payload, r#"{"sid":"xyz"}"#);
    }

    #[test]
    fn parses_event_frame() {
        let frame = Frame::parse(r#"42["snapshot",{"a":1}]"#).unwrap();
        assert_eq!(frame.socket, Some(SocketPacketType::Event));
        let event = SocketEvent::parse(&frame.payload).unwrap();
        assert_eq!(event.name, "snapshot");
        assert_eq!(event.args, vec![json!({"a": 1})]);
    }

    #[test]
    fn numeric_alias_resolves_to_canonical_name() {
        let frame = Frame::parse(r#"42[60,{"taskId":"t1"}]"#).unwrap();
        let event = SocketEvent::parse(&frame.payload).unwrap();
        assert_eq!(event.name, EVENT_TASK_STATUS_CHANGED);
    }

    #[test]
    fn encode_event_round_trips() {
        let text = Frame::encode_event("ping", &[json!({"x": 1})]);
        assert_eq!(text, r#"42["ping",{"x":1}]"#);
    }
}
