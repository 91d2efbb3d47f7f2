//! `RealtimeChannel`: connect/reconnect/ping/writer-task structure
//! retargeted from the bespoke node-hello handshake at Engine.IO/Socket.IO
//! framing, per `examples/original_source/src/pybragerone/api/ws.py`
//! (`RealtimeManager`).

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sa_protocol::realtime::{EnginePacketType, Frame, SocketEvent, SocketPacketType};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::RealtimeError;
use crate::reconnect::ReconnectBackoff;

/// A callback invoked after every successful (re)connect, mirroring
/// `RealtimeManager`'s connect-event waiter. Callers read
/// [`RealtimeChannel::engine_sid`]/[`RealtimeChannel::namespace_sid`] from
/// inside the callback to pick up the freshly (re)established session ids.
pub type OnConnected = Arc<dyn Fn() + Send + Sync>;

/// Supplies the current bearer token at connect time. Called fresh on every
/// connection attempt so a refreshed token is always used.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Static headers sent with the connect handshake, per spec.md §4.B
/// ("passing the bearer token plus Origin/Referer/App-Version headers").
#[derive(Debug, Clone, Default)]
pub struct RealtimeHeaders {
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Subscription {
    modules: Vec<String>,
    group_id: Option<i64>,
}

impl Subscription {
    fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

pub struct RealtimeChannel {
    ws_url: String,
    reconnect_backoff: ReconnectBackoff,
    handshake_timeout: Duration,
    subscription: Mutex<Subscription>,
    on_connected: Mutex<Vec<OnConnected>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    token_provider: Mutex<Option<TokenProvider>>,
    headers: RealtimeHeaders,
    engine_sid: Mutex<Option<String>>,
    namespace_sid: Mutex<Option<String>>,
}

impl RealtimeChannel {
    pub fn new(ws_url: impl Into<String>) -> Self {
        RealtimeChannel {
            ws_url: ws_url.into(),
            reconnect_backoff: ReconnectBackoff::default(),
            handshake_timeout: Duration::from_secs(10),
            subscription: Mutex::new(Subscription::default()),
            on_connected: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
            token_provider: Mutex::new(None),
            headers: RealtimeHeaders::default(),
            engine_sid: Mutex::new(None),
            namespace_sid: Mutex::new(None),
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Supplies the bearer-token callback used to populate the
    /// `Authorization` header on every (re)connect attempt.
    pub fn with_auth(self, token_provider: TokenProvider) -> Self {
        *self.token_provider.lock() = Some(token_provider);
        self
    }

    pub fn with_headers(mut self, headers: RealtimeHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn on_connected(&self, callback: OnConnected) {
        self.on_connected.lock().push(callback);
    }

    /// The Engine.IO transport session id from the most recent connect, if
    /// currently connected.
    pub fn engine_sid(&self) -> Option<String> {
        self.engine_sid.lock().clone()
    }

    /// The Socket.IO default-namespace session id from the most recent
    /// connect, if currently connected.
    pub fn namespace_sid(&self) -> Option<String> {
        self.namespace_sid.lock().clone()
    }

    /// Registers interest in a module/group set for `app:modules:parameters:listen`
    /// and `app:modules:activity:quantity:listen`, emitting immediately if
    /// already connected.
    pub fn subscribe(&self, modules: Vec<String>, group_id: Option<i64>) {
        *self.subscription.lock() = Subscription {
            modules: modules.clone(),
            group_id,
        };
        self.emit_subscription(&modules, group_id);
    }

    /// Re-emits the current subscription set if non-empty. Called after
    /// every reconnect.
    pub fn resubscribe(&self) {
        let sub = self.subscription.lock().clone();
        if !sub.is_empty() {
            self.emit_subscription(&sub.modules, sub.group_id);
        }
    }

    fn emit_subscription(&self, modules: &[String], group_id: Option<i64>) {
        let Some(tx) = self.outbound.lock().clone() else {
            return;
        };
        for (key, value_key) in [
            (sa_protocol::realtime::LISTEN_PARAMETERS, "modules"),
            (sa_protocol::realtime::LISTEN_PARAMETERS, "devids"),
            (sa_protocol::realtime::LISTEN_ACTIVITY_QUANTITY, "modules"),
            (sa_protocol::realtime::LISTEN_ACTIVITY_QUANTITY, "devids"),
        ] {
            let mut payload = serde_json::Map::new();
            payload.insert(
                value_key.to_string(),
                serde_json::Value::Array(
                    modules.iter().cloned().map(serde_json::Value::String).collect(),
                ),
            );
            if let Some(gid) = group_id {
                payload.insert("group_id".to_string(), serde_json::json!(gid));
            }
            let frame = Frame::encode_event(key, &[serde_json::Value::Object(payload)]);
            let _ = tx.send(frame);
        }
    }

    /// Runs the connect/reconnect loop until `shutdown` is cancelled.
    /// `on_event` receives every forwarded named event.
    pub async fn run<F>(self: Arc<Self>, shutdown: CancellationToken, on_event: F)
    where
        F: Fn(SocketEvent) + Send + Sync + 'static,
    {
        let on_event: Arc<dyn Fn(SocketEvent) + Send + Sync> = Arc::new(on_event);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let result = tokio::select! {
                r = self.connect_and_run(on_event.clone()) => r,
                _ = shutdown.cancelled() => return,
            };

            *self.outbound.lock() = None;
            *self.engine_sid.lock() = None;
            *self.namespace_sid.lock() = None;

            match result {
                Ok(()) => {
                    tracing::info!("realtime connection closed gracefully");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "realtime connection lost");
                }
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                tracing::error!(attempts = attempt, "realtime reconnect attempts exhausted");
                return;
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return,
            }
            attempt += 1;
        }
    }

    /// Builds the connect request: the bearer token plus `Origin`/
    /// `Referer`/`App-Version` headers, per spec.md §4.B's connect
    /// contract.
    fn build_request(&self) -> Result<Request, RealtimeError> {
        let mut request = self
            .ws_url
            .clone()
            .into_client_request()
            .map_err(RealtimeError::WebSocket)?;
        let headers = request.headers_mut();
        if let Some(token) = self.token_provider.lock().as_ref().and_then(|f| f()) {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert("Authorization", value);
            }
        }
        if let Some(origin) = &self.headers.origin {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert("Origin", value);
            }
        }
        if let Some(referer) = &self.headers.referer {
            if let Ok(value) = HeaderValue::from_str(referer) {
                headers.insert("Referer", value);
            }
        }
        if let Some(app_version) = &self.headers.app_version {
            if let Ok(value) = HeaderValue::from_str(app_version) {
                headers.insert("App-Version", value);
            }
        }
        Ok(request)
    }

    async fn connect_and_run(
        &self,
        on_event: Arc<dyn Fn(SocketEvent) + Send + Sync>,
    ) -> Result<(), RealtimeError> {
        let request = self.build_request()?;
        let (ws, _resp) = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| RealtimeError::HandshakeTimeout)??;

        let (mut sink, mut stream) = ws.split();

        // Wait for the engine-level `0` open frame, which carries the
        // Engine.IO transport session id.
        let open = tokio::time::timeout(self.handshake_timeout, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Some(frame) = Frame::parse(&text) {
                        if frame.engine == EnginePacketType::Open {
                            return Ok(frame.payload);
                        }
                    }
                }
            }
            Err(RealtimeError::Closed)
        })
        .await
        .map_err(|_| RealtimeError::HandshakeTimeout)??;
        *self.engine_sid.lock() = extract_sid(&open);
        tracing::debug!(open = %open, "engine.io transport open");

        // Join the default namespace and wait for its connect ack, which
        // carries the Socket.IO namespace session id — spec.md §4.B's
        // "namespace-joined signal".
        sink.send(Message::Text(Frame::encode_socket(SocketPacketType::Connect, "")))
            .await?;

        let ack = tokio::time::timeout(self.handshake_timeout, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Some(frame) = Frame::parse(&text) {
                        if frame.engine == EnginePacketType::Message
                            && frame.socket == Some(SocketPacketType::Connect)
                        {
                            return Ok(frame.payload);
                        }
                    }
                }
            }
            Err(RealtimeError::Closed)
        })
        .await
        .map_err(|_| RealtimeError::HandshakeTimeout)??;
        *self.namespace_sid.lock() = extract_sid(&ack);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock() = Some(outbound_tx.clone());

        let writer_task = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        // Settle grace period mirrors `api/ws.py::connect`'s 100ms pause
        // before the caller is considered fully connected.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.resubscribe();
        for cb in self.on_connected.lock().iter() {
            cb();
        }

        while let Some(msg) = stream.next().await {
            let msg = msg?;
            match msg {
                Message::Text(text) => {
                    let Some(frame) = Frame::parse(&text) else {
                        continue;
                    };
                    match frame.engine {
                        EnginePacketType::Ping => {
                            let _ = outbound_tx.send(Frame::encode_engine(EnginePacketType::Pong, ""));
                        }
                        EnginePacketType::Message if frame.socket == Some(SocketPacketType::Event) => {
                            if let Some(event) = SocketEvent::parse(&frame.payload) {
                                if is_forwarded_event(&event.name) {
                                    on_event(event);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        writer_task.abort();
        Ok(())
    }
}

/// Pulls `sid` out of an Engine.IO/Socket.IO handshake payload
/// (`{"sid":"...", ...}`), if present.
fn extract_sid(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get("sid")?.as_str().map(str::to_string)
}

fn is_forwarded_event(name: &str) -> bool {
    matches!(
        name,
        sa_protocol::realtime::EVENT_SNAPSHOT
            | sa_protocol::realtime::EVENT_APP_MODULES_PARAMETERS_CHANGE
            | sa_protocol::realtime::EVENT_MODULES_PARAMETERS_CHANGE
            | sa_protocol::realtime::EVENT_PARAMETERS_CHANGE
            | sa_protocol::realtime::EVENT_TASK_CREATED
            | sa_protocol::realtime::EVENT_TASK_STATUS_CHANGED
            | sa_protocol::realtime::EVENT_TASK_COMPLETED
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_without_connection_does_not_panic() {
        let channel = RealtimeChannel::new("ws://localhost/socket.io");
        channel.subscribe(vec!["dev-1".into()], Some(7));
        assert_eq!(channel.subscription.lock().modules, vec!["dev-1".to_string()]);
    }

    #[test]
    fn resubscribe_is_noop_when_subscription_empty() {
        let channel = RealtimeChannel::new("ws://localhost/socket.io");
        // Should not panic even with no outbound sender and empty subscription.
        channel.resubscribe();
    }

    #[test]
    fn forwards_named_events_but_not_unknown_ones() {
        assert!(is_forwarded_event("snapshot"));
        assert!(is_forwarded_event("app:module:task:created"));
        assert!(!is_forwarded_event("something:else"));
    }

    #[test]
    fn extracts_sid_from_handshake_payload() {
        assert_eq!(
            extract_sid(r#"{"sid":"abc123","upgrades":[]}"#).as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_sid(r#"{"no_sid":true}"#), None);
        assert_eq!(extract_sid("not json"), None);
    }

    #[test]
    fn no_sids_before_first_connect() {
        let channel = RealtimeChannel::new("ws://localhost/socket.io");
        assert!(channel.engine_sid().is_none());
        assert!(channel.namespace_sid().is_none());
    }

    #[test]
    fn build_request_applies_auth_and_static_headers() {
        let channel = RealtimeChannel::new("ws://localhost/socket.io")
            .with_auth(Arc::new(|| Some("tok-1".to_string())))
            .with_headers(RealtimeHeaders {
                origin: Some("https://app.example".into()),
                referer: Some("https://app.example/".into()),
                app_version: Some("1.2.3".into()),
            });
        let request = channel.build_request().unwrap();
        assert_eq!(request.headers().get("Authorization").unwrap(), "Bearer tok-1");
        assert_eq!(request.headers().get("App-Version").unwrap(), "1.2.3");
    }
}
