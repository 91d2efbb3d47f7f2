//! `Gateway`: wires a `HttpClient` and a `RealtimeChannel` into the running
//! system described by spec.md §4.H — discover a site's modules, connect and
//! subscribe the realtime channel, prime the `ParamStore` from REST, and keep
//! both in sync across reconnects. Grounded on
//! `examples/original_source/src/pybragerone/gateway.py` (`Gateway`).

use std::sync::Arc;

use parking_lot::Mutex;
use sa_assets::AssetCatalog;
use sa_bus::EventBus;
use sa_domain::config::GatewayConfig;
use sa_domain::{Error, Result};
use sa_http::HttpClient;
use sa_i18n::I18nResolver;
use sa_protocol::realtime::{
    EVENT_APP_MODULES_PARAMETERS_CHANGE, EVENT_MODULES_PARAMETERS_CHANGE, EVENT_PARAMETERS_CHANGE,
};
use sa_protocol::{Address, ParamMeta, ParamUpdate, SocketEvent};
use sa_realtime::RealtimeChannel;
use sa_resolver::ParamResolver;
use sa_store::ParamStore;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// Owns the full set of live services for one connected site: the realtime
/// channel, the parameter store it feeds, and the asset/i18n/resolver stack
/// built on top of them.
pub struct Gateway {
    http: Arc<HttpClient>,
    realtime: Arc<RealtimeChannel>,
    bus: Arc<EventBus>,
    store: Arc<ParamStore>,
    assets: Arc<AssetCatalog>,
    i18n: Arc<I18nResolver>,
    resolver: Arc<ParamResolver>,
    config: GatewayConfig,
    devids: Mutex<Vec<String>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(
        http: Arc<HttpClient>,
        realtime: Arc<RealtimeChannel>,
        config: GatewayConfig,
        default_lang: Option<String>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ParamStore::new());
        let assets = Arc::new(AssetCatalog::new(http.clone()));
        let i18n = Arc::new(I18nResolver::new(assets.clone(), default_lang));
        let resolver = Arc::new(ParamResolver::new(store.clone(), assets.clone(), i18n.clone()));

        Arc::new(Gateway {
            http,
            realtime,
            bus,
            store,
            assets,
            i18n,
            resolver,
            config,
            devids: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<ParamStore> {
        &self.store
    }

    pub fn assets(&self) -> &Arc<AssetCatalog> {
        &self.assets
    }

    pub fn i18n(&self) -> &Arc<I18nResolver> {
        &self.i18n
    }

    pub fn resolver(&self) -> &Arc<ParamResolver> {
        &self.resolver
    }

    pub fn devids(&self) -> Vec<String> {
        self.devids.lock().clone()
    }

    /// Looks up the modules attached to `config.object_id` and records their
    /// device ids as the subscription/prime target set.
    async fn discover_devices(&self) -> Result<Vec<String>> {
        let object_id = self.config.object_id.ok_or(GatewayError::MissingObjectId)?;
        let modules = self.http.list_modules(object_id).await?;
        let devids: Vec<String> = modules.into_iter().map(|m| m.devid).collect();
        if devids.is_empty() {
            return Err(GatewayError::NoModulesForObject { object_id }.into());
        }
        *self.devids.lock() = devids.clone();
        Ok(devids)
    }

    /// Runs the start sequence from spec.md §4.H:
    /// 1. `ensure_auth`. 2. open the realtime channel. 3-5. bind, subscribe,
    /// and prime, performed by [`Self::bind_subscribe_and_prime`] once the
    /// first connect completes. Returns once that first cycle has run (or
    /// failed); every later reconnect re-runs steps 3-5 on its own, via the
    /// `on_connected` hook registered here.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.http.ensure_auth().await?;

        if self.devids.lock().is_empty() {
            self.discover_devices().await?;
        }

        self.tasks
            .lock()
            .push(self.store.clone().run_with_bus(self.bus.clone(), self.shutdown.clone()));

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();
        let ready_tx = Arc::new(Mutex::new(Some(ready_tx)));

        {
            let gateway = self.clone();
            let ready_tx = ready_tx.clone();
            self.realtime.on_connected(Arc::new(move || {
                let gateway = gateway.clone();
                let ready_tx = ready_tx.clone();
                tokio::spawn(async move {
                    let result = gateway.bind_subscribe_and_prime().await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "post-connect bind/subscribe/prime failed");
                    }
                    if let Some(tx) = ready_tx.lock().take() {
                        let _ = tx.send(result);
                    }
                });
            }));
        }

        let realtime = self.realtime.clone();
        let shutdown = self.shutdown.clone();
        let gateway_for_events = self.clone();
        let run_task = tokio::spawn(async move {
            realtime
                .run(shutdown, move |event| {
                    let gateway = gateway_for_events.clone();
                    tokio::spawn(async move {
                        gateway.handle_event(event).await;
                    });
                })
                .await;
        });
        self.tasks.lock().push(run_task);

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(
                "realtime channel closed before completing its first connect".into(),
            )),
        }
    }

    /// Steps 3-5 of the start sequence, re-run verbatim after every
    /// reconnect (spec.md §4.H, "On reconnect"): negotiate `modules_connect`,
    /// subscribe, then prime. Subscription is always emitted before priming
    /// begins, per spec.md §5's ordering guarantee.
    async fn bind_subscribe_and_prime(&self) -> Result<()> {
        let devids = self.devids.lock().clone();
        if devids.is_empty() {
            return Ok(());
        }

        match (self.realtime.namespace_sid(), self.realtime.engine_sid()) {
            (Some(namespace_sid), Some(engine_sid)) => {
                let connected = self
                    .http
                    .modules_connect(&namespace_sid, &engine_sid, &devids, self.config.group_id)
                    .await?;
                if !connected {
                    return Err(GatewayError::ModulesConnectRejected.into());
                }
            }
            _ => {
                tracing::warn!("realtime channel reported no session ids; skipping modules_connect");
            }
        }

        // Step 4.
        self.realtime.subscribe(devids.clone(), self.config.group_id);

        // Step 5, in parallel.
        let (params, activity) = tokio::join!(
            self.http.modules_parameters_prime(&devids),
            self.http.modules_activity_quantity_prime(&devids),
        );
        self.ingest_prime_response(&params?);
        self.ingest_prime_response(&activity?);

        Ok(())
    }

    /// Flattens a prime response (`{devid: {"P<pool>": {"<chan><idx>": value}}}`,
    /// spec.md §6) per devid and loads it into the store, publishing one
    /// `ParamUpdate` per channel onto the bus.
    fn ingest_prime_response(&self, payload: &Value) {
        let Some(devices) = payload.as_object() else {
            return;
        };
        for (devid, pools) in devices {
            let flat = flatten_nested_pools(pools);
            self.store.ingest_prime_and_publish(&self.bus, devid, &flat);
        }
    }

    /// Handles one forwarded realtime event. Only the three
    /// `*:parameters:change` variants carry data this gateway understands;
    /// everything else is logged and dropped.
    async fn handle_event(&self, event: SocketEvent) {
        match event.name.as_str() {
            EVENT_APP_MODULES_PARAMETERS_CHANGE | EVENT_MODULES_PARAMETERS_CHANGE | EVENT_PARAMETERS_CHANGE => {
                for arg in &event.args {
                    for update in self.updates_from_change_payload(arg) {
                        self.log_state_diff(&update);
                        self.bus.publish(update);
                    }
                }
            }
            other => {
                tracing::debug!(event = other, "unhandled realtime event");
            }
        }
    }

    /// Turns one live `*:parameters:change` payload into the `ParamUpdate`s
    /// it carries. Publishing (not applying directly) keeps the
    /// "Realtime Channel -> Gateway -> Event Bus -> Parameter Store" flow
    /// from spec.md §2 intact: the store only ever learns of live changes
    /// through its own bus subscription (`ParamStore::run_with_bus`).
    fn updates_from_change_payload(&self, payload: &Value) -> Vec<ParamUpdate> {
        let mut updates = Vec::new();
        let Some(devices) = payload.as_object() else {
            return updates;
        };
        for (devid, pools) in devices {
            let Some(pools) = pools.as_object() else {
                continue;
            };
            for (pool, vars) in pools {
                let Some(vars) = vars.as_object() else {
                    continue;
                };
                for (var, entry) in vars {
                    let Ok(address) = format!("{pool}.{var}").parse::<Address>() else {
                        tracing::debug!(pool, var, "skipping unparseable change address");
                        continue;
                    };
                    let (value, meta) = match entry {
                        Value::Object(obj) if obj.contains_key("value") => {
                            (obj.get("value").cloned().unwrap_or(Value::Null), ParamMeta::extract(obj))
                        }
                        other => (other.clone(), None),
                    };
                    updates.push(ParamUpdate {
                        devid: devid.clone(),
                        pool: address.pool,
                        chan: address.chan,
                        idx: address.idx,
                        value,
                        meta,
                        seq: 0,
                    });
                }
            }
        }
        updates
    }

    /// Debug-logs the old -> new transition for a live update, mirroring
    /// `gateway.py::_on_ws_change`'s diagnostic diffing.
    fn log_state_diff(&self, update: &ParamUpdate) {
        let old = self
            .store
            .get_family(&update.pool, update.idx)
            .and_then(|family| family.channels.get(&update.chan).cloned());
        if old.as_ref() != Some(&update.value) {
            tracing::debug!(
                devid = %update.devid,
                pool = %update.pool,
                idx = update.idx,
                chan = ?update.chan,
                old = ?old,
                new = %update.value,
                "parameter change",
            );
        }
    }

    /// Cancels every background task, letting the realtime channel's
    /// reconnect loop and the store's bus consumer both observe the
    /// cancellation and return. `HttpClient` owns no resource that needs an
    /// explicit close beyond this (its underlying `reqwest::Client` is
    /// reference-counted and drops cleanly).
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Flattens a prime-response devid entry shaped `{"P4": {"v1": value}}` into
/// the flat `{"P4.v1": value}` shape `ParamStore::ingest_prime` expects.
fn flatten_nested_pools(pools: &Value) -> Value {
    let mut flat = serde_json::Map::new();
    if let Some(pools) = pools.as_object() {
        for (pool, vars) in pools {
            let Some(vars) = vars.as_object() else {
                continue;
            };
            for (var, entry) in vars {
                flat.insert(format!("{pool}.{var}"), entry.clone());
            }
        }
    }
    Value::Object(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_http::HttpClientConfig;
    use serde_json::json;

    fn gateway() -> Arc<Gateway> {
        let http = Arc::new(HttpClient::new(HttpClientConfig::new("https://example.invalid")).unwrap());
        let realtime = Arc::new(RealtimeChannel::new("wss://example.invalid/socket.io"));
        Gateway::new(http, realtime, GatewayConfig::default(), None)
    }

    #[test]
    fn flatten_nested_pools_builds_dotted_keys() {
        let nested = json!({"P4": {"v1": 5, "s1": true}});
        let flat = flatten_nested_pools(&nested);
        assert_eq!(flat, json!({"P4.v1": 5, "P4.s1": true}));
    }

    #[test]
    fn flatten_nested_pools_tolerates_non_object_input() {
        assert_eq!(flatten_nested_pools(&json!(null)), json!({}));
        assert_eq!(flatten_nested_pools(&json!({"P4": "not-an-object"})), json!({}));
    }

    #[test]
    fn updates_from_change_payload_extracts_every_channel() {
        let gateway = gateway();
        let payload = json!({
            "dev-1": {
                "P4": {
                    "v1": {"value": 12.5, "storable": true},
                    "s1": true,
                }
            }
        });
        let updates = gateway.updates_from_change_payload(&payload);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().any(|u| u.idx == 1 && u.pool == "4" && u.value == json!(12.5)));
    }

    #[test]
    fn updates_from_change_payload_skips_unparseable_addresses() {
        let gateway = gateway();
        let payload = json!({"dev-1": {"not-a-pool": {"v1": 1}}});
        assert!(gateway.updates_from_change_payload(&payload).is_empty());
    }

    #[tokio::test]
    async fn ingest_prime_response_publishes_onto_bus() {
        use futures_util::StreamExt;
        let gateway = gateway();
        let mut rx = gateway.bus().subscribe();
        let payload = json!({"dev-1": {"P4": {"v1": 1}}});
        gateway.ingest_prime_response(&payload);
        let update = rx.next().await.unwrap();
        assert_eq!(update.devid, "dev-1");
        assert_eq!(update.pool, "4");
        assert_eq!(update.idx, 1);
    }

    #[tokio::test]
    async fn start_fails_fast_without_object_id() {
        let gateway = gateway();
        let err = gateway.discover_devices().await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn devids_start_empty() {
        let gateway = gateway();
        assert!(gateway.devids().is_empty());
    }
}
