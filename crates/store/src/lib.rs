//! `ParamStore`: the last-known-value cache for every register family,
//! keyed by `(pool, idx)`. Grounded on
//! `examples/original_source/src/pybragerone/models/param_store.py`
//! (`ParamStore` / `ParamFamilyModel`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sa_bus::EventBus;
use sa_protocol::{Address, Channel, ParamMeta, ParamUpdate};
use serde_json::Value;

/// All known channel values for one `(pool, idx)` register family.
#[derive(Debug, Clone, Default)]
pub struct ParamFamily {
    pub pool: String,
    pub idx: u32,
    pub channels: HashMap<Channel, Value>,
    pub meta: HashMap<Channel, ParamMeta>,
}

impl ParamFamily {
    fn new(pool: String, idx: u32) -> Self {
        ParamFamily {
            pool,
            idx,
            channels: HashMap::new(),
            meta: HashMap::new(),
        }
    }

    /// The value channel if present, else falls back to whichever channel
    /// was set first — mirrors `_mapping_primary_address`'s preference for
    /// the `v` channel with `s` as the common secondary address for
    /// status-only symbols.
    pub fn primary_value(&self) -> Option<&Value> {
        self.channels
            .get(&Channel::Value)
            .or_else(|| self.channels.get(&Channel::Status))
    }
}

/// Guarded map of every parameter family the client has observed, plus
/// helpers to ingest bulk "prime" snapshots and fan individual updates out
/// through an `EventBus`.
#[derive(Default)]
pub struct ParamStore {
    families: Mutex<HashMap<(String, u32), ParamFamily>>,
}

impl ParamStore {
    pub fn new() -> Self {
        ParamStore {
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Records a single channel value, returning the update that was
    /// applied (callers that also hold an `EventBus` typically publish it;
    /// see [`Self::upsert_and_publish`]).
    pub fn upsert(
        &self,
        devid: &str,
        address: &Address,
        value: Value,
        meta: Option<ParamMeta>,
    ) -> ParamUpdate {
        let key = (address.pool.clone(), address.idx);
        let mut families = self.families.lock();
        let family = families
            .entry(key)
            .or_insert_with(|| ParamFamily::new(address.pool.clone(), address.idx));
        family.channels.insert(address.chan, value.clone());
        if let Some(m) = meta.clone() {
            family.meta.insert(address.chan, m);
        }
        ParamUpdate {
            devid: devid.to_string(),
            pool: address.pool.clone(),
            chan: address.chan,
            idx: address.idx,
            value,
            meta,
            seq: 0,
        }
    }

    /// Convenience wrapper that upserts into the store and publishes the
    /// resulting update on the given bus in one call.
    pub fn upsert_and_publish(
        &self,
        bus: &Arc<EventBus>,
        devid: &str,
        address: &Address,
        value: Value,
        meta: Option<ParamMeta>,
    ) {
        let update = self.upsert(devid, address, value, meta);
        bus.publish(update);
    }

    pub fn get_family(&self, pool: &str, idx: u32) -> Option<ParamFamily> {
        self.families
            .lock()
            .get(&(pool.to_string(), idx))
            .cloned()
    }

    /// Flattens the entire store into `(Address, Value)` pairs, one per
    /// populated channel, in no particular order.
    pub fn flatten(&self) -> Vec<(Address, Value)> {
        let families = self.families.lock();
        let mut out = Vec::new();
        for family in families.values() {
            for (chan, value) in &family.channels {
                out.push((
                    Address {
                        pool: family.pool.clone(),
                        chan: *chan,
                        idx: family.idx,
                    },
                    value.clone(),
                ));
            }
        }
        out
    }

    /// Bulk-loads an initial snapshot ("prime"), shaped as a flat JSON
    /// object mapping address strings (`"P1.v66"`) to either a bare value
    /// or an object carrying `value` plus the recognized metadata keys.
    pub fn ingest_prime(&self, devid: &str, snapshot: &Value) -> Vec<ParamUpdate> {
        let mut updates = Vec::new();
        let Some(map) = snapshot.as_object() else {
            return updates;
        };
        for (addr_str, entry) in map {
            let Ok(address) = addr_str.parse::<Address>() else {
                tracing::debug!(address = %addr_str, "skipping unparseable prime address");
                continue;
            };
            let (value, meta) = match entry {
                Value::Object(obj) if obj.contains_key("value") => {
                    (obj.get("value").cloned().unwrap_or(Value::Null), ParamMeta::extract(obj))
                }
                other => (other.clone(), None),
            };
            updates.push(self.upsert(devid, &address, value, meta));
        }
        updates
    }

    /// Like [`Self::ingest_prime`] but also publishes every resulting
    /// update on the given bus, so any other bus subscriber observes the
    /// prime too.
    pub fn ingest_prime_and_publish(&self, bus: &Arc<EventBus>, devid: &str, snapshot: &Value) {
        for update in self.ingest_prime(devid, snapshot) {
            bus.publish(update);
        }
    }

    /// Applies one already-sequenced update directly, without going
    /// through the bus. Ignores meta-only updates (`value` is `null`),
    /// per spec.md §4.D's bus-coupling contract.
    fn apply(&self, update: &ParamUpdate) {
        if update.value.is_null() {
            return;
        }
        let key = (update.pool.clone(), update.idx);
        let mut families = self.families.lock();
        let family = families
            .entry(key)
            .or_insert_with(|| ParamFamily::new(update.pool.clone(), update.idx));
        family.channels.insert(update.chan, update.value.clone());
        if let Some(m) = &update.meta {
            family.meta.insert(update.chan, m.clone());
        }
    }

    /// Spawns a task that subscribes to `bus` and applies every update to
    /// this store as it arrives, exactly as spec.md §4.D's
    /// `run_with_bus(bus)` describes: this is the consumer half of the
    /// "Realtime Channel -> Gateway -> Event Bus -> Parameter Store"
    /// steady-state data flow (spec.md §2). Stops when `shutdown` is
    /// cancelled or the bus's sender side is dropped.
    pub fn run_with_bus(
        self: Arc<Self>,
        bus: Arc<EventBus>,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut updates = bus.subscribe();
            loop {
                tokio::select! {
                    next = updates.next() => {
                        match next {
                            Some(update) => self.apply(&update),
                            None => break,
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_then_get_family_round_trips() {
        let store = ParamStore::new();
        let addr: Address = "P1.v66".parse().unwrap();
        store.upsert("dev-1", &addr, json!(12.3), None);
        let family = store.get_family("1", 66).unwrap();
        assert_eq!(family.channels.get(&Channel::Value), Some(&json!(12.3)));
    }

    #[test]
    fn flatten_covers_every_populated_channel() {
        let store = ParamStore::new();
        store.upsert("dev-1", &"P1.v66".parse().unwrap(), json!(1), None);
        store.upsert("dev-1", &"P1.s66".parse().unwrap(), json!(true), None);
        let flat = store.flatten();
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn ingest_prime_parses_value_objects_and_bare_values() {
        let store = ParamStore::new();
        let snapshot = json!({
            "P1.v66": {"value": 5, "storable": true},
            "P1.s66": true,
            "not-an-address": 1,
        });
        let updates = store.ingest_prime("dev-1", &snapshot);
        assert_eq!(updates.len(), 2);
        let family = store.get_family("1", 66).unwrap();
        assert_eq!(family.channels.get(&Channel::Status), Some(&json!(true)));
        assert!(family.meta.get(&Channel::Value).unwrap().storable == Some(true));
    }

    #[tokio::test]
    async fn ingest_prime_and_publish_publishes_every_update() {
        use futures_util::StreamExt;
        let store = ParamStore::new();
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let snapshot = json!({"P1.v66": 1, "P1.v67": 2});
        store.ingest_prime_and_publish(&bus, "dev-1", &snapshot);
        let a = rx.next().await.unwrap();
        let b = rx.next().await.unwrap();
        assert_ne!(a.seq, b.seq);
    }

    #[tokio::test]
    async fn run_with_bus_applies_updates_published_elsewhere() {
        let store = Arc::new(ParamStore::new());
        let bus = Arc::new(EventBus::new());
        let shutdown = tokio_util::sync::CancellationToken::new();
        let task = store.clone().run_with_bus(bus.clone(), shutdown.clone());

        let addr: Address = "P1.v66".parse().unwrap();
        bus.publish(ParamUpdate {
            devid: "dev-1".into(),
            pool: addr.pool.clone(),
            chan: addr.chan,
            idx: addr.idx,
            value: json!(42),
            meta: None,
            seq: 0,
        });

        // Give the spawned consumer a turn to observe the publish.
        for _ in 0..50 {
            if store.get_family("1", 66).is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            store.get_family("1", 66).unwrap().channels.get(&Channel::Value),
            Some(&json!(42))
        );

        shutdown.cancel();
        let _ = task.await;
    }

    #[tokio::test]
    async fn run_with_bus_ignores_meta_only_updates() {
        let store = Arc::new(ParamStore::new());
        let bus = Arc::new(EventBus::new());
        let shutdown = tokio_util::sync::CancellationToken::new();
        let task = store.clone().run_with_bus(bus.clone(), shutdown.clone());

        bus.publish(ParamUpdate {
            devid: "dev-1".into(),
            pool: "1".into(),
            chan: Channel::Value,
            idx: 99,
            value: Value::Null,
            meta: None,
            seq: 0,
        });
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(store.get_family("1", 99).is_none());

        shutdown.cancel();
        let _ = task.await;
    }
}
