//! `EventBus`: a multi-subscriber fan-out for `ParamUpdate`s.
//!
//! No teacher analog exists for a pub/sub bus specifically (node-sdk talks
//! to exactly one gateway), so this follows the channel-per-subscriber
//! idiom used throughout the teacher's async code (e.g. node-sdk's writer
//! task) generalized to many subscribers.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sa_protocol::ParamUpdate;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Fans out `ParamUpdate`s to any number of subscribers, assigning each
/// update a monotonically increasing sequence number before it ships.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ParamUpdate>>>,
    seq: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Registers a new subscriber and returns a stream of updates it will
    /// receive from this point forward.
    pub fn subscribe(&self) -> UnboundedReceiverStream<ParamUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Assigns the next sequence number and fans the update out to every
    /// live subscriber. Subscribers whose receiver has been dropped are
    /// removed opportunistically.
    pub fn publish(&self, mut update: ParamUpdate) {
        update.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Number of currently live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use sa_protocol::Channel;
    use serde_json::json;

    fn update() -> ParamUpdate {
        ParamUpdate {
            devid: "dev-1".into(),
            pool: "1".into(),
            chan: Channel::Value,
            idx: 66,
            value: json!(42),
            meta: None,
            seq: 0,
        }
    }

    #[tokio::test]
    async fn publish_assigns_increasing_seq() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(update());
        bus.publish(update());
        let first = rx.next().await.unwrap();
        let second = rx.next().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(update());
        assert_eq!(rx1.next().await.unwrap().idx, 66);
        assert_eq!(rx2.next().await.unwrap().idx, 66);
    }

    #[tokio::test]
    async fn drops_dead_subscribers_on_publish() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(update());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
