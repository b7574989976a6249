//! Publish/Subscribe Fan-Out
//!
//! Channels map to the connections subscribed to them. The manager holds
//! only `Weak` references, so a dropped connection can never be kept alive
//! by a forgotten subscription; dead entries are pruned on the next publish.
//!
//! Publishing collects the live subscribers under the lock, releases it,
//! then pushes the framed message onto each subscriber's bounded outbound
//! queue. Nothing here ever waits on a socket.

use crate::connection::{ClientHandle, ConnectionId};
use crate::protocol::Reply;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

type Subscribers = HashMap<ConnectionId, Weak<ClientHandle>>;

/// Channel registry and message fan-out.
#[derive(Debug, Default)]
pub struct PubSubManager {
    channels: Mutex<HashMap<String, Subscribers>>,
}

impl PubSubManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Subscribers>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes `client` to `channel`. Idempotent; returns `true` if the
    /// subscription is new.
    pub fn subscribe(&self, channel: &str, client: &Arc<ClientHandle>) -> bool {
        self.lock()
            .entry(channel.to_string())
            .or_default()
            .insert(client.id(), Arc::downgrade(client))
            .is_none()
    }

    /// Removes one subscription. Idempotent; returns `true` if it existed.
    ///
    /// A channel left without subscribers is removed.
    pub fn unsubscribe(&self, channel: &str, id: ConnectionId) -> bool {
        let mut channels = self.lock();
        let Some(subscribers) = channels.get_mut(channel) else {
            return false;
        };

        let removed = subscribers.remove(&id).is_some();
        if subscribers.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Drops `id` from every channel. Returns how many subscriptions it held.
    pub fn remove_client(&self, id: ConnectionId) -> usize {
        let mut channels = self.lock();
        let mut removed = 0;
        channels.retain(|_, subscribers| {
            if subscribers.remove(&id).is_some() {
                removed += 1;
            }
            !subscribers.is_empty()
        });
        removed
    }

    /// Delivers `message` to every live subscriber of `channel`.
    ///
    /// Returns the number of subscribers whose queue accepted the message.
    /// A full or closed queue is a failed delivery only; the subscription
    /// stays and the remaining subscribers are still served.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        let subscribers: Vec<Arc<ClientHandle>> = {
            let mut channels = self.lock();
            let Some(entries) = channels.get_mut(channel) else {
                return 0;
            };

            entries.retain(|_, weak| weak.strong_count() > 0);
            let live: Vec<Arc<ClientHandle>> = entries.values().filter_map(Weak::upgrade).collect();
            if entries.is_empty() {
                channels.remove(channel);
            }
            live
        };

        if subscribers.is_empty() {
            return 0;
        }

        let frame = Reply::message(channel, message).serialize();
        let mut delivered = 0;
        for subscriber in &subscribers {
            if subscriber.push(frame.clone()) {
                delivered += 1;
            } else {
                warn!(
                    channel = %channel,
                    client = %subscriber.addr(),
                    "Failed to deliver message, outbound queue full or closed"
                );
            }
        }

        debug!(
            channel = %channel,
            subscribers = subscribers.len(),
            delivered = delivered,
            "Published message"
        );
        delivered
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of subscribers on one channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ClientInbox, ConnectionRegistry};
    use bytes::Bytes;

    fn client(registry: &ConnectionRegistry) -> (Arc<ClientHandle>, ClientInbox) {
        registry.register("127.0.0.1:6000".parse().unwrap())
    }

    #[test]
    fn test_publish_without_subscribers() {
        let pubsub = PubSubManager::new();
        assert_eq!(pubsub.publish("news", "hello"), 0);
        assert_eq!(pubsub.channel_count(), 0);
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (a, mut inbox_a) = client(&registry);
        let (b, mut inbox_b) = client(&registry);

        assert!(pubsub.subscribe("news", &a));
        assert!(pubsub.subscribe("news", &b));
        assert!(!pubsub.subscribe("news", &a));
        assert_eq!(pubsub.subscriber_count("news"), 2);

        assert_eq!(pubsub.publish("news", "hello"), 2);

        let expected = Bytes::from_static(b"[MESSAGE news] hello\nEND\n");
        assert_eq!(inbox_a.messages.try_recv().unwrap(), expected);
        assert_eq!(inbox_b.messages.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (a, mut inbox) = client(&registry);
        pubsub.subscribe("ch", &a);

        for i in 0..5 {
            pubsub.publish("ch", &i.to_string());
        }
        for i in 0..5 {
            let frame = inbox.messages.try_recv().unwrap();
            assert_eq!(frame, Bytes::from(format!("[MESSAGE ch] {}\nEND\n", i)));
        }
    }

    #[test]
    fn test_unsubscribe_removes_empty_channel() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (a, _inbox) = client(&registry);

        pubsub.subscribe("news", &a);
        assert!(pubsub.unsubscribe("news", a.id()));
        assert!(!pubsub.unsubscribe("news", a.id()));
        assert_eq!(pubsub.channel_count(), 0);
        assert_eq!(pubsub.publish("news", "hello"), 0);
    }

    #[test]
    fn test_remove_client_from_all_channels() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (a, _inbox_a) = client(&registry);
        let (b, _inbox_b) = client(&registry);

        pubsub.subscribe("one", &a);
        pubsub.subscribe("two", &a);
        pubsub.subscribe("two", &b);

        assert_eq!(pubsub.remove_client(a.id()), 2);
        assert_eq!(pubsub.channel_count(), 1);
        assert_eq!(pubsub.subscriber_count("two"), 1);
    }

    #[test]
    fn test_dropped_client_is_pruned() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (a, _inbox) = client(&registry);

        pubsub.subscribe("news", &a);
        registry.deregister(a.id());
        drop(a);

        assert_eq!(pubsub.publish("news", "hello"), 0);
        assert_eq!(pubsub.channel_count(), 0);
    }

    #[test]
    fn test_full_queue_does_not_block_others() {
        let registry = ConnectionRegistry::new();
        let pubsub = PubSubManager::new();
        let (slow, _slow_inbox) = client(&registry);
        let (fast, mut fast_inbox) = client(&registry);

        pubsub.subscribe("ch", &slow);
        pubsub.subscribe("ch", &fast);

        for _ in 0..crate::connection::OUTBOUND_QUEUE_CAPACITY {
            slow.push(Bytes::from_static(b"filler"));
        }

        assert_eq!(pubsub.publish("ch", "hi"), 1);
        assert_eq!(pubsub.subscriber_count("ch"), 2);
        assert!(fast_inbox.messages.try_recv().is_ok());
    }
}
