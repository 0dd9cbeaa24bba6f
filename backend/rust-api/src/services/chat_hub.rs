use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::sync::RwLock;

/// Fan-out capacity per chat group. Slow consumers that fall this far
/// behind miss messages rather than stalling the senders.
const GROUP_CAPACITY: usize = 64;

/// In-process broadcast registry keyed by chat id. One sender per active
/// chat; subscribers are websocket sessions. Groups with no live receivers
/// are dropped lazily on the next publish.
#[derive(Default)]
pub struct ChatHub {
    groups: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the group for `chat_id`, creating it on first subscribe.
    pub async fn subscribe(&self, chat_id: &str) -> broadcast::Receiver<String> {
        let mut groups = self.groups.write().await;
        groups
            .entry(chat_id.to_string())
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a serialized message envelope to every live subscriber of
    /// the chat group. Returns the number of receivers the message reached.
    pub async fn publish(&self, chat_id: &str, payload: String) -> usize {
        let delivered = {
            let groups = self.groups.read().await;
            match groups.get(chat_id) {
                Some(sender) => sender.send(payload).unwrap_or(0),
                None => 0,
            }
        };
        if delivered == 0 {
            self.prune(chat_id).await;
        }
        delivered
    }

    async fn prune(&self, chat_id: &str) {
        let mut groups = self.groups.write().await;
        if let Some(sender) = groups.get(chat_id) {
            if sender.receiver_count() == 0 {
                groups.remove(chat_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let hub = ChatHub::new();
        let mut rx = hub.subscribe("chat-1").await;

        let delivered = hub.publish("chat-1", "hello".to_string()).await;
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let hub = ChatHub::new();
        let delivered = hub.publish("chat-ghost", "lost".to_string()).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let hub = ChatHub::new();
        let mut rx_a = hub.subscribe("chat-a").await;
        let mut rx_b = hub.subscribe("chat-b").await;

        hub.publish("chat-a", "only-a".to_string()).await;

        assert_eq!(rx_a.recv().await.unwrap(), "only-a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_group_is_pruned_after_publish() {
        let hub = ChatHub::new();
        {
            let _rx = hub.subscribe("chat-x").await;
        }
        hub.publish("chat-x", "after-drop".to_string()).await;
        assert!(!hub.groups.read().await.contains_key("chat-x"));
    }
}
