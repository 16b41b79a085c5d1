//! Metadata-ready notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::torrent::InfoHash;

const EVENT_CAPACITY: usize = 64;

/// Published once per successful background metadata resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReady {
    pub hash: InfoHash,
    pub title: String,
    pub peers: u32,
    pub seeders: u32,
    pub file_count: u32,
    pub total_size: u64,
}

/// Fan-out channel for [`MetadataReady`]. Publishing with no subscribers is
/// fine; slow subscribers miss old events rather than block publishers.
#[derive(Debug, Clone)]
pub struct MetadataEvents {
    tx: broadcast::Sender<MetadataReady>,
}

impl Default for MetadataEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: MetadataReady) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetadataReady> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u8) -> MetadataReady {
        MetadataReady {
            hash: InfoHash::from_bytes([n; 20]),
            title: format!("t{}", n),
            peers: 3,
            seeders: 1,
            file_count: 2,
            total_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let events = MetadataEvents::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();

        events.publish(event(1));

        assert_eq!(a.recv().await.unwrap(), event(1));
        assert_eq!(b.recv().await.unwrap(), event(1));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = MetadataEvents::new();
        events.publish(event(1));
    }
}
