//! Broadcast bus for occupancy readings.
//!
//! Uses [`tokio::sync::broadcast`] so that every subscriber receives every
//! reading without a slow subscriber blocking the workers. A subscriber that
//! falls more than `capacity` readings behind loses the oldest ones.

use occusense_types::ReadingEvent;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered readings before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared reading bus. Clone it cheaply – all clones share the same
/// underlying channel.
#[derive(Clone, Debug)]
pub struct ReadingBus {
    sender: broadcast::Sender<ReadingEvent>,
}

impl ReadingBus {
    /// Create a new bus buffering up to `capacity` readings (at least one).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `event` to every current subscriber.
    ///
    /// Returns the number of subscribers that were handed the reading; `0`
    /// when nobody is listening, which is a normal condition.
    pub fn publish(&self, event: ReadingEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to readings from every stream.
    pub fn subscribe(&self) -> ReadingReceiver {
        ReadingReceiver {
            stream_prefix: None,
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to readings whose `stream_id` starts with `prefix`.
    pub fn subscribe_streams(&self, prefix: impl Into<String>) -> ReadingReceiver {
        ReadingReceiver {
            stream_prefix: Some(prefix.into()),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReadingBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A subscriber on the [`ReadingBus`], optionally filtered by stream prefix.
pub struct ReadingReceiver {
    stream_prefix: Option<String>,
    receiver: broadcast::Receiver<ReadingEvent>,
}

impl ReadingReceiver {
    /// Wait for the next matching reading.
    ///
    /// Returns `None` once every bus handle has been dropped. Readings lost
    /// to lag are logged and skipped.
    pub async fn recv(&mut self) -> Option<ReadingEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = ?self.stream_prefix, lagged_by = n, "ReadingReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, event: &ReadingEvent) -> bool {
        self.stream_prefix
            .as_deref()
            .is_none_or(|prefix| event.stream_id.starts_with(prefix))
    }
}
