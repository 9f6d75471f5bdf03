// Homewatch - Home monitoring telemetry pipeline
//
// Copyright 2026 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Raw payload received by one of the inbound adapters along with the time it
/// was received, in nanoseconds since the UNIX epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub payload: Bytes,
    pub received_at: i64,
}

impl InboundMessage {
    pub fn new(payload: Bytes, received_at: i64) -> Self {
        InboundMessage { payload, received_at }
    }

    /// Create a new message stamped with the current wall clock time.
    pub fn now(payload: Bytes) -> Self {
        Self::new(payload, unix_nanos())
    }
}

/// Current time as nanoseconds since the UNIX epoch, or zero if the system
/// clock is set before the epoch.
pub fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Error returned when enqueuing after the consuming side of the queue has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue receiver has been dropped")]
pub struct QueueClosed;

/// Create a new unbounded FIFO queue with any number of producers and a single consumer.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer side of a queue. Cheap to clone, one per adapter (or per request).
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: UnboundedSender<T>,
}

impl<T> QueueSender<T> {
    /// Add an item to the back of the queue without waiting. There is no upper
    /// bound on the number of items that may be waiting.
    pub fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).map_err(|_| QueueClosed)
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        QueueSender { tx: self.tx.clone() }
    }
}

/// Consumer side of a queue.
///
/// There is exactly one receiver per queue. It's owned by whatever supervises the
/// consumer so that items still waiting survive a restart of the consumer.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: UnboundedReceiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item in the queue. Returns `None` only once every sender
    /// has been dropped and the queue is empty.
    pub async fn dequeue(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod test {
    use super::{channel, InboundMessage, QueueClosed};
    use bytes::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dequeue_fifo_order() {
        let (tx, mut rx) = channel();
        for i in 0..10 {
            tx.enqueue(InboundMessage::new(Bytes::from(format!("msg-{}", i)), i)).unwrap();
        }

        for i in 0..10 {
            let msg = rx.dequeue().await.unwrap();
            assert_eq!(i, msg.received_at);
            assert_eq!(Bytes::from(format!("msg-{}", i)), msg.payload);
        }
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_item() {
        let (tx, mut rx) = channel::<u32>();
        let consumer = tokio::spawn(async move { rx.dequeue().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!consumer.is_finished());

        tx.enqueue(42).unwrap();
        assert_eq!(Some(42), consumer.await.unwrap());
    }

    #[tokio::test]
    async fn test_dequeue_multiple_producers() {
        let (tx, mut rx) = channel::<(u32, u32)>();
        let mut handles = Vec::new();

        for producer in 0..4 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    tx.enqueue((producer, i)).unwrap();
                }
            }));
        }

        for h in handles {
            h.await.unwrap();
        }
        drop(tx);

        let mut last = [None; 4];
        let mut count = 0;
        while let Some((producer, i)) = rx.dequeue().await {
            // Order from each individual producer is preserved
            if let Some(prev) = last[producer as usize] {
                assert!(i > prev);
            }
            last[producer as usize] = Some(i);
            count += 1;
        }

        assert_eq!(400, count);
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (tx, rx) = channel::<u32>();
        drop(rx);

        let err = tx.enqueue(1).unwrap_err();
        assert_eq!(QueueClosed, err);
        assert_eq!("queue receiver has been dropped", err.to_string());
    }

    #[test]
    fn test_inbound_message_now() {
        let msg = InboundMessage::now(Bytes::from_static(b"{}"));
        assert!(msg.received_at > 0);
    }
}
