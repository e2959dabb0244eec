//! Bounded pixel update queue.
//!
//! Many connection handlers enqueue writes; the frame cycle is the only
//! consumer. A full queue makes `enqueue` wait until the frame cycle drains
//! it, so a fast client is throttled instead of losing updates.

use crate::canvas::Pixel;
use thiserror::Error;
use tokio::sync::mpsc;

/// A pending write of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelUpdate {
    pub x: i32,
    pub y: i32,
    pub pixel: Pixel,
}

/// The consumer side of the queue was dropped.
#[derive(Debug, Error)]
#[error("pixel update queue closed")]
pub struct QueueClosed;

/// Create a queue holding at most `capacity` pending updates.
pub fn pixel_queue(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (UpdateSender { tx }, UpdateReceiver { rx })
}

/// Producer handle, one clone per connection.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<PixelUpdate>,
}

impl UpdateSender {
    /// Queue an update, waiting while the queue is full.
    pub async fn enqueue(&self, update: PixelUpdate) -> Result<(), QueueClosed> {
        self.tx.send(update).await.map_err(|_| QueueClosed)
    }
}

/// Consumer handle owned by the frame cycle.
#[derive(Debug)]
pub struct UpdateReceiver {
    rx: mpsc::Receiver<PixelUpdate>,
}

impl UpdateReceiver {
    /// Number of updates currently queued
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Take the updates queued right now, in FIFO order.
    ///
    /// Never waits: updates arriving while the drain is in progress are left
    /// for the next call.
    pub fn drain(&mut self) -> Drain<'_> {
        let remaining = self.rx.len();
        Drain {
            rx: &mut self.rx,
            remaining,
        }
    }
}

/// Iterator returned by [`UpdateReceiver::drain`].
pub struct Drain<'a> {
    rx: &'a mut mpsc::Receiver<PixelUpdate>,
    remaining: usize,
}

impl Iterator for Drain<'_> {
    type Item = PixelUpdate;

    fn next(&mut self) -> Option<PixelUpdate> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.rx.try_recv().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn update(x: i32, value: u8) -> PixelUpdate {
        PixelUpdate {
            x,
            y: 0,
            pixel: Pixel::gray(value),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = pixel_queue(8);

        for i in 0..5 {
            tx.enqueue(update(i, i as u8)).await.unwrap();
        }
        assert_eq!(rx.len(), 5);

        let drained: Vec<_> = rx.drain().map(|u| u.x).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_drain_empty_does_not_wait() {
        let (_tx, mut rx) = pixel_queue(8);
        assert_eq!(rx.drain().count(), 0);
    }

    #[tokio::test]
    async fn test_drain_is_bounded_by_queued_items() {
        let (tx, mut rx) = pixel_queue(8);
        tx.enqueue(update(0, 0)).await.unwrap();
        tx.enqueue(update(1, 0)).await.unwrap();

        let mut drain = rx.drain();
        assert_eq!(drain.next().map(|u| u.x), Some(0));

        // Arrives mid-drain, belongs to the next one
        tx.try_enqueue_for_test(update(2, 0));

        assert_eq!(drain.next().map(|u| u.x), Some(1));
        assert_eq!(drain.next(), None);
        drop(drain);

        assert_eq!(rx.drain().map(|u| u.x).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (tx, mut rx) = pixel_queue(2);
        tx.enqueue(update(0, 0)).await.unwrap();
        tx.enqueue(update(1, 0)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.enqueue(update(2, 0))).await;
        assert!(blocked.is_err(), "enqueue on a full queue should wait");

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.enqueue(update(3, 0)).await })
        };

        // Nothing was dropped while waiting
        assert_eq!(rx.drain().map(|u| u.x).collect::<Vec<_>>(), vec![0, 1]);

        producer.await.unwrap().unwrap();
        assert_eq!(rx.drain().map(|u| u.x).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (tx, rx) = pixel_queue(2);
        drop(rx);
        assert!(tx.enqueue(update(0, 0)).await.is_err());
    }

    impl UpdateSender {
        fn try_enqueue_for_test(&self, update: PixelUpdate) {
            self.tx.try_send(update).unwrap();
        }
    }
}
