//! Position sample stream
//!
//! The location provider pushes fixes through a [`PositionPublisher`]; the
//! consumer pulls them from a [`Subscription`] in arrival order. Delivery stops
//! when the publisher is dropped or when [`UnsubscribeHandle::unsubscribe`] is
//! called, whichever comes first. Samples still queued at unsubscribe time are
//! discarded.

use crate::tracker::{MovementTracker, PositionSample, TrackerUpdate};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Create a connected publisher/subscription pair
pub fn position_feed() -> (PositionPublisher, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = UnsubscribeHandle {
        cancel: Arc::new(cancel_tx),
    };
    let publisher = PositionPublisher {
        tx,
        cancelled: cancel_rx.clone(),
    };
    let subscription = Subscription {
        rx,
        cancelled: cancel_rx,
        handle,
    };
    (publisher, subscription)
}

/// Producer side, held by the location provider
#[derive(Debug, Clone)]
pub struct PositionPublisher {
    tx: mpsc::UnboundedSender<PositionSample>,
    cancelled: watch::Receiver<bool>,
}

impl PositionPublisher {
    /// Push a fix; returns `false` once nobody is listening anymore
    pub fn publish(&self, sample: PositionSample) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(sample).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        *self.cancelled.borrow() || self.tx.is_closed()
    }
}

/// Cancels a subscription from anywhere
#[derive(Debug, Clone)]
pub struct UnsubscribeHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl UnsubscribeHandle {
    pub fn unsubscribe(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!("Position feed unsubscribed");
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Consumer side of the feed
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<PositionSample>,
    cancelled: watch::Receiver<bool>,
    handle: UnsubscribeHandle,
}

impl Subscription {
    /// Handle that ends this subscription
    pub fn handle(&self) -> UnsubscribeHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&mut self) {
        self.handle.unsubscribe();
        self.rx.close();
    }

    /// Next fix, or `None` when the feed has ended
    pub async fn next(&mut self) -> Option<PositionSample> {
        loop {
            if *self.cancelled.borrow_and_update() {
                self.rx.close();
                return None;
            }
            tokio::select! {
                biased;
                changed = self.cancelled.changed() => {
                    // The sender lives in our own handle, so this only fails during teardown
                    if changed.is_err() {
                        break;
                    }
                }
                sample = self.rx.recv() => return sample,
            }
        }
        self.rx.recv().await
    }
}

/// Drive `tracker` from `subscription` until the feed ends
///
/// `on_update` sees every update, including ignored samples. Returns the number
/// of samples processed.
pub async fn run_tracker<F>(
    subscription: &mut Subscription,
    tracker: &mut MovementTracker,
    mut on_update: F,
) -> usize
where
    F: FnMut(&TrackerUpdate),
{
    let mut processed = 0;
    while let Some(sample) = subscription.next().await {
        let update = tracker.process(&sample);
        processed += 1;
        on_update(&update);
    }
    tracing::debug!("Position feed ended after {} samples", processed);
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Indicator;

    fn walk(publisher: &PositionPublisher, count: u64) {
        for i in 0..count {
            let sample = PositionSample::new(i * 1000, 59.0, 18.0 + i as f64 * 1e-4).with_speed(1.2);
            assert!(publisher.publish(sample));
        }
    }

    #[tokio::test]
    async fn test_samples_arrive_in_order() {
        let (publisher, mut subscription) = position_feed();
        walk(&publisher, 3);
        drop(publisher);

        let mut timestamps = Vec::new();
        while let Some(sample) = subscription.next().await {
            timestamps.push(sample.timestamp);
        }
        assert_eq!(timestamps, vec![0, 1000, 2000]);
    }

    #[tokio::test]
    async fn test_run_tracker_until_publisher_dropped() {
        let (publisher, mut subscription) = position_feed();
        walk(&publisher, 4);
        drop(publisher);

        let mut tracker = MovementTracker::default();
        let mut last = None;
        let processed = run_tracker(&mut subscription, &mut tracker, |update| {
            last = Some(update.indicator);
        })
        .await;

        assert_eq!(processed, 4);
        assert!(matches!(last, Some(Indicator::Arrow { .. })));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_tracker_loop() {
        let (publisher, mut subscription) = position_feed();
        walk(&publisher, 5);

        let handle = subscription.handle();
        let mut tracker = MovementTracker::default();
        let processed = run_tracker(&mut subscription, &mut tracker, |_| handle.unsubscribe()).await;

        assert_eq!(processed, 1);
        assert!(handle.is_unsubscribed());
        assert!(publisher.is_closed());
        assert!(!publisher.publish(PositionSample::new(9000, 59.0, 18.0)));
    }

    #[tokio::test]
    async fn test_unsubscribe_wakes_pending_consumer() {
        let (publisher, mut subscription) = position_feed();
        let handle = subscription.handle();

        let consumer = tokio::spawn(async move { subscription.next().await });
        tokio::task::yield_now().await;
        handle.unsubscribe();

        assert_eq!(consumer.await.unwrap(), None);
        assert!(!publisher.publish(PositionSample::new(0, 59.0, 18.0)));
    }
}
