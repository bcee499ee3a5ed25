// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Fans events out to every subscriber of a session.

use futures::stream::{Stream, StreamExt};
use log::trace;
use std::fmt::Debug;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug)]
pub struct EventHub<E> {
    events_channel: broadcast::Sender<E>,
}

impl<E> EventHub<E>
where
    E: Clone + Debug + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let (broadcast_sender, _) = broadcast::channel(capacity.max(1));
        EventHub {
            events_channel: broadcast_sender,
        }
    }

    pub fn emit(&self, event: E) {
        if let Err(lost) = self.events_channel.send(event) {
            trace!("Lost session event, while nothing subscribed: {:?}", lost);
        }
    }

    /// Subscribers only see events emitted after they subscribed. A subscriber that falls more
    /// than the channel capacity behind skips the events it missed.
    pub fn event_stream(&self) -> Pin<Box<dyn Stream<Item = E> + Send>> {
        let receiver = self.events_channel.subscribe();
        Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move {
            match x {
                Ok(event) => Some(event),
                Err(lagged) => {
                    trace!("Session event subscriber {}", lagged);
                    None
                }
            }
        }))
    }

    pub fn subscriber_count(&self) -> usize {
        self.events_channel.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let hub = EventHub::new(8);
        let mut first = hub.event_stream();
        let mut second = hub.event_stream();
        assert_eq!(hub.subscriber_count(), 2);

        hub.emit(1u32);
        hub.emit(2u32);

        assert_eq!(first.next().await, Some(1));
        assert_eq!(first.next().await, Some(2));
        assert_eq!(second.next().await, Some(1));
        assert_eq!(second.next().await, Some(2));
    }

    #[tokio::test]
    async fn emitting_without_subscribers_is_harmless() {
        let hub = EventHub::new(8);
        hub.emit("dropped");

        let mut late = hub.event_stream();
        assert_eq!(late.next().now_or_never(), None);
        hub.emit("seen");
        assert_eq!(late.next().await, Some("seen"));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_events() {
        let hub = EventHub::new(2);
        let mut slow = hub.event_stream();
        for i in 0..5u32 {
            hub.emit(i);
        }
        // Only the newest `capacity` events survive.
        assert_eq!(slow.next().await, Some(3));
        assert_eq!(slow.next().await, Some(4));
    }
}
