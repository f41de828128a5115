// PriceStream - typed publish/subscribe bus for price history events.
//
// Two channels let consumers distinguish freshly fetched remote data from
// existing records replayed out of storage at startup. Unsubscribing is
// dropping the receiver; publishing with no subscribers is not an error.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::metrics;
use crate::types::PriceRecord;

/// Event channels, closed set. Not free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceChannel {
    /// Records just fetched from the price index; payload is exactly the
    /// newly fetched batch, never the full history.
    NewPrices,
    /// Records replayed from storage at startup so consumers can warm up
    /// without waiting on external APIs.
    SyncedExisting,
}

pub struct PriceStream {
    new_prices: broadcast::Sender<Vec<PriceRecord>>,
    synced_existing: broadcast::Sender<Vec<PriceRecord>>,
}

impl PriceStream {
    /// `capacity`: per-channel buffer before slow receivers start lagging.
    pub fn new(capacity: usize) -> Self {
        let (new_prices, _) = broadcast::channel(capacity);
        let (synced_existing, _) = broadcast::channel(capacity);
        Self {
            new_prices,
            synced_existing,
        }
    }

    fn sender(&self, channel: PriceChannel) -> &broadcast::Sender<Vec<PriceRecord>> {
        match channel {
            PriceChannel::NewPrices => &self.new_prices,
            PriceChannel::SyncedExisting => &self.synced_existing,
        }
    }

    /// Subscribes a new consumer to one channel. Dropping the receiver
    /// unsubscribes it; that is safe anywhere, including inside a handler.
    pub fn subscribe(&self, channel: PriceChannel) -> broadcast::Receiver<Vec<PriceRecord>> {
        self.sender(channel).subscribe()
    }

    /// Publishes a batch to every subscriber of a channel.
    /// Returns the number of subscribers that received the batch.
    pub fn publish(&self, channel: PriceChannel, records: Vec<PriceRecord>) -> usize {
        let count = records.len();
        match self.sender(channel).send(records) {
            Ok(receivers) => {
                debug!(
                    "[PriceStream] Published {} records on {:?} to {} subscribers",
                    count, channel, receivers
                );
                receivers
            }
            Err(broadcast::error::SendError(_)) => {
                warn!(
                    "⚠️ [PriceStream] Published {} records on {:?} but no active subscribers",
                    count, channel
                );
                0
            }
        }
    }

    pub fn subscriber_count(&self, channel: PriceChannel) -> usize {
        let count = self.sender(channel).receiver_count();
        metrics::set_price_stream_subscribers(
            (self.new_prices.receiver_count() + self.synced_existing.receiver_count()) as f64,
        );
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(hour: u32, price: f64) -> PriceRecord {
        PriceRecord {
            coingecko_id: "ethereum".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            price_usd: price,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let stream = PriceStream::new(16);
        let mut rx1 = stream.subscribe(PriceChannel::NewPrices);
        let mut rx2 = stream.subscribe(PriceChannel::NewPrices);

        let batch = vec![record(10, 2500.0), record(11, 2510.0)];
        let receivers = stream.publish(PriceChannel::NewPrices, batch.clone());
        assert_eq!(receivers, 2);

        assert_eq!(rx1.recv().await.unwrap(), batch);
        assert_eq!(rx2.recv().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let stream = PriceStream::new(16);
        let mut new_rx = stream.subscribe(PriceChannel::NewPrices);
        let mut synced_rx = stream.subscribe(PriceChannel::SyncedExisting);

        stream.publish(PriceChannel::SyncedExisting, vec![record(9, 1.0)]);

        // The replay lands only on its own channel.
        assert_eq!(synced_rx.recv().await.unwrap().len(), 1);
        assert!(new_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let stream = PriceStream::new(16);
        assert_eq!(stream.subscriber_count(PriceChannel::NewPrices), 0);
        let receivers = stream.publish(PriceChannel::NewPrices, vec![record(8, 42.0)]);
        assert_eq!(receivers, 0);
    }

    #[tokio::test]
    async fn test_dropping_receiver_unsubscribes() {
        let stream = PriceStream::new(16);
        let rx = stream.subscribe(PriceChannel::SyncedExisting);
        assert_eq!(stream.subscriber_count(PriceChannel::SyncedExisting), 1);
        drop(rx);
        assert_eq!(stream.subscriber_count(PriceChannel::SyncedExisting), 0);
    }
}
