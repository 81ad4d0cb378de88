//! # Telemetry Publisher
//!
//! Entry point for every sampled reading. While the link is up the reading is
//! sent right away; while it is down it goes into the high-resolution tier.
//!
//! ## Overflow Protocol
//! When a reading arrives and the high-resolution tier is already full:
//! 1. drain the whole tier, oldest first, into one batch
//! 2. if the low-resolution tier is full too, drop its oldest aggregate
//! 3. aggregate the batch and store it in the low-resolution tier
//! 4. store the new reading in the (now empty) high-resolution tier
//!
//! Resolution degrades from per-cycle readings to batch averages before any
//! data is lost, and the only thing ever dropped is the oldest aggregate.
//!
//! A send that fails while the link is reported up is dropped, not buffered,
//! unless the transport says the link is actually down; then it is buffered.

use crate::aggregate::{AggregationPolicy, Aggregator};
use crate::buffer::{HighResBuffer, LowResBuffer};
use crate::payload::{telemetry_topic, SequenceCounter, TelemetryPayload};
use crate::transport::{Transport, TransportError};
use crate::Reading;
use thiserror::Error;
use tracing::{debug, error, warn};

/// What happened to a published reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport
    Sent,
    /// Stored for the next reconnection
    Buffered,
    /// Transport failed while connected; the reading is gone
    Failed,
}

/// Why a single transmission failed.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The two buffer tiers, for callers that walk them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    LowRes,
    HighRes,
}

/// Send-or-buffer logic plus the state it owns: both tiers and the sequence counter.
#[derive(Debug)]
pub struct TelemetryPublisher {
    device_id: String,
    topic: String,
    high_res: HighResBuffer,
    low_res: LowResBuffer,
    aggregator: Aggregator,
    sequence: SequenceCounter,
}

impl TelemetryPublisher {
    /// Publisher for greenhouse `greenhouse_id`, which is also the payload's `device_id`.
    pub fn new(greenhouse_id: &str, policy: AggregationPolicy) -> Self {
        Self {
            device_id: greenhouse_id.to_string(),
            topic: telemetry_topic(greenhouse_id),
            high_res: HighResBuffer::new(),
            low_res: LowResBuffer::new(),
            aggregator: Aggregator::new(policy),
            sequence: SequenceCounter::new(),
        }
    }

    /// Send `reading` now if `connected`, otherwise buffer it.
    pub fn publish<T: Transport + ?Sized>(
        &mut self,
        reading: Reading,
        connected: bool,
        transport: &mut T,
    ) -> PublishOutcome {
        if !connected {
            self.buffer(reading);
            debug!(
                high_res = self.high_res.len(),
                low_res = self.low_res.len(),
                "reading buffered"
            );
            return PublishOutcome::Buffered;
        }

        match self.transmit(&reading, transport) {
            Ok(sequence) => {
                debug!(sequence, timestamp = reading.timestamp, "telemetry published");
                PublishOutcome::Sent
            }
            Err(PublishError::Transport(TransportError::NotConnected)) => {
                // Link dropped after the caller looked
                self.buffer(reading);
                debug!(timestamp = reading.timestamp, "link down at send, reading buffered");
                PublishOutcome::Buffered
            }
            Err(e) => {
                warn!(timestamp = reading.timestamp, "telemetry dropped: {e}");
                PublishOutcome::Failed
            }
        }
    }

    /// Encode and send one reading with the next sequence number.
    ///
    /// The counter only advances when the transport accepted the message.
    pub fn transmit<T: Transport + ?Sized>(
        &mut self,
        reading: &Reading,
        transport: &mut T,
    ) -> Result<u64, PublishError> {
        let sequence = self.sequence.upcoming();
        let json = TelemetryPayload::new(&self.device_id, reading, sequence).to_json()?;
        transport.publish(&self.topic, &json)?;
        Ok(self.sequence.advance())
    }

    fn buffer(&mut self, reading: Reading) {
        if self.high_res.is_full() {
            let batch: Vec<Reading> = self.high_res.drain_oldest_first().collect();

            if self.low_res.is_full() {
                if let Some(dropped) = self.low_res.pop_oldest() {
                    warn!(
                        timestamp = dropped.timestamp,
                        "both buffers full, dropping oldest aggregate"
                    );
                }
            }

            if let Some(aggregate) = self.aggregator.aggregate(&batch) {
                if let Err(e) = self.low_res.push(aggregate) {
                    error!("aggregate lost: {e}");
                } else {
                    debug!(
                        readings = batch.len(),
                        timestamp = aggregate.timestamp,
                        "high-res buffer aggregated"
                    );
                }
            }
        }

        if let Err(e) = self.high_res.push(reading) {
            error!("reading lost: {e}");
        }
    }

    /// Oldest reading of `tier`, still in place.
    pub fn peek_oldest(&self, tier: Tier) -> Option<Reading> {
        match tier {
            Tier::LowRes => self.low_res.peek_oldest(),
            Tier::HighRes => self.high_res.peek_oldest(),
        }
    }

    /// Remove the oldest reading of `tier`.
    pub fn pop_oldest(&mut self, tier: Tier) -> Option<Reading> {
        match tier {
            Tier::LowRes => self.low_res.pop_oldest(),
            Tier::HighRes => self.high_res.pop_oldest(),
        }
    }

    pub fn high_res(&self) -> &HighResBuffer {
        &self.high_res
    }

    pub fn low_res(&self) -> &LowResBuffer {
        &self.low_res
    }

    pub fn buffered_count(&self) -> usize {
        self.high_res.len() + self.low_res.len()
    }

    pub fn has_buffered_data(&self) -> bool {
        !self.high_res.is_empty() || !self.low_res.is_empty()
    }

    /// Last sequence number sent, 0 before the first message.
    pub fn last_sequence(&self) -> u64 {
        self.sequence.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{HIGH_RES_CAPACITY, LOW_RES_CAPACITY};
    use crate::transport::MemoryTransport;

    fn reading(timestamp: i64) -> Reading {
        Reading {
            timestamp,
            temperature: Some(timestamp as f32),
            humidity: Some(50.0),
            light: Some(200.0),
            tank_level: true,
            pump_on: false,
            lights_on: false,
            irrigated: false,
        }
    }

    fn publisher() -> TelemetryPublisher {
        TelemetryPublisher::new("gh-test", AggregationPolicy::default())
    }

    #[test]
    fn connected_publish_sends_with_sequence() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(true);

        assert_eq!(
            publisher.publish(reading(1), true, &mut transport),
            PublishOutcome::Sent
        );
        assert_eq!(
            publisher.publish(reading(2), true, &mut transport),
            PublishOutcome::Sent
        );

        let sent = transport.published_json();
        assert_eq!(sent[0]["sequence"], 1);
        assert_eq!(sent[1]["sequence"], 2);
        assert_eq!(sent[0]["device_id"], "gh-test");
        assert_eq!(transport.published()[0].topic, "greenhouse/gh-test/telemetry");
        assert_eq!(publisher.buffered_count(), 0);
    }

    #[test]
    fn connected_failure_drops_reading() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(true);
        transport.fail_after(0);

        assert_eq!(
            publisher.publish(reading(1), true, &mut transport),
            PublishOutcome::Failed
        );
        assert_eq!(publisher.buffered_count(), 0);
        assert_eq!(publisher.last_sequence(), 0);

        // The failed attempt did not burn a sequence number
        transport.clear_failures();
        publisher.publish(reading(2), true, &mut transport);
        assert_eq!(transport.published_json()[0]["sequence"], 1);
    }

    #[test]
    fn link_lost_at_send_buffers_instead_of_dropping() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(false);

        assert_eq!(
            publisher.publish(reading(1), true, &mut transport),
            PublishOutcome::Buffered
        );
        assert_eq!(publisher.high_res().len(), 1);
        assert_eq!(publisher.last_sequence(), 0);
    }

    #[test]
    fn disconnected_publish_buffers() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(false);

        assert_eq!(
            publisher.publish(reading(1), false, &mut transport),
            PublishOutcome::Buffered
        );
        assert_eq!(publisher.high_res().len(), 1);
        assert!(transport.published().is_empty());
    }

    #[test]
    fn overflow_aggregates_into_low_res() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(false);

        for ts in 1..=HIGH_RES_CAPACITY as i64 {
            publisher.publish(reading(ts), false, &mut transport);
        }
        assert!(publisher.high_res().is_full());
        assert!(publisher.low_res().is_empty());

        publisher.publish(reading(11), false, &mut transport);
        assert_eq!(publisher.low_res().len(), 1);
        assert_eq!(publisher.high_res().len(), 1);
        assert_eq!(publisher.high_res().peek_oldest().unwrap().timestamp, 11);

        let aggregate = publisher.low_res().peek_oldest().unwrap();
        assert_eq!(aggregate.timestamp, 10);
        assert_eq!(aggregate.temperature, Some(5.5));
    }

    #[test]
    fn both_full_evicts_oldest_aggregate() {
        let mut publisher = publisher();
        let mut transport = MemoryTransport::new(false);

        // Fill the low tier with 10 aggregates and the high tier with 10 readings
        let total = (LOW_RES_CAPACITY + 1) * HIGH_RES_CAPACITY;
        for ts in 1..=total as i64 {
            publisher.publish(reading(ts), false, &mut transport);
        }
        assert!(publisher.low_res().is_full());
        assert!(publisher.high_res().is_full());
        let oldest_before = publisher.low_res().peek_oldest().unwrap().timestamp;
        assert_eq!(oldest_before, HIGH_RES_CAPACITY as i64);

        publisher.publish(reading(total as i64 + 1), false, &mut transport);

        assert_eq!(publisher.low_res().len(), LOW_RES_CAPACITY);
        assert_eq!(publisher.high_res().len(), 1);
        let stamps: Vec<i64> = publisher.low_res().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps.first(), Some(&(2 * HIGH_RES_CAPACITY as i64)));
        assert_eq!(stamps.last(), Some(&(total as i64)));
        assert_eq!(
            publisher.high_res().peek_oldest().unwrap().timestamp,
            total as i64 + 1
        );
    }
}
