//! # Connection Monitoring and Flushing
//!
//! [`ConnectionMonitor`] is polled every loop iteration and tracks two states,
//! Disconnected and Connected. It reacts only to edges:
//!
//! | from → to | action |
//! |-----------|--------|
//! | Disconnected → Connected | flush buffered telemetry once |
//! | Connected → Connected | nothing |
//! | Connected → Disconnected | reset the flush flag, try to reconnect |
//! | Disconnected → Disconnected | try to reconnect once the backoff elapsed |
//!
//! [`FlushController`] sends the buffered readings in chronological order:
//! the low-resolution tier first (it always holds older data), then the
//! high-resolution tier. It stops at the first failure and leaves the failed
//! reading at the front of its tier.

use crate::publisher::{TelemetryPublisher, Tier};
use crate::transport::Transport;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sends buffered telemetry after a reconnection.
#[derive(Debug, Clone)]
pub struct FlushController {
    delay: Duration,
}

impl FlushController {
    /// `delay` is the pause between two messages; zero disables it.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Transmit everything buffered, oldest first. Returns how many readings were sent.
    ///
    /// Does nothing when the transport is down.
    pub fn flush<T: Transport + ?Sized>(
        &self,
        publisher: &mut TelemetryPublisher,
        transport: &mut T,
    ) -> usize {
        if !transport.is_connected() {
            debug!("flush skipped, not connected");
            return 0;
        }

        let mut sent = 0;
        for tier in [Tier::LowRes, Tier::HighRes] {
            while let Some(reading) = publisher.peek_oldest(tier) {
                if sent > 0 {
                    self.pause();
                }
                match publisher.transmit(&reading, transport) {
                    Ok(sequence) => {
                        publisher.pop_oldest(tier);
                        sent += 1;
                        debug!(?tier, sequence, timestamp = reading.timestamp, "flushed reading");
                    }
                    Err(e) => {
                        warn!(
                            sent,
                            remaining = publisher.buffered_count(),
                            "flush interrupted: {e}"
                        );
                        return sent;
                    }
                }
            }
        }

        info!(
            sent,
            last_sequence = publisher.last_sequence(),
            "buffered telemetry flushed"
        );
        sent
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

/// What a [`ConnectionMonitor::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No transition and no reconnect attempt
    Steady,
    /// The link came up; `flushed` buffered readings were sent
    Connected { flushed: usize },
    /// The link went down
    Lost { reconnect_attempted: bool },
    /// Still down; a reconnect was attempted
    ReconnectAttempted,
}

/// Edge detector over transport connectivity.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    was_connected_before: bool,
    flushed_since_reconnect: bool,
    backoff: Duration,
    last_attempt: Option<Instant>,
}

impl ConnectionMonitor {
    /// Starts Disconnected; reconnect attempts are spaced by at least `backoff`.
    pub fn new(backoff: Duration) -> Self {
        Self {
            was_connected_before: false,
            flushed_since_reconnect: false,
            backoff,
            last_attempt: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.was_connected_before
    }

    /// Observe connectivity once and act on any transition.
    pub fn tick<T: Transport + ?Sized>(
        &mut self,
        now: Instant,
        publisher: &mut TelemetryPublisher,
        transport: &mut T,
        flusher: &FlushController,
    ) -> TickOutcome {
        match (self.was_connected_before, transport.is_connected()) {
            (false, true) => {
                self.was_connected_before = true;
                self.last_attempt = None;

                let mut flushed = 0;
                if publisher.has_buffered_data() && !self.flushed_since_reconnect {
                    info!(
                        buffered = publisher.buffered_count(),
                        "connection restored, flushing buffered telemetry"
                    );
                    flushed = flusher.flush(publisher, transport);
                    self.flushed_since_reconnect = true;
                } else {
                    info!("connection established");
                }
                TickOutcome::Connected { flushed }
            }
            (true, true) => TickOutcome::Steady,
            (true, false) => {
                warn!("connection lost, buffering telemetry");
                self.was_connected_before = false;
                self.flushed_since_reconnect = false;
                TickOutcome::Lost {
                    reconnect_attempted: self.try_reconnect(now, transport),
                }
            }
            (false, false) => {
                if self.try_reconnect(now, transport) {
                    TickOutcome::ReconnectAttempted
                } else {
                    TickOutcome::Steady
                }
            }
        }
    }

    fn try_reconnect<T: Transport + ?Sized>(&mut self, now: Instant, transport: &mut T) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.backoff {
                return false;
            }
        }
        self.last_attempt = Some(now);

        match transport.reconnect() {
            Ok(()) => debug!("reconnect attempt started"),
            Err(e) => warn!("reconnect attempt failed: {e}"),
        }
        true
    }
}
