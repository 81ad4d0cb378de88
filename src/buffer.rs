//! # Fixed-Capacity Reading Buffers
//!
//! Both telemetry tiers are the same structure: an array of slots, a head index
//! and a count. Nothing here allocates, so a buffer can sit inside the
//! controller for the whole life of the process.
//!
//! ## Slot Layout
//! - `head` is the slot the next push writes to
//! - the oldest occupied slot is `(head + N - count) % N`
//! - an empty slot holds `None`
//!
//! A full buffer refuses new readings instead of overwriting the oldest one.
//! Deciding what to give up is the publisher's job, not the buffer's.

use crate::Reading;
use thiserror::Error;

/// High-resolution tier: one raw reading per sample cycle.
pub const HIGH_RES_CAPACITY: usize = 10;

/// Low-resolution tier: one aggregate per full high-resolution tier.
pub const LOW_RES_CAPACITY: usize = 10;

/// Raw readings buffered while the broker is unreachable.
pub type HighResBuffer = RingBuffer<HIGH_RES_CAPACITY>;

/// Aggregated readings; only ever fed from [`crate::aggregate::Aggregator`] output.
pub type LowResBuffer = RingBuffer<LOW_RES_CAPACITY>;

/// Returned by [`RingBuffer::push`] when every slot is taken.
///
/// Carries the refused reading back so the caller can still decide what to do
/// with it.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("buffer full ({capacity} readings)")]
pub struct BufferFull {
    /// The reading that was not stored
    pub reading: Reading,
    /// Capacity of the buffer that refused it
    pub capacity: usize,
}

/// FIFO ring buffer of [`Reading`]s with a capacity fixed at compile time.
///
/// # Example
/// ```
/// use greenhouse_lib::buffer::RingBuffer;
/// use greenhouse_lib::Reading;
///
/// let mut buffer = RingBuffer::<2>::new();
/// let reading = Reading {
///     timestamp: 60,
///     temperature: Some(21.0),
///     humidity: Some(55.0),
///     light: None,
///     tank_level: true,
///     pump_on: false,
///     lights_on: false,
///     irrigated: false,
/// };
///
/// buffer.push(reading).unwrap();
/// assert_eq!(buffer.len(), 1);
/// assert_eq!(buffer.pop_oldest(), Some(reading));
/// assert!(buffer.pop_oldest().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    slots: [Option<Reading>; N],
    head: usize,
    count: usize,
}

impl<const N: usize> RingBuffer<N> {
    const NON_ZERO: () = assert!(N > 0, "ring buffer capacity must be non-zero");

    /// Create an empty buffer.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_ZERO;
        Self {
            slots: [None; N],
            head: 0,
            count: 0,
        }
    }

    /// Store `reading` as the newest entry.
    ///
    /// # Errors
    /// [`BufferFull`] when `len() == capacity()`; the buffer is left untouched.
    pub fn push(&mut self, reading: Reading) -> Result<(), BufferFull> {
        if self.is_full() {
            return Err(BufferFull {
                reading,
                capacity: N,
            });
        }

        self.slots[self.head] = Some(reading);
        self.head = (self.head + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// Copy of the oldest entry, without removing it.
    pub fn peek_oldest(&self) -> Option<Reading> {
        if self.count == 0 {
            return None;
        }
        self.slots[self.tail()]
    }

    /// Remove and return the oldest entry. Empty buffer: `None`, nothing changes.
    pub fn pop_oldest(&mut self) -> Option<Reading> {
        if self.count == 0 {
            return None;
        }
        let tail = self.tail();
        self.count -= 1;
        self.slots[tail].take()
    }

    /// Pop every entry, oldest first.
    ///
    /// Entries the iterator has not yielded yet stay in the buffer if it is
    /// dropped early.
    pub fn drain_oldest_first(&mut self) -> Drain<'_, N> {
        Drain { buffer: self }
    }

    /// Copies of the stored entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Reading> + '_ {
        let tail = self.tail();
        (0..self.count).filter_map(move |offset| self.slots[(tail + offset) % N])
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn tail(&self) -> usize {
        (self.head + N - self.count) % N
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest-first draining iterator returned by [`RingBuffer::drain_oldest_first`].
pub struct Drain<'a, const N: usize> {
    buffer: &'a mut RingBuffer<N>,
}

impl<const N: usize> Iterator for Drain<'_, N> {
    type Item = Reading;

    fn next(&mut self) -> Option<Reading> {
        self.buffer.pop_oldest()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.buffer.len(), Some(self.buffer.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(timestamp: i64) -> Reading {
        Reading {
            timestamp,
            temperature: Some(20.0),
            humidity: Some(50.0),
            light: Some(300.0),
            tank_level: true,
            pump_on: false,
            lights_on: false,
            irrigated: false,
        }
    }

    #[test]
    fn pops_in_push_order() {
        let mut buffer = HighResBuffer::new();
        for ts in 1..=HIGH_RES_CAPACITY as i64 {
            buffer.push(reading(ts)).unwrap();
        }

        let popped: Vec<i64> = std::iter::from_fn(|| buffer.pop_oldest())
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(popped, (1..=HIGH_RES_CAPACITY as i64).collect::<Vec<_>>());
        assert!(buffer.is_empty());
    }

    #[test]
    fn full_buffer_refuses_and_returns_reading() {
        let mut buffer = RingBuffer::<3>::new();
        for ts in 0..3 {
            buffer.push(reading(ts)).unwrap();
        }
        assert!(buffer.is_full());

        let err = buffer.push(reading(99)).unwrap_err();
        assert_eq!(err.reading.timestamp, 99);
        assert_eq!(err.capacity, 3);

        // Nothing was overwritten
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.peek_oldest().unwrap().timestamp, 0);
    }

    #[test]
    fn empty_pop_is_a_no_op() {
        let mut buffer = LowResBuffer::new();
        assert!(buffer.pop_oldest().is_none());
        assert!(buffer.peek_oldest().is_none());
        assert_eq!(buffer.len(), 0);

        // Still usable afterwards
        buffer.push(reading(5)).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn order_survives_wraparound() {
        let mut buffer = RingBuffer::<4>::new();
        let mut next_ts = 0;
        let mut expected = std::collections::VecDeque::new();

        // Interleave pushes and pops so head wraps several times
        for round in 0..10 {
            for _ in 0..(round % 3 + 1) {
                if buffer.push(reading(next_ts)).is_ok() {
                    expected.push_back(next_ts);
                }
                next_ts += 1;
            }
            if round % 2 == 0 {
                assert_eq!(
                    buffer.pop_oldest().map(|r| r.timestamp),
                    expected.pop_front()
                );
            }
            assert!(buffer.len() <= buffer.capacity());
            let stored: Vec<i64> = buffer.iter().map(|r| r.timestamp).collect();
            assert_eq!(stored, expected.iter().copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn peek_does_not_remove() {
        let mut buffer = RingBuffer::<2>::new();
        buffer.push(reading(7)).unwrap();
        assert_eq!(buffer.peek_oldest().unwrap().timestamp, 7);
        assert_eq!(buffer.peek_oldest().unwrap().timestamp, 7);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn drain_yields_oldest_first_and_empties() {
        let mut buffer = RingBuffer::<3>::new();
        for ts in [10, 20, 30] {
            buffer.push(reading(ts)).unwrap();
        }
        buffer.pop_oldest();
        buffer.push(reading(40)).unwrap();

        let drained: Vec<i64> = buffer.drain_oldest_first().map(|r| r.timestamp).collect();
        assert_eq!(drained, vec![20, 30, 40]);
        assert!(buffer.is_empty());
    }
}
