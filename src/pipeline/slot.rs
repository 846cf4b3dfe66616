//! Ring-buffer storage behind every pipe.
//!
//! A [`SlotStore`] holds `N` slots addressed by `sequence_number mod N`.
//! Writes never fail and never block: writing sequence `K + N` into a slot
//! whose content for `K` was never read replaces it and reports the loss
//! through [`WriteOutcome::Overwrote`].
//!
//! Two read flavours exist. [`SlotStore::read`] returns whatever the slot
//! holds, the way legacy filters expect. [`SlotStore::read_checked`] and
//! [`SlotStore::read_as`] verify the stored sequence number and report
//! stale reads as a [`SlotError`].

use crate::pipeline::id::{SequenceNumber, SubscriptionId};
use std::sync::Arc;
use thiserror::Error;

/// Why a checked read could not return the value for a sequence number.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    #[error("sequence {requested} was never written")]
    NeverWritten { requested: SequenceNumber },

    #[error("sequence {requested} was already consumed")]
    AlreadyConsumed { requested: SequenceNumber },

    #[error("sequence {requested} was overwritten by sequence {current}")]
    Overwritten {
        requested: SequenceNumber,
        current: SequenceNumber,
    },
}

/// Result of storing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The slot was empty or its previous content had been read.
    Stored,
    /// The same sequence number was written again.
    Replaced,
    /// Unread content for another sequence number was destroyed.
    Overwrote { lost: SequenceNumber },
}

/// One storage cell.
#[derive(Debug)]
pub struct Slot<T> {
    value: Option<Arc<T>>,
    sequence: Option<SequenceNumber>,
    available: bool,
    read: bool,
    consumers: Vec<SubscriptionId>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            sequence: None,
            available: false,
            read: false,
            consumers: Vec::new(),
        }
    }
}

impl<T> Slot<T> {
    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.sequence
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn check(&self, requested: SequenceNumber) -> Result<&Arc<T>, SlotError> {
        match (self.sequence, &self.value) {
            (Some(current), Some(value)) if current == requested => Ok(value),
            (Some(current), Some(_)) if current > requested => {
                Err(SlotError::Overwritten { requested, current })
            }
            _ => Err(SlotError::NeverWritten { requested }),
        }
    }
}

/// Fixed-size ring of slots.
#[derive(Debug)]
pub struct SlotStore<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> SlotStore<T> {
    /// Create a store with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1)).map(|_| Slot::default()).collect();
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, sequence: SequenceNumber) -> &Slot<T> {
        &self.slots[sequence.slot_index(self.slots.len())]
    }

    fn slot_mut(&mut self, sequence: SequenceNumber) -> &mut Slot<T> {
        let index = sequence.slot_index(self.slots.len());
        &mut self.slots[index]
    }

    /// Store `value` for `sequence`, unconditionally replacing the slot's content.
    pub fn write(&mut self, sequence: SequenceNumber, value: Arc<T>) -> WriteOutcome {
        let slot = self.slot_mut(sequence);

        let outcome = match slot.sequence {
            Some(previous) if previous == sequence => WriteOutcome::Replaced,
            Some(previous) if !slot.read && slot.value.is_some() => {
                WriteOutcome::Overwrote { lost: previous }
            }
            _ => WriteOutcome::Stored,
        };

        slot.value = Some(value);
        slot.sequence = Some(sequence);
        slot.available = false;
        slot.read = false;
        slot.consumers.clear();
        outcome
    }

    /// Flag the slot of `sequence` as available. Returns false if the slot
    /// currently holds a different sequence number (it is flagged anyway).
    pub fn mark_available(&mut self, sequence: SequenceNumber) -> bool {
        let slot = self.slot_mut(sequence);
        slot.available = true;
        slot.sequence == Some(sequence)
    }

    /// True if the slot is flagged available and holds `sequence`.
    pub fn is_available(&self, sequence: SequenceNumber) -> bool {
        let slot = self.slot(sequence);
        slot.available && slot.sequence == Some(sequence)
    }

    /// Sequence number currently stored in the slot addressed by `sequence`.
    pub fn sequence_at(&self, sequence: SequenceNumber) -> Option<SequenceNumber> {
        self.slot(sequence).sequence
    }

    /// Legacy read: returns the slot content whatever sequence it belongs
    /// to and clears the available flag. `None` only for a never-written slot.
    pub fn read(&mut self, sequence: SequenceNumber) -> Option<Arc<T>> {
        let slot = self.slot_mut(sequence);
        slot.available = false;
        slot.read = true;
        slot.value.clone()
    }

    /// Checked read shared by all consumers: a second read of the same
    /// content reports [`SlotError::AlreadyConsumed`].
    pub fn read_checked(&mut self, sequence: SequenceNumber) -> Result<Arc<T>, SlotError> {
        let slot = self.slot_mut(sequence);
        let value = slot.check(sequence)?.clone();
        if slot.read {
            return Err(SlotError::AlreadyConsumed {
                requested: sequence,
            });
        }
        slot.available = false;
        slot.read = true;
        Ok(value)
    }

    /// Checked read with a per-subscriber consumption marker: every
    /// subscriber may consume the content of a slot once.
    pub fn read_as(
        &mut self,
        subscriber: SubscriptionId,
        sequence: SequenceNumber,
    ) -> Result<Arc<T>, SlotError> {
        let slot = self.slot_mut(sequence);
        let value = slot.check(sequence)?.clone();
        if slot.consumers.contains(&subscriber) {
            return Err(SlotError::AlreadyConsumed {
                requested: sequence,
            });
        }
        slot.consumers.push(subscriber);
        slot.available = false;
        slot.read = true;
        Ok(value)
    }

    /// Checked read without side effects.
    pub fn peek(&self, sequence: SequenceNumber) -> Result<Arc<T>, SlotError> {
        self.slot(sequence).check(sequence).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber(n)
    }

    #[test]
    fn test_write_then_read() {
        let mut store = SlotStore::new(2);
        assert_eq!(store.write(seq(5), Arc::new(50)), WriteOutcome::Stored);
        assert!(store.mark_available(seq(5)));
        assert!(store.is_available(seq(5)));
        assert_eq!(store.read(seq(5)).as_deref(), Some(&50));
        assert!(!store.is_available(seq(5)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store: SlotStore<u8> = SlotStore::new(0);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn test_overwrite_reported_only_for_unread_content() {
        let mut store = SlotStore::new(2);
        store.write(seq(1), Arc::new(1));
        assert_eq!(
            store.write(seq(3), Arc::new(3)),
            WriteOutcome::Overwrote { lost: seq(1) }
        );

        store.read(seq(3));
        assert_eq!(store.write(seq(5), Arc::new(5)), WriteOutcome::Stored);
        assert_eq!(store.write(seq(5), Arc::new(6)), WriteOutcome::Replaced);
    }

    #[test]
    fn test_checked_read_errors() {
        let mut store = SlotStore::new(2);
        assert_eq!(
            store.read_checked(seq(4)),
            Err(SlotError::NeverWritten { requested: seq(4) })
        );

        store.write(seq(4), Arc::new(40));
        assert_eq!(store.read_checked(seq(4)).as_deref(), Ok(&40));
        assert_eq!(
            store.read_checked(seq(4)),
            Err(SlotError::AlreadyConsumed { requested: seq(4) })
        );

        store.write(seq(6), Arc::new(60));
        assert_eq!(
            store.read_checked(seq(4)),
            Err(SlotError::Overwritten {
                requested: seq(4),
                current: seq(6)
            })
        );
        // Slot holds an older sequence than the one asked for.
        assert_eq!(
            store.read_checked(seq(8)),
            Err(SlotError::NeverWritten { requested: seq(8) })
        );
    }

    #[test]
    fn test_per_subscriber_consumption() {
        let mut store = SlotStore::new(1);
        let a = SubscriptionId(1);
        let b = SubscriptionId(2);
        store.write(seq(9), Arc::new("frame"));

        assert!(store.read_as(a, seq(9)).is_ok());
        assert!(store.read_as(b, seq(9)).is_ok());
        assert_eq!(
            store.read_as(a, seq(9)),
            Err(SlotError::AlreadyConsumed { requested: seq(9) })
        );

        // A new write resets the markers.
        store.write(seq(10), Arc::new("next"));
        assert!(store.read_as(a, seq(10)).is_ok());
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut store = SlotStore::new(3);
        store.write(seq(2), Arc::new(2.5));
        store.mark_available(seq(2));
        assert_eq!(store.peek(seq(2)).as_deref(), Ok(&2.5));
        assert!(store.is_available(seq(2)));
        assert!(store.read_checked(seq(2)).is_ok());
    }

    proptest! {
        #[test]
        fn prop_write_read_identity(capacity in 1usize..16, s in 0u64..1_000_000, v in any::<i64>()) {
            let mut store = SlotStore::new(capacity);
            store.write(seq(s), Arc::new(v));
            store.mark_available(seq(s));
            let got = store.read(seq(s));
            prop_assert_eq!(got.as_deref(), Some(&v));
        }

        #[test]
        fn prop_availability_toggles(capacity in 1usize..16, s in 0u64..1_000_000) {
            let mut store = SlotStore::new(capacity);
            store.write(seq(s), Arc::new(()));
            prop_assert!(!store.is_available(seq(s)));
            store.mark_available(seq(s));
            prop_assert!(store.is_available(seq(s)));
            store.read(seq(s));
            prop_assert!(!store.is_available(seq(s)));
        }

        #[test]
        fn prop_wraparound_returns_latest(capacity in 1usize..16, s in 0u64..1_000_000) {
            let n = capacity as u64;
            let mut store = SlotStore::new(capacity);
            store.write(seq(s), Arc::new(s));
            store.write(seq(s + n), Arc::new(s + n));
            store.write(seq(s + 2 * n), Arc::new(s + 2 * n));
            let got = store.read(seq(s));
            prop_assert_eq!(got.as_deref(), Some(&(s + 2 * n)));
        }
    }
}
