//! Typed, sequence-addressed fan-out pipes.
//!
//! A [`Pipe`] wraps a [`SlotStore`] and an ordered list of subscriber
//! callbacks. Producers `write` a value for a sequence number and then
//! `signal` it; every subscriber is called synchronously, in installation
//! order, on the producer's thread. A subscriber typically reads the value
//! back from the pipe and signals its own outputs, so one producer call
//! drives the whole downstream cascade.
//!
//! Locks are never held while subscriber callbacks run: `signal` takes a
//! snapshot of the subscriber list first.

use crate::config::{GraphConfig, OverwritePolicy};
use crate::pipeline::id::{PipeId, SequenceNumber, SubscriptionId};
use crate::pipeline::payload::PayloadType;
use crate::pipeline::slot::{SlotError, SlotStore, WriteOutcome};
use crate::pipeline::{lock, read_lock, write_lock};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Notification delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeEvent {
    /// Producer identity.
    pub sender: PipeId,
    pub sequence: SequenceNumber,
}

/// Subscriber callback.
pub type PipeHandler = Arc<dyn Fn(&PipeEvent) + Send + Sync>;

/// Construction parameters of a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeSpec {
    pub name: String,
    pub capacity: usize,
    pub overwrite_policy: OverwritePolicy,
}

impl PipeSpec {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            overwrite_policy: OverwritePolicy::default(),
        }
    }

    /// Spec for a pipe belonging to a graph with the given configuration.
    pub fn from_config(name: impl Into<String>, config: &GraphConfig) -> Self {
        Self {
            name: name.into(),
            capacity: config.max_in_flight,
            overwrite_policy: config.overwrite_policy,
        }
    }
}

/// Snapshot of a pipe's hazard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipeStats {
    pub writes: u64,
    pub signals: u64,
    /// Unread values destroyed by a later sequence number.
    pub overwrites: u64,
    /// Reads that did not find the requested sequence number.
    pub stale_reads: u64,
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct PipeCounters {
    writes: AtomicU64,
    signals: AtomicU64,
    overwrites: AtomicU64,
    stale_reads: AtomicU64,
}

struct Subscriber {
    id: SubscriptionId,
    handler: PipeHandler,
}

/// Typed pipe carrying values of `T`.
pub struct Pipe<T> {
    id: PipeId,
    name: String,
    overwrite_policy: OverwritePolicy,
    slots: Mutex<SlotStore<T>>,
    subscribers: RwLock<Vec<Subscriber>>,
    counters: PipeCounters,
}

impl<T: Send + Sync + 'static> Pipe<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_spec(PipeSpec::new(name, capacity))
    }

    pub fn with_spec(spec: PipeSpec) -> Self {
        Self {
            id: PipeId::next(),
            name: spec.name,
            overwrite_policy: spec.overwrite_policy,
            slots: Mutex::new(SlotStore::new(spec.capacity)),
            subscribers: RwLock::new(Vec::new()),
            counters: PipeCounters::default(),
        }
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        lock(&self.slots).capacity()
    }

    pub fn payload_type(&self) -> PayloadType {
        PayloadType::of::<T>()
    }

    // ── Producer side ──

    /// Store `value` for `sequence`. Never fails; unread content in the
    /// same slot is replaced and counted as an overwrite.
    pub fn write(&self, sequence: SequenceNumber, value: T) {
        self.write_shared(sequence, Arc::new(value));
    }

    pub fn write_shared(&self, sequence: SequenceNumber, value: Arc<T>) {
        let outcome = lock(&self.slots).write(sequence, value);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        if let WriteOutcome::Overwrote { lost } = outcome {
            self.counters.overwrites.fetch_add(1, Ordering::Relaxed);
            match self.overwrite_policy {
                OverwritePolicy::Warn => tracing::warn!(
                    pipe = %self.name,
                    lost = %lost,
                    by = %sequence,
                    "Unread value overwritten, more sequence numbers in flight than slots"
                ),
                OverwritePolicy::Silent => tracing::trace!(
                    pipe = %self.name,
                    lost = %lost,
                    by = %sequence,
                    "Unread value overwritten"
                ),
            }
        }
    }

    /// Mark `sequence` available and notify every subscriber in order.
    pub fn signal(&self, sequence: SequenceNumber) {
        let holds_sequence = lock(&self.slots).mark_available(sequence);
        self.counters.signals.fetch_add(1, Ordering::Relaxed);
        if !holds_sequence {
            tracing::debug!(pipe = %self.name, seq = %sequence, "Signal without a stored value");
        }

        let handlers: Vec<PipeHandler> = read_lock(&self.subscribers)
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect();
        tracing::trace!(
            pipe = %self.name,
            seq = %sequence,
            subscribers = handlers.len(),
            "Signal"
        );

        let event = PipeEvent {
            sender: self.id,
            sequence,
        };
        for handler in &handlers {
            handler(&event);
        }
    }

    /// Write and signal in one step. Does nothing and returns false when no
    /// subscriber is installed.
    pub fn signal_value(&self, sequence: SequenceNumber, value: T) -> bool {
        if !self.linked() {
            return false;
        }
        self.write(sequence, value);
        self.signal(sequence);
        true
    }

    /// [`Pipe::signal_value`] for a value that is already shared.
    pub fn signal_shared(&self, sequence: SequenceNumber, value: Arc<T>) -> bool {
        if !self.linked() {
            return false;
        }
        self.write_shared(sequence, value);
        self.signal(sequence);
        true
    }

    // ── Consumer side ──

    /// Return the slot content for `sequence` and clear its available flag.
    ///
    /// The content may belong to another sequence number if the slot was
    /// reused; use [`Pipe::read_checked`] or [`Pipe::read_as`] to detect that.
    pub fn read(&self, sequence: SequenceNumber) -> Option<Arc<T>> {
        let mut slots = lock(&self.slots);
        if slots.sequence_at(sequence) != Some(sequence) {
            self.note_stale_read(sequence, None);
        }
        slots.read(sequence)
    }

    /// Read that reports never-written, consumed and overwritten slots.
    pub fn read_checked(&self, sequence: SequenceNumber) -> Result<Arc<T>, SlotError> {
        let result = lock(&self.slots).read_checked(sequence);
        self.observe(result)
    }

    /// Checked read with a consumption marker owned by `subscription`.
    pub fn read_as(
        &self,
        subscription: SubscriptionId,
        sequence: SequenceNumber,
    ) -> Result<Arc<T>, SlotError> {
        let result = lock(&self.slots).read_as(subscription, sequence);
        self.observe(result)
    }

    /// Checked read that leaves the slot untouched.
    pub fn peek(&self, sequence: SequenceNumber) -> Result<Arc<T>, SlotError> {
        lock(&self.slots).peek(sequence)
    }

    pub fn data_available(&self, sequence: SequenceNumber) -> bool {
        lock(&self.slots).is_available(sequence)
    }

    fn observe(&self, result: Result<Arc<T>, SlotError>) -> Result<Arc<T>, SlotError> {
        if let Err(err) = &result {
            let sequence = match err {
                SlotError::NeverWritten { requested }
                | SlotError::AlreadyConsumed { requested }
                | SlotError::Overwritten { requested, .. } => *requested,
            };
            self.note_stale_read(sequence, Some(err));
        }
        result
    }

    fn note_stale_read(&self, sequence: SequenceNumber, err: Option<&SlotError>) {
        self.counters.stale_reads.fetch_add(1, Ordering::Relaxed);
        match err {
            Some(err) => tracing::debug!(pipe = %self.name, seq = %sequence, "Stale read: {}", err),
            None => tracing::debug!(pipe = %self.name, seq = %sequence, "Stale read"),
        }
    }

    // ── Subscribers ──

    pub fn install(&self, handler: PipeHandler) -> SubscriptionId {
        let id = SubscriptionId::next();
        write_lock(&self.subscribers).push(Subscriber { id, handler });
        tracing::debug!(pipe = %self.name, subscription = ?id, "Subscriber installed");
        id
    }

    /// Remove a subscriber. Unknown ids are ignored and return false.
    pub fn uninstall(&self, id: SubscriptionId) -> bool {
        let mut subscribers = write_lock(&self.subscribers);
        let Some(index) = subscribers.iter().position(|s| s.id == id) else {
            return false;
        };
        subscribers.remove(index);
        tracing::debug!(pipe = %self.name, subscription = ?id, "Subscriber removed");
        true
    }

    pub fn linked(&self) -> bool {
        !read_lock(&self.subscribers).is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        read_lock(&self.subscribers).len()
    }

    pub fn stats(&self) -> PipeStats {
        PipeStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            signals: self.counters.signals.load(Ordering::Relaxed),
            overwrites: self.counters.overwrites.load(Ordering::Relaxed),
            stale_reads: self.counters.stale_reads.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

impl<T> fmt::Debug for Pipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("payload", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`Pipe`], used for wiring graphs whose payload
/// types are only known at runtime.
pub trait AnyPipe: Send + Sync {
    fn id(&self) -> PipeId;
    fn name(&self) -> &str;
    fn payload_type(&self) -> PayloadType;
    fn capacity(&self) -> usize;
    fn install(&self, handler: PipeHandler) -> SubscriptionId;
    fn uninstall(&self, id: SubscriptionId) -> bool;
    fn linked(&self) -> bool;
    fn data_available(&self, sequence: SequenceNumber) -> bool;
    fn signal(&self, sequence: SequenceNumber);
    fn stats(&self) -> PipeStats;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> AnyPipe for Pipe<T> {
    fn id(&self) -> PipeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn payload_type(&self) -> PayloadType {
        PayloadType::of::<T>()
    }

    fn capacity(&self) -> usize {
        Pipe::capacity(self)
    }

    fn install(&self, handler: PipeHandler) -> SubscriptionId {
        Pipe::install(self, handler)
    }

    fn uninstall(&self, id: SubscriptionId) -> bool {
        Pipe::uninstall(self, id)
    }

    fn linked(&self) -> bool {
        Pipe::linked(self)
    }

    fn data_available(&self, sequence: SequenceNumber) -> bool {
        Pipe::data_available(self, sequence)
    }

    fn signal(&self, sequence: SequenceNumber) {
        Pipe::signal(self, sequence)
    }

    fn stats(&self) -> PipeStats {
        Pipe::stats(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn AnyPipe {
    /// Typed view of an erased pipe, if it carries `T`.
    pub fn downcast_ref<T: Send + Sync + 'static>(&self) -> Option<&Pipe<T>> {
        self.as_any().downcast_ref::<Pipe<T>>()
    }
}

/// Typed handle to an erased pipe, if it carries `T`.
pub fn downcast_pipe<T: Send + Sync + 'static>(pipe: Arc<dyn AnyPipe>) -> Option<Arc<Pipe<T>>> {
    pipe.into_any().downcast::<Pipe<T>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber(n)
    }

    fn recording_handler(log: &Arc<Mutex<Vec<(usize, u64)>>>, tag: usize) -> PipeHandler {
        let log = Arc::clone(log);
        Arc::new(move |event: &PipeEvent| {
            log.lock().unwrap().push((tag, event.sequence.value()));
        })
    }

    #[test]
    fn test_signal_calls_subscribers_in_order() {
        let pipe = Pipe::<i32>::new("out", 2);
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            pipe.install(recording_handler(&log, tag));
        }

        pipe.write(seq(1), 10);
        pipe.signal(seq(1));

        assert_eq!(*log.lock().unwrap(), vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_event_carries_producer_identity() {
        let pipe = Pipe::<i32>::new("out", 2);
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        pipe.install(Arc::new(move |event: &PipeEvent| {
            *seen_clone.lock().unwrap() = Some(event.sender);
        }));

        pipe.signal_value(seq(0), 1);
        assert_eq!(*seen.lock().unwrap(), Some(pipe.id()));
    }

    #[test]
    fn test_uninstall_unknown_is_noop() {
        let pipe = Pipe::<u8>::new("out", 1);
        assert!(!pipe.uninstall(SubscriptionId(u64::MAX)));
        assert!(!pipe.linked());

        let log = Arc::new(Mutex::new(Vec::new()));
        let id = pipe.install(recording_handler(&log, 0));
        assert!(pipe.linked());
        assert!(pipe.uninstall(id));
        assert!(!pipe.uninstall(id));
        assert!(!pipe.linked());
        assert_eq!(pipe.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_may_read_during_signal() {
        let pipe = Arc::new(Pipe::<String>::new("text", 2));
        let got = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&pipe);
        let got_clone = Arc::clone(&got);
        pipe.install(Arc::new(move |event: &PipeEvent| {
            if let Some(pipe) = weak.upgrade() {
                *got_clone.lock().unwrap() = pipe.read(event.sequence);
            }
        }));

        assert!(pipe.signal_value(seq(3), "hello".to_string()));
        assert_eq!(got.lock().unwrap().as_deref().map(String::as_str), Some("hello"));
        assert!(!pipe.data_available(seq(3)));
    }

    #[test]
    fn test_stats_track_overwrites_and_stale_reads() {
        let pipe = Pipe::<i32>::with_spec(PipeSpec {
            name: "out".to_string(),
            capacity: 1,
            overwrite_policy: OverwritePolicy::Silent,
        });
        pipe.write(seq(0), 0);
        pipe.write(seq(1), 1);
        assert!(pipe.read_checked(seq(0)).is_err());

        let stats = pipe.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.overwrites, 1);
        assert_eq!(stats.stale_reads, 1);
        assert_eq!(stats.subscribers, 0);
    }

    #[test]
    fn test_downcast() {
        let erased: Arc<dyn AnyPipe> = Arc::new(Pipe::<i64>::new("n", 2));
        assert!(erased.downcast_ref::<i64>().is_some());
        assert!(erased.downcast_ref::<i32>().is_none());
        assert!(downcast_pipe::<i32>(Arc::clone(&erased)).is_none());
        assert!(downcast_pipe::<i64>(erased).is_some());
    }
}
