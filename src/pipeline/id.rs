//! Identity types for the pipe engine.
//!
//! Sequence numbers address slots; UUID-based ids identify nodes and ports
//! across processes (persisted graphs reference them); counter-based ids
//! identify pipes and subscriptions within one process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Namespace for name-based ids derived from strings that are not UUIDs.
pub const NAME_NAMESPACE: Uuid = Uuid::from_u128(0x8ed82e4c_5dbb_4f24_b268_774821c983fe);

/// Parse a UUID, falling back to a stable name-based UUID for anything else.
///
/// Graph files written by hand often use readable ids ("camera", "seam-1");
/// those map to the same UUID on every load.
pub fn uuid_from_str_lenient(s: &str) -> Uuid {
    Uuid::parse_str(s.trim()).unwrap_or_else(|_| Uuid::new_v5(&NAME_NAMESPACE, s.as_bytes()))
}

/// Identifies one unit of work (one camera frame) end-to-end through the graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Ring index of this sequence number in a store of `capacity` slots.
    #[inline]
    pub fn slot_index(self, capacity: usize) -> usize {
        debug_assert!(capacity > 0);
        (self.0 % capacity as u64) as usize
    }

    #[inline]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a node (filter instance).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Id from a persisted string, see [`uuid_from_str_lenient`].
    pub fn parse_lenient(s: &str) -> Self {
        Self(uuid_from_str_lenient(s))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Process-stable identity of a port (connector). Never reused for a
/// semantically different port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub Uuid);

impl PortId {
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn parse_lenient(s: &str) -> Self {
        Self(uuid_from_str_lenient(s))
    }

    /// Name-based id, identical for identical names.
    pub fn derived(name: &str) -> Self {
        Self(Uuid::new_v5(&NAME_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortId({})", self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Producer identity carried by every signal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(pub u64);

impl PipeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeId({})", self.0)
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// Handle returned by `install`, used to `uninstall` the same callback.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}
