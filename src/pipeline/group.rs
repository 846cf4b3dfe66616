//! Dispatch group coordinator.
//!
//! Inputs declared with a group number of 1 or above are joined: the
//! coordinator records which members of a group have signaled for a
//! sequence number and reports [`Arrival::Fired`] exactly once, when every
//! mandatory member has arrived. Optional members are recorded but never
//! waited for, unless the group has no mandatory member at all.
//!
//! Members are identified by input key, so one upstream pipe may feed
//! several inputs of the same group.
//!
//! Arrival records live in a ring of `N` entries per group, addressed like
//! pipe slots by `sequence_number mod N`. A record for a sequence number
//! that never completes is evicted when a sequence number `N` further on
//! claims its entry.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{PipeId, SequenceNumber};
use std::collections::BTreeMap;

/// Maximum number of inputs in one group (one bit each).
pub const MAX_GROUP_MEMBERS: usize = 64;

/// Passed to the group processing entry point when a group completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEvent {
    pub group: u32,
    pub sequence: SequenceNumber,
    /// Producer whose signal completed the group.
    pub last_sender: PipeId,
}

/// What an arrival did to the group state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Still waiting for mandatory members.
    Collecting { arrived: u32, required: u32 },
    /// All mandatory members arrived. Reported once per sequence number.
    Fired(GroupEvent),
    /// The group already fired for this sequence number.
    Completed,
    /// Arrival for a sequence number older than the one now using the entry.
    Stale { current: SequenceNumber },
    /// The input is not a member of the group.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct ArrivalRecord {
    sequence: SequenceNumber,
    arrived: u64,
    fired: bool,
}

#[derive(Debug)]
struct GroupState {
    members: Vec<GroupMember>,
    records: Vec<Option<ArrivalRecord>>,
}

#[derive(Debug, Clone)]
struct GroupMember {
    key: String,
    mandatory: bool,
}

impl GroupState {
    fn new(capacity: usize) -> Self {
        Self {
            members: Vec::new(),
            records: vec![None; capacity],
        }
    }

    /// Bits of the mandatory members. A group of optional inputs only
    /// waits for all of them.
    fn required_mask(&self) -> u64 {
        let mandatory = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.mandatory)
            .fold(0u64, |mask, (bit, _)| mask | 1 << bit);
        if mandatory != 0 {
            return mandatory;
        }
        match self.members.len() {
            0 => 0,
            MAX_GROUP_MEMBERS => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }

    fn clear_records(&mut self) {
        self.records.iter_mut().for_each(|r| *r = None);
    }
}

/// Per-node join bookkeeping for all groups ≥ 1.
#[derive(Debug)]
pub struct GroupCoordinator {
    node: String,
    capacity: usize,
    groups: BTreeMap<u32, GroupState>,
    evicted: u64,
}

impl GroupCoordinator {
    pub fn new(node: impl Into<String>, capacity: usize) -> Self {
        Self {
            node: node.into(),
            capacity: capacity.max(1),
            groups: BTreeMap::new(),
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register input `key` as a member of `group`. Only mandatory members
    /// hold the group back.
    ///
    /// Membership changes discard the group's pending records, since their
    /// bitmaps refer to the old member order.
    pub fn add_member(&mut self, group: u32, key: &str, mandatory: bool) -> PipelineResult<()> {
        let capacity = self.capacity;
        let state = self
            .groups
            .entry(group)
            .or_insert_with(|| GroupState::new(capacity));

        if state.members.iter().any(|m| m.key == key) {
            return Err(PipelineError::AlreadyConnected {
                node: self.node.clone(),
                port: key.to_string(),
            });
        }
        if state.members.len() >= MAX_GROUP_MEMBERS {
            return Err(PipelineError::GroupTooLarge {
                node: self.node.clone(),
                group,
                max: MAX_GROUP_MEMBERS,
            });
        }

        state.members.push(GroupMember {
            key: key.to_string(),
            mandatory,
        });
        state.clear_records();
        Ok(())
    }

    /// Remove the member wired to input `key`. Returns false if unknown.
    pub fn remove_member(&mut self, key: &str) -> bool {
        for state in self.groups.values_mut() {
            if let Some(index) = state.members.iter().position(|m| m.key == key) {
                state.members.remove(index);
                state.clear_records();
                return true;
            }
        }
        false
    }

    pub fn member_count(&self, group: u32) -> usize {
        self.groups.get(&group).map_or(0, |s| s.members.len())
    }

    /// Record that input `key`, fed by `sender`, signaled `sequence` for `group`.
    pub fn arrive(
        &mut self,
        group: u32,
        key: &str,
        sender: PipeId,
        sequence: SequenceNumber,
    ) -> Arrival {
        let Some(state) = self.groups.get_mut(&group) else {
            return Arrival::Ignored;
        };
        let Some(bit) = state.members.iter().position(|m| m.key == key) else {
            return Arrival::Ignored;
        };
        let required = state.required_mask();
        let index = sequence.slot_index(self.capacity);
        let entry = &mut state.records[index];

        let mask: u64 = 1 << bit;

        let arrived = match *entry {
            Some(record) if record.sequence == sequence && record.fired => {
                return Arrival::Completed;
            }
            Some(record) if record.sequence == sequence => record.arrived | mask,
            Some(record) if record.sequence > sequence => {
                return Arrival::Stale {
                    current: record.sequence,
                };
            }
            Some(record) if !record.fired => {
                tracing::warn!(
                    node = %self.node,
                    group,
                    evicted = %record.sequence,
                    by = %sequence,
                    "Incomplete group evicted"
                );
                self.evicted += 1;
                mask
            }
            _ => mask,
        };

        let fired = arrived & required == required;
        *entry = Some(ArrivalRecord {
            sequence,
            arrived,
            fired,
        });

        if fired {
            Arrival::Fired(GroupEvent {
                group,
                sequence,
                last_sender: sender,
            })
        } else {
            Arrival::Collecting {
                arrived: (arrived & required).count_ones(),
                required: required.count_ones(),
            }
        }
    }

    /// Discard all arrivals recorded for `sequence`.
    pub fn reset(&mut self, sequence: SequenceNumber) {
        let index = sequence.slot_index(self.capacity);
        for state in self.groups.values_mut() {
            if matches!(state.records[index], Some(r) if r.sequence == sequence) {
                state.records[index] = None;
            }
        }
    }

    /// Discard every pending arrival record.
    pub fn reset_all(&mut self) {
        self.groups.values_mut().for_each(GroupState::clear_records);
    }

    /// Number of records still collecting, over all groups.
    pub fn pending(&self) -> usize {
        self.groups
            .values()
            .map(|s| {
                s.records
                    .iter()
                    .filter(|r| matches!(r, Some(r) if !r.fired))
                    .count()
            })
            .sum()
    }

    /// Number of incomplete records evicted so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
