//! Port descriptors (connectors).
//!
//! Every filter declares its inputs and outputs as [`PortDescriptor`]s. The
//! engine uses them to create output pipes and to type-check wiring; graph
//! tooling persists them as [`ConnectorInfo`], keyed by the port UUID.

use crate::pipeline::id::PortId;
use crate::pipeline::payload::PayloadType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group number of inputs that fire the filter once per signal.
pub const GROUP_PROCEED: u32 = 0;
/// Default group for inputs that are joined per sequence number.
pub const GROUP_JOIN: u32 = 1;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Connection contract of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Mandatory,
    Optional,
    /// Mandatory when used as an input, optional as an output.
    MandatoryForInOptionalForOut,
}

impl ConnectionKind {
    /// Must a port of this kind be connected in the given direction?
    pub fn is_required(self, direction: PortDirection) -> bool {
        match (self, direction) {
            (ConnectionKind::Mandatory, _) => true,
            (ConnectionKind::Optional, _) => false,
            (ConnectionKind::MandatoryForInOptionalForOut, PortDirection::Input) => true,
            (ConnectionKind::MandatoryForInOptionalForOut, PortDirection::Output) => false,
        }
    }
}

/// Immutable description of one filter port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    id: PortId,
    payload_type: PayloadType,
    name: String,
    direction: PortDirection,
    group: u32,
    tag: String,
    connection_kind: ConnectionKind,
}

impl PortDescriptor {
    /// Mandatory input carrying `T`, firing per signal (group 0).
    pub fn input<T: Send + Sync + 'static>(id: PortId, name: impl Into<String>) -> Self {
        Self {
            id,
            payload_type: PayloadType::of::<T>(),
            name: name.into(),
            direction: PortDirection::Input,
            group: GROUP_PROCEED,
            tag: String::new(),
            connection_kind: ConnectionKind::Mandatory,
        }
    }

    /// Output carrying `T`. Outputs may stay unconnected unless marked mandatory.
    pub fn output<T: Send + Sync + 'static>(id: PortId, name: impl Into<String>) -> Self {
        Self {
            id,
            payload_type: PayloadType::of::<T>(),
            name: name.into(),
            direction: PortDirection::Output,
            group: GROUP_PROCEED,
            tag: String::new(),
            connection_kind: ConnectionKind::MandatoryForInOptionalForOut,
        }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_connection_kind(mut self, kind: ConnectionKind) -> Self {
        self.connection_kind = kind;
        self
    }

    pub fn optional(self) -> Self {
        self.with_connection_kind(ConnectionKind::Optional)
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn connection_kind(&self) -> ConnectionKind {
        self.connection_kind
    }

    pub fn is_required(&self) -> bool {
        self.connection_kind.is_required(self.direction)
    }

    /// Name under which the port is addressed when wiring: the tag for
    /// tagged inputs, the plain name otherwise.
    pub fn key(&self) -> &str {
        if self.is_input() && !self.tag.is_empty() {
            &self.tag
        } else {
            &self.name
        }
    }
}

/// Persisted form of a [`PortDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub id: PortId,
    pub name: String,
    pub payload_type: String,
    pub direction: PortDirection,
    pub group: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    pub connection_kind: ConnectionKind,
}

impl From<&PortDescriptor> for ConnectorInfo {
    fn from(port: &PortDescriptor) -> Self {
        Self {
            id: port.id,
            name: port.name.clone(),
            payload_type: port.payload_type.name().to_string(),
            direction: port.direction,
            group: port.group,
            tag: port.tag.clone(),
            connection_kind: port.connection_kind,
        }
    }
}
