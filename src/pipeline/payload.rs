//! Payload type tags.
//!
//! A [`PayloadType`] stands for the Rust type carried by a pipe. Wiring
//! compares tags instead of downcasting pipes, and a tag can build an empty
//! pipe of its type, which lets nodes create their outputs from port
//! descriptors alone.

use crate::pipeline::channel::{AnyPipe, Pipe, PipeSpec};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Runtime tag for the payload type of a pipe or port.
#[derive(Clone, Copy)]
pub struct PayloadType {
    type_id: TypeId,
    name: &'static str,
    make_pipe: fn(PipeSpec) -> Arc<dyn AnyPipe>,
}

impl PayloadType {
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            make_pipe: make_pipe::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full Rust type name, used in diagnostics and connector exports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Create an empty pipe carrying this payload type.
    pub fn create_pipe(&self, spec: PipeSpec) -> Arc<dyn AnyPipe> {
        (self.make_pipe)(spec)
    }
}

fn make_pipe<T: Send + Sync + 'static>(spec: PipeSpec) -> Arc<dyn AnyPipe> {
    Arc::new(Pipe::<T>::with_spec(spec))
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for PayloadType {}

impl Hash for PayloadType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadType({})", self.name)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
