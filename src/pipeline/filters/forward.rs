//! ForwardFilter: passes each input value to its output unchanged.
//!
//! The value is shared, not cloned. With the `enabled` parameter set to
//! false the filter swallows its input.

use super::{builtin_port_id, builtin_type_name};
use crate::pipeline::channel::PipeEvent;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::node::{Filter, FilterContext};
use crate::pipeline::parameter::{ParameterError, ParameterValue};
use crate::pipeline::port::PortDescriptor;
use std::marker::PhantomData;

pub struct ForwardFilter<T> {
    type_name: String,
    ports: Vec<PortDescriptor>,
    enabled: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ForwardFilter<T> {
    pub fn new() -> Self {
        Self::with_type_name(builtin_type_name::<T>("forward"))
    }

    pub fn with_type_name(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ports: vec![
                PortDescriptor::input::<T>(builtin_port_id::<T>("forward", "in"), "in"),
                PortDescriptor::output::<T>(builtin_port_id::<T>("forward", "out"), "out"),
            ],
            enabled: true,
            _payload: PhantomData,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl<T: Send + Sync + 'static> Default for ForwardFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Filter for ForwardFilter<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn proceed(&mut self, ctx: &mut FilterContext<'_>, _event: &PipeEvent) -> PipelineResult<()> {
        let value = ctx.read::<T>("in")?;
        if self.enabled {
            ctx.signal_shared("out", value)?;
        }
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ParameterValue) -> Result<(), ParameterError> {
        match key {
            "enabled" => {
                self.enabled = value.as_bool().ok_or_else(|| ParameterError::WrongType {
                    expected: "bool",
                    actual: value.clone(),
                })?;
                Ok(())
            }
            _ => Err(ParameterError::Unknown),
        }
    }
}
