//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use fliplib::pipeline::{GroupEvent, ParameterError, ParameterValue, PipelineResult, PortId};
use fliplib::{Filter, FilterContext, PipeEvent, PortDescriptor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Which entry point of a filter ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Proceed,
    Group,
}

/// One recorded invocation: entry point, sequence number and the input
/// values read, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<T> {
    pub entry: Entry,
    pub sequence: u64,
    pub values: Vec<T>,
}

pub type Log<T> = Arc<Mutex<Vec<Invocation<T>>>>;

/// Sink that records every invocation. Inputs are read with `read_optional`,
/// so unconnected optional inputs are simply skipped.
pub struct RecordingSink<T> {
    ports: Vec<PortDescriptor>,
    log: Log<T>,
}

impl<T: Clone + Send + Sync + 'static> RecordingSink<T> {
    /// One mandatory input `key`, dispatched per signal.
    pub fn single(key: &str) -> (Self, Log<T>) {
        Self::with_ports(vec![PortDescriptor::input::<T>(
            PortId::derived(&format!("recording/{}", key)),
            key,
        )])
    }

    /// Mandatory inputs `keys`, all joined in `group`.
    pub fn join(keys: &[&str], group: u32) -> (Self, Log<T>) {
        Self::with_ports(
            keys.iter()
                .map(|key| {
                    PortDescriptor::input::<T>(PortId::derived(&format!("recording/{}", key)), *key)
                        .with_group(group)
                })
                .collect(),
        )
    }

    pub fn with_ports(ports: Vec<PortDescriptor>) -> (Self, Log<T>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                ports,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn record(&self, ctx: &FilterContext<'_>, entry: Entry) -> PipelineResult<()> {
        let mut values = Vec::new();
        for port in self.ports.iter().filter(|p| p.is_input()) {
            if let Some(value) = ctx.read_optional::<T>(port.key())? {
                values.push(value.as_ref().clone());
            }
        }
        self.log.lock().unwrap().push(Invocation {
            entry,
            sequence: ctx.sequence().value(),
            values,
        });
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> Filter for RecordingSink<T> {
    fn type_name(&self) -> &str {
        "recording_sink"
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn proceed(&mut self, ctx: &mut FilterContext<'_>, _event: &PipeEvent) -> PipelineResult<()> {
        self.record(ctx, Entry::Proceed)
    }

    fn proceed_group(
        &mut self,
        ctx: &mut FilterContext<'_>,
        _event: &GroupEvent,
    ) -> PipelineResult<()> {
        self.record(ctx, Entry::Group)
    }
}

/// Multiplies its `in` input by a constant and signals `out`.
pub struct ScaleFilter {
    factor: i64,
    ports: Vec<PortDescriptor>,
}

impl ScaleFilter {
    pub fn new(factor: i64) -> Self {
        Self {
            factor,
            ports: vec![
                PortDescriptor::input::<i64>(PortId::derived("scale/in"), "in"),
                PortDescriptor::output::<i64>(PortId::derived("scale/out"), "out"),
            ],
        }
    }
}

impl Filter for ScaleFilter {
    fn type_name(&self) -> &str {
        "scale"
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn proceed(&mut self, ctx: &mut FilterContext<'_>, _event: &PipeEvent) -> PipelineResult<()> {
        let value = ctx.read::<i64>("in")?;
        ctx.signal("out", *value * self.factor)?;
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: &ParameterValue) -> Result<(), ParameterError> {
        match key {
            "factor" => {
                self.factor = value.as_i64().ok_or_else(|| ParameterError::WrongType {
                    expected: "integer",
                    actual: value.clone(),
                })?;
                Ok(())
            }
            _ => Err(ParameterError::Unknown),
        }
    }
}
