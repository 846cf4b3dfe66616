//! PairFilter: joins two inputs on the sequence number.
//!
//! Both inputs belong to group 1, so the filter runs once per sequence
//! number, after `first` and `second` have both been signaled, regardless
//! of the order they arrive in.

use super::{builtin_port_id, payload_label};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::group::GroupEvent;
use crate::pipeline::node::{Filter, FilterContext};
use crate::pipeline::port::{PortDescriptor, GROUP_JOIN};
use std::marker::PhantomData;
use std::sync::Arc;

/// Output payload of [`PairFilter`].
pub type Pair<A, B> = (Arc<A>, Arc<B>);

pub struct PairFilter<A, B> {
    type_name: String,
    ports: Vec<PortDescriptor>,
    _payload: PhantomData<fn() -> (A, B)>,
}

impl<A, B> PairFilter<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (first, second) = (payload_label::<A>(), payload_label::<B>());
        if first == second {
            Self::with_type_name(format!("pair<{}>", first))
        } else {
            Self::with_type_name(format!("pair<{}, {}>", first, second))
        }
    }

    pub fn with_type_name(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ports: vec![
                PortDescriptor::input::<A>(builtin_port_id::<(A, B)>("pair", "first"), "first")
                    .with_group(GROUP_JOIN),
                PortDescriptor::input::<B>(builtin_port_id::<(A, B)>("pair", "second"), "second")
                    .with_group(GROUP_JOIN),
                PortDescriptor::output::<Pair<A, B>>(
                    builtin_port_id::<(A, B)>("pair", "pair"),
                    "pair",
                ),
            ],
            _payload: PhantomData,
        }
    }
}

impl<A, B> Default for PairFilter<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B> Filter for PairFilter<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn proceed_group(
        &mut self,
        ctx: &mut FilterContext<'_>,
        _event: &GroupEvent,
    ) -> PipelineResult<()> {
        if !ctx.is_linked("pair") {
            return Ok(());
        }
        let first = ctx.read::<A>("first")?;
        let second = ctx.read::<B>("second")?;
        ctx.signal::<Pair<A, B>>("pair", (first, second))?;
        Ok(())
    }
}
