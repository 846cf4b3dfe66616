//! Built-in filters.
//!
//! Generic over their payload type; [`FilterRegistry`](crate::pipeline::FilterRegistry)
//! registers them for the common scalar types.

pub mod collector;
pub mod forward;
pub mod pair;
pub mod source;

pub use collector::{Collected, CollectorFilter};
pub use forward::ForwardFilter;
pub use pair::{Pair, PairFilter};
pub use source::SourceFilter;

use crate::pipeline::id::PortId;
use std::any::TypeId;

/// Payload name used in built-in filter type names, such as the `string`
/// in `source<string>`. Types other than `String` use their Rust type name.
pub fn payload_label<T: ?Sized + 'static>() -> String {
    if TypeId::of::<T>() == TypeId::of::<String>() {
        return "string".to_string();
    }
    std::any::type_name::<T>().to_string()
}

/// Type name of a built-in filter over one payload type.
pub(crate) fn builtin_type_name<T: ?Sized + 'static>(filter: &str) -> String {
    format!("{}<{}>", filter, payload_label::<T>())
}

/// Port id shared by every instance of one filter type.
pub(crate) fn builtin_port_id<T: ?Sized>(filter: &str, port: &str) -> PortId {
    PortId::derived(&format!(
        "fliplib::{}<{}>/{}",
        filter,
        std::any::type_name::<T>(),
        port
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_labels() {
        assert_eq!(payload_label::<String>(), "string");
        assert_eq!(payload_label::<i64>(), "i64");
        assert_eq!(builtin_type_name::<bool>("forward"), "forward<bool>");
    }
}
