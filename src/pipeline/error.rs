//! Pipeline-specific error types.

use crate::pipeline::port::PortDirection;
use crate::pipeline::slot::SlotError;
use thiserror::Error;

/// Errors raised while wiring, validating or running a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("port {port} on node {node}: expected type {expected}, got {actual}")]
    WiringTypeMismatch {
        node: String,
        port: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("port {port} on node {node}: mandatory {direction} is not connected")]
    MissingMandatoryPort {
        node: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("node {node} has no {direction} port {port}")]
    UnknownPort {
        node: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    #[error("port {port} on node {node} is declared twice")]
    DuplicatePort { node: String, port: String },

    #[error("port {port} on node {node} is already connected")]
    AlreadyConnected { node: String, port: String },

    #[error("port {port} on node {node} is not connected")]
    NotConnected { node: String, port: String },

    #[error("group {group} on node {node} has more than {max} inputs")]
    GroupTooLarge { node: String, group: u32, max: usize },

    #[error("Cycle detected in pipeline graph between: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("pipe {pipe} on node {node} has {actual} slots, graph is configured for {expected}")]
    CapacityMismatch {
        node: String,
        pipe: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown filter type: {0}")]
    UnknownFilterType(String),

    #[error("parameter {key} on node {node}: {message}")]
    InvalidParameter {
        node: String,
        key: String,
        message: String,
    },

    #[error("port {port} on node {node}: {source}")]
    Slot {
        node: String,
        port: String,
        #[source]
        source: SlotError,
    },

    #[error("Node {node} error: {message}")]
    Filter { node: String, message: String },

    #[error("{}", join_problems(.0))]
    Multiple(Vec<PipelineError>),
}

impl PipelineError {
    /// `Ok` for an empty list of problems, otherwise the problem (or all of
    /// them as [`PipelineError::Multiple`]).
    pub fn from_problems(mut problems: Vec<PipelineError>) -> PipelineResult<()> {
        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            _ => Err(PipelineError::Multiple(problems)),
        }
    }

    /// Individual problems, flattening [`PipelineError::Multiple`].
    pub fn problems(&self) -> Vec<&PipelineError> {
        match self {
            PipelineError::Multiple(inner) => inner.iter().flat_map(|e| e.problems()).collect(),
            other => vec![other],
        }
    }
}

fn join_problems(problems: &[PipelineError]) -> String {
    let mut out = format!("{} problems:", problems.len());
    for problem in problems {
        out.push_str("\n  - ");
        out.push_str(&problem.to_string());
    }
    out
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_message() {
        let err = PipelineError::WiringTypeMismatch {
            node: "B".to_string(),
            port: "X".to_string(),
            expected: "i32",
            actual: "f64",
        };
        assert_eq!(err.to_string(), "port X on node B: expected type i32, got f64");
    }

    #[test]
    fn test_from_problems() {
        assert!(PipelineError::from_problems(Vec::new()).is_ok());

        let single = PipelineError::from_problems(vec![PipelineError::UnknownNode("a".into())]);
        assert_eq!(single, Err(PipelineError::UnknownNode("a".into())));

        let multiple = PipelineError::from_problems(vec![
            PipelineError::UnknownNode("a".into()),
            PipelineError::DuplicateNode("b".into()),
        ])
        .unwrap_err();
        assert_eq!(multiple.problems().len(), 2);
        let text = multiple.to_string();
        assert!(text.starts_with("2 problems:"));
        assert!(text.contains("Unknown node: a"));
        assert!(text.contains("Duplicate node: b"));
    }
}
