use std::path::PathBuf;

use graph_ir::{GraphError, TensorError};
use strum::Display;

use crate::attribute::AttributeError;

/// Coarse classification of a load failure.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or oversized input, or an unreadable file.
    Format,
    /// IR version too old, or no usable default operator set.
    Version,
    /// Element type other than float32/int64, or a tensor without usable payload.
    UnsupportedTensorKind,
    /// Missing, mistyped or unsupported attribute value.
    UnsupportedAttribute,
    /// Operator type not handled by the loader.
    UnsupportedOperator,
    /// Shapes or value references that do not line up.
    ShapeInvariant,
}

/// Errors raised while loading a model.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot open model file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("malformed model: {0}")]
    Decode(#[from] protobuf::Error),

    #[error("model of at least {size} bytes exceeds the decode limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("IR version {0} is too old, at least {min} is required", min = crate::reader::MIN_IR_VERSION)]
    IrVersion(i64),

    #[error("model does not import the default operator set")]
    MissingOpset,

    #[error("unsupported default operator set version {0}")]
    OpsetVersion(i64),

    #[error("tensor {name}: unsupported element type {data_type}")]
    TensorKind { name: String, data_type: String },

    #[error("tensor {name} has no payload")]
    EmptyTensor { name: String },

    #[error("tensor {name}: {source}")]
    Tensor {
        name: String,
        #[source]
        source: TensorError,
    },

    #[error("input {name} needs {size} bytes, more than the limit of {limit} bytes")]
    InputTooLarge { name: String, size: u64, limit: u64 },

    #[error("input {name} has a dimension without a fixed size")]
    SymbolicDim { name: String },

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error("unsupported operator {op_type} (node {name})")]
    UnsupportedOperator { op_type: String, name: String },

    #[error("{0}")]
    Shape(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("value {0} is not defined by any input, initializer or prior node")]
    UnresolvedValue(String),

    #[error("value {0} must be a constant tensor")]
    NotConstant(String),

    #[error("graph declares no outputs")]
    NoOutputs,

    #[error("failed to lower {op_type} node {name}: {source}")]
    Node {
        op_type: String,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. }
            | Error::Read(_)
            | Error::Decode(_)
            | Error::TooLarge { .. }
            | Error::InputTooLarge { .. }
            | Error::Tensor {
                source: TensorError::Overflow { .. },
                ..
            } => ErrorKind::Format,
            Error::IrVersion(_) | Error::MissingOpset | Error::OpsetVersion(_) => {
                ErrorKind::Version
            }
            Error::Tensor {
                source: TensorError::CopyMismatch { .. } | TensorError::Permutation { .. },
                ..
            } => ErrorKind::ShapeInvariant,
            Error::TensorKind { .. }
            | Error::EmptyTensor { .. }
            | Error::Tensor { .. }
            | Error::SymbolicDim { .. } => ErrorKind::UnsupportedTensorKind,
            Error::Attribute(_) => ErrorKind::UnsupportedAttribute,
            Error::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            Error::Shape(_)
            | Error::Graph(_)
            | Error::UnresolvedValue(_)
            | Error::NotConstant(_)
            | Error::NoOutputs => ErrorKind::ShapeInvariant,
            Error::Node { source, .. } => source.kind(),
        }
    }

    /// Attach the failing node to an error raised while lowering it.
    pub(crate) fn in_node(self, op_type: &str, name: &str) -> Self {
        match self {
            Error::Node { .. } | Error::UnsupportedOperator { .. } => self,
            source => Error::Node {
                op_type: op_type.to_string(),
                name: name.to_string(),
                source: Box::new(source),
            },
        }
    }

    /// The innermost error, skipping node context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Node { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
