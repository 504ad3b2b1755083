#![warn(missing_docs)]
#![allow(clippy::upper_case_acronyms)]

//! `onnx-loader` reads ONNX models and lowers them into the computation graph of
//! [`graph_ir`]. Initializers become variables, each supported operator becomes one or more
//! graph nodes, and declared outputs are bound to save nodes.
//!
//! Spatial operators are given channel-first operands by ONNX while the graph works
//! channel-last, so their lowering inserts the transposes between the two layouts.

/// Generated ONNX protobuf messages.
#[allow(missing_docs)]
pub mod protos;

/// Typed access to node attributes.
#[allow(missing_docs)]
pub mod attribute;
/// Operator lowering.
#[allow(missing_docs)]
pub mod node;
/// Conversion of tensor protos into graph tensors.
pub mod proto_conversion;
/// Decoding of model files and version resolution.
#[allow(missing_docs)]
pub mod reader;
/// The name-keyed tensor and value table of a load.
#[allow(missing_docs)]
pub mod tensor_table;

#[allow(missing_docs)]
mod error;
mod logger;
#[allow(missing_docs)]
mod outputs;
#[allow(missing_docs)]
mod pipeline;

pub use attribute::{AttributeError, Attributes};
pub use error::{Error, ErrorKind, Result};
pub use logger::{LoggerError, init_log};
pub use node::{LoweringEngine, OpKind};
pub use outputs::{bind_outputs, save_name};
pub use pipeline::{LoadConfig, LoadedModel, OnnxLoader, load_onnx_bytes, load_onnx_file};
pub use reader::{MAX_PROTO_SIZE, MIN_IR_VERSION, ModelDescription, ModelReader};
pub use tensor_table::TensorTable;
