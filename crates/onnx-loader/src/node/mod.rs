//! Lowering of ONNX operators into graph nodes.
//!
//! Every supported operator has its own submodule with the attribute handling and the node
//! construction for that operator. Spatial operators take channel-first operands and
//! bracket their graph node with transposes to and from the channel-last layout the graph
//! works in.

#[cfg(test)]
pub(crate) mod test_utils;

pub mod arithmetic;
pub mod batch_norm;
pub mod concat;
pub mod constant;
pub mod conv;
pub mod elementwise;
pub mod gemm;
pub mod policy;
pub mod pool;
pub mod reshape;
pub mod squeeze;
pub mod transpose;

use std::str::FromStr;

use graph_ir::{Graph, NodeId};
use strum::EnumString;

use crate::attribute::Attributes;
use crate::error::{Error, Result};
use crate::protos::NodeProto;
use crate::tensor_table::TensorTable;

pub use policy::{broadcast_enabled, pads};

/// Channel-first to channel-last.
pub const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];
/// Channel-last to channel-first.
pub const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];

/// Operators the loader knows how to lower.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum OpKind {
    Constant,
    Conv,
    MaxPool,
    AveragePool,
    GlobalAveragePool,
    Squeeze,
    Unsqueeze,
    Dropout,
    Identity,
    BatchNormalization,
    Concat,
    Gemm,
    MatMul,
    Transpose,
    Reshape,
    Flatten,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Add,
    Sub,
    Mul,
    Div,
    Sum,
    #[strum(disabled)]
    Unsupported(String),
}

impl OpKind {
    /// Classify a node. Operators outside the default domain are never supported.
    pub fn from_node(node: &NodeProto) -> Self {
        let default_domain = node.domain.is_empty() || node.domain == "ai.onnx";
        match OpKind::from_str(&node.op_type) {
            Ok(kind) if default_domain => kind,
            _ => OpKind::Unsupported(node.op_type.clone()),
        }
    }
}

/// The name graph nodes created for `node` are given: the node name, or its first output.
pub fn operator_name(node: &NodeProto) -> &str {
    if !node.name.is_empty() {
        return &node.name;
    }
    node.output.first().map(String::as_str).unwrap_or_default()
}

/// A node being lowered, with its attributes.
pub struct OpNode<'n> {
    pub proto: &'n NodeProto,
    pub attrs: Attributes<'n>,
    pub name: &'n str,
}

impl<'n> OpNode<'n> {
    pub fn new(proto: &'n NodeProto) -> Self {
        Self {
            proto,
            attrs: Attributes::new(proto),
            name: operator_name(proto),
        }
    }

    pub fn op_type(&self) -> &'n str {
        &self.proto.op_type
    }

    /// The `index`-th input, which must be present.
    pub fn input(&self, index: usize) -> Result<&'n str> {
        self.optional_input(index).ok_or_else(|| {
            Error::Shape(format!(
                "{} expects an input at position {index}",
                self.op_type()
            ))
        })
    }

    /// The `index`-th input, if given. An empty name marks an omitted optional input.
    pub fn optional_input(&self, index: usize) -> Option<&'n str> {
        self.proto
            .input
            .get(index)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn inputs(&self) -> impl Iterator<Item = &'n str> + use<'n> {
        self.proto.input.iter().map(String::as_str)
    }

    pub fn output(&self) -> Result<&'n str> {
        self.proto
            .output
            .first()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Shape(format!("{} declares no output", self.op_type())))
    }

    /// Name for an auxiliary graph node created while lowering this one.
    pub fn part(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.name)
    }
}

/// Translates ONNX nodes into nodes of a [`Graph`], resolving operands through a
/// [`TensorTable`].
pub struct LoweringEngine<'g, 'a> {
    graph: &'g mut Graph,
    table: &'g mut TensorTable<'a>,
    opset_version: i64,
}

impl<'g, 'a> LoweringEngine<'g, 'a> {
    pub fn new(graph: &'g mut Graph, table: &'g mut TensorTable<'a>, opset_version: i64) -> Self {
        Self {
            graph,
            table,
            opset_version,
        }
    }

    pub fn opset_version(&self) -> i64 {
        self.opset_version
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn table(&mut self) -> &mut TensorTable<'a> {
        self.table
    }

    /// The graph value for an operand name.
    pub fn value(&mut self, name: &str) -> Result<NodeId> {
        self.table.get_or_create_value(self.graph, name)
    }

    /// Bind `value` to the first output of `node`.
    pub fn bind_output(&mut self, node: &OpNode, value: NodeId) -> Result<()> {
        let output = node.output()?;
        self.table.bind_value(output, value);
        Ok(())
    }

    /// Lower one node. Returns `false` for operators the loader does not support, leaving the
    /// graph untouched.
    pub fn lower(&mut self, proto: &NodeProto) -> Result<bool> {
        let kind = OpKind::from_node(proto);
        if let OpKind::Unsupported(op_type) = &kind {
            log::debug!("Unsupported operator {op_type}");
            return Ok(false);
        }

        let node = OpNode::new(proto);
        log::debug!("Lowering {:?} node {}", kind, node.name);

        match kind {
            OpKind::Constant => constant::lower_constant(self, &node)?,
            OpKind::Conv => conv::lower_conv(self, &node)?,
            OpKind::MaxPool => pool::lower_pool(self, &node, graph_ir::PoolKind::Max)?,
            OpKind::AveragePool => pool::lower_pool(self, &node, graph_ir::PoolKind::Avg)?,
            OpKind::GlobalAveragePool => pool::lower_global_avg_pool(self, &node)?,
            OpKind::Squeeze => squeeze::lower_squeeze(self, &node)?,
            OpKind::Unsqueeze => squeeze::lower_unsqueeze(self, &node)?,
            OpKind::Dropout | OpKind::Identity => elementwise::lower_identity(self, &node)?,
            OpKind::BatchNormalization => batch_norm::lower_batch_norm(self, &node)?,
            OpKind::Concat => concat::lower_concat(self, &node)?,
            OpKind::Gemm => gemm::lower_gemm(self, &node)?,
            OpKind::MatMul => gemm::lower_matmul(self, &node)?,
            OpKind::Transpose => transpose::lower_transpose(self, &node)?,
            OpKind::Reshape => reshape::lower_reshape(self, &node)?,
            OpKind::Flatten => reshape::lower_flatten(self, &node)?,
            OpKind::Relu => elementwise::lower_unary(self, &node, graph_ir::UnaryOp::Relu)?,
            OpKind::Sigmoid => elementwise::lower_unary(self, &node, graph_ir::UnaryOp::Sigmoid)?,
            OpKind::Tanh => elementwise::lower_unary(self, &node, graph_ir::UnaryOp::Tanh)?,
            OpKind::Softmax => elementwise::lower_softmax(self, &node)?,
            OpKind::Add => arithmetic::lower_binary(self, &node, graph_ir::ArithmeticOp::Add)?,
            OpKind::Sub => arithmetic::lower_binary(self, &node, graph_ir::ArithmeticOp::Sub)?,
            OpKind::Mul => arithmetic::lower_binary(self, &node, graph_ir::ArithmeticOp::Mul)?,
            OpKind::Div => arithmetic::lower_binary(self, &node, graph_ir::ArithmeticOp::Div)?,
            OpKind::Sum => arithmetic::lower_sum(self, &node)?,
            OpKind::Unsupported(_) => return Ok(false),
        }

        Ok(true)
    }
}
