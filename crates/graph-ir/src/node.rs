//! IR nodes
//!
//! A node is an operation in the graph. It refers to its operands by [`NodeId`] and carries a
//! uniqued result type. Node bodies that work on images always use channel-last (NHWC) layout.

use core::fmt;

use derive_new::new;
use strum::Display;

use crate::tensor::{ElemKind, Tensor};

/// Handle to a node inside a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the graph.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Handle to a uniqued [`Type`] owned by a [`Graph`](crate::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(pub(crate) usize);

/// Element kind and explicit shape of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct Type {
    pub kind: ElemKind,
    pub dims: Vec<usize>,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.kind, self.dims)
    }
}

/// Element-wise binary operations.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Element-wise unary operations.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
}

/// Pooling flavours.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Avg,
}

/// Spatial window parameters shared by convolution and pooling.
///
/// `pads` is `[top, left, bottom, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Window {
    pub kernel: usize,
    pub stride: usize,
    pub pads: [usize; 4],
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A parameter owning its tensor.
    Variable { tensor: Tensor },
    Transpose { shuffle: Vec<usize> },
    /// Inputs: `[input (NHWC), filter, bias]`.
    Convolution { window: Window, group: usize },
    Pool { kind: PoolKind, window: Window },
    Squeeze { axes: Vec<usize> },
    ExpandDims { axes: Vec<usize> },
    /// Inputs: `[input, scale, bias, mean, var]`.
    BatchNormalization {
        channel: usize,
        epsilon: f32,
        momentum: f32,
    },
    Concat { axis: usize },
    MatMul,
    /// Broadcasts the input into the node type, aligning input dimension 0 with `axis`.
    Broadcast { axis: usize },
    Arithmetic(ArithmeticOp),
    Unary(UnaryOp),
    SoftMax { axis: usize },
    Reshape,
    /// Terminal binding of a graph result.
    Save,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Variable { .. } => write!(f, "Variable"),
            NodeKind::Transpose { shuffle } => write!(f, "Transpose{shuffle:?}"),
            NodeKind::Convolution { window, group } => write!(
                f,
                "Convolution(kernel={}, stride={}, pads={:?}, group={group})",
                window.kernel, window.stride, window.pads
            ),
            NodeKind::Pool { kind, window } => write!(
                f,
                "Pool{kind}(kernel={}, stride={}, pads={:?})",
                window.kernel, window.stride, window.pads
            ),
            NodeKind::Squeeze { axes } => write!(f, "Squeeze{axes:?}"),
            NodeKind::ExpandDims { axes } => write!(f, "ExpandDims{axes:?}"),
            NodeKind::BatchNormalization {
                channel,
                epsilon,
                momentum,
            } => write!(
                f,
                "BatchNormalization(channel={channel}, epsilon={epsilon}, momentum={momentum})"
            ),
            NodeKind::Concat { axis } => write!(f, "Concat(axis={axis})"),
            NodeKind::MatMul => write!(f, "MatMul"),
            NodeKind::Broadcast { axis } => write!(f, "Broadcast(axis={axis})"),
            NodeKind::Arithmetic(op) => write!(f, "{op}"),
            NodeKind::Unary(op) => write!(f, "{op}"),
            NodeKind::SoftMax { axis } => write!(f, "SoftMax(axis={axis})"),
            NodeKind::Reshape => write!(f, "Reshape"),
            NodeKind::Save => write!(f, "Save"),
        }
    }
}

/// A node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<NodeId>,
    pub ty: TypeRef,
}

impl Node {
    /// The tensor of a [`NodeKind::Variable`] node.
    pub fn tensor(&self) -> Option<&Tensor> {
        match &self.kind {
            NodeKind::Variable { tensor } => Some(tensor),
            _ => None,
        }
    }
}
