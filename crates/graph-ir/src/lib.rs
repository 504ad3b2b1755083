#![warn(missing_docs)]

//! `graph-ir` holds the typed tensors and the computation graph that model loaders lower into.
//!
//! A [`Graph`] owns its nodes in creation order and uniques their result [`Type`]s. Parameters
//! are [`NodeKind::Variable`] nodes owning a [`Tensor`]; graph results are bound through
//! [`NodeKind::Save`] nodes.

#[allow(missing_docs)]
mod graph;
#[allow(missing_docs)]
mod node;
#[allow(missing_docs)]
mod tensor;

pub use graph::{BatchNormParams, Checkpoint, Graph, GraphError, conv_pool_output_dims};
pub use node::{ArithmeticOp, Node, NodeId, NodeKind, PoolKind, Type, TypeRef, UnaryOp, Window};
pub use tensor::{ElemKind, Tensor, TensorData, TensorError, byte_size, element_count};
