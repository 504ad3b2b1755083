use core::fmt;
use std::collections::HashMap;

use derive_new::new;

use crate::node::{
    ArithmeticOp, Node, NodeId, NodeKind, PoolKind, Type, TypeRef, UnaryOp, Window,
};
use crate::tensor::{ElemKind, Tensor, TensorError, element_count, is_permutation};

/// Errors raised while constructing graph nodes.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("{node}: expected an input of rank {expected}, got {actual}")]
    Rank {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("{node}: expected {expected} elements, got {actual}")]
    Kind {
        node: String,
        expected: ElemKind,
        actual: ElemKind,
    },

    #[error("{node}: {detail}")]
    Shape { node: String, detail: String },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

fn shape_error(node: &str, detail: impl Into<String>) -> GraphError {
    GraphError::Shape {
        node: node.to_string(),
        detail: detail.into(),
    }
}

/// The four parameter tensors of a batch normalization, all of length `channels`.
#[derive(Debug, Clone, new)]
pub struct BatchNormParams {
    pub scale: Tensor,
    pub bias: Tensor,
    pub mean: Tensor,
    pub var: Tensor,
}

/// Output height and width of a convolution or pooling window over an `in_h` x `in_w` image.
///
/// `pads` is `[top, left, bottom, right]`.
pub fn conv_pool_output_dims(
    in_h: usize,
    in_w: usize,
    window: &Window,
) -> Option<(usize, usize)> {
    let [top, left, bottom, right] = window.pads;
    let padded_h = in_h.checked_add(top)?.checked_add(bottom)?;
    let padded_w = in_w.checked_add(left)?.checked_add(right)?;
    if window.stride == 0 || window.kernel == 0 || window.kernel > padded_h || window.kernel > padded_w
    {
        return None;
    }

    Some((
        (padded_h - window.kernel) / window.stride + 1,
        (padded_w - window.kernel) / window.stride + 1,
    ))
}

/// Sizes of a [`Graph`] to roll back to, taken with [`Graph::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    nodes: usize,
    types: usize,
}

/// The computation graph.
///
/// Nodes are stored in creation order, so an operand always precedes its users. Types are
/// uniqued: two values of the same kind and shape share one [`TypeRef`].
#[derive(Debug, Default, Clone)]
pub struct Graph {
    name: String,
    nodes: Vec<Node>,
    types: Vec<Type>,
    type_ids: HashMap<Type, TypeRef>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            types: self.types.len(),
        }
    }

    /// Drop every node and type created since `checkpoint` was taken.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if checkpoint.nodes < self.nodes.len() {
            log::debug!(
                "Discarding {} nodes of graph {}",
                self.nodes.len() - checkpoint.nodes,
                self.name
            );
        }
        self.nodes.truncate(checkpoint.nodes);
        self.types.truncate(checkpoint.types);
        self.type_ids.retain(|_, id| id.0 < checkpoint.types);
    }

    /// Number of distinct types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    /// The uniqued type for `kind` and `dims`.
    pub fn unique_type(&mut self, kind: ElemKind, dims: &[usize]) -> TypeRef {
        let ty = Type::new(kind, dims.to_vec());
        if let Some(id) = self.type_ids.get(&ty) {
            return *id;
        }
        let id = TypeRef(self.types.len());
        self.types.push(ty.clone());
        self.type_ids.insert(ty, id);
        id
    }

    pub fn type_of(&self, ty: TypeRef) -> &Type {
        &self.types[ty.0]
    }

    /// The result type of a node.
    pub fn ty(&self, id: NodeId) -> Result<&Type, GraphError> {
        Ok(self.type_of(self.node(id)?.ty))
    }

    pub fn dims(&self, id: NodeId) -> Result<&[usize], GraphError> {
        Ok(&self.ty(id)?.dims)
    }

    pub fn kind(&self, id: NodeId) -> Result<ElemKind, GraphError> {
        Ok(self.ty(id)?.kind)
    }

    /// Iterate over the parameter nodes.
    pub fn variables(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.iter()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Variable { .. }))
    }

    /// Iterate over the terminal save nodes.
    pub fn saves(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.iter()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Save))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i), node))
    }

    fn push(&mut self, name: &str, kind: NodeKind, inputs: Vec<NodeId>, ty: TypeRef) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
            inputs,
            ty,
        });
        id
    }

    fn push_with_type(
        &mut self,
        name: &str,
        kind: NodeKind,
        inputs: Vec<NodeId>,
        elem: ElemKind,
        dims: &[usize],
    ) -> NodeId {
        let ty = self.unique_type(elem, dims);
        self.push(name, kind, inputs, ty)
    }

    fn expect_rank(&self, name: &str, id: NodeId, rank: usize) -> Result<Vec<usize>, GraphError> {
        let dims = self.dims(id)?;
        if dims.len() != rank {
            return Err(GraphError::Rank {
                node: name.to_string(),
                expected: rank,
                actual: dims.len(),
            });
        }
        Ok(dims.to_vec())
    }

    fn expect_kind(&self, name: &str, id: NodeId, kind: ElemKind) -> Result<(), GraphError> {
        let actual = self.kind(id)?;
        if actual != kind {
            return Err(GraphError::Kind {
                node: name.to_string(),
                expected: kind,
                actual,
            });
        }
        Ok(())
    }

    /// Create a parameter node that owns `tensor`.
    pub fn create_variable(&mut self, name: &str, tensor: Tensor) -> NodeId {
        let ty = self.unique_type(tensor.kind(), tensor.dims());
        self.push(name, NodeKind::Variable { tensor }, vec![], ty)
    }

    pub fn create_transpose(
        &mut self,
        name: &str,
        input: NodeId,
        shuffle: &[usize],
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        if !is_permutation(shuffle, ty.dims.len()) {
            return Err(TensorError::Permutation {
                shuffle: shuffle.to_vec(),
                rank: ty.dims.len(),
            }
            .into());
        }
        let dims: Vec<usize> = shuffle.iter().map(|&axis| ty.dims[axis]).collect();
        Ok(self.push_with_type(
            name,
            NodeKind::Transpose {
                shuffle: shuffle.to_vec(),
            },
            vec![input],
            ty.kind,
            &dims,
        ))
    }

    /// Create a 2-D convolution over an NHWC input.
    ///
    /// `filter` is `[depth, kernel, kernel, channels / group]`, `bias` is `[depth]` and
    /// `out_ty` must be the `[n, out_h, out_w, depth]` type implied by the window.
    #[allow(clippy::too_many_arguments)]
    pub fn create_conv(
        &mut self,
        name: &str,
        input: NodeId,
        filter: NodeId,
        bias: NodeId,
        out_ty: TypeRef,
        window: Window,
        group: usize,
    ) -> Result<NodeId, GraphError> {
        let [n, h, w, c] = as_nhwc(self.expect_rank(name, input, 4)?);
        let filter_dims = self.expect_rank(name, filter, 4)?;
        let bias_dims = self.expect_rank(name, bias, 1)?;
        let depth = filter_dims[0];

        if group == 0 || c % group != 0 || filter_dims[3] * group != c {
            return Err(shape_error(
                name,
                format!("filter {filter_dims:?} does not match {c} input channels in {group} groups"),
            ));
        }
        if filter_dims[1] != window.kernel || filter_dims[2] != window.kernel {
            return Err(shape_error(
                name,
                format!("filter {filter_dims:?} does not match kernel {}", window.kernel),
            ));
        }
        if bias_dims[0] != depth {
            return Err(shape_error(
                name,
                format!("bias of length {} does not match depth {depth}", bias_dims[0]),
            ));
        }

        let (out_h, out_w) = conv_pool_output_dims(h, w, &window)
            .ok_or_else(|| shape_error(name, format!("window {window:?} does not fit {h}x{w}")))?;
        let expected = [n, out_h, out_w, depth];
        let out = self.type_of(out_ty);
        if out.dims != expected {
            return Err(shape_error(
                name,
                format!("output type {out} does not match expected {expected:?}"),
            ));
        }

        Ok(self.push(
            name,
            NodeKind::Convolution { window, group },
            vec![input, filter, bias],
            out_ty,
        ))
    }

    /// Create a max or average pooling over an NHWC input.
    pub fn create_pool(
        &mut self,
        name: &str,
        kind: PoolKind,
        input: NodeId,
        window: Window,
    ) -> Result<NodeId, GraphError> {
        let [n, h, w, c] = as_nhwc(self.expect_rank(name, input, 4)?);
        let elem = self.kind(input)?;
        let (out_h, out_w) = conv_pool_output_dims(h, w, &window)
            .ok_or_else(|| shape_error(name, format!("window {window:?} does not fit {h}x{w}")))?;

        Ok(self.push_with_type(
            name,
            NodeKind::Pool { kind, window },
            vec![input],
            elem,
            &[n, out_h, out_w, c],
        ))
    }

    /// Remove the size-1 dimensions at `axes`.
    pub fn create_squeeze(
        &mut self,
        name: &str,
        input: NodeId,
        axes: &[usize],
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        let axes = sorted_axes(name, axes, ty.dims.len())?;
        for &axis in &axes {
            if ty.dims[axis] != 1 {
                return Err(shape_error(
                    name,
                    format!("cannot squeeze dimension {axis} of size {}", ty.dims[axis]),
                ));
            }
        }
        let dims: Vec<usize> = ty
            .dims
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, d)| *d)
            .collect();

        Ok(self.push_with_type(
            name,
            NodeKind::Squeeze { axes },
            vec![input],
            ty.kind,
            &dims,
        ))
    }

    /// Insert size-1 dimensions so that they sit at `axes` of the output.
    pub fn create_expand_dims(
        &mut self,
        name: &str,
        input: NodeId,
        axes: &[usize],
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        let axes = sorted_axes(name, axes, ty.dims.len() + axes.len())?;
        let mut dims = ty.dims.clone();
        for &axis in &axes {
            dims.insert(axis, 1);
        }

        Ok(self.push_with_type(
            name,
            NodeKind::ExpandDims { axes },
            vec![input],
            ty.kind,
            &dims,
        ))
    }

    /// Create a batch normalization over dimension `channel`, binding the four parameter
    /// tensors as new variables.
    pub fn create_batch_normalization(
        &mut self,
        name: &str,
        input: NodeId,
        channel: usize,
        epsilon: f32,
        momentum: f32,
        params: BatchNormParams,
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        let channels = *ty.dims.get(channel).ok_or_else(|| {
            shape_error(name, format!("channel dimension {channel} is out of range for {ty}"))
        })?;

        let BatchNormParams {
            scale,
            bias,
            mean,
            var,
        } = params;
        let mut inputs = vec![input];
        for (suffix, source) in [("scale", scale), ("bias", bias), ("mean", mean), ("var", var)] {
            // The parameter keeps the layout the node expects; copy_from checks the source.
            let mut tensor = Tensor::zeros(ElemKind::Float, &[channels])?;
            tensor.copy_from(&source)?;
            inputs.push(self.create_variable(&format!("{name}.{suffix}"), tensor));
        }

        let out_ty = self.node(input)?.ty;
        Ok(self.push(
            name,
            NodeKind::BatchNormalization {
                channel,
                epsilon,
                momentum,
            },
            inputs,
            out_ty,
        ))
    }

    pub fn create_concat(
        &mut self,
        name: &str,
        inputs: &[NodeId],
        axis: usize,
    ) -> Result<NodeId, GraphError> {
        let first = inputs
            .first()
            .ok_or_else(|| shape_error(name, "concat needs at least one input"))?;
        let first_ty = self.ty(*first)?.clone();
        if axis >= first_ty.dims.len() {
            return Err(shape_error(
                name,
                format!("axis {axis} is out of range for {first_ty}"),
            ));
        }

        let mut dims = first_ty.dims.clone();
        dims[axis] = 0;
        for input in inputs {
            let ty = self.ty(*input)?;
            let compatible = ty.kind == first_ty.kind
                && ty.dims.len() == dims.len()
                && ty
                    .dims
                    .iter()
                    .zip(&first_ty.dims)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(shape_error(
                    name,
                    format!("cannot concatenate {ty} with {first_ty} along axis {axis}"),
                ));
            }
            dims[axis] += ty.dims[axis];
        }

        Ok(self.push_with_type(
            name,
            NodeKind::Concat { axis },
            inputs.to_vec(),
            first_ty.kind,
            &dims,
        ))
    }

    /// 2-D matrix product `[m, k] x [k, n] -> [m, n]`.
    pub fn create_matmul(
        &mut self,
        name: &str,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, GraphError> {
        let lhs_dims = self.expect_rank(name, lhs, 2)?;
        let rhs_dims = self.expect_rank(name, rhs, 2)?;
        let elem = self.kind(lhs)?;
        self.expect_kind(name, rhs, elem)?;
        if lhs_dims[1] != rhs_dims[0] {
            return Err(shape_error(
                name,
                format!("cannot multiply {lhs_dims:?} by {rhs_dims:?}"),
            ));
        }

        Ok(self.push_with_type(
            name,
            NodeKind::MatMul,
            vec![lhs, rhs],
            elem,
            &[lhs_dims[0], rhs_dims[1]],
        ))
    }

    /// Broadcast `input` to `new_dims`, aligning input dimension 0 with output dimension `axis`.
    /// Each input dimension must equal the output dimension it aligns with, or be 1.
    pub fn create_broadcast(
        &mut self,
        name: &str,
        input: NodeId,
        new_dims: &[usize],
        axis: usize,
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        let fits = axis + ty.dims.len() <= new_dims.len()
            && ty
                .dims
                .iter()
                .enumerate()
                .all(|(i, &d)| d == 1 || d == new_dims[axis + i]);
        if !fits {
            return Err(shape_error(
                name,
                format!("cannot broadcast {ty} to {new_dims:?} at axis {axis}"),
            ));
        }

        Ok(self.push_with_type(
            name,
            NodeKind::Broadcast { axis },
            vec![input],
            ty.kind,
            new_dims,
        ))
    }

    /// Element-wise binary operation; both operands must have the same type.
    pub fn create_arithmetic(
        &mut self,
        name: &str,
        op: ArithmeticOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, GraphError> {
        let lhs_ty = self.node(lhs)?.ty;
        let rhs_ty = self.node(rhs)?.ty;
        if lhs_ty != rhs_ty {
            return Err(shape_error(
                name,
                format!(
                    "operands of {op} differ: {} and {}",
                    self.type_of(lhs_ty),
                    self.type_of(rhs_ty)
                ),
            ));
        }
        Ok(self.push(name, NodeKind::Arithmetic(op), vec![lhs, rhs], lhs_ty))
    }

    pub fn create_unary(
        &mut self,
        name: &str,
        op: UnaryOp,
        input: NodeId,
    ) -> Result<NodeId, GraphError> {
        let ty = self.node(input)?.ty;
        Ok(self.push(name, NodeKind::Unary(op), vec![input], ty))
    }

    pub fn create_softmax(
        &mut self,
        name: &str,
        input: NodeId,
        axis: usize,
    ) -> Result<NodeId, GraphError> {
        let ty = self.node(input)?.ty;
        let rank = self.type_of(ty).dims.len();
        if axis >= rank {
            return Err(shape_error(
                name,
                format!("axis {axis} is out of range for rank {rank}"),
            ));
        }
        Ok(self.push(name, NodeKind::SoftMax { axis }, vec![input], ty))
    }

    pub fn create_reshape(
        &mut self,
        name: &str,
        input: NodeId,
        dims: &[usize],
    ) -> Result<NodeId, GraphError> {
        let ty = self.ty(input)?.clone();
        let from = element_count(&ty.dims)?;
        let to = element_count(dims)?;
        if from != to {
            return Err(shape_error(
                name,
                format!("cannot reshape {ty} into {dims:?}"),
            ));
        }
        Ok(self.push_with_type(name, NodeKind::Reshape, vec![input], ty.kind, dims))
    }

    /// Create the terminal binding of `input` as a graph result.
    pub fn create_save(&mut self, name: &str, input: NodeId) -> Result<NodeId, GraphError> {
        let ty = self.node(input)?.ty;
        Ok(self.push(name, NodeKind::Save, vec![input], ty))
    }
}

fn as_nhwc(dims: Vec<usize>) -> [usize; 4] {
    [dims[0], dims[1], dims[2], dims[3]]
}

fn sorted_axes(name: &str, axes: &[usize], rank: usize) -> Result<Vec<usize>, GraphError> {
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != axes.len() || sorted.iter().any(|&axis| axis >= rank) {
        return Err(shape_error(
            name,
            format!("invalid axes {axes:?} for rank {rank}"),
        ));
    }
    Ok(sorted)
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} ({} nodes)", self.name, self.nodes.len())?;
        for (id, node) in self.iter() {
            let inputs: Vec<String> = node.inputs.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "  {id} = {} \"{}\" ({}) : {}",
                node.kind,
                node.name,
                inputs.join(", "),
                self.type_of(node.ty)
            )?;
        }
        Ok(())
    }
}
