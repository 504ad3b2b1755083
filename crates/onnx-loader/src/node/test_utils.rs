//! Builders for node and model protos used by the tests.

use graph_ir::{ElemKind, Graph, NodeId, Tensor};
use protobuf::{EnumOrUnknown, Message};

use crate::error::Result;
use crate::node::LoweringEngine;
use crate::protos::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto, attribute_proto::AttributeType,
    tensor_proto::DataType, tensor_shape_proto, type_proto,
};
use crate::tensor_table::TensorTable;

pub fn float_tensor(name: &str, dims: &[i64], values: Vec<f32>) -> TensorProto {
    let mut tensor = TensorProto::new();
    tensor.name = name.to_string();
    tensor.data_type = DataType::FLOAT as i32;
    tensor.dims = dims.to_vec();
    tensor.float_data = values;
    tensor
}

pub fn int64_tensor(name: &str, dims: &[i64], values: Vec<i64>) -> TensorProto {
    let mut tensor = TensorProto::new();
    tensor.name = name.to_string();
    tensor.data_type = DataType::INT64 as i32;
    tensor.dims = dims.to_vec();
    tensor.int64_data = values;
    tensor
}

pub fn value_info(name: &str, elem_type: DataType, dims: &[i64]) -> ValueInfoProto {
    let mut shape = TensorShapeProto::new();
    shape.dim = dims
        .iter()
        .map(|&d| {
            let mut dim = tensor_shape_proto::Dimension::new();
            dim.value = Some(tensor_shape_proto::dimension::Value::DimValue(d));
            dim
        })
        .collect();

    let mut tensor_type = type_proto::Tensor::new();
    tensor_type.elem_type = elem_type as i32;
    tensor_type.shape = Some(shape).into();

    let mut ty = TypeProto::new();
    ty.value = Some(type_proto::Value::TensorType(tensor_type));

    let mut info = ValueInfoProto::new();
    info.name = name.to_string();
    info.type_ = Some(ty).into();
    info
}

fn attribute(name: &str, ty: AttributeType) -> AttributeProto {
    let mut attr = AttributeProto::new();
    attr.name = name.to_string();
    attr.type_ = EnumOrUnknown::new(ty);
    attr
}

/// Builds a [`NodeProto`] with typed attributes.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: NodeProto,
}

impl NodeBuilder {
    pub fn new(op_type: &str, name: &str) -> Self {
        let mut node = NodeProto::new();
        node.op_type = op_type.to_string();
        node.name = name.to_string();
        Self { node }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.node.input.push(name.to_string());
        self
    }

    pub fn inputs(mut self, names: &[&str]) -> Self {
        self.node.input.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.node.output.push(name.to_string());
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.node.domain = domain.to_string();
        self
    }

    pub fn attr_int(mut self, name: &str, value: i64) -> Self {
        let mut attr = attribute(name, AttributeType::INT);
        attr.i = value;
        self.node.attribute.push(attr);
        self
    }

    pub fn attr_float(mut self, name: &str, value: f32) -> Self {
        let mut attr = attribute(name, AttributeType::FLOAT);
        attr.f = value;
        self.node.attribute.push(attr);
        self
    }

    pub fn attr_string(mut self, name: &str, value: &str) -> Self {
        let mut attr = attribute(name, AttributeType::STRING);
        attr.s = value.as_bytes().to_vec();
        self.node.attribute.push(attr);
        self
    }

    pub fn attr_ints(mut self, name: &str, values: Vec<i64>) -> Self {
        let mut attr = attribute(name, AttributeType::INTS);
        attr.ints = values;
        self.node.attribute.push(attr);
        self
    }

    pub fn attr_tensor(mut self, name: &str, tensor: TensorProto) -> Self {
        let mut attr = attribute(name, AttributeType::TENSOR);
        attr.t = Some(tensor).into();
        self.node.attribute.push(attr);
        self
    }

    pub fn build(self) -> NodeProto {
        self.node
    }
}

/// Builds a serialized [`ModelProto`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    model: ModelProto,
    graph: GraphProto,
}

impl ModelBuilder {
    /// A model with the given IR version importing the default operator set at `opset`.
    pub fn new(ir_version: i64, opset: i64) -> Self {
        let mut model = ModelProto::new();
        model.ir_version = ir_version;
        let mut import = OperatorSetIdProto::new();
        import.version = opset;
        model.opset_import.push(import);

        let mut graph = GraphProto::new();
        graph.name = "test".to_string();
        Self { model, graph }
    }

    pub fn input(mut self, name: &str, dims: &[i64]) -> Self {
        self.graph
            .input
            .push(value_info(name, DataType::FLOAT, dims));
        self
    }

    pub fn input_info(mut self, info: ValueInfoProto) -> Self {
        self.graph.input.push(info);
        self
    }

    pub fn initializer(mut self, tensor: TensorProto) -> Self {
        self.graph.initializer.push(tensor);
        self
    }

    pub fn node(mut self, node: NodeProto) -> Self {
        self.graph.node.push(node);
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        let mut info = ValueInfoProto::new();
        info.name = name.to_string();
        self.graph.output.push(info);
        self
    }

    pub fn build(self) -> ModelProto {
        let Self { mut model, graph } = self;
        model.graph = Some(graph).into();
        model
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.build()
            .write_to_bytes()
            .expect("model should serialize")
    }
}

/// A graph and tensor table to lower single nodes into.
pub struct Harness {
    pub graph: Graph,
    pub table: TensorTable<'static>,
    pub opset: i64,
}

impl Harness {
    pub fn new(opset: i64) -> Self {
        Self {
            graph: Graph::new("test"),
            table: TensorTable::new(),
            opset,
        }
    }

    /// Declare a float input of the given shape.
    pub fn input(mut self, name: &str, dims: &[usize]) -> Self {
        self.table.insert(name, Tensor::zeros(ElemKind::Float, dims).unwrap());
        self
    }

    pub fn constant(mut self, name: &str, tensor: Tensor) -> Self {
        self.table.insert(name, tensor);
        self
    }

    pub fn lower(&mut self, node: &NodeProto) -> Result<bool> {
        LoweringEngine::new(&mut self.graph, &mut self.table, self.opset).lower(node)
    }

    pub fn value(&self, name: &str) -> NodeId {
        self.table.value(name).expect("value should be bound")
    }

    pub fn dims(&self, name: &str) -> Vec<usize> {
        self.graph.dims(self.value(name)).unwrap().to_vec()
    }
}
