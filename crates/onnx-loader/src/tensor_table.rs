use std::collections::HashMap;

use graph_ir::{Graph, NodeId, Tensor};

use crate::error::{Error, Result};
use crate::proto_conversion::{tensor_from_proto, tensor_from_value_info};
use crate::protos::{TensorProto, ValueInfoProto};

/// A table entry: either materialized by the load or lent by the caller.
#[derive(Debug, Clone)]
pub enum TensorSlot<'a> {
    Owned(Tensor),
    Borrowed(&'a Tensor),
}

impl TensorSlot<'_> {
    pub fn tensor(&self) -> &Tensor {
        match self {
            TensorSlot::Owned(tensor) => tensor,
            TensorSlot::Borrowed(tensor) => tensor,
        }
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, TensorSlot::Borrowed(_))
    }
}

/// What a value name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'t> {
    Tensor(&'t Tensor),
    Value(NodeId),
}

/// Name-keyed store of the tensors and graph values known during one load.
///
/// Caller-bound tensors are inserted first and are never replaced afterwards.
#[derive(Debug, Default)]
pub struct TensorTable<'a> {
    tensors: HashMap<String, TensorSlot<'a>>,
    values: HashMap<String, NodeId>,
}

impl<'a> TensorTable<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a caller-owned tensor to `name`.
    pub fn prebind(&mut self, name: impl Into<String>, tensor: &'a Tensor) {
        self.tensors.insert(name.into(), TensorSlot::Borrowed(tensor));
    }

    pub fn is_prebound(&self, name: &str) -> bool {
        self.tensors.get(name).is_some_and(TensorSlot::is_borrowed)
    }

    /// Insert a tensor materialized by the load. Names bound by the caller are left untouched;
    /// returns whether the tensor was stored.
    pub fn insert(&mut self, name: &str, tensor: Tensor) -> bool {
        if self.is_prebound(name) {
            log::debug!("Keeping caller-bound tensor {name}");
            return false;
        }
        self.tensors
            .insert(name.to_string(), TensorSlot::Owned(tensor));
        true
    }

    /// Materialize initializers, except those shadowed by caller-bound tensors. An initializer
    /// replaces a shape-only slot of the same name.
    pub fn seed_initializers(&mut self, initializers: &[TensorProto]) -> Result<()> {
        for initializer in initializers {
            if self.is_prebound(&initializer.name) {
                log::debug!("Skipping initializer {}: bound by caller", initializer.name);
                continue;
            }
            let tensor = tensor_from_proto(initializer)?;
            self.insert(&initializer.name, tensor);
        }
        Ok(())
    }

    /// Allocate shape-only tensors for declared inputs that have no entry yet, each at most
    /// `limit` bytes.
    pub fn seed_inputs(&mut self, inputs: &[ValueInfoProto], limit: u64) -> Result<()> {
        for input in inputs {
            if self.tensors.contains_key(&input.name) {
                continue;
            }
            let tensor = tensor_from_value_info(input, limit)?;
            log::debug!("Declared input {}: {} {:?}", input.name, tensor.kind(), tensor.dims());
            self.insert(&input.name, tensor);
        }
        Ok(())
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name).map(TensorSlot::tensor)
    }

    /// The constant tensor bound to `name`.
    pub fn require_tensor(&self, name: &str) -> Result<&Tensor> {
        if let Some(tensor) = self.tensor(name) {
            return Ok(tensor);
        }
        if self.values.contains_key(name) {
            return Err(Error::NotConstant(name.to_string()));
        }
        Err(Error::UnresolvedValue(name.to_string()))
    }

    pub fn contains_tensor(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn bind_value(&mut self, name: &str, value: NodeId) {
        self.values.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<NodeId> {
        self.values.get(name).copied()
    }

    /// Every name bound to a graph value so far.
    pub fn values(&self) -> &HashMap<String, NodeId> {
        &self.values
    }

    pub fn into_values(self) -> HashMap<String, NodeId> {
        self.values
    }

    /// Resolve a name, preferring a table tensor over a graph value.
    pub fn lookup(&self, name: &str) -> Option<Operand<'_>> {
        self.tensor(name)
            .map(Operand::Tensor)
            .or_else(|| self.value(name).map(Operand::Value))
    }

    /// The graph value for `name`, creating a variable from the table tensor the first time a
    /// constant or declared input is used as an operand.
    pub fn get_or_create_value(&mut self, graph: &mut Graph, name: &str) -> Result<NodeId> {
        if let Some(value) = self.value(name) {
            return Ok(value);
        }
        let tensor = self
            .tensor(name)
            .ok_or_else(|| Error::UnresolvedValue(name.to_string()))?
            .clone();
        let value = graph.create_variable(name, tensor);
        log::debug!("Created variable {value} for {name}");
        self.bind_value(name, value);
        Ok(value)
    }
}
