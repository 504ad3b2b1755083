use graph_ir::{Graph, NodeId};

use crate::error::{Error, Result};
use crate::protos::ValueInfoProto;
use crate::tensor_table::TensorTable;

/// Name given to the save node of a graph output.
pub fn save_name(output: &str) -> String {
    format!("save_{output}")
}

/// Create a save node for every declared graph output, in declaration order.
///
/// Returns the output names with their save nodes. Fails when the graph declares no output or
/// when an output was never produced.
pub fn bind_outputs(
    graph: &mut Graph,
    table: &TensorTable,
    outputs: &[ValueInfoProto],
) -> Result<Vec<(String, NodeId)>> {
    if outputs.is_empty() {
        return Err(Error::NoOutputs);
    }

    let mut saves = Vec::with_capacity(outputs.len());
    for output in outputs {
        let value = table
            .value(&output.name)
            .ok_or_else(|| Error::UnresolvedValue(output.name.clone()))?;
        let save = graph.create_save(&save_name(&output.name), value)?;
        log::debug!("Bound output {} to {save}", output.name);
        saves.push((output.name.clone(), save));
    }
    Ok(saves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::node::test_utils::value_info;
    use crate::protos::tensor_proto::DataType;
    use graph_ir::{ElemKind, NodeKind, Tensor};

    fn declared(names: &[&str]) -> Vec<ValueInfoProto> {
        names
            .iter()
            .map(|name| value_info(name, DataType::FLOAT, &[2]))
            .collect()
    }

    #[test]
    fn saves_outputs_in_order() {
        let mut graph = Graph::new("g");
        let mut table = TensorTable::new();
        let a = graph.create_variable("a", Tensor::zeros(ElemKind::Float, &[2]).unwrap());
        let b = graph.create_variable("b", Tensor::zeros(ElemKind::Float, &[2]).unwrap());
        table.bind_value("y", b);
        table.bind_value("z", a);

        let saves = bind_outputs(&mut graph, &table, &declared(&["y", "z"])).unwrap();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].0, "y");
        assert_eq!(saves[1].0, "z");

        let save = graph.node(saves[0].1).unwrap();
        assert_eq!(save.name, "save_y");
        assert_eq!(save.kind, NodeKind::Save);
        assert_eq!(save.inputs, vec![b]);
        assert_eq!(graph.saves().count(), 2);
    }

    #[test]
    fn no_declared_outputs() {
        let mut graph = Graph::new("g");
        let err = bind_outputs(&mut graph, &TensorTable::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::NoOutputs));
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }

    #[test]
    fn unproduced_output() {
        let mut graph = Graph::new("g");
        let err = bind_outputs(&mut graph, &TensorTable::new(), &declared(&["y"])).unwrap_err();
        assert!(matches!(err, Error::UnresolvedValue(name) if name == "y"));
    }
}
