use graph_ir::{ArithmeticOp, Graph, NodeId};

use super::{LoweringEngine, OpNode, broadcast_enabled};
use crate::attribute::{Attributes, normalize_axis};
use crate::error::{Error, Result};

/// How the operands of an element-wise operation may be reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Operands must already have the same shape.
    Disabled,
    /// Operator sets up to 6: the right operand is broadcast to the left operand's shape,
    /// starting at `axis` (trailing-aligned when absent).
    Legacy { axis: Option<i64> },
    /// Numpy-style broadcasting of both operands to a common shape.
    Multidirectional,
}

pub fn broadcast_mode(attrs: &Attributes, opset_version: i64) -> Result<Broadcast> {
    if !broadcast_enabled(attrs, opset_version)? {
        return Ok(Broadcast::Disabled);
    }
    if opset_version > 6 {
        return Ok(Broadcast::Multidirectional);
    }
    let axis = if attrs.contains("axis") {
        Some(attrs.int("axis")?)
    } else {
        None
    };
    Ok(Broadcast::Legacy { axis })
}

/// The common shape of two operands under numpy broadcasting.
pub fn multidirectional_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let dim_at = |dims: &[usize], i: usize| {
        (i + dims.len())
            .checked_sub(rank)
            .map_or(1, |j| dims[j])
    };

    (0..rank)
        .map(|i| match (dim_at(a, i), dim_at(b, i)) {
            (x, y) if x == y => Some(x),
            (1, y) => Some(y),
            (x, 1) => Some(x),
            _ => None,
        })
        .collect()
}

fn broadcast_to(
    graph: &mut Graph,
    name: &str,
    value: NodeId,
    dims: &[usize],
    axis: usize,
) -> Result<NodeId> {
    if graph.dims(value)? == dims {
        return Ok(value);
    }
    Ok(graph.create_broadcast(name, value, dims, axis)?)
}

/// Create `lhs op rhs`, inserting broadcasts as `mode` allows.
pub fn combine(
    graph: &mut Graph,
    name: &str,
    op: ArithmeticOp,
    lhs: NodeId,
    rhs: NodeId,
    mode: Broadcast,
) -> Result<NodeId> {
    let lhs_dims = graph.dims(lhs)?.to_vec();
    let rhs_dims = graph.dims(rhs)?.to_vec();

    let (lhs, rhs) = if lhs_dims == rhs_dims {
        (lhs, rhs)
    } else {
        match mode {
            Broadcast::Disabled => (lhs, rhs),
            Broadcast::Legacy { axis } => {
                let axis = match axis {
                    Some(axis) => normalize_axis("axis", axis, lhs_dims.len())?,
                    None => lhs_dims.len().checked_sub(rhs_dims.len()).ok_or_else(|| {
                        Error::Shape(format!("cannot broadcast {rhs_dims:?} to {lhs_dims:?}"))
                    })?,
                };
                let rhs = broadcast_to(graph, &format!("{name}.rhs_broadcast"), rhs, &lhs_dims, axis)?;
                (lhs, rhs)
            }
            Broadcast::Multidirectional => {
                let dims = multidirectional_shape(&lhs_dims, &rhs_dims).ok_or_else(|| {
                    Error::Shape(format!("cannot broadcast {lhs_dims:?} with {rhs_dims:?}"))
                })?;
                let lhs = broadcast_to(
                    graph,
                    &format!("{name}.lhs_broadcast"),
                    lhs,
                    &dims,
                    dims.len() - lhs_dims.len(),
                )?;
                let rhs = broadcast_to(
                    graph,
                    &format!("{name}.rhs_broadcast"),
                    rhs,
                    &dims,
                    dims.len() - rhs_dims.len(),
                )?;
                (lhs, rhs)
            }
        }
    };

    Ok(graph.create_arithmetic(name, op, lhs, rhs)?)
}

pub fn lower_binary(engine: &mut LoweringEngine, node: &OpNode, op: ArithmeticOp) -> Result<()> {
    let mode = broadcast_mode(&node.attrs, engine.opset_version())?;
    let lhs = engine.value(node.input(0)?)?;
    let rhs = engine.value(node.input(1)?)?;

    let output = combine(engine.graph(), node.name, op, lhs, rhs, mode)?;
    engine.bind_output(node, output)
}

/// Variadic sum, folded left to right into additions.
pub fn lower_sum(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let mode = if engine.opset_version() > 6 {
        Broadcast::Multidirectional
    } else {
        Broadcast::Disabled
    };
    let inputs = node
        .inputs()
        .map(|name| engine.value(name))
        .collect::<Result<Vec<_>>>()?;
    let Some((&first, rest)) = inputs.split_first() else {
        return Err(Error::Shape("Sum expects at least one input".to_string()));
    };

    let mut acc = first;
    for (i, &operand) in rest.iter().enumerate() {
        let name = if i + 1 == rest.len() {
            node.name.to_string()
        } else {
            node.part(&format!("partial{i}"))
        };
        acc = combine(engine.graph(), &name, ArithmeticOp::Add, acc, operand, mode)?;
    }
    engine.bind_output(node, acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::node::test_utils::{Harness, NodeBuilder};
    use graph_ir::NodeKind;
    use rstest::rstest;

    #[rstest]
    #[case(&[2, 3], &[2, 3], Some(vec![2, 3]))]
    #[case(&[2, 3], &[3], Some(vec![2, 3]))]
    #[case(&[4, 1, 5], &[3, 1], Some(vec![4, 3, 5]))]
    #[case(&[1], &[2, 2], Some(vec![2, 2]))]
    #[case(&[], &[2], Some(vec![2]))]
    #[case(&[2, 3], &[2], None)]
    fn numpy_shapes(#[case] a: &[usize], #[case] b: &[usize], #[case] expected: Option<Vec<usize>>) {
        assert_eq!(multidirectional_shape(a, b), expected);
    }

    #[rstest]
    #[case(7, None, Broadcast::Multidirectional)]
    #[case(6, None, Broadcast::Disabled)]
    #[case(6, Some(1), Broadcast::Legacy { axis: None })]
    fn mode_follows_opset(#[case] opset: i64, #[case] broadcast: Option<i64>, #[case] expected: Broadcast) {
        let mut builder = NodeBuilder::new("Add", "add");
        if let Some(broadcast) = broadcast {
            builder = builder.attr_int("broadcast", broadcast);
        }
        let node = builder.build();
        assert_eq!(broadcast_mode(&Attributes::new(&node), opset).unwrap(), expected);
    }

    #[test]
    fn same_shapes() {
        let mut harness = Harness::new(7).input("a", &[2, 3]).input("b", &[2, 3]);
        let node = NodeBuilder::new("Mul", "mul")
            .inputs(&["a", "b"])
            .output("y")
            .build();
        harness.lower(&node).unwrap();

        let output = harness.graph.node(harness.value("y")).unwrap();
        assert_eq!(output.kind, NodeKind::Arithmetic(ArithmeticOp::Mul));
        assert_eq!(harness.graph.len(), 3);
    }

    #[test]
    fn multidirectional_broadcast_of_both_operands() {
        let mut harness = Harness::new(13).input("a", &[4, 1]).input("b", &[3]);
        let node = NodeBuilder::new("Sub", "sub")
            .inputs(&["a", "b"])
            .output("y")
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![4, 3]);

        let output = harness.graph.node(harness.value("y")).unwrap();
        let lhs = harness.graph.node(output.inputs[0]).unwrap();
        let rhs = harness.graph.node(output.inputs[1]).unwrap();
        assert_eq!(lhs.kind, NodeKind::Broadcast { axis: 0 });
        assert_eq!(rhs.kind, NodeKind::Broadcast { axis: 1 });
    }

    #[test]
    fn legacy_broadcast_with_axis() {
        let mut harness = Harness::new(6).input("a", &[2, 3, 4, 5]).input("b", &[3]);
        let node = NodeBuilder::new("Add", "add")
            .inputs(&["a", "b"])
            .output("y")
            .attr_int("broadcast", 1)
            .attr_int("axis", 1)
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![2, 3, 4, 5]);

        let output = harness.graph.node(harness.value("y")).unwrap();
        let rhs = harness.graph.node(output.inputs[1]).unwrap();
        assert_eq!(rhs.kind, NodeKind::Broadcast { axis: 1 });
    }

    #[test]
    fn legacy_without_broadcast_flag_fails() {
        let mut harness = Harness::new(6).input("a", &[2, 3]).input("b", &[3]);
        let node = NodeBuilder::new("Div", "div")
            .inputs(&["a", "b"])
            .output("y")
            .build();
        assert_eq!(
            harness.lower(&node).unwrap_err().kind(),
            ErrorKind::ShapeInvariant
        );
    }

    #[test]
    fn sum_folds_into_adds() {
        let mut harness = Harness::new(8)
            .input("a", &[2, 2])
            .input("b", &[2, 2])
            .input("c", &[2]);
        let node = NodeBuilder::new("Sum", "total")
            .inputs(&["a", "b", "c"])
            .output("y")
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![2, 2]);

        let output = harness.graph.node(harness.value("y")).unwrap();
        assert_eq!(output.name, "total");
        let partial = harness.graph.node(output.inputs[0]).unwrap();
        assert_eq!(partial.name, "total.partial0");
        assert_eq!(partial.kind, NodeKind::Arithmetic(ArithmeticOp::Add));
    }

    #[test]
    fn sum_of_one_input_is_identity() {
        let mut harness = Harness::new(8).input("a", &[2]);
        let node = NodeBuilder::new("Sum", "total").input("a").output("y").build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.value("y"), harness.table.value("a").unwrap());
    }
}
