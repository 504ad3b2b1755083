use super::{LoweringEngine, OpNode};
use crate::attribute::{AttributeError, normalize_axis};
use crate::error::{Error, Result};
use crate::tensor_table::Operand;

/// The `axes` of a Squeeze or Unsqueeze, normalized against `rank`.
///
/// Newer operator sets pass the axes as a constant second input instead of an attribute.
fn axes(engine: &mut LoweringEngine, node: &OpNode, rank: usize) -> Result<Vec<usize>> {
    let raw: Vec<i64> = match node.attrs.ints_opt("axes")? {
        Some(axes) => axes.to_vec(),
        None => match node.optional_input(1) {
            Some(name) => match engine.table().lookup(name) {
                Some(Operand::Tensor(tensor)) => tensor
                    .as_i64()
                    .ok_or_else(|| Error::Shape(format!("axes input {name} must hold integers")))?
                    .to_vec(),
                Some(Operand::Value(_)) => return Err(Error::NotConstant(name.to_string())),
                None => return Err(Error::UnresolvedValue(name.to_string())),
            },
            None => return Err(AttributeError::Missing("axes".to_string()).into()),
        },
    };

    raw.iter()
        .map(|&axis| normalize_axis("axes", axis, rank).map_err(Error::from))
        .collect()
}

pub fn lower_squeeze(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let rank = engine.graph().dims(input)?.len();
    let axes = axes(engine, node, rank)?;

    let output = engine.graph().create_squeeze(node.name, input, &axes)?;
    engine.bind_output(node, output)
}

pub fn lower_unsqueeze(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let rank = engine.graph().dims(input)?.len();

    // Axes index the output, whose rank grows by one per axis.
    let count = match node.attrs.ints_opt("axes")? {
        Some(axes) => axes.len(),
        None => node
            .optional_input(1)
            .and_then(|name| engine.table().tensor(name))
            .map_or(0, |tensor| tensor.size()),
    };
    let axes = axes(engine, node, rank + count)?;

    let output = engine.graph().create_expand_dims(node.name, input, &axes)?;
    engine.bind_output(node, output)
}
