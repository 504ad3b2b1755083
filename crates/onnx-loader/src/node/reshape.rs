use graph_ir::{GraphError, element_count};

use super::{LoweringEngine, OpNode};
use crate::attribute::AttributeError;
use crate::error::{Error, Result};
use crate::tensor_table::Operand;

/// Resolve a requested shape against the input shape: `0` copies the input dimension at the
/// same position and a single `-1` takes whatever size is left.
pub fn reshape_dims(input_dims: &[usize], shape: &[i64]) -> Result<Vec<usize>> {
    let mut inferred = None;
    let mut dims = Vec::with_capacity(shape.len());
    for (i, &size) in shape.iter().enumerate() {
        match size {
            -1 if inferred.is_none() => {
                inferred = Some(i);
                dims.push(1);
            }
            0 => dims.push(*input_dims.get(i).ok_or_else(|| {
                Error::Shape(format!("shape {shape:?} copies a dimension past rank {}", input_dims.len()))
            })?),
            size if size > 0 => dims.push(size as usize),
            _ => return Err(Error::Shape(format!("invalid target shape {shape:?}"))),
        }
    }

    if let Some(i) = inferred {
        let total = element_count(input_dims).map_err(GraphError::from)?;
        let known = element_count(&dims).map_err(GraphError::from)?;
        if known == 0 || total % known != 0 {
            return Err(Error::Shape(format!(
                "cannot reshape {input_dims:?} into {shape:?}"
            )));
        }
        dims[i] = total / known;
    }
    Ok(dims)
}

pub fn lower_reshape(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;

    let shape: Vec<i64> = match node.optional_input(1) {
        Some(name) => match engine.table().lookup(name) {
            Some(Operand::Tensor(tensor)) => tensor
                .as_i64()
                .ok_or_else(|| Error::Shape(format!("shape input {name} must hold integers")))?
                .to_vec(),
            Some(Operand::Value(_)) => return Err(Error::NotConstant(name.to_string())),
            None => return Err(Error::UnresolvedValue(name.to_string())),
        },
        None => node
            .attrs
            .ints_opt("shape")?
            .ok_or_else(|| AttributeError::Missing("shape".to_string()))?
            .to_vec(),
    };

    let graph = engine.graph();
    let dims = reshape_dims(graph.dims(input)?, &shape)?;
    let output = graph.create_reshape(node.name, input, &dims)?;
    engine.bind_output(node, output)
}

/// Collapse the input into `[product(dims[..axis]), product(dims[axis..])]`.
pub fn lower_flatten(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let graph = engine.graph();
    let input_dims = graph.dims(input)?.to_vec();

    let rank = input_dims.len() as i64;
    let axis = node.attrs.int_or("axis", 1)?;
    let axis = if axis < 0 { axis + rank } else { axis };
    if !(0..=rank).contains(&axis) {
        return Err(AttributeError::invalid(
            "axis",
            format!("{axis} is out of range for rank {rank}"),
        )
        .into());
    }
    let (outer, inner) = input_dims.split_at(axis as usize);

    let dims = [
        element_count(outer).map_err(GraphError::from)?,
        element_count(inner).map_err(GraphError::from)?,
    ];
    let output = graph.create_reshape(node.name, input, &dims)?;
    engine.bind_output(node, output)
}
