use super::{LoweringEngine, OpNode};
use crate::attribute::normalize_axis;
use crate::error::{Error, Result};

/// Concatenate every input, in order, along the required `axis`.
pub fn lower_concat(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let inputs = node
        .inputs()
        .map(|name| engine.value(name))
        .collect::<Result<Vec<_>>>()?;
    let first = *inputs
        .first()
        .ok_or_else(|| Error::Shape("Concat expects at least one input".to_string()))?;

    let rank = engine.graph().dims(first)?.len();
    let axis = normalize_axis("axis", node.attrs.int("axis")?, rank)?;

    let output = engine.graph().create_concat(node.name, &inputs, axis)?;
    engine.bind_output(node, output)
}
