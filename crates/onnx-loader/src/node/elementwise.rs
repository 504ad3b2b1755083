use graph_ir::UnaryOp;

use super::{LoweringEngine, OpNode};
use crate::attribute::normalize_axis;
use crate::error::Result;

/// Forward the first input to the first output. Dropout lowers this way too, since inference
/// neither scales nor masks.
pub fn lower_identity(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    engine.bind_output(node, input)
}

pub fn lower_unary(engine: &mut LoweringEngine, node: &OpNode, op: UnaryOp) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let output = engine.graph().create_unary(node.name, op, input)?;
    engine.bind_output(node, output)
}

pub fn lower_softmax(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let rank = engine.graph().dims(input)?.len();
    let axis = normalize_axis("axis", node.attrs.int_or("axis", 1)?, rank)?;

    let output = engine.graph().create_softmax(node.name, input, axis)?;
    engine.bind_output(node, output)
}
