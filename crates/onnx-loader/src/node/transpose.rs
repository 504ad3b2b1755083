use super::{LoweringEngine, OpNode};
use crate::attribute::to_sizes;
use crate::error::Result;

pub fn lower_transpose(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let perm = to_sizes("perm", node.attrs.ints("perm")?)?;

    let output = engine.graph().create_transpose(node.name, input, &perm)?;
    engine.bind_output(node, output)
}
