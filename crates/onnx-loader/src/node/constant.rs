use super::{LoweringEngine, OpNode};
use crate::error::Result;
use crate::proto_conversion::tensor_from_proto;

/// Store the `value` tensor of a Constant under its output name. Constants produce no graph
/// node until an operator uses them as an operand.
pub fn lower_constant(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let output = node.output()?;
    if engine.table().is_prebound(output) {
        log::debug!("Constant {output} is bound by the caller");
        return Ok(());
    }

    let tensor = tensor_from_proto(node.attrs.tensor("value")?)?;
    engine.table().insert(output, tensor);
    Ok(())
}
