use derive_new::new;
use graph_ir::BatchNormParams;

use super::{LoweringEngine, OpNode};
use crate::attribute::Attributes;
use crate::error::Result;

/// Configuration for BatchNormalization.
#[derive(Debug, Clone, PartialEq, new)]
pub struct BatchNormConfig {
    /// Small constant added to the variance.
    pub epsilon: f32,
    /// Momentum of the running statistics.
    pub momentum: f32,
}

pub fn batch_norm_config(attrs: &Attributes) -> Result<BatchNormConfig> {
    Ok(BatchNormConfig::new(
        attrs.float_or("epsilon", 1e-5)?,
        attrs.float_or("momentum", 0.9)?,
    ))
}

/// Normalize over channel dimension 1 with constant scale, bias, mean and variance operands.
pub fn lower_batch_norm(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let config = batch_norm_config(&node.attrs)?;

    let table = engine.table();
    let params = BatchNormParams::new(
        table.require_tensor(node.input(1)?)?.clone(),
        table.require_tensor(node.input(2)?)?.clone(),
        table.require_tensor(node.input(3)?)?.clone(),
        table.require_tensor(node.input(4)?)?.clone(),
    );

    let output = engine.graph().create_batch_normalization(
        node.name,
        input,
        1,
        config.epsilon,
        config.momentum,
        params,
    )?;
    engine.bind_output(node, output)
}
