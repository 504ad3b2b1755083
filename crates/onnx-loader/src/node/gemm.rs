use derive_new::new;
use graph_ir::ArithmeticOp;

use super::{LoweringEngine, OpNode, broadcast_enabled};
use crate::attribute::Attributes;
use crate::error::{Error, Result};

/// Configuration for Gemm.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct GemmConfig {
    pub trans_a: bool,
    pub trans_b: bool,
    /// Whether `C` may be broadcast to the product shape.
    pub broadcast: bool,
}

pub fn gemm_config(attrs: &Attributes, opset_version: i64) -> Result<GemmConfig> {
    for scale in ["alpha", "beta"] {
        let value = attrs.float_or(scale, 1.0)?;
        if value != 1.0 {
            log::warn!("Gemm {scale}={value} is not supported and is treated as 1");
        }
    }

    Ok(GemmConfig::new(
        attrs.int_or("transA", 0)? != 0,
        attrs.int_or("transB", 0)? != 0,
        broadcast_enabled(attrs, opset_version)?,
    ))
}

/// `A * B + C`, with optional transposes of `A` and `B`.
pub fn lower_gemm(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let config = gemm_config(&node.attrs, engine.opset_version())?;
    let mut a = engine.value(node.input(0)?)?;
    let mut b = engine.value(node.input(1)?)?;
    let c = match node.optional_input(2) {
        Some(name) => Some(engine.value(name)?),
        None => None,
    };

    let graph = engine.graph();
    if config.trans_a {
        a = graph.create_transpose(&node.part("a_transposed"), a, &[1, 0])?;
    }
    if config.trans_b {
        b = graph.create_transpose(&node.part("b_transposed"), b, &[1, 0])?;
    }

    let Some(mut c) = c else {
        let output = graph.create_matmul(node.name, a, b)?;
        return engine.bind_output(node, output);
    };

    let product = graph.create_matmul(&node.part("matmul"), a, b)?;
    let product_dims = graph.dims(product)?.to_vec();
    let c_dims = graph.dims(c)?;
    if config.broadcast && c_dims != product_dims.as_slice() {
        let axis = product_dims.len().checked_sub(c_dims.len()).ok_or_else(|| {
            Error::Shape(format!(
                "cannot broadcast C {c_dims:?} to the product shape {product_dims:?}"
            ))
        })?;
        c = graph.create_broadcast(&node.part("c_broadcast"), c, &product_dims, axis)?;
    }

    let output = graph.create_arithmetic(node.name, ArithmeticOp::Add, product, c)?;
    engine.bind_output(node, output)
}

/// 2-D matrix product.
pub fn lower_matmul(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let a = engine.value(node.input(0)?)?;
    let b = engine.value(node.input(1)?)?;

    let output = engine.graph().create_matmul(node.name, a, b)?;
    engine.bind_output(node, output)
}
