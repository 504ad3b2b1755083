use graph_ir::{PoolKind, Window};

use super::conv::square;
use super::{LoweringEngine, NCHW_TO_NHWC, NHWC_TO_NCHW, OpNode, pads};
use crate::attribute::{AttributeError, Attributes};
use crate::error::{Error, Result};

/// Spatial extent of a channel-last input, which must be square for window-sized pooling.
fn square_extent(input_dims: &[usize]) -> Result<usize> {
    match input_dims {
        [_, h, w, _] if h == w => Ok(*h),
        _ => Err(Error::Shape(format!(
            "global pooling needs a square spatial input, got {input_dims:?}"
        ))),
    }
}

/// Window of a MaxPool or AveragePool over a channel-last input.
///
/// A non-zero `global_pooling` flag makes the window cover the whole image, whatever
/// `kernel_shape` says.
pub fn pool_config(attrs: &Attributes, input_dims: &[usize]) -> Result<Window> {
    let global = attrs.int_or("global_pooling", 0)? != 0;
    let kernel = if global {
        square_extent(input_dims)?
    } else {
        let kernel_shape = attrs
            .ints_opt("kernel_shape")?
            .ok_or_else(|| AttributeError::Missing("kernel_shape".to_string()))?;
        square("kernel_shape", kernel_shape)?
    };
    let stride = match attrs.ints_opt("strides")? {
        Some(strides) => square("strides", strides)?,
        None => 1,
    };

    Ok(Window::new(kernel, stride, pads(attrs)?))
}

fn lower_pool_with(
    engine: &mut LoweringEngine,
    node: &OpNode,
    kind: PoolKind,
    config: impl FnOnce(&[usize]) -> Result<Window>,
) -> Result<()> {
    let input = engine.value(node.input(0)?)?;
    let graph = engine.graph();
    let nhwc = graph.create_transpose(&node.part("input_nhwc"), input, &NCHW_TO_NHWC)?;
    let window = config(graph.dims(nhwc)?)?;

    let pool = graph.create_pool(node.name, kind, nhwc, window)?;
    let output = graph.create_transpose(&node.part("output_nchw"), pool, &NHWC_TO_NCHW)?;
    engine.bind_output(node, output)
}

pub fn lower_pool(engine: &mut LoweringEngine, node: &OpNode, kind: PoolKind) -> Result<()> {
    lower_pool_with(engine, node, kind, |dims| pool_config(&node.attrs, dims))
}

/// Average over the whole (square) image.
pub fn lower_global_avg_pool(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    lower_pool_with(engine, node, PoolKind::Avg, |dims| {
        Ok(Window::new(square_extent(dims)?, 1, [0; 4]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::node::test_utils::{Harness, NodeBuilder};
    use graph_ir::NodeKind;

    #[test]
    fn global_pooling_overrides_kernel_shape() {
        let node = NodeBuilder::new("MaxPool", "pool")
            .attr_ints("kernel_shape", vec![3, 3])
            .attr_int("global_pooling", 1)
            .build();
        let window = pool_config(&Attributes::new(&node), &[1, 7, 7, 64]).unwrap();
        assert_eq!(window.kernel, 7);
    }

    #[test]
    fn explicit_window() {
        let node = NodeBuilder::new("MaxPool", "pool")
            .attr_ints("kernel_shape", vec![2, 2])
            .attr_ints("strides", vec![2, 2])
            .attr_ints("pads", vec![0, 0, 1, 1])
            .build();
        let window = pool_config(&Attributes::new(&node), &[1, 7, 7, 64]).unwrap();
        assert_eq!(window, Window::new(2, 2, [0, 0, 1, 1]));
    }

    #[test]
    fn kernel_shape_is_required() {
        let node = NodeBuilder::new("AveragePool", "pool").build();
        let err = pool_config(&Attributes::new(&node), &[1, 7, 7, 64]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAttribute);
    }

    #[test]
    fn max_pool_with_global_pooling() {
        let mut harness = Harness::new(7).input("x", &[1, 64, 7, 7]);
        let node = NodeBuilder::new("MaxPool", "pool")
            .input("x")
            .output("y")
            .attr_ints("kernel_shape", vec![2, 2])
            .attr_int("global_pooling", 1)
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![1, 64, 1, 1]);

        let output = harness.graph.node(harness.value("y")).unwrap();
        let pool = harness.graph.node(output.inputs[0]).unwrap();
        assert_eq!(
            pool.kind,
            NodeKind::Pool {
                kind: PoolKind::Max,
                window: Window::new(7, 1, [0; 4])
            }
        );
    }

    #[test]
    fn average_pool_selects_kind() {
        let mut harness = Harness::new(7).input("x", &[1, 3, 8, 8]);
        let node = NodeBuilder::new("AveragePool", "pool")
            .input("x")
            .output("y")
            .attr_ints("kernel_shape", vec![2, 2])
            .attr_ints("strides", vec![2, 2])
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![1, 3, 4, 4]);

        let output = harness.graph.node(harness.value("y")).unwrap();
        let pool = harness.graph.node(output.inputs[0]).unwrap();
        assert!(matches!(pool.kind, NodeKind::Pool { kind: PoolKind::Avg, .. }));
    }

    #[test]
    fn overflowing_pads_fail() {
        let mut harness = Harness::new(7).input("x", &[1, 2, 4, 4]);
        let node = NodeBuilder::new("MaxPool", "pool")
            .input("x")
            .output("y")
            .attr_ints("kernel_shape", vec![2, 2])
            .attr_ints("pads", vec![i64::MAX; 4])
            .build();
        let err = harness.lower(&node).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }

    #[test]
    fn global_average_pool() {
        let mut harness = Harness::new(7).input("x", &[2, 16, 5, 5]);
        let node = NodeBuilder::new("GlobalAveragePool", "gap")
            .input("x")
            .output("y")
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![2, 16, 1, 1]);
    }

    #[test]
    fn global_average_pool_needs_square_input() {
        let mut harness = Harness::new(7).input("x", &[1, 16, 5, 6]);
        let node = NodeBuilder::new("GlobalAveragePool", "gap")
            .input("x")
            .output("y")
            .build();
        let err = harness.lower(&node).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }
}
