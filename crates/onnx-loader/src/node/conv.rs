use derive_new::new;
use graph_ir::{ElemKind, Tensor, Window};

use super::{LoweringEngine, NCHW_TO_NHWC, NHWC_TO_NCHW, OpNode, pads};
use crate::attribute::{AttributeError, Attributes, to_sizes};
use crate::error::{Error, Result};

/// Parameters of a 2-D convolution.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ConvConfig {
    /// Number of output channels.
    pub depth: usize,
    pub window: Window,
    pub group: usize,
}

/// The single size of a per-axis list whose entries must all agree.
pub(crate) fn square(name: &str, values: &[i64]) -> Result<usize> {
    let sizes = to_sizes(name, values)?;
    match sizes.split_first() {
        Some((&first, rest)) if rest.iter().all(|&v| v == first) => Ok(first),
        Some(_) => Err(Error::Shape(format!(
            "only square {name} are supported, got {sizes:?}"
        ))),
        None => Err(AttributeError::invalid(name, "list is empty").into()),
    }
}

/// Read the convolution attributes against a filter in channel-last layout,
/// `[depth, kernel_h, kernel_w, channels]`.
pub fn conv_config(attrs: &Attributes, filter_dims: &[usize]) -> Result<ConvConfig> {
    let [depth, kernel_h, kernel_w, _] = filter_dims else {
        return Err(Error::Shape(format!(
            "expected a 4-D filter, got {filter_dims:?}"
        )));
    };

    let kernel = match attrs.ints_opt("kernel_shape")? {
        Some(kernel_shape) => square("kernel_shape", kernel_shape)?,
        None if kernel_h == kernel_w => *kernel_h,
        None => {
            return Err(Error::Shape(format!(
                "only square kernels are supported, filter is {kernel_h}x{kernel_w}"
            )));
        }
    };
    let stride = match attrs.ints_opt("strides")? {
        Some(strides) => square("strides", strides)?,
        None => 1,
    };
    if let Some(dilations) = attrs.ints_opt("dilations")?
        && dilations.iter().any(|&d| d != 1)
    {
        return Err(AttributeError::Unsupported {
            name: "dilations".to_string(),
            value: format!("{dilations:?}"),
        }
        .into());
    }
    let group = attrs.usize_or("group", 1)?;

    Ok(ConvConfig::new(
        *depth,
        Window::new(kernel, stride, pads(attrs)?),
        group,
    ))
}

pub fn lower_conv(engine: &mut LoweringEngine, node: &OpNode) -> Result<()> {
    let input = engine.value(node.input(0)?)?;

    // ONNX stores filters as [depth, channels, kh, kw]; the graph wants them channel-last.
    let weight_name = node.input(1)?;
    let weight = engine.table().require_tensor(weight_name)?;
    let filter_tensor = weight.transpose(&NCHW_TO_NHWC).map_err(|source| Error::Tensor {
        name: weight_name.to_string(),
        source,
    })?;
    let config = conv_config(&node.attrs, filter_tensor.dims())?;

    let mut bias_tensor =
        Tensor::zeros(ElemKind::Float, &[config.depth]).map_err(|source| Error::Tensor {
            name: node.part("bias"),
            source,
        })?;
    if let Some(bias_name) = node.optional_input(2) {
        let bias = engine.table().require_tensor(bias_name)?;
        bias_tensor.copy_from(bias).map_err(|source| Error::Tensor {
            name: bias_name.to_string(),
            source,
        })?;
    }

    let graph = engine.graph();
    let filter = graph.create_variable(&node.part("filter"), filter_tensor);
    let bias = graph.create_variable(&node.part("bias"), bias_tensor);
    let nhwc = graph.create_transpose(&node.part("input_nhwc"), input, &NCHW_TO_NHWC)?;

    let in_dims = graph.dims(nhwc)?.to_vec();
    let (out_h, out_w) = graph_ir::conv_pool_output_dims(in_dims[1], in_dims[2], &config.window)
        .ok_or_else(|| {
            Error::Shape(format!(
                "window {:?} does not fit input {in_dims:?}",
                config.window
            ))
        })?;
    let out_ty = graph.unique_type(
        graph.kind(nhwc)?,
        &[in_dims[0], out_h, out_w, config.depth],
    );

    let conv = graph.create_conv(
        node.name,
        nhwc,
        filter,
        bias,
        out_ty,
        config.window,
        config.group,
    )?;
    let output = graph.create_transpose(&node.part("output_nchw"), conv, &NHWC_TO_NCHW)?;
    engine.bind_output(node, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::node::test_utils::{Harness, NodeBuilder};
    use graph_ir::{NodeKind, TensorError};
    use rstest::rstest;

    fn weight(dims: &[usize]) -> Tensor {
        let len = dims.iter().product();
        Tensor::from_f32((0..len).map(|v| v as f32).collect(), dims).unwrap()
    }

    fn harness(input: &[usize], filter: &[usize]) -> Harness {
        Harness::new(7).input("x", input).constant("w", weight(filter))
    }

    #[test]
    fn default_attributes() {
        let node = NodeBuilder::new("Conv", "conv").build();
        let config = conv_config(&Attributes::new(&node), &[16, 3, 3, 3]).unwrap();
        assert_eq!(config, ConvConfig::new(16, Window::new(3, 1, [0; 4]), 1));
    }

    #[test]
    fn explicit_attributes() {
        let node = NodeBuilder::new("Conv", "conv")
            .attr_ints("kernel_shape", vec![5, 5])
            .attr_ints("strides", vec![2, 2])
            .attr_ints("pads", vec![2, 2, 2, 2])
            .attr_int("group", 4)
            .build();
        let config = conv_config(&Attributes::new(&node), &[8, 5, 5, 1]).unwrap();
        assert_eq!(config, ConvConfig::new(8, Window::new(5, 2, [2; 4]), 4));
    }

    #[rstest]
    #[case::kernel_from_filter(vec![], &[4, 3, 5, 1])]
    #[case::kernel_attribute(vec![("kernel_shape", vec![3, 5])], &[4, 3, 5, 1])]
    #[case::strides(vec![("strides", vec![1, 2])], &[4, 3, 3, 1])]
    fn non_square_is_rejected(#[case] attrs: Vec<(&str, Vec<i64>)>, #[case] filter: &[usize]) {
        let mut builder = NodeBuilder::new("Conv", "conv");
        for (name, values) in attrs {
            builder = builder.attr_ints(name, values);
        }
        let node = builder.build();
        let err = conv_config(&Attributes::new(&node), filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }

    #[test]
    fn dilation_is_unsupported() {
        let node = NodeBuilder::new("Conv", "conv")
            .attr_ints("dilations", vec![2, 2])
            .build();
        let err = conv_config(&Attributes::new(&node), &[1, 3, 3, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAttribute);
    }

    #[test]
    fn lowers_with_layout_transposes() {
        let mut harness = harness(&[1, 3, 32, 32], &[16, 3, 3, 3]);
        let node = NodeBuilder::new("Conv", "conv1")
            .inputs(&["x", "w"])
            .output("y")
            .build();
        assert!(harness.lower(&node).unwrap());
        assert_eq!(harness.dims("y"), vec![1, 16, 30, 30]);

        let graph = &harness.graph;
        let output = graph.node(harness.value("y")).unwrap();
        assert_eq!(output.kind, NodeKind::Transpose { shuffle: vec![0, 3, 1, 2] });

        let conv = graph.node(output.inputs[0]).unwrap();
        assert_eq!(conv.name, "conv1");
        assert_eq!(
            conv.kind,
            NodeKind::Convolution {
                window: Window::new(3, 1, [0; 4]),
                group: 1
            }
        );
        assert_eq!(graph.dims(output.inputs[0]).unwrap(), &[1, 30, 30, 16]);

        let filter = graph.node(conv.inputs[1]).unwrap();
        assert_eq!(filter.name, "conv1.filter");
        assert_eq!(filter.tensor().unwrap().dims(), &[16, 3, 3, 3]);
        let bias = graph.node(conv.inputs[2]).unwrap();
        assert!(bias.tensor().unwrap().as_f32().unwrap().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn filter_is_transposed_to_channel_last() {
        let mut harness = harness(&[1, 2, 1, 1], &[1, 2, 1, 1]);
        let node = NodeBuilder::new("Conv", "conv")
            .inputs(&["x", "w"])
            .output("y")
            .build();
        harness.lower(&node).unwrap();

        let conv = harness.graph.node(harness.value("y")).unwrap().inputs[0];
        let filter = harness.graph.node(conv).unwrap().inputs[1];
        let tensor = harness.graph.node(filter).unwrap().tensor().unwrap();
        assert_eq!(tensor.dims(), &[1, 1, 1, 2]);
        assert_eq!(tensor.as_f32().unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn bias_is_copied() {
        let mut harness = harness(&[1, 1, 4, 4], &[2, 1, 3, 3])
            .constant("b", Tensor::from_f32(vec![0.5, -0.5], &[2]).unwrap());
        let node = NodeBuilder::new("Conv", "conv")
            .inputs(&["x", "w", "b"])
            .output("y")
            .attr_ints("pads", vec![1, 1, 1, 1])
            .build();
        harness.lower(&node).unwrap();
        assert_eq!(harness.dims("y"), vec![1, 2, 4, 4]);

        let conv = harness.graph.node(harness.value("y")).unwrap().inputs[0];
        let bias = harness.graph.node(conv).unwrap().inputs[2];
        let bias = harness.graph.node(bias).unwrap().tensor().unwrap();
        assert_eq!(bias.as_f32().unwrap(), &[0.5, -0.5]);
    }

    #[test]
    fn bias_of_wrong_length_fails() {
        let mut harness = harness(&[1, 1, 4, 4], &[2, 1, 3, 3])
            .constant("b", Tensor::from_f32(vec![0.5; 3], &[3]).unwrap());
        let node = NodeBuilder::new("Conv", "conv")
            .inputs(&["x", "w", "b"])
            .output("y")
            .build();
        let err = harness.lower(&node).unwrap_err();
        assert!(matches!(err, Error::Tensor { ref name, .. } if name == "b"));
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }

    #[test]
    fn rank_2_weight_fails() {
        let mut harness = Harness::new(7)
            .input("x", &[1, 1, 4, 4])
            .constant("w", Tensor::from_f32(vec![0.5; 6], &[2, 3]).unwrap());
        let node = NodeBuilder::new("Conv", "conv")
            .inputs(&["x", "w"])
            .output("y")
            .build();
        let err = harness.lower(&node).unwrap_err();
        assert!(matches!(
            err,
            Error::Tensor {
                source: TensorError::Permutation { .. },
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::ShapeInvariant);
    }

    #[test]
    fn weight_must_be_constant() {
        let mut harness = Harness::new(7).input("x", &[1, 1, 4, 4]).input("w", &[1, 1, 3, 3]);
        let relu = NodeBuilder::new("Relu", "r").input("w").output("w2").build();
        harness.lower(&relu).unwrap();

        let node = NodeBuilder::new("Conv", "conv")
            .inputs(&["x", "w2"])
            .output("y")
            .build();
        assert!(matches!(harness.lower(&node), Err(Error::NotConstant(_))));
    }
}
