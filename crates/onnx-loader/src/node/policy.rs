use crate::attribute::{AttributeError, Attributes, to_sizes};

/// Spatial padding as `[top, left, bottom, right]`.
///
/// An explicit `pads` list is used as is. Otherwise `auto_pad` may only be `VALID` (or the
/// format's own `NOTSET` marker); without either attribute there is no padding.
pub fn pads(attrs: &Attributes) -> Result<[usize; 4], AttributeError> {
    if let Some(pads) = attrs.ints_opt("pads")? {
        let pads = to_sizes("pads", pads)?;
        return <[usize; 4]>::try_from(pads.as_slice()).map_err(|_| {
            AttributeError::invalid("pads", format!("expected 4 values, got {pads:?}"))
        });
    }

    if attrs.contains("auto_pad") {
        let auto_pad = attrs.string("auto_pad")?;
        if auto_pad != "VALID" && auto_pad != "NOTSET" {
            return Err(AttributeError::Unsupported {
                name: "auto_pad".to_string(),
                value: auto_pad.to_string(),
            });
        }
    }

    Ok([0; 4])
}

/// Whether implicit broadcasting applies to a node.
///
/// From operator set 7 on broadcasting is always on; before that the node must carry
/// `broadcast = 1`.
pub fn broadcast_enabled(attrs: &Attributes, opset_version: i64) -> Result<bool, AttributeError> {
    if opset_version > 6 {
        return Ok(true);
    }
    Ok(attrs.int_or("broadcast", 0)? == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_utils::NodeBuilder;
    use rstest::rstest;

    #[rstest]
    #[case(7, None, true)]
    #[case(7, Some(0), true)]
    #[case(13, None, true)]
    #[case(6, None, false)]
    #[case(6, Some(1), true)]
    #[case(6, Some(0), false)]
    #[case(1, Some(1), true)]
    fn broadcast_policy(#[case] opset: i64, #[case] broadcast: Option<i64>, #[case] expected: bool) {
        let mut builder = NodeBuilder::new("Add", "add");
        if let Some(broadcast) = broadcast {
            builder = builder.attr_int("broadcast", broadcast);
        }
        let node = builder.build();
        assert_eq!(
            broadcast_enabled(&Attributes::new(&node), opset),
            Ok(expected)
        );
    }

    #[rstest]
    #[case(None, None, Ok([0, 0, 0, 0]))]
    #[case(None, Some("VALID"), Ok([0, 0, 0, 0]))]
    #[case(None, Some("NOTSET"), Ok([0, 0, 0, 0]))]
    #[case(Some(vec![1, 2, 3, 4]), None, Ok([1, 2, 3, 4]))]
    #[case(Some(vec![1, 1, 1, 1]), Some("SAME_UPPER"), Ok([1, 1, 1, 1]))]
    fn padding_policy(
        #[case] explicit: Option<Vec<i64>>,
        #[case] auto_pad: Option<&str>,
        #[case] expected: Result<[usize; 4], AttributeError>,
    ) {
        let mut builder = NodeBuilder::new("Conv", "conv");
        if let Some(explicit) = explicit {
            builder = builder.attr_ints("pads", explicit);
        }
        if let Some(auto_pad) = auto_pad {
            builder = builder.attr_string("auto_pad", auto_pad);
        }
        let node = builder.build();
        assert_eq!(pads(&Attributes::new(&node)), expected);
    }

    #[rstest]
    #[case("SAME_UPPER")]
    #[case("SAME_LOWER")]
    fn same_padding_is_unsupported(#[case] auto_pad: &str) {
        let node = NodeBuilder::new("MaxPool", "pool")
            .attr_string("auto_pad", auto_pad)
            .build();
        assert!(matches!(
            pads(&Attributes::new(&node)),
            Err(AttributeError::Unsupported { value, .. }) if value == auto_pad
        ));
    }

    #[test]
    fn malformed_pads() {
        let node = NodeBuilder::new("Conv", "conv")
            .attr_ints("pads", vec![1, 1])
            .build();
        assert!(matches!(
            pads(&Attributes::new(&node)),
            Err(AttributeError::Invalid { .. })
        ));
    }
}
