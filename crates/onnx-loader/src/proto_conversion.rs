//! Conversion of serialized tensors and value declarations into [`Tensor`]s.

use graph_ir::{ElemKind, Tensor, byte_size};
use protobuf::Enum;

use crate::error::{Error, Result};
use crate::protos::{
    TensorProto, TensorShapeProto, ValueInfoProto, tensor_proto::DataType as DT,
    tensor_shape_proto::dimension::Value, type_proto,
};

/// Map an ONNX element type to the kinds the graph can hold.
pub fn elem_kind_from_proto(name: &str, data_type: i32) -> Result<ElemKind> {
    match DT::from_i32(data_type) {
        Some(DT::FLOAT) => Ok(ElemKind::Float),
        Some(DT::INT64) => Ok(ElemKind::Index),
        Some(other) => Err(Error::TensorKind {
            name: name.to_string(),
            data_type: format!("{other:?}"),
        }),
        None => Err(Error::TensorKind {
            name: name.to_string(),
            data_type: format!("unknown ({data_type})"),
        }),
    }
}

fn convert_dims(name: &str, dims: &[i64]) -> Result<Vec<usize>> {
    dims.iter()
        .map(|&d| usize::try_from(d).map_err(|_| Error::SymbolicDim { name: name.to_string() }))
        .collect()
}

/// Materialize a serialized tensor.
///
/// The typed element array is used when it is non-empty, otherwise `raw_data` is read as exactly
/// `product(dims)` little-endian elements. A record with neither payload is rejected.
pub fn tensor_from_proto(tensor: &TensorProto) -> Result<Tensor> {
    let name = tensor.name.as_str();
    let kind = elem_kind_from_proto(name, tensor.data_type)?;
    let dims = convert_dims(name, &tensor.dims)?;
    let wrap = |source| Error::Tensor {
        name: name.to_string(),
        source,
    };

    let result = match kind {
        ElemKind::Float if !tensor.float_data.is_empty() => {
            Tensor::from_f32(tensor.float_data.clone(), &dims).map_err(wrap)?
        }
        ElemKind::Index if !tensor.int64_data.is_empty() => {
            Tensor::from_i64(tensor.int64_data.clone(), &dims).map_err(wrap)?
        }
        _ if !tensor.raw_data.is_empty() => {
            Tensor::from_raw_bytes(kind, &dims, &tensor.raw_data).map_err(wrap)?
        }
        _ => {
            return Err(Error::EmptyTensor {
                name: name.to_string(),
            });
        }
    };

    log::debug!(
        "Materialized tensor {name}: {} {:?}",
        result.kind(),
        result.dims()
    );
    Ok(result)
}

/// Fixed dimensions of a declared shape.
pub fn dims_from_shape(name: &str, shape: &TensorShapeProto) -> Result<Vec<usize>> {
    shape
        .dim
        .iter()
        .map(|dim| match dim.value {
            Some(Value::DimValue(value)) if value >= 0 => Ok(value as usize),
            _ => Err(Error::SymbolicDim {
                name: name.to_string(),
            }),
        })
        .collect()
}

/// Allocate a zero-filled tensor with the element kind and shape of a declared input.
///
/// Shapes whose byte size exceeds `limit` are rejected before anything is allocated.
pub fn tensor_from_value_info(info: &ValueInfoProto, limit: u64) -> Result<Tensor> {
    let name = info.name.as_str();
    let tensor_type = match &info.type_.value {
        Some(type_proto::Value::TensorType(tensor_type)) => tensor_type,
        None => {
            return Err(Error::TensorKind {
                name: name.to_string(),
                data_type: "non-tensor value".to_string(),
            });
        }
    };
    let kind = elem_kind_from_proto(name, tensor_type.elem_type)?;
    let dims = match tensor_type.shape.as_ref() {
        Some(shape) => dims_from_shape(name, shape)?,
        None => {
            return Err(Error::SymbolicDim {
                name: name.to_string(),
            });
        }
    };

    let wrap = |source| Error::Tensor {
        name: name.to_string(),
        source,
    };
    let size = byte_size(kind, &dims).map_err(wrap)? as u64;
    if size > limit {
        return Err(Error::InputTooLarge {
            name: name.to_string(),
            size,
            limit,
        });
    }
    Tensor::zeros(kind, &dims).map_err(wrap)
}
