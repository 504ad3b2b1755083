use core::fmt;

use strum::Display;

/// The element kinds a [`Tensor`] can hold.
///
/// 64-bit integer tensors are stored at their full width (`i64`); nothing is narrowed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    /// 32-bit IEEE float.
    Float,
    /// 64-bit signed integer, used for indices and shapes.
    Index,
}

impl ElemKind {
    /// Size of one element in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            ElemKind::Float => size_of::<f32>(),
            ElemKind::Index => size_of::<i64>(),
        }
    }
}

/// Errors raised by tensor operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("payload holds {actual} elements but the shape {dims:?} requires {expected}")]
    ElementCount {
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("raw payload of {actual} bytes does not match the {expected} bytes required")]
    ByteCount { expected: usize, actual: usize },

    #[error("cannot copy a {from_kind} tensor of shape {from:?} into a {to_kind} tensor of shape {to:?}")]
    CopyMismatch {
        from_kind: ElemKind,
        from: Vec<usize>,
        to_kind: ElemKind,
        to: Vec<usize>,
    },

    #[error("invalid permutation {shuffle:?} for a tensor of rank {rank}")]
    Permutation { shuffle: Vec<usize>, rank: usize },

    #[error("shape {dims:?} has more elements than fit in memory")]
    Overflow { dims: Vec<usize> },
}

/// Number of elements of a shape. Fails when the count does not fit in `usize`.
pub fn element_count(dims: &[usize]) -> Result<usize, TensorError> {
    dims.iter()
        .try_fold(1usize, |count, &dim| count.checked_mul(dim))
        .ok_or_else(|| TensorError::Overflow {
            dims: dims.to_vec(),
        })
}

/// Size in bytes of a `kind` tensor of shape `dims`.
pub fn byte_size(kind: ElemKind, dims: &[usize]) -> Result<usize, TensorError> {
    element_count(dims)?
        .checked_mul(kind.size_of())
        .ok_or_else(|| TensorError::Overflow {
            dims: dims.to_vec(),
        })
}

/// Typed storage of a tensor.
#[derive(Clone, PartialEq)]
pub enum TensorData {
    Float(Vec<f32>),
    Index(Vec<i64>),
}

impl TensorData {
    fn zeros(kind: ElemKind, len: usize) -> Self {
        match kind {
            ElemKind::Float => TensorData::Float(vec![0.0; len]),
            ElemKind::Index => TensorData::Index(vec![0; len]),
        }
    }

    fn len(&self) -> usize {
        match self {
            TensorData::Float(v) => v.len(),
            TensorData::Index(v) => v.len(),
        }
    }

    fn kind(&self) -> ElemKind {
        match self {
            TensorData::Float(_) => ElemKind::Float,
            TensorData::Index(_) => ElemKind::Index,
        }
    }
}

/// Truncate the vector display for debug display
fn trunc<T: fmt::Display>(v: &[T]) -> String {
    const MAX_LEN: usize = 5;
    let mut s = String::new();
    s.push('[');
    for (i, item) in v.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push_str(&format!("{item}"));
        if i > MAX_LEN {
            s.push_str(", ...");
            break;
        }
    }
    s.push(']');
    s
}

/// Shorten the tensor data for debug display
impl fmt::Debug for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorData::Float(v) => write!(f, "Float({})", trunc(v)),
            TensorData::Index(v) => write!(f, "Index({})", trunc(v)),
        }
    }
}

/// A dense, row-major tensor buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Allocate a zero-filled tensor.
    pub fn zeros(kind: ElemKind, dims: &[usize]) -> Result<Self, TensorError> {
        let len = element_count(dims)?;
        Ok(Self {
            dims: dims.to_vec(),
            data: TensorData::zeros(kind, len),
        })
    }

    /// Build a float tensor from its elements.
    pub fn from_f32(values: Vec<f32>, dims: &[usize]) -> Result<Self, TensorError> {
        Self::from_data(TensorData::Float(values), dims)
    }

    /// Build an index tensor from its elements.
    pub fn from_i64(values: Vec<i64>, dims: &[usize]) -> Result<Self, TensorError> {
        Self::from_data(TensorData::Index(values), dims)
    }

    /// Build a tensor from typed storage, checking the element count against `dims`.
    pub fn from_data(data: TensorData, dims: &[usize]) -> Result<Self, TensorError> {
        let expected = element_count(dims)?;
        if data.len() != expected {
            return Err(TensorError::ElementCount {
                dims: dims.to_vec(),
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            dims: dims.to_vec(),
            data,
        })
    }

    /// Decode little-endian bytes as a row-major tensor of exactly `product(dims)` elements.
    pub fn from_raw_bytes(kind: ElemKind, dims: &[usize], bytes: &[u8]) -> Result<Self, TensorError> {
        let expected = byte_size(kind, dims)?;
        if bytes.len() != expected {
            return Err(TensorError::ByteCount {
                expected,
                actual: bytes.len(),
            });
        }

        // The payload may not be aligned for the element type, so collect into a fresh vector.
        let data = match kind {
            ElemKind::Float => TensorData::Float(
                bytemuck::pod_collect_to_vec::<u8, u32>(bytes)
                    .into_iter()
                    .map(|bits| f32::from_bits(u32::from_le(bits)))
                    .collect(),
            ),
            ElemKind::Index => TensorData::Index(
                bytemuck::pod_collect_to_vec::<u8, i64>(bytes)
                    .into_iter()
                    .map(i64::from_le)
                    .collect(),
            ),
        };

        Self::from_data(data, dims)
    }

    pub fn kind(&self) -> ElemKind {
        self.data.kind()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::Index(v) => Some(v),
            _ => None,
        }
    }

    /// The raw bytes of the buffer in native byte order.
    ///
    /// These match the ONNX `raw_data` encoding only on little-endian targets.
    pub fn raw_bytes(&self) -> &[u8] {
        match &self.data {
            TensorData::Float(v) => bytemuck::cast_slice(v),
            TensorData::Index(v) => bytemuck::cast_slice(v),
        }
    }

    /// Fill the buffer with zeros, keeping kind and shape.
    pub fn zero(&mut self) {
        self.data = TensorData::zeros(self.kind(), self.size());
    }

    /// Overwrite this tensor's elements with `other`'s. Kind and shape must match.
    pub fn copy_from(&mut self, other: &Tensor) -> Result<(), TensorError> {
        if self.kind() != other.kind() || self.dims != other.dims {
            return Err(TensorError::CopyMismatch {
                from_kind: other.kind(),
                from: other.dims.clone(),
                to_kind: self.kind(),
                to: self.dims.clone(),
            });
        }
        self.data = other.data.clone();
        Ok(())
    }

    /// Permute the dimensions: output dimension `i` is input dimension `shuffle[i]`.
    pub fn transpose(&self, shuffle: &[usize]) -> Result<Tensor, TensorError> {
        let rank = self.dims.len();
        if !is_permutation(shuffle, rank) {
            return Err(TensorError::Permutation {
                shuffle: shuffle.to_vec(),
                rank,
            });
        }

        let out_dims: Vec<usize> = shuffle.iter().map(|&axis| self.dims[axis]).collect();
        let in_strides = strides(&self.dims);
        let len = self.size();

        // For every output element, walk its coordinates and gather the matching input offset.
        let source_index = |flat: usize| {
            let mut rem = flat;
            let mut offset = 0;
            for (i, &dim) in out_dims.iter().enumerate().rev() {
                let coord = rem % dim;
                rem /= dim;
                offset += coord * in_strides[shuffle[i]];
            }
            offset
        };

        let data = match &self.data {
            TensorData::Float(v) => TensorData::Float((0..len).map(|i| v[source_index(i)]).collect()),
            TensorData::Index(v) => TensorData::Index((0..len).map(|i| v[source_index(i)]).collect()),
        };

        Ok(Tensor {
            dims: out_dims,
            data,
        })
    }
}

/// Row-major strides of a shape.
pub(crate) fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Whether `shuffle` is a permutation of `0..rank`.
pub(crate) fn is_permutation(shuffle: &[usize], rank: usize) -> bool {
    if shuffle.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &axis in shuffle {
        if axis >= rank || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}
