//! Name-keyed view over the attributes of a node.

use std::collections::HashMap;

use crate::protos::{AttributeProto, NodeProto, TensorProto, attribute_proto::AttributeType};

/// Errors raised by attribute access.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    #[error("required attribute {0} is missing")]
    Missing(String),

    #[error("attribute {name} holds {actual}, expected {expected:?}")]
    TypeMismatch {
        name: String,
        expected: AttributeType,
        actual: String,
    },

    #[error("attribute {0} is not valid UTF-8")]
    InvalidUtf8(String),

    #[error("attribute {name}: unsupported value {value}")]
    Unsupported { name: String, value: String },

    #[error("attribute {name}: {detail}")]
    Invalid { name: String, detail: String },
}

impl AttributeError {
    pub(crate) fn invalid(name: &str, detail: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            detail: detail.into(),
        }
    }
}

/// Attributes of one node, keyed by name. A name that appears twice resolves to its last
/// occurrence.
///
/// Typed accessors fail with [`AttributeError::Missing`] when the name is absent and with
/// [`AttributeError::TypeMismatch`] when the stored tag differs; the `_or` variants fall back to
/// a default for optional attributes.
#[derive(Debug, Clone, Default)]
pub struct Attributes<'a> {
    attrs: HashMap<&'a str, &'a AttributeProto>,
}

impl<'a> Attributes<'a> {
    pub fn new(node: &'a NodeProto) -> Self {
        Self::from_protos(&node.attribute)
    }

    pub fn from_protos(protos: &'a [AttributeProto]) -> Self {
        let attrs = protos.iter().map(|attr| (attr.name.as_str(), attr)).collect();
        Self { attrs }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&'a AttributeProto> {
        self.attrs.get(name).copied()
    }

    fn typed(&self, name: &str, expected: AttributeType) -> Result<&'a AttributeProto, AttributeError> {
        let attr = self
            .get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_string()))?;
        match attr.type_.enum_value() {
            Ok(ty) if ty == expected => Ok(attr),
            Ok(ty) => Err(AttributeError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: format!("{ty:?}"),
            }),
            Err(raw) => Err(AttributeError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: format!("unknown type {raw}"),
            }),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, AttributeError> {
        Ok(self.typed(name, AttributeType::INT)?.i)
    }

    pub fn float(&self, name: &str) -> Result<f32, AttributeError> {
        Ok(self.typed(name, AttributeType::FLOAT)?.f)
    }

    pub fn string(&self, name: &str) -> Result<&'a str, AttributeError> {
        let attr = self.typed(name, AttributeType::STRING)?;
        core::str::from_utf8(&attr.s).map_err(|_| AttributeError::InvalidUtf8(name.to_string()))
    }

    pub fn ints(&self, name: &str) -> Result<&'a [i64], AttributeError> {
        Ok(&self.typed(name, AttributeType::INTS)?.ints)
    }

    pub fn tensor(&self, name: &str) -> Result<&'a TensorProto, AttributeError> {
        self.typed(name, AttributeType::TENSOR)?
            .t
            .as_ref()
            .ok_or_else(|| AttributeError::Missing(name.to_string()))
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, AttributeError> {
        if self.contains(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> Result<f32, AttributeError> {
        if self.contains(name) {
            self.float(name)
        } else {
            Ok(default)
        }
    }

    pub fn ints_opt(&self, name: &str) -> Result<Option<&'a [i64]>, AttributeError> {
        if self.contains(name) {
            self.ints(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// A non-negative integer attribute as a size.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize, AttributeError> {
        if !self.contains(name) {
            return Ok(default);
        }
        let value = self.int(name)?;
        usize::try_from(value)
            .map_err(|_| AttributeError::invalid(name, format!("{value} is negative")))
    }
}

/// Convert a list of non-negative integers into sizes.
pub(crate) fn to_sizes(name: &str, values: &[i64]) -> Result<Vec<usize>, AttributeError> {
    values
        .iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| AttributeError::invalid(name, format!("{values:?} contains a negative value")))
        })
        .collect()
}

/// Resolve a possibly negative axis against `rank`.
pub(crate) fn normalize_axis(name: &str, axis: i64, rank: usize) -> Result<usize, AttributeError> {
    let rank = rank as i64;
    let resolved = if axis < 0 { axis + rank } else { axis };
    if resolved < 0 || resolved >= rank {
        return Err(AttributeError::invalid(
            name,
            format!("axis {axis} is out of range for rank {rank}"),
        ));
    }
    Ok(resolved as usize)
}
