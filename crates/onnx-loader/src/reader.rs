use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use protobuf::Message;

use crate::error::{Error, Result};
use crate::protos::{GraphProto, ModelProto};

/// Default decode budget in bytes.
pub const MAX_PROTO_SIZE: u64 = 0x7FFF_FFFF;

/// Oldest IR version the loader accepts.
pub const MIN_IR_VERSION: i64 = 3;

/// A decoded model with its resolved versions.
#[derive(Debug, Clone)]
pub struct ModelDescription {
    pub ir_version: i64,
    pub opset_version: i64,
    pub graph: GraphProto,
}

/// Decodes ONNX models from bytes, streams or files under a size limit.
#[derive(Debug, Clone, Copy)]
pub struct ModelReader {
    limit: u64,
}

impl Default for ModelReader {
    fn default() -> Self {
        Self {
            limit: MAX_PROTO_SIZE,
        }
    }
}

impl ModelReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a decode budget of `limit` bytes instead of [`MAX_PROTO_SIZE`].
    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn read_bytes(&self, bytes: &[u8]) -> Result<ModelDescription> {
        let size = bytes.len() as u64;
        if size > self.limit {
            return Err(Error::TooLarge {
                size,
                limit: self.limit,
            });
        }

        let model = ModelProto::parse_from_bytes(bytes)?;
        log::debug!("Decoded model of {size} bytes");
        describe(model)
    }

    /// Read a model from a stream. At most `limit + 1` bytes are consumed, so an oversized
    /// stream is rejected without being read to the end.
    pub fn read_from<R: Read>(&self, reader: R) -> Result<ModelDescription> {
        let mut bytes = Vec::new();
        reader
            .take(self.limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(Error::Read)?;
        self.read_bytes(&bytes)
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<ModelDescription> {
        let path = path.as_ref();
        log::info!("Reading ONNX file: {}", path.display());

        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.read_from(BufReader::new(file))
    }
}

/// Check the IR version and resolve the default operator set version of a model.
///
/// The first operator set import with an empty domain wins.
pub fn resolve_versions(model: &ModelProto) -> Result<(i64, i64)> {
    if model.ir_version < MIN_IR_VERSION {
        return Err(Error::IrVersion(model.ir_version));
    }

    let opset = model
        .opset_import
        .iter()
        .find(|opset| opset.domain.is_empty())
        .ok_or(Error::MissingOpset)?;
    if opset.version <= 0 {
        return Err(Error::OpsetVersion(opset.version));
    }

    Ok((model.ir_version, opset.version))
}

fn describe(mut model: ModelProto) -> Result<ModelDescription> {
    let (ir_version, opset_version) = resolve_versions(&model)?;
    let graph = model.graph.take().unwrap_or_default();

    log::debug!("Number of nodes: {}", graph.node.len());
    log::debug!("Number of inputs: {}", graph.input.len());
    log::debug!("Number of initializers: {}", graph.initializer.len());
    log::debug!("Number of outputs: {}", graph.output.len());

    Ok(ModelDescription {
        ir_version,
        opset_version,
        graph,
    })
}
