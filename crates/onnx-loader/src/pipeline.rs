use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use graph_ir::{Graph, NodeId, Tensor};

use crate::error::{Error, Result};
use crate::node::{LoweringEngine, operator_name};
use crate::outputs::bind_outputs;
use crate::reader::{ModelDescription, ModelReader};
use crate::tensor_table::TensorTable;

/// What a load does besides lowering the nodes.
#[derive(Debug, Clone, Default)]
pub struct LoadConfig<'a> {
    /// Materialize the model initializers. Without them every constant must be pre-bound.
    pub load_initializers: bool,
    /// Create a save node for each declared graph output.
    pub bind_outputs: bool,
    /// Caller-owned tensors bound by name before anything else; they shadow initializers and
    /// declared inputs of the same name.
    pub prebound: Vec<(String, &'a Tensor)>,
}

impl<'a> LoadConfig<'a> {
    /// Lower inputs and operators only, for hosts that supply the constants themselves.
    pub fn embedding() -> Self {
        Self::default()
    }

    /// The full sequence, initializers and outputs included.
    pub fn standalone() -> Self {
        Self {
            load_initializers: true,
            bind_outputs: true,
            prebound: Vec::new(),
        }
    }
}

/// The result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub ir_version: i64,
    pub opset_version: i64,
    /// Save nodes of the graph outputs, in declaration order. Empty when outputs are not bound.
    pub outputs: Vec<(String, NodeId)>,
    /// Graph value of every name resolved or produced during the load.
    pub values: HashMap<String, NodeId>,
}

impl LoadedModel {
    /// The save node of the output named `name`.
    pub fn output(&self, name: &str) -> Option<NodeId> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, save)| *save)
    }

    pub fn value(&self, name: &str) -> Option<NodeId> {
        self.values.get(name).copied()
    }
}

/// Loads ONNX models into a [`Graph`].
///
/// ```no_run
/// use graph_ir::Graph;
/// use onnx_loader::OnnxLoader;
///
/// let mut graph = Graph::new("mnist");
/// let model = OnnxLoader::standalone()
///     .load_file("mnist.onnx", &mut graph)
///     .unwrap();
/// println!("opset {}: {graph}", model.opset_version);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OnnxLoader<'a> {
    config: LoadConfig<'a>,
    reader: ModelReader,
}

impl<'a> OnnxLoader<'a> {
    pub fn new(config: LoadConfig<'a>) -> Self {
        Self {
            config,
            reader: ModelReader::new(),
        }
    }

    pub fn embedding() -> Self {
        Self::new(LoadConfig::embedding())
    }

    pub fn standalone() -> Self {
        Self::new(LoadConfig::standalone())
    }

    pub fn config(&self) -> &LoadConfig<'a> {
        &self.config
    }

    pub fn load_initializers(mut self, load_initializers: bool) -> Self {
        self.config.load_initializers = load_initializers;
        self
    }

    pub fn bind_outputs(mut self, bind_outputs: bool) -> Self {
        self.config.bind_outputs = bind_outputs;
        self
    }

    /// Bind a caller-owned tensor to `name` for the duration of each load.
    pub fn prebind(mut self, name: impl Into<String>, tensor: &'a Tensor) -> Self {
        self.config.prebound.push((name.into(), tensor));
        self
    }

    /// Set the decode budget in bytes.
    pub fn limit(mut self, limit: u64) -> Self {
        self.reader = ModelReader::with_limit(limit);
        self
    }

    pub fn load_bytes(&self, bytes: &[u8], graph: &mut Graph) -> Result<LoadedModel> {
        log::info!("Loading ONNX model from {} bytes", bytes.len());
        let description = self.reader.read_bytes(bytes)?;
        self.load(description, graph)
    }

    pub fn load_reader<R: Read>(&self, reader: R, graph: &mut Graph) -> Result<LoadedModel> {
        let description = self.reader.read_from(reader)?;
        self.load(description, graph)
    }

    pub fn load_file(&self, path: impl AsRef<Path>, graph: &mut Graph) -> Result<LoadedModel> {
        let path = path.as_ref();
        let description = self.reader.read_file(path)?;
        let model = self.load(description, graph)?;
        log::info!("Finished loading ONNX file: {}", path.display());
        Ok(model)
    }

    /// Lower a decoded model. On failure the graph is rolled back to its nodes and types before
    /// the call.
    pub fn load(&self, description: ModelDescription, graph: &mut Graph) -> Result<LoadedModel> {
        let checkpoint = graph.checkpoint();
        let len = graph.len();
        let result = self.lower_model(&description, graph);
        match &result {
            Ok(model) => log::info!(
                "Loaded ONNX model: ir_version {}, opset {}, {} graph nodes",
                model.ir_version,
                model.opset_version,
                graph.len()
            ),
            Err(err) => {
                log::debug!("Load failed, dropping {} graph nodes", graph.len() - len);
                graph.rollback(checkpoint);
                log::error!("Failed to load ONNX model: {err}");
            }
        }
        result
    }

    fn lower_model(&self, description: &ModelDescription, graph: &mut Graph) -> Result<LoadedModel> {
        let model = &description.graph;

        let mut table = TensorTable::new();
        for (name, tensor) in &self.config.prebound {
            table.prebind(name.clone(), *tensor);
        }
        if self.config.load_initializers {
            table.seed_initializers(&model.initializer)?;
        }
        table.seed_inputs(&model.input, self.reader.limit())?;

        let mut engine = LoweringEngine::new(graph, &mut table, description.opset_version);
        for node in &model.node {
            let name = operator_name(node);
            let lowered = engine
                .lower(node)
                .map_err(|err| err.in_node(&node.op_type, name))?;
            if !lowered {
                return Err(Error::UnsupportedOperator {
                    op_type: node.op_type.clone(),
                    name: name.to_string(),
                });
            }
        }

        let outputs = if self.config.bind_outputs {
            bind_outputs(graph, &table, &model.output)?
        } else {
            Vec::new()
        };

        Ok(LoadedModel {
            ir_version: description.ir_version,
            opset_version: description.opset_version,
            outputs,
            values: table.into_values(),
        })
    }
}

/// Load a model file with initializers and outputs, binding `prebound` tensors first.
pub fn load_onnx_file(
    path: impl AsRef<Path>,
    prebound: &[(&str, &Tensor)],
    graph: &mut Graph,
) -> Result<LoadedModel> {
    prebound
        .iter()
        .fold(OnnxLoader::standalone(), |loader, &(name, tensor)| {
            loader.prebind(name, tensor)
        })
        .load_file(path, graph)
}

/// Load the inputs and operators of a serialized model, without initializers or outputs.
pub fn load_onnx_bytes(bytes: &[u8], graph: &mut Graph) -> Result<LoadedModel> {
    OnnxLoader::embedding().load_bytes(bytes, graph)
}
