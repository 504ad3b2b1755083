use std::process::ExitCode;

use graph_ir::Graph;
use log::LevelFilter;
use onnx_loader::{OnnxLoader, init_log};

/// Loads an ONNX file and prints the lowered graph
fn main() -> ExitCode {
    let onnx_file = std::env::args().nth(1).expect("No input file provided");
    let verbose = std::env::args().nth(2).is_some_and(|arg| arg == "--verbose");

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_log(level).expect("Unable to initialize the logger");

    let mut graph = Graph::new(onnx_file.as_str());
    match OnnxLoader::standalone().load_file(&onnx_file, &mut graph) {
        Ok(model) => {
            println!(
                "ir_version {}, opset {}, {} outputs",
                model.ir_version,
                model.opset_version,
                model.outputs.len()
            );
            print!("{graph}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{} error: {err}", err.kind());
            ExitCode::FAILURE
        }
    }
}
