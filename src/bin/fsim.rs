// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Fault-simulation front-end: reads a netlist and its pre-generated
//! pattern file, runs one engine, writes the answer file.
//!
//! Usage:
//!   fsim <circuit> <output-path> [--engine auto] [--threads N]

use std::path::PathBuf;

use clap::Parser;
use faultline::answer_io::write_answer_file;
use faultline::engine::{self, EngineKind};
use faultline::error::{Result, SimError};
use faultline::netlist_parser;
use faultline::pattern_parser;

#[derive(Parser)]
#[command(name = "fsim")]
#[command(about = "Stuck-at fault simulator for combinational netlists")]
struct Args {
    /// Testcase basename or .v file located under the testcase directory.
    circuit: String,

    /// Output answer file path.
    output: PathBuf,

    /// Backend: auto, serial, bitparallel, worddfs, threaded, levelized,
    /// distributed, gpu.
    #[clap(long, default_value = "auto")]
    engine: String,

    /// Worker thread count for the thread-parallel backends.
    /// 0 reads OMP_NUM_THREADS, or leaves the choice to the thread library.
    #[clap(long, default_value_t = 0)]
    threads: usize,

    /// Directory holding the circuit and pattern files.
    #[clap(long, default_value = "testcases")]
    testcase_dir: PathBuf,
}

fn circuit_file_name(arg: &str) -> String {
    if arg.ends_with(".v") {
        arg.to_string()
    } else {
        format!("{}.v", arg)
    }
}

fn circuit_base_name(file_name: &str) -> &str {
    file_name.strip_suffix(".v").unwrap_or(file_name)
}

fn resolve_threads(cli_threads: usize) -> usize {
    if cli_threads != 0 {
        return cli_threads;
    }
    std::env::var("OMP_NUM_THREADS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn run(args: &Args) -> Result<()> {
    let circuit_file = circuit_file_name(&args.circuit);
    let base_name = circuit_base_name(&circuit_file).to_string();
    let circuit_path = args.testcase_dir.join(&circuit_file);
    let pattern_path = args.testcase_dir.join(format!("{}.in", base_name));

    let circuit = netlist_parser::parse_file(&circuit_path)?;
    clilog::info!(
        "parsed {}: {} inputs, {} outputs, {} gates",
        circuit.name(),
        circuit.primary_inputs().len(),
        circuit.primary_outputs().len(),
        circuit.gates().len()
    );
    let rows = pattern_parser::parse_file(&circuit, &pattern_path)?;

    let kind = EngineKind::from_name(&args.engine)
        .ok_or_else(|| SimError::Parse(format!("unknown engine: {}", args.engine)))?;
    let threads = resolve_threads(args.threads);

    if kind == EngineKind::Distributed {
        return run_distributed(&circuit, &rows, &args.output);
    }

    let table = engine::run(kind, &circuit, &rows, threads)?;
    write_answer_file(&table, &circuit, &args.output)?;
    clilog::info!("wrote answers to {}", args.output.display());
    Ok(())
}

#[cfg(feature = "mpi")]
fn run_distributed(
    circuit: &faultline::circuit::Circuit,
    rows: &[faultline::pattern::PatternRow],
    output: &std::path::Path,
) -> Result<()> {
    use faultline::engine::distributed::DistributedEngine;
    use mpi::traits::*;

    let universe = mpi::initialize()
        .ok_or_else(|| SimError::Transport("unable to initialize MPI".into()))?;
    let world = universe.world();
    clilog::info!(
        "distributed backend: rank {} of {}",
        world.rank(),
        world.size()
    );
    let mut engine = DistributedEngine::new(circuit, rows, &world)?;
    engine.start()?;
    if engine.rank() == 0 {
        write_answer_file(engine.answers(), circuit, output)?;
        clilog::info!("wrote answers to {}", output.display());
    }
    Ok(())
}

#[cfg(not(feature = "mpi"))]
fn run_distributed(
    _circuit: &faultline::circuit::Circuit,
    _rows: &[faultline::pattern::PatternRow],
    _output: &std::path::Path,
) -> Result<()> {
    Err(SimError::Transport(
        "distributed backend requires building with --features mpi".into(),
    ))
}

fn main() {
    clilog::init_stderr_color_debug();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
