// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Testcase generator front-end.
//!
//! Draws seeded random patterns for a circuit, computes the fault-free
//! outputs for each, and emits the pattern file, the reference answer
//! file and its SHA-256 digest under the testcase directory.
//!
//! Usage:
//!   fsim-gen <circuit> [pattern-count=100] [seed=42]

use std::path::PathBuf;

use clap::Parser;
use faultline::answer_io::{write_answer_file, write_digest_file};
use faultline::batch::build_batches;
use faultline::engine::{self, EngineKind};
use faultline::error::{Result, SimError};
use faultline::levelize::Levelization;
use faultline::netlist_parser;
use faultline::pattern::{PatternGenerator, PatternRow};

#[derive(Parser)]
#[command(name = "fsim-gen")]
#[command(about = "Random pattern and reference answer generator")]
struct Args {
    /// Testcase basename or .v file located under the testcase directory.
    circuit: String,

    /// Number of patterns to draw.
    #[clap(default_value_t = 100)]
    pattern_count: usize,

    /// Random seed.
    #[clap(default_value_t = 42)]
    seed: u64,

    /// Directory holding the circuit and receiving the generated files.
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

fn run(args: &Args) -> Result<()> {
    let circuit_file = circuit_file_name(&args.circuit);
    let base_name = circuit_file.strip_suffix(".v").unwrap_or(&circuit_file);
    let circuit_path = args.testcase_dir.join(&circuit_file);
    let in_path = args.testcase_dir.join(format!("{}.in", base_name));
    let ans_path = args.testcase_dir.join(format!("{}.ans", base_name));
    let sha_path = args.testcase_dir.join(format!("{}.ans.sha", base_name));

    let circuit = netlist_parser::parse_file(&circuit_path)?;
    let patterns = PatternGenerator::new(&circuit, args.seed).generate(args.pattern_count);
    let mut rows: Vec<PatternRow> = patterns
        .into_iter()
        .map(|pattern| PatternRow {
            pattern,
            provided_outputs: Default::default(),
        })
        .collect();

    // One fault-free pass gives the expected outputs for every row.
    let levels = Levelization::build(&circuit)?;
    let batches = build_batches(&circuit, &levels, &rows)?;
    let outputs = circuit.primary_outputs();
    let mut text = String::new();
    for batch in &batches {
        for offset in 0..batch.chunk_size {
            let row = &mut rows[batch.base + offset];
            text.push_str(&row.pattern.to_line(&circuit));
            text.push_str(" | ");
            for (output_idx, &po) in outputs.iter().enumerate() {
                let bit = batch.expected_bit(offset, output_idx);
                row.provided_outputs.insert(po, bit);
                text.push_str(circuit.net_name(po));
                text.push('=');
                text.push(if bit { '1' } else { '0' });
                if output_idx + 1 != outputs.len() {
                    text.push_str(", ");
                }
            }
            text.push('\n');
        }
    }
    std::fs::write(&in_path, &text)
        .map_err(|e| SimError::Io(format!("unable to write {}: {}", in_path.display(), e)))?;
    clilog::info!(
        "wrote {} patterns for {} to {}",
        rows.len(),
        circuit_file,
        in_path.display()
    );

    let table = engine::run(EngineKind::BitParallel, &circuit, &rows, 0)?;
    write_answer_file(&table, &circuit, &ans_path)?;
    clilog::info!("wrote fault answers to {}", ans_path.display());
    write_digest_file(&ans_path, &sha_path)?;
    clilog::info!("wrote digest to {}", sha_path.display());
    Ok(())
}

fn main() {
    clilog::init_stderr_color_debug();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
