// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Engine roster and selection.
//!
//! Every backend fills the same answer table from the same circuit and
//! pattern rows and must produce byte-identical results; they differ only
//! in how the (pattern, fault) space is traversed. The orchestrator picks
//! one backend per run, either explicitly or by size heuristics, runs it
//! to completion and releases the finished table to the writer.

pub mod bitparallel;
pub mod levelized;
pub mod serial;
pub mod threaded;
pub mod word_dfs;

#[cfg(feature = "mpi")]
pub mod distributed;

#[cfg(all(feature = "metal", target_os = "macos"))]
pub mod gpu;

use crate::answers::AnswerTable;
use crate::circuit::Circuit;
use crate::error::{Result, SimError};
use crate::pattern::PatternRow;

use bitparallel::BitParallelEngine;
use levelized::LevelizedEngine;
use serial::SerialEngine;
use threaded::ThreadedEngine;
use word_dfs::WordDfsEngine;

/// Work ceiling (nets x patterns) below which the scalar engine wins.
const SERIAL_WORK_LIMIT: usize = 4096;
/// Net count above which the fault sweep is worth spreading over threads.
const THREADED_NET_LIMIT: usize = 2048;

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Auto,
    Serial,
    BitParallel,
    WordDfs,
    Threaded,
    Levelized,
    Distributed,
    Gpu,
}

impl EngineKind {
    pub fn from_name(name: &str) -> Option<EngineKind> {
        match name {
            "auto" => Some(EngineKind::Auto),
            "serial" => Some(EngineKind::Serial),
            "bitparallel" => Some(EngineKind::BitParallel),
            "worddfs" => Some(EngineKind::WordDfs),
            "threaded" => Some(EngineKind::Threaded),
            "levelized" => Some(EngineKind::Levelized),
            "distributed" => Some(EngineKind::Distributed),
            "gpu" => Some(EngineKind::Gpu),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Auto => "auto",
            EngineKind::Serial => "serial",
            EngineKind::BitParallel => "bitparallel",
            EngineKind::WordDfs => "worddfs",
            EngineKind::Threaded => "threaded",
            EngineKind::Levelized => "levelized",
            EngineKind::Distributed => "distributed",
            EngineKind::Gpu => "gpu",
        }
    }

    /// Resolve `Auto` by problem size; explicit choices pass through.
    pub fn resolve(self, circuit: &Circuit, rows: &[PatternRow]) -> EngineKind {
        if self != EngineKind::Auto {
            return self;
        }
        let nets = circuit.net_count();
        if nets.saturating_mul(rows.len()) <= SERIAL_WORK_LIMIT {
            EngineKind::Serial
        } else if nets <= THREADED_NET_LIMIT {
            EngineKind::BitParallel
        } else {
            EngineKind::Threaded
        }
    }
}

/// One constructed backend. The distributed backend is built directly by
/// the front-end because it owns the process-wide communicator.
pub enum Engine<'a> {
    Serial(SerialEngine<'a>),
    BitParallel(BitParallelEngine<'a>),
    WordDfs(WordDfsEngine<'a>),
    Threaded(ThreadedEngine<'a>),
    Levelized(LevelizedEngine<'a>),
    #[cfg(all(feature = "metal", target_os = "macos"))]
    Gpu(gpu::GpuEngine<'a>),
}

impl<'a> Engine<'a> {
    /// Construct the requested backend. `num_threads == 0` defers to the
    /// thread library (or `OMP_NUM_THREADS`, resolved by the caller).
    pub fn build(
        kind: EngineKind,
        circuit: &'a Circuit,
        rows: &'a [PatternRow],
        num_threads: usize,
    ) -> Result<Engine<'a>> {
        let kind = kind.resolve(circuit, rows);
        clilog::info!(
            "engine {}: {} nets, {} gates, {} patterns",
            kind.name(),
            circuit.net_count(),
            circuit.gates().len(),
            rows.len()
        );
        match kind {
            EngineKind::Auto => unreachable!("resolve() never returns Auto"),
            EngineKind::Serial => Ok(Engine::Serial(SerialEngine::new(circuit, rows)?)),
            EngineKind::BitParallel => {
                Ok(Engine::BitParallel(BitParallelEngine::new(circuit, rows)?))
            }
            EngineKind::WordDfs => Ok(Engine::WordDfs(WordDfsEngine::new(circuit, rows)?)),
            EngineKind::Threaded => Ok(Engine::Threaded(ThreadedEngine::new(
                circuit,
                rows,
                num_threads,
            )?)),
            EngineKind::Levelized => Ok(Engine::Levelized(LevelizedEngine::new(
                circuit,
                rows,
                num_threads,
            )?)),
            EngineKind::Distributed => Err(SimError::Transport(
                "distributed backend must be launched through its front-end path".into(),
            )),
            EngineKind::Gpu => {
                #[cfg(all(feature = "metal", target_os = "macos"))]
                {
                    Ok(Engine::Gpu(gpu::GpuEngine::new(circuit, rows)?))
                }
                #[cfg(not(all(feature = "metal", target_os = "macos")))]
                {
                    Err(SimError::Transport(
                        "gpu backend not available in this build".into(),
                    ))
                }
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        match self {
            Engine::Serial(e) => e.start(),
            Engine::BitParallel(e) => e.start(),
            Engine::WordDfs(e) => e.start(),
            Engine::Threaded(e) => e.start(),
            Engine::Levelized(e) => e.start(),
            #[cfg(all(feature = "metal", target_os = "macos"))]
            Engine::Gpu(e) => e.start(),
        }
    }

    pub fn answers(&self) -> &AnswerTable {
        match self {
            Engine::Serial(e) => e.answers(),
            Engine::BitParallel(e) => e.answers(),
            Engine::WordDfs(e) => e.answers(),
            Engine::Threaded(e) => e.answers(),
            Engine::Levelized(e) => e.answers(),
            #[cfg(all(feature = "metal", target_os = "macos"))]
            Engine::Gpu(e) => e.answers(),
        }
    }

    pub fn into_answers(self) -> AnswerTable {
        match self {
            Engine::Serial(e) => e.into_answers(),
            Engine::BitParallel(e) => e.into_answers(),
            Engine::WordDfs(e) => e.into_answers(),
            Engine::Threaded(e) => e.into_answers(),
            Engine::Levelized(e) => e.into_answers(),
            #[cfg(all(feature = "metal", target_os = "macos"))]
            Engine::Gpu(e) => e.into_answers(),
        }
    }
}

/// Run one backend to completion and hand back the filled table.
pub fn run(
    kind: EngineKind,
    circuit: &Circuit,
    rows: &[PatternRow],
    num_threads: usize,
) -> Result<AnswerTable> {
    let mut engine = Engine::build(kind, circuit, rows, num_threads)?;
    let timer = clilog::stimer!("fault simulation");
    engine.start()?;
    clilog::finish!(timer);
    Ok(engine.into_answers())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser;
    use crate::pattern::PatternGenerator;
    use crate::pattern::PatternRow;
    use crate::pattern_parser;

    const CIRCUITS: &[&str] = &[
        // 2-input AND
        "module and2 (a, b, y);
         input a, b;
         output y;
         and g1 (y, a, b);
         endmodule",
        // XOR built from four NANDs
        "module xor_tree (a, b, y);
         input a, b;
         output y;
         wire n1, n2, n3;
         nand g1 (n1, a, b);
         nand g2 (n2, a, n1);
         nand g3 (n3, b, n1);
         nand g4 (y, n2, n3);
         endmodule",
        // no internal wires: outputs are direct gate functions of inputs
        "module flat (a, b, c, s, t);
         input a, b, c;
         output s, t;
         nor g1 (s, a, b, c);
         xnor g2 (t, a, c);
         endmodule",
        // redundant inverter pair
        "module double_inv (a, y);
         input a;
         output y;
         wire n1;
         not g1 (n1, a);
         not g2 (y, n1);
         endmodule",
        // reconvergent fanout with mixed gate types
        "module mix (a, b, c, y, z);
         input a, b, c;
         output y, z;
         wire n1, n2;
         xor g1 (n1, a, b);
         nand g2 (n2, n1, c);
         or g3 (y, n2, a);
         xnor g4 (z, n1, n2);
         endmodule",
    ];

    fn generated_rows(circuit: &Circuit, count: usize) -> Vec<PatternRow> {
        let mut generator = PatternGenerator::new(circuit, 42);
        generator
            .generate(count)
            .into_iter()
            .map(|pattern| PatternRow {
                pattern,
                provided_outputs: Default::default(),
            })
            .collect()
    }

    #[test]
    fn test_all_backends_agree() {
        for netlist in CIRCUITS {
            let circuit = netlist_parser::parse_str(netlist).unwrap();
            let rows = generated_rows(&circuit, 70);
            let reference = run(EngineKind::Serial, &circuit, &rows, 0).unwrap();
            for kind in [
                EngineKind::BitParallel,
                EngineKind::WordDfs,
                EngineKind::Threaded,
                EngineKind::Levelized,
            ] {
                let table = run(kind, &circuit, &rows, 2).unwrap();
                for pattern in 0..rows.len() {
                    assert_eq!(
                        table.row(pattern).unwrap(),
                        reference.row(pattern).unwrap(),
                        "{} disagrees with serial on pattern {}",
                        kind.name(),
                        pattern
                    );
                }
            }
        }
    }

    #[test]
    fn test_running_twice_is_identical() {
        let circuit = netlist_parser::parse_str(CIRCUITS[1]).unwrap();
        let rows = generated_rows(&circuit, 96);
        let first = run(EngineKind::Levelized, &circuit, &rows, 2).unwrap();
        let second = run(EngineKind::Levelized, &circuit, &rows, 2).unwrap();
        for pattern in 0..rows.len() {
            assert_eq!(first.row(pattern).unwrap(), second.row(pattern).unwrap());
        }
    }

    #[test]
    fn test_auto_selection_by_size() {
        let circuit = netlist_parser::parse_str(CIRCUITS[0]).unwrap();
        let rows = generated_rows(&circuit, 10);
        assert_eq!(
            EngineKind::Auto.resolve(&circuit, &rows),
            EngineKind::Serial
        );
        let rows = generated_rows(&circuit, 5000);
        assert_eq!(
            EngineKind::Auto.resolve(&circuit, &rows),
            EngineKind::BitParallel
        );
        assert_eq!(
            EngineKind::Levelized.resolve(&circuit, &rows),
            EngineKind::Levelized
        );
    }

    #[test]
    fn test_engine_names_round_trip() {
        for kind in [
            EngineKind::Auto,
            EngineKind::Serial,
            EngineKind::BitParallel,
            EngineKind::WordDfs,
            EngineKind::Threaded,
            EngineKind::Levelized,
            EngineKind::Distributed,
            EngineKind::Gpu,
        ] {
            assert_eq!(EngineKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EngineKind::from_name("warp"), None);
    }

    #[test]
    fn test_expected_output_mismatch_stops_run() {
        let circuit = netlist_parser::parse_str(CIRCUITS[0]).unwrap();
        let rows = pattern_parser::parse_str(&circuit, "a=1, b=1 | y=0\n").unwrap();
        let result = run(EngineKind::BitParallel, &circuit, &rows, 0);
        assert!(matches!(
            result,
            Err(SimError::ExpectedOutputMismatch { .. })
        ));
    }

    #[test]
    fn test_masked_and_propagated_faults() {
        // y = a | b with a=0, b=1: a is masked entirely, b propagates
        let circuit = netlist_parser::parse_str(
            "module or2 (a, b, y);
             input a, b;
             output y;
             or g1 (y, a, b);
             endmodule",
        )
        .unwrap();
        let rows = pattern_parser::parse_str(&circuit, "a=0, b=1\n").unwrap();
        let table = run(EngineKind::WordDfs, &circuit, &rows, 0).unwrap();
        let a = circuit.net_id("a").unwrap();
        let b = circuit.net_id("b").unwrap();
        let row = table.row(0).unwrap();
        assert!(row[a].stuck0_eq && row[a].stuck1_eq);
        assert!(row[b].stuck1_eq && !row[b].stuck0_eq);
    }
}
