// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Levelized fault sweep.
//!
//! The canonical sweep for the shared-memory and distributed backends.
//! Working values start from the window's fault-free plane, the fault word
//! is pinned, and only levels at and below the fault's cone of influence
//! are re-evaluated, in level order. The cone is marked through the fanout
//! index before each fault; gates outside it keep their golden words.
//! Within one level all evaluations write distinct nets, so they run on a
//! rayon pool and are committed at the level boundary.

use rayon::prelude::*;

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};
use crate::eval::{eval_word, SimWord};
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

pub struct LevelizedEngine<'a> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
    pool: rayon::ThreadPool,
}

/// Cone membership with generation stamps, so per-fault reset is O(1).
struct ConeMarks {
    net_stamp: Vec<u32>,
    gate_stamp: Vec<u32>,
    current: u32,
}

impl ConeMarks {
    fn new(net_count: usize, gate_count: usize) -> ConeMarks {
        ConeMarks {
            net_stamp: vec![0; net_count],
            gate_stamp: vec![0; gate_count],
            current: 0,
        }
    }

    /// Mark every gate downstream of `fault_net`.
    fn mark(&mut self, levels: &Levelization, circuit: &Circuit, fault_net: NetId, stack: &mut Vec<NetId>) {
        self.current += 1;
        let stamp = self.current;
        self.net_stamp[fault_net] = stamp;
        stack.clear();
        stack.push(fault_net);
        while let Some(net) = stack.pop() {
            for &gate_idx in levels.fanout_of(net) {
                if self.gate_stamp[gate_idx] == stamp {
                    continue;
                }
                self.gate_stamp[gate_idx] = stamp;
                let output = circuit.gates()[gate_idx].output;
                if self.net_stamp[output] != stamp {
                    self.net_stamp[output] = stamp;
                    stack.push(output);
                }
            }
        }
    }

    fn gate_in_cone(&self, gate_idx: usize) -> bool {
        self.gate_stamp[gate_idx] == self.current
    }
}

impl<'a> LevelizedEngine<'a> {
    /// `num_threads == 0` leaves the pool size to rayon.
    pub fn new(
        circuit: &'a Circuit,
        rows: &[PatternRow],
        num_threads: usize,
    ) -> Result<LevelizedEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| SimError::Transport(format!("unable to build thread pool: {}", e)))?;
        Ok(LevelizedEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
            pool,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let circuit = self.circuit;
        let levels = &self.levels;
        let pool = &self.pool;
        let answers = &mut self.answers;
        let gates = circuit.gates();
        let net_count = circuit.net_count();

        let mut working = vec![0u64; net_count];
        let mut marks = ConeMarks::new(net_count, gates.len());
        let mut mark_stack = Vec::new();

        for batch in &self.batches {
            for fault_net in 0..net_count {
                marks.mark(levels, circuit, fault_net, &mut mark_stack);
                let start_level = levels.net_levels[fault_net] + 1;

                for stuck_value in [false, true] {
                    working.copy_from_slice(&batch.golden_values);
                    working[fault_net] = if stuck_value { batch.mask } else { 0 };

                    for level in start_level..=levels.max_level {
                        let level_gates = &levels.gates_by_level[level as usize];
                        let updates: Vec<(NetId, u64)> = pool.install(|| {
                            level_gates
                                .par_iter()
                                .filter(|&&gate_idx| {
                                    marks.gate_in_cone(gate_idx)
                                        && gates[gate_idx].output != fault_net
                                })
                                .map(|&gate_idx| {
                                    let gate = &gates[gate_idx];
                                    let value = eval_word(
                                        gate,
                                        gate.inputs.iter().map(|&n| working[n]),
                                        batch.mask,
                                    );
                                    (gate.output, value)
                                })
                                .collect()
                        });
                        for (net, value) in updates {
                            working[net] = value;
                        }
                    }

                    let mut eq_mask = batch.mask;
                    for (output_idx, &po) in circuit.primary_outputs().iter().enumerate() {
                        eq_mask &= !(working[po] ^ batch.expected[output_idx]) & batch.mask;
                    }
                    for offset in 0..batch.chunk_size {
                        answers.set(
                            batch.base + offset,
                            fault_net,
                            !stuck_value,
                            eq_mask.lane(offset),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn answers(&self) -> &AnswerTable {
        &self.answers
    }

    pub fn into_answers(self) -> AnswerTable {
        self.answers
    }
}
