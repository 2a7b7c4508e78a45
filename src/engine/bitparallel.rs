// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Multi-fault bit-parallel engine.
//!
//! One sweep over the circuit evaluates up to 63 (fault net, stuck value)
//! candidates for a single pattern: lane 0 carries the fault-free
//! reference, lane i+1 carries candidate i. Faults are injected through
//! per-net forcing words applied as the last step of every net write, so
//! downstream fanout observes the forced value while the golden lane stays
//! untouched. Gates are swept in topological order.

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, NetId};
use crate::error::Result;
use crate::eval::{eval_word, SimWord};
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

/// Fault candidates evaluated per sweep (lane 0 is the golden reference).
const FAULTS_PER_SWEEP: usize = 63;

pub struct BitParallelEngine<'a> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
}

/// Per-sweep scratch: value plane and the two forcing planes.
struct Sweep {
    values: Vec<u64>,
    force_zero: Vec<u64>,
    force_one: Vec<u64>,
}

impl Sweep {
    fn new(net_count: usize) -> Sweep {
        Sweep {
            values: vec![0; net_count],
            force_zero: vec![0; net_count],
            force_one: vec![0; net_count],
        }
    }

    /// Overwrite forced lanes of `net` and clip to the active mask.
    /// Must be the final step of every write to `net`.
    fn apply_forcing(&mut self, net: NetId, mask: u64) {
        let mut value = self.values[net];
        value &= !self.force_zero[net];
        value |= self.force_one[net];
        self.values[net] = value & mask;
    }
}

impl<'a> BitParallelEngine<'a> {
    pub fn new(circuit: &'a Circuit, rows: &[PatternRow]) -> Result<BitParallelEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        Ok(BitParallelEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let net_count = self.circuit.net_count();
        let mut sweep = Sweep::new(net_count);
        let mut chunk: Vec<(NetId, bool)> = Vec::with_capacity(FAULTS_PER_SWEEP);

        for batch_idx in 0..self.batches.len() {
            for offset in 0..self.batches[batch_idx].chunk_size {
                let pattern = self.batches[batch_idx].base + offset;
                let total_faults = net_count * 2;
                let mut processed = 0;
                while processed < total_faults {
                    let count = FAULTS_PER_SWEEP.min(total_faults - processed);
                    chunk.clear();
                    for i in 0..count {
                        let fault_index = processed + i;
                        chunk.push((fault_index / 2, fault_index % 2 == 1));
                    }
                    let eq_mask = self.sweep_chunk(batch_idx, offset, &chunk, &mut sweep);
                    for (i, &(net, stuck_value)) in chunk.iter().enumerate() {
                        let equal = eq_mask.lane(i + 1);
                        self.answers.set(pattern, net, !stuck_value, equal);
                    }
                    processed += count;
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

    /// One full-circuit sweep; returns the lane mask of candidates whose
    /// primary outputs all match the golden lane.
    fn sweep_chunk(
        &self,
        batch_idx: usize,
        offset: usize,
        chunk: &[(NetId, bool)],
        sweep: &mut Sweep,
    ) -> u64 {
        let batch = &self.batches[batch_idx];
        let lanes = chunk.len() + 1;
        let mask = u64::lane_mask(lanes);

        sweep.force_zero.fill(0);
        sweep.force_one.fill(0);
        for (i, &(net, stuck_value)) in chunk.iter().enumerate() {
            let bit = 1u64 << (i + 1);
            if stuck_value {
                sweep.force_one[net] |= bit;
            } else {
                sweep.force_zero[net] |= bit;
            }
        }

        sweep.values.fill(0);
        for &pi in self.circuit.primary_inputs() {
            sweep.values[pi] = u64::splat(batch.input_bit(pi, offset)) & mask;
            sweep.apply_forcing(pi, mask);
        }

        let gates = self.circuit.gates();
        for &gate_idx in &self.levels.topo_order {
            let gate = &gates[gate_idx];
            sweep.values[gate.output] =
                eval_word(gate, gate.inputs.iter().map(|&n| sweep.values[n]), mask);
            sweep.apply_forcing(gate.output, mask);
        }

        let mut eq_mask = mask;
        for &po in self.circuit.primary_outputs() {
            let bits = sweep.values[po];
            let golden = u64::splat(bits.lane(0)) & mask;
            eq_mask &= !(bits ^ golden) & mask;
        }
        eq_mask
    }
}
