// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Distributed levelized sweep over message-passing ranks.
//!
//! Levels are partitioned contiguously and approximately equally across
//! the ranks of one communicator; the owner of a level evaluates its gates
//! and broadcasts `(net, value)` updates, so after each level every rank
//! holds the same working plane. Rank 0 alone reduces primary-output
//! equality and fills the answer table; the equality word is broadcast so
//! every rank agrees on progress, and a final barrier synchronizes
//! shutdown. The workload loop (windows, then fault nets, then both stuck
//! values) is identical on every rank, which keeps the collectives paired.

use mpi::traits::*;

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};
use crate::eval::{eval_word, SimWord};
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

pub struct DistributedEngine<'a, C: Communicator> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
    comm: &'a C,
    rank: i32,
    /// Evaluating rank per level; index 0 is unused (inputs have no gates).
    level_owner: Vec<i32>,
}

impl<'a, C: Communicator> DistributedEngine<'a, C> {
    pub fn new(
        circuit: &'a Circuit,
        rows: &[PatternRow],
        comm: &'a C,
    ) -> Result<DistributedEngine<'a, C>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        let rank = comm.rank();
        let size = comm.size();
        let level_owner = partition_levels(levels.max_level as usize + 1, size);
        Ok(DistributedEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
            comm,
            rank,
            level_owner,
        })
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn start(&mut self) -> Result<()> {
        let circuit = self.circuit;
        let net_count = circuit.net_count();
        let mut working = vec![0u64; net_count];
        let mut ready = vec![false; net_count];
        let mut update_ids: Vec<u64> = Vec::new();
        let mut update_values: Vec<u64> = Vec::new();

        for batch_idx in 0..self.batches.len() {
            for fault_net in 0..net_count {
                for stuck_value in [false, true] {
                    let eq_mask = self.sweep_fault(
                        batch_idx,
                        fault_net,
                        stuck_value,
                        &mut working,
                        &mut ready,
                        &mut update_ids,
                        &mut update_values,
                    )?;
                    if self.rank == 0 {
                        let base = self.batches[batch_idx].base;
                        let chunk_size = self.batches[batch_idx].chunk_size;
                        for offset in 0..chunk_size {
                            self.answers.set(
                                base + offset,
                                fault_net,
                                !stuck_value,
                                eq_mask.lane(offset),
                            );
                        }
                    }
                }
            }
        }

        self.comm.barrier();
        Ok(())
    }

    pub fn answers(&self) -> &AnswerTable {
        &self.answers
    }

    pub fn into_answers(self) -> AnswerTable {
        self.answers
    }

    /// One level-by-level fault sweep across the group.
    #[allow(clippy::too_many_arguments)]
    fn sweep_fault(
        &self,
        batch_idx: usize,
        fault_net: NetId,
        stuck_value: bool,
        working: &mut [u64],
        ready: &mut [bool],
        update_ids: &mut Vec<u64>,
        update_values: &mut Vec<u64>,
    ) -> Result<u64> {
        let batch = &self.batches[batch_idx];
        let gates = self.circuit.gates();

        working.copy_from_slice(&batch.base_values);
        ready.copy_from_slice(&batch.base_ready);
        working[fault_net] = if stuck_value { batch.mask } else { 0 };
        ready[fault_net] = true;

        for level in 1..=self.levels.max_level {
            let owner = self.level_owner[level as usize];
            let mut update_count: u64 = 0;
            if self.rank == owner {
                update_ids.clear();
                update_values.clear();
                for &gate_idx in &self.levels.gates_by_level[level as usize] {
                    let gate = &gates[gate_idx];
                    if gate.output == fault_net {
                        continue;
                    }
                    for &input in &gate.inputs {
                        if !ready[input] {
                            return Err(SimError::UnresolvedNet(input));
                        }
                    }
                    let value =
                        eval_word(gate, gate.inputs.iter().map(|&n| working[n]), batch.mask);
                    working[gate.output] = value;
                    ready[gate.output] = true;
                    update_ids.push(gate.output as u64);
                    update_values.push(value);
                }
                update_count = update_ids.len() as u64;
            }

            let owner_process = self.comm.process_at_rank(owner);
            owner_process.broadcast_into(&mut update_count);
            if update_count > 0 {
                if self.rank != owner {
                    update_ids.resize(update_count as usize, 0);
                    update_values.resize(update_count as usize, 0);
                }
                owner_process.broadcast_into(&mut update_ids[..]);
                owner_process.broadcast_into(&mut update_values[..]);
                if self.rank != owner {
                    for (&net, &value) in update_ids.iter().zip(update_values.iter()) {
                        let net = net as usize;
                        working[net] = value & batch.mask;
                        ready[net] = true;
                    }
                }
            }
        }

        let mut eq_mask: u64 = 0;
        if self.rank == 0 {
            eq_mask = batch.mask;
            for (output_idx, &po) in self.circuit.primary_outputs().iter().enumerate() {
                if !ready[po] {
                    return Err(SimError::UnresolvedNet(po));
                }
                eq_mask &= !(working[po] ^ batch.expected[output_idx]) & batch.mask;
            }
        }
        self.comm.process_at_rank(0).broadcast_into(&mut eq_mask);
        Ok(eq_mask & batch.mask)
    }
}

/// Contiguous, approximately equal level spans per rank; the last rank
/// absorbs any remainder.
fn partition_levels(total_levels: usize, size: i32) -> Vec<i32> {
    let size = size.max(1) as usize;
    let mut owners = vec![0i32; total_levels.max(1)];
    let mut next_level = 0;
    let mut remaining = total_levels;
    for rank in 0..size {
        if next_level >= total_levels {
            break;
        }
        let ranks_left = size - rank;
        let span = remaining.div_ceil(ranks_left).max(1);
        for _ in 0..span {
            if next_level >= total_levels {
                break;
            }
            owners[next_level] = rank as i32;
            next_level += 1;
        }
        remaining = total_levels - next_level;
    }
    while next_level < total_levels {
        owners[next_level] = size as i32 - 1;
        next_level += 1;
    }
    owners
}
