// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Scalar reference engine.
//!
//! Simulates one (pattern, fault net, stuck value) at a time with a
//! demand-driven DFS from each primary output, visiting only the cone the
//! output depends on. Slowest backend, but the simplest one; the other
//! engines are validated against it.

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};
use crate::eval::eval_scalar;
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

/// Two-phase work item for the iterative DFS: `Visit` pushes the driving
/// gate's inputs, `Process` runs once they all carry values.
#[derive(Clone, Copy)]
enum WorkItem {
    Visit(NetId),
    Process(usize),
}

pub struct SerialEngine<'a> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
}

impl<'a> SerialEngine<'a> {
    pub fn new(circuit: &'a Circuit, rows: &[PatternRow]) -> Result<SerialEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        Ok(SerialEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let net_count = self.circuit.net_count();
        let mut values = vec![false; net_count];
        let mut visited = vec![false; net_count];
        let mut stack = Vec::new();

        for batch_idx in 0..self.batches.len() {
            for offset in 0..self.batches[batch_idx].chunk_size {
                let pattern = self.batches[batch_idx].base + offset;
                for net in 0..net_count {
                    for stuck_value in [false, true] {
                        let equal = self.outputs_match(
                            batch_idx,
                            offset,
                            net,
                            stuck_value,
                            &mut values,
                            &mut visited,
                            &mut stack,
                        )?;
                        self.answers.set(pattern, net, !stuck_value, equal);
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

    /// Simulate one fault and compare every primary output to the
    /// reference bits of the batch.
    #[allow(clippy::too_many_arguments)]
    fn outputs_match(
        &self,
        batch_idx: usize,
        offset: usize,
        fault_net: NetId,
        stuck_value: bool,
        values: &mut [bool],
        visited: &mut [bool],
        stack: &mut Vec<WorkItem>,
    ) -> Result<bool> {
        let batch = &self.batches[batch_idx];
        visited.fill(false);
        for &pi in self.circuit.primary_inputs() {
            values[pi] = batch.input_bit(pi, offset);
            visited[pi] = true;
        }
        values[fault_net] = stuck_value;
        visited[fault_net] = true;

        for (output_idx, &po) in self.circuit.primary_outputs().iter().enumerate() {
            let value = self.resolve(po, values, visited, stack)?;
            if value != batch.expected_bit(offset, output_idx) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn resolve(
        &self,
        target: NetId,
        values: &mut [bool],
        visited: &mut [bool],
        stack: &mut Vec<WorkItem>,
    ) -> Result<bool> {
        let gates = self.circuit.gates();
        stack.clear();
        stack.push(WorkItem::Visit(target));
        while let Some(item) = stack.pop() {
            match item {
                WorkItem::Visit(net) => {
                    if visited[net] {
                        continue;
                    }
                    let gate_idx = self.levels.driver_of[net]
                        .ok_or(SimError::UnresolvedNet(net))?;
                    stack.push(WorkItem::Process(gate_idx));
                    for &input in &gates[gate_idx].inputs {
                        if !visited[input] {
                            stack.push(WorkItem::Visit(input));
                        }
                    }
                }
                WorkItem::Process(gate_idx) => {
                    let gate = &gates[gate_idx];
                    if visited[gate.output] {
                        continue;
                    }
                    let mut inputs = smallvec::SmallVec::<[bool; 4]>::new();
                    for &input in &gate.inputs {
                        if !visited[input] {
                            return Err(SimError::UnresolvedNet(input));
                        }
                        inputs.push(values[input]);
                    }
                    values[gate.output] = eval_scalar(gate, &inputs)?;
                    visited[gate.output] = true;
                }
            }
        }
        Ok(values[target])
    }
}
