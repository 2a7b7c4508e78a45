// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Word-parallel multi-pattern engine, demand-driven variant.
//!
//! Evaluates one fixed (fault net, stuck value) for a window of 64
//! patterns per sweep. Instead of a forward sweep over every gate, values
//! are resolved by DFS from each primary output with memoization, so only
//! the cone each output depends on is visited; the recursion
//! short-circuits at the fault net, whose word is pinned before the sweep.

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};
use crate::eval::{eval_word, SimWord};
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

/// Two-phase work item shared by the word-parallel DFS engines.
#[derive(Clone, Copy)]
pub(crate) enum WorkItem {
    Visit(NetId),
    Process(usize),
}

/// Resolve the packed value of `target`, memoizing every net on the way.
/// Primary inputs and the fault net must be seeded (`visited`) before the
/// call; an unvisited net without a driver is an engine bug.
pub(crate) fn resolve_word(
    circuit: &Circuit,
    levels: &Levelization,
    mask: u64,
    target: NetId,
    values: &mut [u64],
    visited: &mut [bool],
    stack: &mut Vec<WorkItem>,
) -> Result<u64> {
    let gates = circuit.gates();
    stack.clear();
    stack.push(WorkItem::Visit(target));
    while let Some(item) = stack.pop() {
        match item {
            WorkItem::Visit(net) => {
                if visited[net] {
                    continue;
                }
                let gate_idx = levels.driver_of[net].ok_or(SimError::UnresolvedNet(net))?;
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
                for &input in &gate.inputs {
                    if !visited[input] {
                        return Err(SimError::UnresolvedNet(input));
                    }
                }
                values[gate.output] =
                    eval_word(gate, gate.inputs.iter().map(|&n| values[n]), mask);
                visited[gate.output] = true;
            }
        }
    }
    Ok(values[target])
}

/// Equality word of all primary outputs against the batch reference for
/// one injected fault. Scratch slices are reset from the batch planes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fault_equality_word(
    circuit: &Circuit,
    levels: &Levelization,
    batch: &PatternBatch,
    fault_net: NetId,
    stuck_value: bool,
    values: &mut [u64],
    visited: &mut [bool],
    stack: &mut Vec<WorkItem>,
) -> Result<u64> {
    values.copy_from_slice(&batch.base_values);
    visited.copy_from_slice(&batch.base_ready);
    values[fault_net] = if stuck_value { batch.mask } else { 0 };
    visited[fault_net] = true;

    let mut eq_mask = batch.mask;
    for (output_idx, &po) in circuit.primary_outputs().iter().enumerate() {
        let bits = resolve_word(circuit, levels, batch.mask, po, values, visited, stack)?;
        eq_mask &= !(bits ^ batch.expected[output_idx]) & batch.mask;
    }
    Ok(eq_mask)
}

pub struct WordDfsEngine<'a> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
}

impl<'a> WordDfsEngine<'a> {
    pub fn new(circuit: &'a Circuit, rows: &[PatternRow]) -> Result<WordDfsEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        Ok(WordDfsEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let circuit = self.circuit;
        let levels = &self.levels;
        let answers = &mut self.answers;
        let net_count = circuit.net_count();
        let mut values = vec![0u64; net_count];
        let mut visited = vec![false; net_count];
        let mut stack = Vec::new();

        for batch in &self.batches {
            for net in 0..net_count {
                for stuck_value in [false, true] {
                    let eq_mask = fault_equality_word(
                        circuit,
                        levels,
                        batch,
                        net,
                        stuck_value,
                        &mut values,
                        &mut visited,
                        &mut stack,
                    )?;
                    for offset in 0..batch.chunk_size {
                        answers.set(batch.base + offset, net, !stuck_value, eq_mask.lane(offset));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser;
    use crate::pattern_parser;

    #[test]
    fn test_window_of_three_patterns() {
        let circuit = netlist_parser::parse_str(
            "module and2 (a, b, y);
             input a, b;
             output y;
             and g1 (y, a, b);
             endmodule",
        )
        .unwrap();
        let rows =
            pattern_parser::parse_str(&circuit, "a=1, b=1\na=0, b=1\na=1, b=0\n").unwrap();
        let mut engine = WordDfsEngine::new(&circuit, &rows).unwrap();
        engine.start().unwrap();
        let answers = engine.into_answers();

        let a = circuit.net_id("a").unwrap();
        let y = circuit.net_id("y").unwrap();
        // pattern 0: a=1,b=1,y=1 -> a stuck-at-0 flips y
        assert!(!answers.row(0).unwrap()[a].stuck0_eq);
        assert!(answers.row(0).unwrap()[a].stuck1_eq);
        // pattern 1: a=0,b=1,y=0 -> a stuck-at-0 is the pattern value
        assert!(answers.row(1).unwrap()[a].stuck0_eq);
        assert!(!answers.row(1).unwrap()[a].stuck1_eq);
        // pattern 2: a=1,b=0,y=0 -> a unobservable while b=0
        assert!(answers.row(2).unwrap()[a].stuck0_eq);
        assert!(answers.row(2).unwrap()[a].stuck1_eq);
        // y itself: equal iff forced value matches golden
        assert!(!answers.row(0).unwrap()[y].stuck0_eq);
        assert!(answers.row(0).unwrap()[y].stuck1_eq);
        assert!(answers.row(1).unwrap()[y].stuck0_eq);
        assert!(!answers.row(1).unwrap()[y].stuck1_eq);
    }

    #[test]
    fn test_agrees_with_serial_engine() {
        let netlist = "module mix (a, b, c, y, z);
             input a, b, c;
             output y, z;
             wire n1, n2;
             xor g1 (n1, a, b);
             nand g2 (n2, n1, c);
             or g3 (y, n2, a);
             xnor g4 (z, n1, n2);
             endmodule";
        let circuit = netlist_parser::parse_str(netlist).unwrap();
        let mut text = String::new();
        for i in 0..70u32 {
            text.push_str(&format!(
                "a={}, b={}, c={}\n",
                i & 1,
                (i >> 1) & 1,
                (i >> 2) & 1
            ));
        }
        let rows = pattern_parser::parse_str(&circuit, &text).unwrap();

        let mut dfs = WordDfsEngine::new(&circuit, &rows).unwrap();
        dfs.start().unwrap();
        let mut serial = crate::engine::serial::SerialEngine::new(&circuit, &rows).unwrap();
        serial.start().unwrap();

        for pattern in 0..rows.len() {
            assert_eq!(
                dfs.answers().row(pattern).unwrap(),
                serial.answers().row(pattern).unwrap(),
                "pattern {}",
                pattern
            );
        }
    }
}
