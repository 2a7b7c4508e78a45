// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Levelization of the combinational DAG.
//!
//! Assigns level 0 to every primary input and `1 + max(input levels)` to
//! every gate output, groups gates by level, and records a topological
//! placement order. Gates at one level have no dependencies among each
//! other, so level groups are the unit of parallel evaluation, and the
//! placement order is a valid visit order for single-sweep engines.

use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};

/// Level structure and derived indices for one circuit.
#[derive(Debug)]
pub struct Levelization {
    /// Level per net. Primary inputs are 0; nets no gate ever reads or
    /// drives stay 0 as well.
    pub net_levels: Vec<u32>,
    /// Gate indices grouped by the level of their output net, stable by
    /// gate index within each group.
    pub gates_by_level: Vec<Vec<usize>>,
    /// Gate indices in the order the sweep placed them (a topological
    /// order of the DAG).
    pub topo_order: Vec<usize>,
    /// Longest input-to-output path in gate edges.
    pub max_level: u32,
    /// Driving gate per net, `None` for primary inputs and floating nets.
    pub driver_of: Vec<Option<usize>>,
    /// Fanout in CSR form: gates reading net `n` are
    /// `fanout[fanout_start[n]..fanout_start[n + 1]]`.
    pub fanout_start: Vec<usize>,
    pub fanout: Vec<usize>,
}

impl Levelization {
    /// Levelize `circuit`, verifying its structural invariants: every net
    /// has at most one driver, primary inputs have none, and the gate
    /// graph is acyclic.
    pub fn build(circuit: &Circuit) -> Result<Levelization> {
        let net_count = circuit.net_count();
        let gates = circuit.gates();

        let mut driver_of: Vec<Option<usize>> = vec![None; net_count];
        for (gate_idx, gate) in gates.iter().enumerate() {
            if circuit.is_primary_input(gate.output) {
                return Err(SimError::Parse(format!(
                    "gate {} drives primary input {}",
                    gate.name,
                    circuit.net_name(gate.output)
                )));
            }
            if let Some(prev) = driver_of[gate.output] {
                return Err(SimError::Parse(format!(
                    "net {} driven by both {} and {}",
                    circuit.net_name(gate.output),
                    gates[prev].name,
                    gate.name
                )));
            }
            driver_of[gate.output] = Some(gate_idx);
        }

        let mut fanout_start = vec![0usize; net_count + 1];
        for gate in gates {
            for &input in &gate.inputs {
                fanout_start[input + 1] += 1;
            }
        }
        for i in 0..net_count {
            fanout_start[i + 1] += fanout_start[i];
        }
        let mut fanout = vec![0usize; fanout_start[net_count]];
        let mut cursor = fanout_start.clone();
        for (gate_idx, gate) in gates.iter().enumerate() {
            for &input in &gate.inputs {
                fanout[cursor[input]] = gate_idx;
                cursor[input] += 1;
            }
        }

        let mut levels: Vec<Option<u32>> = vec![None; net_count];
        for &pi in circuit.primary_inputs() {
            levels[pi] = Some(0);
        }

        // Sweep until every gate is placed. A sweep that places nothing
        // while gates remain means a loop or an undriven non-input net.
        let mut topo_order = Vec::with_capacity(gates.len());
        let mut placed = vec![false; gates.len()];
        let mut remaining = gates.len();
        let mut max_level = 0u32;
        while remaining > 0 {
            let mut progress = false;
            for (gate_idx, gate) in gates.iter().enumerate() {
                if placed[gate_idx] {
                    continue;
                }
                let mut max_input_level = 0u32;
                let mut ready = true;
                for &input in &gate.inputs {
                    match levels[input] {
                        Some(level) => max_input_level = max_input_level.max(level),
                        None => {
                            ready = false;
                            break;
                        }
                    }
                }
                if !ready {
                    continue;
                }
                let gate_level = max_input_level + 1;
                max_level = max_level.max(gate_level);
                levels[gate.output] = Some(match levels[gate.output] {
                    Some(existing) => existing.max(gate_level),
                    None => gate_level,
                });
                topo_order.push(gate_idx);
                placed[gate_idx] = true;
                remaining -= 1;
                progress = true;
            }
            if !progress {
                return Err(SimError::CombinationalLoop);
            }
        }

        let net_levels: Vec<u32> = levels.into_iter().map(|l| l.unwrap_or(0)).collect();

        let mut gates_by_level = vec![Vec::new(); max_level as usize + 1];
        for (gate_idx, gate) in gates.iter().enumerate() {
            gates_by_level[net_levels[gate.output] as usize].push(gate_idx);
        }
        clilog::debug!(
            "levelized {} gates over {} levels ({} nets)",
            gates.len(),
            max_level + 1,
            net_count
        );

        Ok(Levelization {
            net_levels,
            gates_by_level,
            topo_order,
            max_level,
            driver_of,
            fanout_start,
            fanout,
        })
    }

    /// Gates reading net `net`.
    pub fn fanout_of(&self, net: NetId) -> &[usize] {
        &self.fanout[self.fanout_start[net]..self.fanout_start[net + 1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser::parse_str;

    const XOR_NAND_TREE: &str = "\
        module top (a, b, y);
        input a, b;
        output y;
        wire n1, n2, n3;
        nand g1 (n1, a, b);
        nand g2 (n2, a, n1);
        nand g3 (n3, b, n1);
        nand g4 (y, n2, n3);
        endmodule
    ";

    #[test]
    fn test_levels_respect_edges() {
        let circuit = parse_str(XOR_NAND_TREE).unwrap();
        let levels = Levelization::build(&circuit).unwrap();
        for gate in circuit.gates() {
            for &input in &gate.inputs {
                assert!(
                    levels.net_levels[gate.output] > levels.net_levels[input],
                    "gate {} output level must exceed input levels",
                    gate.name
                );
            }
        }
        assert_eq!(levels.max_level, 3);
    }

    #[test]
    fn test_level_groups_partition_gates() {
        let circuit = parse_str(XOR_NAND_TREE).unwrap();
        let levels = Levelization::build(&circuit).unwrap();
        let mut seen = vec![false; circuit.gates().len()];
        for group in &levels.gates_by_level {
            for &gate_idx in group {
                assert!(!seen[gate_idx]);
                seen[gate_idx] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(levels.topo_order.len(), circuit.gates().len());
    }

    #[test]
    fn test_relevelize_is_idempotent() {
        let circuit = parse_str(XOR_NAND_TREE).unwrap();
        let first = Levelization::build(&circuit).unwrap();
        let second = Levelization::build(&circuit).unwrap();
        assert_eq!(first.net_levels, second.net_levels);
        assert_eq!(first.gates_by_level, second.gates_by_level);
        assert_eq!(first.topo_order, second.topo_order);
    }

    #[test]
    fn test_combinational_loop_detected() {
        let src = "\
            module loopy (b);
            input b;
            and g1 (a, a, b);
            endmodule
        ";
        let circuit = parse_str(src).unwrap();
        let result = Levelization::build(&circuit);
        assert!(matches!(result, Err(SimError::CombinationalLoop)));
    }

    #[test]
    fn test_undriven_wire_input_detected() {
        let src = "\
            module dangling (a, y);
            input a;
            output y;
            wire n1;
            and g1 (y, a, n1);
            endmodule
        ";
        let circuit = parse_str(src).unwrap();
        let result = Levelization::build(&circuit);
        assert!(matches!(result, Err(SimError::CombinationalLoop)));
    }

    #[test]
    fn test_duplicate_driver_rejected() {
        let src = "\
            module dup (a, y);
            input a;
            output y;
            buf g1 (y, a);
            not g2 (y, a);
            endmodule
        ";
        let circuit = parse_str(src).unwrap();
        let result = Levelization::build(&circuit);
        assert!(matches!(result, Err(SimError::Parse(_))));
    }

    #[test]
    fn test_fanout_index() {
        let circuit = parse_str(XOR_NAND_TREE).unwrap();
        let levels = Levelization::build(&circuit).unwrap();
        let n1 = circuit.net_id("n1").unwrap();
        // n1 feeds g2 and g3
        let fanout = levels.fanout_of(n1);
        assert_eq!(fanout.len(), 2);
        for &gate_idx in fanout {
            assert!(circuit.gates()[gate_idx]
                .inputs
                .contains(&n1));
        }
    }
}
