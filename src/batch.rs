// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Pattern window assembly.
//!
//! Packs a contiguous window of up to 64 pattern rows into per-net bit
//! planes, runs one fault-free levelized sweep to obtain the golden value
//! of every net for every lane, and reconciles expected primary outputs:
//! rows that provide expected bits are checked against the golden
//! reference, rows that provide none inherit it. Every engine consumes
//! these batches, so all backends compare faults against the same
//! reference plane.

use crate::circuit::{Circuit, NetId};
use crate::error::{Result, SimError};
use crate::eval::{eval_word, SimWord};
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

/// Lanes per window.
pub const WINDOW: usize = 64;

/// One packed window of patterns.
#[derive(Debug)]
pub struct PatternBatch {
    /// Index of the first pattern row in this window.
    pub base: usize,
    /// Number of active lanes, 1..=64.
    pub chunk_size: usize,
    /// Low `chunk_size` bits set.
    pub mask: u64,
    /// Per-net primary input planes; lane i holds the bit of row base+i.
    pub base_values: Vec<u64>,
    /// True for nets seeded by the patterns (the primary inputs).
    pub base_ready: Vec<bool>,
    /// Fault-free value plane of every net.
    pub golden_values: Vec<u64>,
    /// Golden plane of each primary output, in output column order.
    pub expected: Vec<u64>,
}

impl PatternBatch {
    /// Expected bit of output column `output_idx` in lane `offset`.
    pub fn expected_bit(&self, offset: usize, output_idx: usize) -> bool {
        self.expected[output_idx].lane(offset)
    }

    /// Primary-input bit of `net` in lane `offset`.
    pub fn input_bit(&self, net: NetId, offset: usize) -> bool {
        self.base_values[net].lane(offset)
    }
}

/// Pack all rows into consecutive windows.
pub fn build_batches(
    circuit: &Circuit,
    levels: &Levelization,
    rows: &[PatternRow],
) -> Result<Vec<PatternBatch>> {
    let mut batches = Vec::with_capacity(rows.len().div_ceil(WINDOW));
    let mut base = 0;
    while base < rows.len() {
        let chunk_size = WINDOW.min(rows.len() - base);
        batches.push(build_batch(circuit, levels, rows, base, chunk_size)?);
        base += chunk_size;
    }
    Ok(batches)
}

fn build_batch(
    circuit: &Circuit,
    levels: &Levelization,
    rows: &[PatternRow],
    base: usize,
    chunk_size: usize,
) -> Result<PatternBatch> {
    let net_count = circuit.net_count();
    let mask = u64::lane_mask(chunk_size);

    let mut base_values = vec![0u64; net_count];
    let mut base_ready = vec![false; net_count];
    for offset in 0..chunk_size {
        let bit = 1u64 << offset;
        for entry in &rows[base + offset].pattern.assignments {
            if entry.net >= net_count {
                return Err(SimError::UnknownNet(format!("net id {}", entry.net)));
            }
            if entry.value {
                base_values[entry.net] |= bit;
            }
            base_ready[entry.net] = true;
        }
    }

    // Fault-free sweep in level order fills the golden plane.
    let mut golden_values = base_values.clone();
    let mut ready = base_ready.clone();
    let gates = circuit.gates();
    for level_gates in levels.gates_by_level.iter().skip(1) {
        for &gate_idx in level_gates {
            let gate = &gates[gate_idx];
            for &input in &gate.inputs {
                if !ready[input] {
                    return Err(SimError::UnresolvedNet(input));
                }
            }
            let value = eval_word(gate, gate.inputs.iter().map(|&n| golden_values[n]), mask);
            golden_values[gate.output] = value;
            ready[gate.output] = true;
        }
    }

    let outputs = circuit.primary_outputs();
    let mut expected = Vec::with_capacity(outputs.len());
    for &po in outputs {
        if !ready[po] {
            return Err(SimError::UnresolvedNet(po));
        }
        expected.push(golden_values[po]);
    }

    // Rows that carry expected outputs must agree with the golden sweep
    // and must cover every output; rows that carry none inherit golden.
    for offset in 0..chunk_size {
        let provided = &rows[base + offset].provided_outputs;
        if provided.is_empty() {
            continue;
        }
        for (output_idx, &po) in outputs.iter().enumerate() {
            let name = circuit.net_name(po);
            let &value = provided.get(&po).ok_or_else(|| {
                SimError::MissingExpectedOutput {
                    pattern: base + offset,
                    output: name.to_string(),
                }
            })?;
            if value != expected[output_idx].lane(offset) {
                return Err(SimError::ExpectedOutputMismatch {
                    pattern: base + offset,
                    output: name.to_string(),
                });
            }
        }
    }

    Ok(PatternBatch {
        base,
        chunk_size,
        mask,
        base_values,
        base_ready,
        golden_values,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser;
    use crate::pattern_parser;

    fn and2() -> Circuit {
        netlist_parser::parse_str(
            "module and2 (a, b, y);
             input a, b;
             output y;
             and g1 (y, a, b);
             endmodule",
        )
        .unwrap()
    }

    #[test]
    fn test_packing_and_golden_reference() {
        let circuit = and2();
        let levels = Levelization::build(&circuit).unwrap();
        let rows =
            pattern_parser::parse_str(&circuit, "a=1, b=1\na=0, b=1\na=1, b=0\n").unwrap();
        let batches = build_batches(&circuit, &levels, &rows).unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.chunk_size, 3);
        assert_eq!(batch.mask, 0b111);

        let a = circuit.net_id("a").unwrap();
        let b = circuit.net_id("b").unwrap();
        assert_eq!(batch.base_values[a], 0b101);
        assert_eq!(batch.base_values[b], 0b011);
        // y = a & b per lane: (1,1)=1, (0,1)=0, (1,0)=0
        assert_eq!(batch.expected[0], 0b001);
        assert!(batch.expected_bit(0, 0));
        assert!(!batch.expected_bit(1, 0));
    }

    #[test]
    fn test_high_lanes_zero_throughout() {
        let circuit = and2();
        let levels = Levelization::build(&circuit).unwrap();
        let rows =
            pattern_parser::parse_str(&circuit, "a=1, b=1\na=0, b=1\na=1, b=0\n").unwrap();
        let batch = &build_batches(&circuit, &levels, &rows).unwrap()[0];
        for net in 0..circuit.net_count() {
            assert_eq!(batch.base_values[net] & !batch.mask, 0);
            assert_eq!(batch.golden_values[net] & !batch.mask, 0);
        }
        for word in &batch.expected {
            assert_eq!(word & !batch.mask, 0);
        }
    }

    #[test]
    fn test_provided_outputs_verified() {
        let circuit = and2();
        let levels = Levelization::build(&circuit).unwrap();
        let rows = pattern_parser::parse_str(&circuit, "a=1, b=1 | y=1\n").unwrap();
        assert!(build_batches(&circuit, &levels, &rows).is_ok());

        let rows = pattern_parser::parse_str(&circuit, "a=1, b=1 | y=0\n").unwrap();
        let result = build_batches(&circuit, &levels, &rows);
        assert!(matches!(
            result,
            Err(SimError::ExpectedOutputMismatch { pattern: 0, .. })
        ));
    }

    #[test]
    fn test_partial_provided_outputs_rejected() {
        let circuit = netlist_parser::parse_str(
            "module two_out (a, y, z);
             input a;
             output y, z;
             buf g1 (y, a);
             not g2 (z, a);
             endmodule",
        )
        .unwrap();
        let levels = Levelization::build(&circuit).unwrap();
        let rows = pattern_parser::parse_str(&circuit, "a=1 | y=1\n").unwrap();
        let result = build_batches(&circuit, &levels, &rows);
        assert!(matches!(
            result,
            Err(SimError::MissingExpectedOutput { pattern: 0, .. })
        ));
    }

    #[test]
    fn test_windows_split_at_64() {
        let circuit = and2();
        let levels = Levelization::build(&circuit).unwrap();
        let mut text = String::new();
        for i in 0..130 {
            text.push_str(if i % 2 == 0 { "a=1, b=1\n" } else { "a=0, b=0\n" });
        }
        let rows = pattern_parser::parse_str(&circuit, &text).unwrap();
        let batches = build_batches(&circuit, &levels, &rows).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].chunk_size, 64);
        assert_eq!(batches[0].mask, u64::MAX);
        assert_eq!(batches[1].base, 64);
        assert_eq!(batches[2].chunk_size, 2);
    }
}
