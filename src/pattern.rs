// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Input patterns and the seeded random pattern generator.

use indexmap::IndexMap;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::circuit::{Circuit, NetId};

/// One primary-input assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEntry {
    pub net: NetId,
    pub value: bool,
}

/// A full assignment of the primary inputs, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub assignments: Vec<PatternEntry>,
}

impl Pattern {
    /// Render as a pattern-file line fragment: `a=1, b=0`.
    pub fn to_line(&self, circuit: &Circuit) -> String {
        let mut line = String::new();
        for (i, entry) in self.assignments.iter().enumerate() {
            if i != 0 {
                line.push_str(", ");
            }
            line.push_str(circuit.net_name(entry.net));
            line.push('=');
            line.push(if entry.value { '1' } else { '0' });
        }
        line
    }
}

/// A pattern plus optional expected primary-output bits. The map is either
/// empty (the engine derives the reference by fault-free simulation) or
/// complete over the primary outputs.
#[derive(Debug, Clone, Default)]
pub struct PatternRow {
    pub pattern: Pattern,
    pub provided_outputs: IndexMap<NetId, bool>,
}

/// Reproducible random pattern source. The stream is a pure function of
/// the seed and the circuit's primary input order.
pub struct PatternGenerator<'a> {
    circuit: &'a Circuit,
    rng: ChaCha8Rng,
}

impl<'a> PatternGenerator<'a> {
    pub fn new(circuit: &'a Circuit, seed: u64) -> PatternGenerator<'a> {
        PatternGenerator {
            circuit,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_pattern(&mut self) -> Pattern {
        let inputs = self.circuit.primary_inputs();
        let mut assignments = Vec::with_capacity(inputs.len());
        for &net in inputs {
            assignments.push(PatternEntry {
                net,
                value: self.rng.random_range(0..2) == 1,
            });
        }
        Pattern { assignments }
    }

    pub fn generate(&mut self, count: usize) -> Vec<Pattern> {
        (0..count).map(|_| self.next_pattern()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser::parse_str;

    fn and2() -> Circuit {
        parse_str(
            "module and2 (a, b, y);
             input a, b;
             output y;
             and g1 (y, a, b);
             endmodule",
        )
        .unwrap()
    }

    #[test]
    fn test_generator_is_reproducible() {
        let circuit = and2();
        let mut first = PatternGenerator::new(&circuit, 42);
        let mut second = PatternGenerator::new(&circuit, 42);
        for _ in 0..64 {
            assert_eq!(first.next_pattern().assignments, second.next_pattern().assignments);
        }
    }

    #[test]
    fn test_generator_assigns_every_input_once() {
        let circuit = and2();
        let mut generator = PatternGenerator::new(&circuit, 7);
        let pattern = generator.next_pattern();
        assert_eq!(pattern.assignments.len(), circuit.primary_inputs().len());
        assert_eq!(pattern.assignments[0].net, circuit.primary_inputs()[0]);
        assert_eq!(pattern.assignments[1].net, circuit.primary_inputs()[1]);
    }

    #[test]
    fn test_pattern_line_rendering() {
        let circuit = and2();
        let a = circuit.net_id("a").unwrap();
        let b = circuit.net_id("b").unwrap();
        let pattern = Pattern {
            assignments: vec![
                PatternEntry { net: a, value: true },
                PatternEntry { net: b, value: false },
            ],
        };
        assert_eq!(pattern.to_line(&circuit), "a=1, b=0");
    }
}
