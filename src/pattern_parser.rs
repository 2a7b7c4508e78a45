// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Parser for pattern (`.in`) files.
//!
//! One pattern per non-empty line: `net = 0|1, ...` assignments for every
//! primary input, optionally followed by `| out = 0|1, ...` expected
//! primary-output bits. Whitespace is insignificant, blank lines are
//! skipped, and `#` or `//` starts a comment.

use std::path::Path;

use crate::circuit::{Circuit, NetType};
use crate::error::{Result, SimError};
use crate::pattern::{Pattern, PatternEntry, PatternRow};

/// Load a pattern file against an already-parsed circuit.
pub fn parse_file(circuit: &Circuit, path: impl AsRef<Path>) -> Result<Vec<PatternRow>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| SimError::Io(format!("unable to open pattern file {}: {}", path.display(), e)))?;
    let rows = parse_str(circuit, &text)?;
    if rows.is_empty() {
        return Err(SimError::Parse(format!(
            "pattern file contains no patterns: {}",
            path.display()
        )));
    }
    Ok(rows)
}

/// Parse pattern rows from a string.
pub fn parse_str(circuit: &Circuit, text: &str) -> Result<Vec<PatternRow>> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let (input_section, output_section) = match line.find('|') {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        };
        let mut row = PatternRow {
            pattern: parse_assignments(circuit, input_section)?,
            provided_outputs: Default::default(),
        };
        if let Some(section) = output_section {
            parse_expected_outputs(circuit, section, &mut row)?;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn strip_comment(line: &str) -> &str {
    let cut = match (line.find('#'), line.find("//")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    match cut {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_bit(token: &str) -> Result<bool> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(SimError::NonBinaryValue(other.to_string())),
    }
}

fn split_token(token: &str) -> Result<(&str, &str)> {
    let eq = token
        .find('=')
        .ok_or_else(|| SimError::Parse(format!("assignment missing '=': {}", token)))?;
    let name = token[..eq].trim();
    let value = token[eq + 1..].trim();
    if name.is_empty() || value.is_empty() {
        return Err(SimError::Parse(format!("invalid assignment: {}", token)));
    }
    Ok((name, value))
}

/// Parse the input section, checking that every primary input is assigned
/// exactly once and nothing else is assigned at all.
fn parse_assignments(circuit: &Circuit, section: &str) -> Result<Pattern> {
    let mut pattern = Pattern::default();
    let mut assigned = vec![false; circuit.net_count()];
    for token in section.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (name, value) = split_token(token)?;
        let net = circuit
            .net_id(name)
            .ok_or_else(|| SimError::UnknownNet(name.to_string()))?;
        if !circuit.is_primary_input(net) {
            return Err(SimError::Parse(format!(
                "pattern assigns non-input net {}",
                name
            )));
        }
        if assigned[net] {
            return Err(SimError::Parse(format!(
                "pattern assigns {} more than once",
                name
            )));
        }
        assigned[net] = true;
        pattern.assignments.push(PatternEntry {
            net,
            value: parse_bit(value)?,
        });
    }
    if pattern.assignments.is_empty() {
        return Err(SimError::Parse("pattern line missing assignments".into()));
    }
    for &pi in circuit.primary_inputs() {
        if !assigned[pi] {
            return Err(SimError::Parse(format!(
                "pattern missing assignment for primary input {}",
                circuit.net_name(pi)
            )));
        }
    }
    Ok(pattern)
}

fn parse_expected_outputs(circuit: &Circuit, section: &str, row: &mut PatternRow) -> Result<()> {
    for token in section.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (name, value) = split_token(token)?;
        let net = circuit
            .net_id(name)
            .ok_or_else(|| SimError::UnknownNet(name.to_string()))?;
        if circuit.net_type(net) != NetType::PrimaryOutput {
            return Err(SimError::Parse(format!(
                "expected-output section names non-output net {}",
                name
            )));
        }
        if row.provided_outputs.insert(net, parse_bit(value)?).is_some() {
            return Err(SimError::Parse(format!(
                "expected output {} given more than once",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist_parser;

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
    fn test_parse_rows_with_and_without_outputs() {
        let circuit = and2();
        let rows = parse_str(
            &circuit,
            "a = 1, b = 1 | y = 1\n\
             \n\
             # comment line\n\
             a=0 , b=1\n",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        let y = circuit.net_id("y").unwrap();
        assert_eq!(rows[0].provided_outputs.get(&y), Some(&true));
        assert!(rows[1].provided_outputs.is_empty());
        assert_eq!(rows[1].pattern.assignments.len(), 2);
    }

    #[test]
    fn test_non_binary_value_rejected() {
        let circuit = and2();
        let result = parse_str(&circuit, "a = 2, b = 1\n");
        assert!(matches!(result, Err(SimError::NonBinaryValue(v)) if v == "2"));
    }

    #[test]
    fn test_unknown_net_rejected() {
        let circuit = and2();
        let result = parse_str(&circuit, "a = 1, q = 1\n");
        assert!(matches!(result, Err(SimError::UnknownNet(name)) if name == "q"));
    }

    #[test]
    fn test_duplicate_assignment_rejected() {
        let circuit = and2();
        let result = parse_str(&circuit, "a = 1, a = 0, b = 1\n");
        assert!(matches!(result, Err(SimError::Parse(_))));
    }

    #[test]
    fn test_missing_input_rejected() {
        let circuit = and2();
        let result = parse_str(&circuit, "a = 1\n");
        assert!(matches!(result, Err(SimError::Parse(_))));
    }

    #[test]
    fn test_output_assignment_on_left_rejected() {
        let circuit = and2();
        let result = parse_str(&circuit, "a = 1, b = 1, y = 1\n");
        assert!(matches!(result, Err(SimError::Parse(_))));
    }
}
