// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Parser for the structural gate-level netlist subset.
//!
//! The accepted language is a small slice of Verilog: a `module` header,
//! `input`/`output`/`wire` declaration lists, gate instantiations of the
//! form `TYPE NAME (out, in, ...);` with a case-insensitive type, and
//! `endmodule`. Statements end at `;` and may span lines; `//` comments
//! run to end of line.

use std::path::Path;

use smallvec::SmallVec;

use crate::circuit::{Circuit, Gate, GateType, NetType};
use crate::error::{Result, SimError};

/// Parse a netlist file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Circuit> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| SimError::Io(format!("unable to open circuit file {}: {}", path.display(), e)))?;
    parse_str(&text)
}

/// Parse a netlist from a string.
pub fn parse_str(text: &str) -> Result<Circuit> {
    let mut buffer = String::new();
    for line in text.lines() {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        buffer.push_str(line);
        buffer.push(' ');
    }

    let mut circuit = Circuit::new();
    let mut saw_module = false;
    for statement in buffer.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        if statement.to_ascii_lowercase().starts_with("endmodule") {
            break;
        }
        parse_statement(statement, &mut circuit, &mut saw_module)?;
    }

    if !saw_module {
        return Err(SimError::Parse("netlist missing module declaration".into()));
    }
    circuit.finalize_nets();
    Ok(circuit)
}

fn parse_statement(statement: &str, circuit: &mut Circuit, saw_module: &mut bool) -> Result<()> {
    let (keyword, rest) = match statement.find(char::is_whitespace) {
        Some(pos) => (&statement[..pos], statement[pos..].trim_start()),
        None => (statement, ""),
    };

    match keyword.to_ascii_lowercase().as_str() {
        "module" => {
            let name = match rest.find('(') {
                Some(pos) => rest[..pos].trim(),
                None => {
                    return Err(SimError::Parse(format!(
                        "malformed module declaration: {}",
                        statement
                    )))
                }
            };
            if name.is_empty() {
                return Err(SimError::Parse(format!(
                    "malformed module declaration: {}",
                    statement
                )));
            }
            circuit.set_name(name);
            *saw_module = true;
            Ok(())
        }
        "input" => declare_nets(rest, circuit, NetType::PrimaryInput, statement),
        "output" => declare_nets(rest, circuit, NetType::PrimaryOutput, statement),
        "wire" => declare_nets(rest, circuit, NetType::Wire, statement),
        _ => parse_gate(statement, circuit),
    }
}

fn declare_nets(
    list: &str,
    circuit: &mut Circuit,
    net_type: NetType,
    statement: &str,
) -> Result<()> {
    let mut any = false;
    for name in list.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if !is_valid_net_name(name) {
            return Err(SimError::Parse(format!("invalid net name: {}", name)));
        }
        match net_type {
            NetType::PrimaryInput => circuit.add_primary_input(name),
            NetType::PrimaryOutput => circuit.add_primary_output(name),
            NetType::Wire => circuit.add_wire(name),
        }
        any = true;
    }
    if !any {
        return Err(SimError::Parse(format!("empty declaration: {}", statement)));
    }
    Ok(())
}

fn parse_gate(statement: &str, circuit: &mut Circuit) -> Result<()> {
    let open = statement.find('(');
    let close = statement.rfind(')');
    let (open, close) = match (open, close) {
        (Some(open), Some(close)) if close > open => (open, close),
        _ => {
            return Err(SimError::Parse(format!(
                "malformed gate connection block: {}",
                statement
            )))
        }
    };

    let mut header = statement[..open].split_whitespace();
    let type_str = header.next().ok_or_else(|| {
        SimError::Parse(format!("unable to parse gate line: {}", statement))
    })?;
    let instance = header.next().ok_or_else(|| {
        SimError::Parse(format!("unable to parse gate line: {}", statement))
    })?;
    if header.next().is_some() {
        return Err(SimError::Parse(format!(
            "unable to parse gate line: {}",
            statement
        )));
    }

    let gate_type =
        GateType::parse(type_str).ok_or_else(|| SimError::UnknownGate(type_str.to_string()))?;

    let mut nets: Vec<&str> = Vec::new();
    for name in statement[open + 1..close].split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if !is_valid_net_name(name) {
            return Err(SimError::Parse(format!("invalid net name: {}", name)));
        }
        nets.push(name);
    }
    if nets.len() < 2 {
        return Err(SimError::Parse(format!(
            "gate must have an output and at least one input: {}",
            statement
        )));
    }

    let output = circuit.ensure_net(nets[0], NetType::Wire);
    let inputs: SmallVec<[_; 4]> = nets[1..]
        .iter()
        .map(|name| circuit.ensure_net(name, NetType::Wire))
        .collect();
    circuit.add_gate(Gate {
        gate_type,
        name: instance.into(),
        output,
        inputs,
    })
}

fn is_valid_net_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '[' || c == ']' || c == '$')
}
