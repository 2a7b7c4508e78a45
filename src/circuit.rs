// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Interned gate-level circuit model.
//!
//! Net names are strings only at the I/O boundary. During construction each
//! name is interned to a dense `NetId`; `finalize_nets` then re-maps all ids
//! so that NetId order equals lexicographic name order, which makes every
//! downstream table deterministic across runs.

use compact_str::CompactString;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{Result, SimError};

/// Dense net index in `[0, net_count)`.
pub type NetId = usize;

/// Role of a net. A wire that is re-declared as a primary output keeps the
/// output tag; a primary input never loses its input tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetType {
    PrimaryInput,
    PrimaryOutput,
    Wire,
}

/// The supported single-output gate primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateType {
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    Not,
    Buf,
}

/// Word-parallel evaluation shape of a gate: the reduction it performs,
/// with the inversion split off (NAND = And + invert, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    And,
    Or,
    Xor,
    Unary,
}

impl GateType {
    /// Case-insensitive lookup used by the netlist parser.
    pub fn parse(name: &str) -> Option<GateType> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(GateType::And),
            "or" => Some(GateType::Or),
            "nand" => Some(GateType::Nand),
            "nor" => Some(GateType::Nor),
            "xor" => Some(GateType::Xor),
            "xnor" => Some(GateType::Xnor),
            "not" => Some(GateType::Not),
            "buf" => Some(GateType::Buf),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GateType::And => "and",
            GateType::Or => "or",
            GateType::Nand => "nand",
            GateType::Nor => "nor",
            GateType::Xor => "xor",
            GateType::Xnor => "xnor",
            GateType::Not => "not",
            GateType::Buf => "buf",
        }
    }

    pub fn op_kind(self) -> OpKind {
        match self {
            GateType::And | GateType::Nand => OpKind::And,
            GateType::Or | GateType::Nor => OpKind::Or,
            GateType::Xor | GateType::Xnor => OpKind::Xor,
            GateType::Not | GateType::Buf => OpKind::Unary,
        }
    }

    pub fn inverts(self) -> bool {
        matches!(
            self,
            GateType::Nand | GateType::Nor | GateType::Xnor | GateType::Not
        )
    }

    fn is_unary(self) -> bool {
        matches!(self, GateType::Not | GateType::Buf)
    }
}

/// One gate instance. Drives exactly one net.
#[derive(Debug, Clone)]
pub struct Gate {
    pub gate_type: GateType,
    /// Instance name from the netlist, kept for diagnostics only.
    pub name: CompactString,
    pub output: NetId,
    pub inputs: SmallVec<[NetId; 4]>,
}

/// An interned combinational circuit.
#[derive(Debug, Default)]
pub struct Circuit {
    name: String,
    net_names: Vec<CompactString>,
    net_types: Vec<NetType>,
    net_lookup: IndexMap<CompactString, NetId>,
    primary_inputs: Vec<NetId>,
    primary_outputs: Vec<NetId>,
    gates: Vec<Gate>,
}

impl Circuit {
    pub fn new() -> Circuit {
        Circuit::default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Intern `name`, upgrading a wire to the given type if it already
    /// exists. Primary input/output tags are never downgraded.
    pub fn ensure_net(&mut self, name: &str, net_type: NetType) -> NetId {
        if let Some(&id) = self.net_lookup.get(name) {
            if self.net_types[id] == NetType::Wire && net_type != NetType::Wire {
                self.net_types[id] = net_type;
            }
            return id;
        }
        let id = self.net_names.len();
        self.net_names.push(CompactString::from(name));
        self.net_types.push(net_type);
        self.net_lookup.insert(CompactString::from(name), id);
        id
    }

    pub fn add_primary_input(&mut self, name: &str) {
        let id = self.ensure_net(name, NetType::PrimaryInput);
        if !self.primary_inputs.contains(&id) {
            self.primary_inputs.push(id);
        }
    }

    pub fn add_primary_output(&mut self, name: &str) {
        let id = self.ensure_net(name, NetType::PrimaryOutput);
        if !self.primary_outputs.contains(&id) {
            self.primary_outputs.push(id);
        }
    }

    pub fn add_wire(&mut self, name: &str) {
        self.ensure_net(name, NetType::Wire);
    }

    /// Append a gate, validating net ids and input arity.
    pub fn add_gate(&mut self, gate: Gate) -> Result<()> {
        let arity_ok = if gate.gate_type.is_unary() {
            gate.inputs.len() == 1
        } else {
            !gate.inputs.is_empty()
        };
        if !arity_ok {
            return Err(SimError::ArityMismatch {
                gate: gate.name.to_string(),
                inputs: gate.inputs.len(),
            });
        }
        if gate.output >= self.net_names.len() {
            return Err(SimError::Parse(format!(
                "gate {} drives an unregistered net",
                gate.name
            )));
        }
        for &input in &gate.inputs {
            if input >= self.net_names.len() {
                return Err(SimError::Parse(format!(
                    "gate {} reads an unregistered net",
                    gate.name
                )));
            }
        }
        self.gates.push(gate);
        Ok(())
    }

    /// Re-map all net ids so NetId order equals lexicographic name order.
    /// Must be called once, after the last net has been interned.
    pub fn finalize_nets(&mut self) {
        let count = self.net_names.len();
        let mut order: Vec<NetId> = (0..count).collect();
        order.sort_by(|&a, &b| self.net_names[a].cmp(&self.net_names[b]));

        let mut old_to_new = vec![0; count];
        for (new_id, &old_id) in order.iter().enumerate() {
            old_to_new[old_id] = new_id;
        }

        let mut new_names = Vec::with_capacity(count);
        let mut new_types = Vec::with_capacity(count);
        for &old_id in &order {
            new_names.push(self.net_names[old_id].clone());
            new_types.push(self.net_types[old_id]);
        }
        self.net_names = new_names;
        self.net_types = new_types;

        self.net_lookup.clear();
        for (id, name) in self.net_names.iter().enumerate() {
            self.net_lookup.insert(name.clone(), id);
        }

        for id in &mut self.primary_inputs {
            *id = old_to_new[*id];
        }
        for id in &mut self.primary_outputs {
            *id = old_to_new[*id];
        }
        for gate in &mut self.gates {
            gate.output = old_to_new[gate.output];
            for input in gate.inputs.iter_mut() {
                *input = old_to_new[*input];
            }
        }
    }

    pub fn net_count(&self) -> usize {
        self.net_names.len()
    }

    pub fn net_id(&self, name: &str) -> Option<NetId> {
        self.net_lookup.get(name).copied()
    }

    pub fn net_name(&self, id: NetId) -> &str {
        &self.net_names[id]
    }

    pub fn net_names(&self) -> impl Iterator<Item = &str> {
        self.net_names.iter().map(|n| n.as_str())
    }

    pub fn net_type(&self, id: NetId) -> NetType {
        self.net_types[id]
    }

    pub fn is_primary_input(&self, id: NetId) -> bool {
        self.net_types[id] == NetType::PrimaryInput
    }

    /// Primary inputs in declaration order.
    pub fn primary_inputs(&self) -> &[NetId] {
        &self.primary_inputs
    }

    /// Primary outputs in declaration order. This order defines the output
    /// columns everywhere downstream.
    pub fn primary_outputs(&self) -> &[NetId] {
        &self.primary_outputs
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }
}
