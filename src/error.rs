// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy shared by the parsers, engines and front-ends.

use crate::circuit::NetId;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SimError>;

/// Everything that can go wrong between reading a netlist and writing the
/// answer file. Each variant maps to one diagnostic category; all of them
/// surface to the front-end, which aborts without touching the output file.
#[derive(Debug)]
pub enum SimError {
    /// Malformed netlist or pattern file.
    Parse(String),
    /// Reference to a net outside the declared vocabulary.
    UnknownNet(String),
    /// Gate instantiation with an unrecognized gate type.
    UnknownGate(String),
    /// Pattern or expected-output value not in {0, 1}.
    NonBinaryValue(String),
    /// Pattern row provides some but not all primary outputs.
    MissingExpectedOutput { pattern: usize, output: String },
    /// Pattern row provides an output bit that disagrees with the
    /// fault-free simulation of the same pattern.
    ExpectedOutputMismatch { pattern: usize, output: String },
    /// NOT/BUF with other than one input, or any gate with no inputs.
    ArityMismatch { gate: String, inputs: usize },
    /// The levelizer made a full sweep without placing a gate.
    CombinationalLoop,
    /// An evaluator asked for a net that has no value yet. This indicates
    /// a bug in the engine, not a user error.
    UnresolvedNet(NetId),
    /// The writer asked for a pattern row before the engine filled it.
    UnfilledPattern(usize),
    /// Message-passing or GPU backend failure.
    Transport(String),
    /// File open / read / write failure.
    Io(String),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::Parse(msg) => write!(f, "parse error: {}", msg),
            SimError::UnknownNet(name) => write!(f, "unknown net: {}", name),
            SimError::UnknownGate(name) => write!(f, "unknown gate type: {}", name),
            SimError::NonBinaryValue(what) => {
                write!(f, "value must be 0 or 1: {}", what)
            }
            SimError::MissingExpectedOutput { pattern, output } => write!(
                f,
                "pattern {} provides expected outputs but omits {}",
                pattern, output
            ),
            SimError::ExpectedOutputMismatch { pattern, output } => write!(
                f,
                "pattern {} expects a value for {} that disagrees with the fault-free simulation",
                pattern, output
            ),
            SimError::ArityMismatch { gate, inputs } => {
                write!(f, "gate {} has unsupported input count {}", gate, inputs)
            }
            SimError::CombinationalLoop => write!(
                f,
                "unable to levelize circuit (combinational loop or missing dependency)"
            ),
            SimError::UnresolvedNet(net) => {
                write!(f, "net {} read before it was computed", net)
            }
            SimError::UnfilledPattern(pattern) => {
                write!(f, "answer table missing data for pattern {}", pattern)
            }
            SimError::Transport(msg) => write!(f, "transport failure: {}", msg),
            SimError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SimError {}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Io(err.to_string())
    }
}
