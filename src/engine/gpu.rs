// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Metal fault-sweep backend.
//!
//! Gates are packed in topological order into a flat device array of
//! `{op_kind, invert, input_offset, input_count, output}` records plus one
//! shared `gate_inputs` table. One GPU thread owns one (fault net, stuck
//! value) candidate: it sweeps the packed gates over the pattern window,
//! pins the fault word, and reduces primary-output equality against the
//! expected plane in-kernel. The shader is generated at runtime for the
//! concrete net count and compiled with the session's Metal device; there
//! are lane-width specializations for 64- and 32-pattern windows and a
//! branchy per-gate-type variant kept for correctness debugging.

use metal::{
    Buffer, CommandQueue, CompileOptions, ComputePipelineState, Device, MTLResourceOptions,
    MTLSize,
};

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::{Circuit, OpKind};
use crate::error::{Result, SimError};
use crate::eval::SimWord;
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

/// Device-side gate record; layout must match the shader's `Gate` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct GpuGate {
    op_kind: u32,
    invert: u32,
    input_offset: u32,
    input_count: u32,
    output: u32,
    _pad: [u32; 3],
}

pub struct GpuEngine<'a> {
    circuit: &'a Circuit,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
    device: Device,
    command_queue: CommandQueue,
    pipeline_w64: ComputePipelineState,
    pipeline_w32: ComputePipelineState,
    pipeline_debug: ComputePipelineState,
    gate_buffer: Buffer,
    gate_input_buffer: Buffer,
    output_id_buffer: Buffer,
    gate_count: u32,
    /// Evaluate through the branchy per-gate-type kernel instead of the
    /// specialized ones.
    pub use_debug_kernel: bool,
}

impl<'a> GpuEngine<'a> {
    pub fn new(circuit: &'a Circuit, rows: &[PatternRow]) -> Result<GpuEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;

        let device = Device::system_default()
            .ok_or_else(|| SimError::Transport("no Metal device found".into()))?;
        let command_queue = device.new_command_queue();

        // Pack gates in topological order so a flat loop in the kernel
        // respects dependencies.
        let gates = circuit.gates();
        let mut packed = Vec::with_capacity(gates.len());
        let mut gate_inputs: Vec<u32> = Vec::new();
        for &gate_idx in &levels.topo_order {
            let gate = &gates[gate_idx];
            let op_kind = match gate.gate_type.op_kind() {
                OpKind::And => 0,
                OpKind::Or => 1,
                OpKind::Xor => 2,
                OpKind::Unary => 3,
            };
            packed.push(GpuGate {
                op_kind,
                invert: gate.gate_type.inverts() as u32,
                input_offset: gate_inputs.len() as u32,
                input_count: gate.inputs.len() as u32,
                output: gate.output as u32,
                _pad: [0; 3],
            });
            gate_inputs.extend(gate.inputs.iter().map(|&n| n as u32));
        }

        let source = shader_source(circuit.net_count());
        let library = device
            .new_library_with_source(&source, &CompileOptions::new())
            .map_err(|e| SimError::Transport(format!("shader compilation failed: {}", e)))?;
        let pipeline = |name: &str| -> Result<ComputePipelineState> {
            let function = library
                .get_function(name, None)
                .map_err(|e| SimError::Transport(format!("missing kernel {}: {}", name, e)))?;
            device
                .new_compute_pipeline_state_with_function(&function)
                .map_err(|e| SimError::Transport(format!("pipeline {} failed: {}", name, e)))
        };
        let pipeline_w64 = pipeline("fault_sweep_w64")?;
        let pipeline_w32 = pipeline("fault_sweep_w32")?;
        let pipeline_debug = pipeline("fault_sweep_debug")?;

        let gate_buffer = buffer_from_slice(&device, &packed);
        let gate_input_buffer = buffer_from_slice(&device, &gate_inputs);
        let output_ids: Vec<u32> = circuit.primary_outputs().iter().map(|&n| n as u32).collect();
        let output_id_buffer = buffer_from_slice(&device, &output_ids);

        Ok(GpuEngine {
            circuit,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
            device,
            command_queue,
            pipeline_w64,
            pipeline_w32,
            pipeline_debug,
            gate_buffer,
            gate_input_buffer,
            output_id_buffer,
            gate_count: packed.len() as u32,
            use_debug_kernel: false,
        })
    }

    pub fn device_name(&self) -> String {
        self.device.name().to_string()
    }

    pub fn start(&mut self) -> Result<()> {
        let net_count = self.circuit.net_count();
        let num_faults = (net_count * 2) as u64;

        for batch_idx in 0..self.batches.len() {
            let eq_words = self.sweep_window(batch_idx, num_faults)?;
            let base = self.batches[batch_idx].base;
            let chunk_size = self.batches[batch_idx].chunk_size;
            for net in 0..net_count {
                for (slot, stuck_at_0) in [(2 * net, true), (2 * net + 1, false)] {
                    let eq = eq_words[slot];
                    for offset in 0..chunk_size {
                        self.answers
                            .set(base + offset, net, stuck_at_0, eq.lane(offset));
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

    /// Dispatch one pattern window; returns one equality word per
    /// (fault net, stuck value) candidate in fault index order.
    fn sweep_window(&self, batch_idx: usize, num_faults: u64) -> Result<Vec<u64>> {
        let batch = &self.batches[batch_idx];
        let narrow = batch.chunk_size <= 32 && !self.use_debug_kernel;

        let (base_buffer, expected_buffer) = if narrow {
            let base: Vec<u32> = batch.base_values.iter().map(|&v| v as u32).collect();
            let expected: Vec<u32> = batch.expected.iter().map(|&v| v as u32).collect();
            (
                buffer_from_slice(&self.device, &base),
                buffer_from_slice(&self.device, &expected),
            )
        } else {
            (
                buffer_from_slice(&self.device, &batch.base_values),
                buffer_from_slice(&self.device, &batch.expected),
            )
        };

        let result_stride = if narrow { 4 } else { 8 };
        let result_buffer = self.device.new_buffer(
            (num_faults as usize * result_stride).max(16) as u64,
            MTLResourceOptions::StorageModeShared,
        );

        let pipeline = if self.use_debug_kernel {
            &self.pipeline_debug
        } else if narrow {
            &self.pipeline_w32
        } else {
            &self.pipeline_w64
        };

        let command_buffer = self.command_queue.new_command_buffer();
        let encoder = command_buffer.new_compute_command_encoder();
        encoder.set_compute_pipeline_state(pipeline);
        encoder.set_buffer(0, Some(&self.gate_buffer), 0);
        encoder.set_buffer(1, Some(&self.gate_input_buffer), 0);
        encoder.set_buffer(2, Some(&base_buffer), 0);
        encoder.set_buffer(3, Some(&self.output_id_buffer), 0);
        encoder.set_buffer(4, Some(&expected_buffer), 0);
        encoder.set_buffer(5, Some(&result_buffer), 0);
        set_u32(encoder, 6, self.gate_count);
        set_u32(encoder, 7, self.circuit.primary_outputs().len() as u32);
        let mask = batch.mask;
        encoder.set_bytes(
            8,
            std::mem::size_of::<u64>() as u64,
            &mask as *const u64 as _,
        );
        set_u32(encoder, 9, num_faults as u32);

        let threadgroup = MTLSize::new(64, 1, 1);
        let grid = MTLSize::new(num_faults, 1, 1);
        encoder.dispatch_threads(grid, threadgroup);
        encoder.end_encoding();
        command_buffer.commit();
        command_buffer.wait_until_completed();

        let eq_words = if narrow {
            let raw: &[u32] = unsafe {
                std::slice::from_raw_parts(
                    result_buffer.contents() as *const u32,
                    num_faults as usize,
                )
            };
            raw.iter().map(|&v| v as u64).collect()
        } else {
            let raw: &[u64] = unsafe {
                std::slice::from_raw_parts(
                    result_buffer.contents() as *const u64,
                    num_faults as usize,
                )
            };
            raw.to_vec()
        };
        Ok(eq_words)
    }
}

fn buffer_from_slice<T: Copy>(device: &Device, data: &[T]) -> Buffer {
    let size = (std::mem::size_of_val(data)).max(16);
    let buffer = device.new_buffer(size as u64, MTLResourceOptions::StorageModeShared);
    if !data.is_empty() {
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.contents() as *mut T, data.len());
        }
    }
    buffer
}

fn set_u32(encoder: &metal::ComputeCommandEncoderRef, index: u64, value: u32) {
    encoder.set_bytes(
        index,
        std::mem::size_of::<u32>() as u64,
        &value as *const u32 as _,
    );
}

/// Generate the compute shader for a concrete net count.
fn shader_source(net_count: usize) -> String {
    let nets = net_count.max(1);
    let mut source = String::from(
        r#"
#include <metal_stdlib>
using namespace metal;

struct Gate {
    uint op_kind;
    uint invert;
    uint input_offset;
    uint input_count;
    uint output;
    uint pad0;
    uint pad1;
    uint pad2;
};
"#,
    );

    // One kernel body per lane width; `word` is the packed lane type.
    for (name, word) in [("fault_sweep_w64", "ulong"), ("fault_sweep_w32", "uint")] {
        source.push_str(&format!(
            r#"
kernel void {name}(
    device const Gate* gates [[buffer(0)]],
    device const uint* gate_inputs [[buffer(1)]],
    device const {word}* base_values [[buffer(2)]],
    device const uint* output_ids [[buffer(3)]],
    device const {word}* expected [[buffer(4)]],
    device {word}* results [[buffer(5)]],
    constant uint& num_gates [[buffer(6)]],
    constant uint& num_outputs [[buffer(7)]],
    constant ulong& mask_bits [[buffer(8)]],
    constant uint& num_faults [[buffer(9)]],
    uint tid [[thread_position_in_grid]])
{{
    if (tid >= num_faults) {{
        return;
    }}
    const {word} mask = ({word})mask_bits;
    const uint fault_net = tid / 2;
    const bool stuck_one = (tid & 1) != 0;

    {word} values[{nets}];
    for (uint i = 0; i < {nets}; i++) {{
        values[i] = base_values[i];
    }}
    values[fault_net] = stuck_one ? mask : ({word})0;

    for (uint g = 0; g < num_gates; g++) {{
        Gate gate = gates[g];
        if (gate.output == fault_net) {{
            continue;
        }}
        {word} acc;
        if (gate.op_kind == 0) {{
            acc = mask;
            for (uint i = 0; i < gate.input_count; i++) {{
                acc &= values[gate_inputs[gate.input_offset + i]];
            }}
        }} else if (gate.op_kind == 1) {{
            acc = 0;
            for (uint i = 0; i < gate.input_count; i++) {{
                acc |= values[gate_inputs[gate.input_offset + i]];
            }}
        }} else if (gate.op_kind == 2) {{
            acc = 0;
            for (uint i = 0; i < gate.input_count; i++) {{
                acc ^= values[gate_inputs[gate.input_offset + i]];
            }}
        }} else {{
            acc = values[gate_inputs[gate.input_offset]];
        }}
        if (gate.invert != 0) {{
            acc = ~acc;
        }}
        values[gate.output] = acc & mask;
    }}

    {word} eq = mask;
    for (uint o = 0; o < num_outputs; o++) {{
        eq &= ~(values[output_ids[o]] ^ expected[o]) & mask;
    }}
    results[tid] = eq;
}}
"#,
            name = name,
            word = word,
            nets = nets,
        ));
    }

    // Branchy variant: one switch case per concrete gate shape, useful
    // when bisecting a miscompare back to a gate type.
    source.push_str(&format!(
        r#"
static ulong eval_gate_debug(uint op_kind, uint invert,
                             device const uint* gate_inputs,
                             uint offset, uint count,
                             thread const ulong* values, ulong mask)
{{
    ulong acc = 0;
    switch (op_kind * 2 + invert) {{
        case 0: // and
            acc = mask;
            for (uint i = 0; i < count; i++) acc &= values[gate_inputs[offset + i]];
            return acc & mask;
        case 1: // nand
            acc = mask;
            for (uint i = 0; i < count; i++) acc &= values[gate_inputs[offset + i]];
            return ~acc & mask;
        case 2: // or
            for (uint i = 0; i < count; i++) acc |= values[gate_inputs[offset + i]];
            return acc & mask;
        case 3: // nor
            for (uint i = 0; i < count; i++) acc |= values[gate_inputs[offset + i]];
            return ~acc & mask;
        case 4: // xor
            for (uint i = 0; i < count; i++) acc ^= values[gate_inputs[offset + i]];
            return acc & mask;
        case 5: // xnor
            for (uint i = 0; i < count; i++) acc ^= values[gate_inputs[offset + i]];
            return ~acc & mask;
        case 6: // buf
            return values[gate_inputs[offset]] & mask;
        default: // not
            return ~values[gate_inputs[offset]] & mask;
    }}
}}

kernel void fault_sweep_debug(
    device const Gate* gates [[buffer(0)]],
    device const uint* gate_inputs [[buffer(1)]],
    device const ulong* base_values [[buffer(2)]],
    device const uint* output_ids [[buffer(3)]],
    device const ulong* expected [[buffer(4)]],
    device ulong* results [[buffer(5)]],
    constant uint& num_gates [[buffer(6)]],
    constant uint& num_outputs [[buffer(7)]],
    constant ulong& mask_bits [[buffer(8)]],
    constant uint& num_faults [[buffer(9)]],
    uint tid [[thread_position_in_grid]])
{{
    if (tid >= num_faults) {{
        return;
    }}
    const ulong mask = mask_bits;
    const uint fault_net = tid / 2;
    const bool stuck_one = (tid & 1) != 0;

    ulong values[{nets}];
    for (uint i = 0; i < {nets}; i++) {{
        values[i] = base_values[i];
    }}
    values[fault_net] = stuck_one ? mask : 0ul;

    for (uint g = 0; g < num_gates; g++) {{
        Gate gate = gates[g];
        if (gate.output == fault_net) {{
            continue;
        }}
        values[gate.output] = eval_gate_debug(
            gate.op_kind, gate.invert, gate_inputs,
            gate.input_offset, gate.input_count, values, mask);
    }}

    ulong eq = mask;
    for (uint o = 0; o < num_outputs; o++) {{
        eq &= ~(values[output_ids[o]] ^ expected[o]) & mask;
    }}
    results[tid] = eq;
}}
"#,
        nets = nets,
    ));

    source
}
