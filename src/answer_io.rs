// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Answer file emission and SHA-256 digest.

use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::answers::AnswerTable;
use crate::circuit::Circuit;
use crate::error::{Result, SimError};

/// Render the answer table in its on-disk form: a header comment, then one
/// `pattern net stuck0_eq stuck1_eq` line per (pattern, net) with nets in
/// finalized id order (= lexicographic name order).
pub fn render_answers(table: &AnswerTable, circuit: &Circuit) -> Result<String> {
    let mut out = String::new();
    out.push_str("# pattern_index net stuck_at_0_eq stuck_at_1_eq\n");
    for pattern in 0..table.pattern_count() {
        let row = table.row(pattern)?;
        for (net, eval) in row.iter().enumerate() {
            out.push_str(&format!(
                "{} {} {} {}\n",
                pattern,
                circuit.net_name(net),
                eval.stuck0_eq as u8,
                eval.stuck1_eq as u8
            ));
        }
    }
    Ok(out)
}

/// Write the answer file.
pub fn write_answer_file(
    table: &AnswerTable,
    circuit: &Circuit,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let rendered = render_answers(table, circuit)?;
    let mut file = std::fs::File::create(path)
        .map_err(|e| SimError::Io(format!("unable to open output file {}: {}", path.display(), e)))?;
    file.write_all(rendered.as_bytes())
        .map_err(|e| SimError::Io(format!("unable to write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Lowercase hex SHA-256 of a byte string.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write `<digest>\n` for the contents of `answer_path` into `digest_path`.
pub fn write_digest_file(
    answer_path: impl AsRef<Path>,
    digest_path: impl AsRef<Path>,
) -> Result<()> {
    let answer_path = answer_path.as_ref();
    let digest_path = digest_path.as_ref();
    let bytes = std::fs::read(answer_path)
        .map_err(|e| SimError::Io(format!("unable to read {}: {}", answer_path.display(), e)))?;
    let line = format!("{}\n", digest_hex(&bytes));
    std::fs::write(digest_path, line)
        .map_err(|e| SimError::Io(format!("unable to write {}: {}", digest_path.display(), e)))?;
    Ok(())
}
