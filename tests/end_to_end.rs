// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! End-to-end flows through the file formats: netlist in, patterns in,
//! answers and digest out.

use std::fs;

use faultline::answer_io::{digest_hex, render_answers, write_answer_file, write_digest_file};
use faultline::engine::{self, EngineKind};
use faultline::error::SimError;
use faultline::levelize::Levelization;
use faultline::netlist_parser;
use faultline::pattern_parser;

const AND2: &str = "\
module and2 (a, b, y);
input a, b;
output y;
and g1 (y, a, b);
endmodule
";

#[test]
fn test_and2_answer_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let circuit_path = dir.path().join("and2.v");
    let pattern_path = dir.path().join("and2.in");
    let ans_path = dir.path().join("and2.ans");
    fs::write(&circuit_path, AND2).unwrap();
    fs::write(&pattern_path, "a = 1, b = 1 | y = 1\n").unwrap();

    let circuit = netlist_parser::parse_file(&circuit_path).unwrap();
    let rows = pattern_parser::parse_file(&circuit, &pattern_path).unwrap();
    let table = engine::run(EngineKind::Auto, &circuit, &rows, 0).unwrap();
    write_answer_file(&table, &circuit, &ans_path).unwrap();

    let contents = fs::read_to_string(&ans_path).unwrap();
    assert_eq!(
        contents,
        "# pattern_index net stuck_at_0_eq stuck_at_1_eq\n\
         0 a 0 1\n\
         0 b 0 1\n\
         0 y 0 1\n"
    );
}

#[test]
fn test_digest_matches_answer_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let ans_path = dir.path().join("t.ans");
    let sha_path = dir.path().join("t.ans.sha");

    let circuit = netlist_parser::parse_str(AND2).unwrap();
    let rows = pattern_parser::parse_str(&circuit, "a=0, b=1\na=1, b=1\n").unwrap();
    let table = engine::run(EngineKind::BitParallel, &circuit, &rows, 0).unwrap();
    write_answer_file(&table, &circuit, &ans_path).unwrap();
    write_digest_file(&ans_path, &sha_path).unwrap();

    let bytes = fs::read(&ans_path).unwrap();
    let digest_line = fs::read_to_string(&sha_path).unwrap();
    assert_eq!(digest_line, format!("{}\n", digest_hex(&bytes)));
    assert_eq!(digest_line.trim_end().len(), 64);
}

#[test]
fn test_two_runs_render_identically() {
    let circuit = netlist_parser::parse_str(
        "module mix (a, b, c, y, z);
         input a, b, c;
         output y, z;
         wire n1, n2;
         xor g1 (n1, a, b);
         nand g2 (n2, n1, c);
         or g3 (y, n2, a);
         xnor g4 (z, n1, n2);
         endmodule",
    )
    .unwrap();
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

    let first = engine::run(EngineKind::Threaded, &circuit, &rows, 4).unwrap();
    let second = engine::run(EngineKind::Levelized, &circuit, &rows, 2).unwrap();
    assert_eq!(
        render_answers(&first, &circuit).unwrap(),
        render_answers(&second, &circuit).unwrap()
    );
}

#[test]
fn test_combinational_loop_produces_no_answer_file() {
    let dir = tempfile::tempdir().unwrap();
    let ans_path = dir.path().join("loop.ans");

    let circuit = netlist_parser::parse_str(
        "module loopy (b, y);
         input b;
         output y;
         and g1 (a, y, b);
         or g2 (y, a, b);
         endmodule",
    )
    .unwrap();
    let rows = pattern_parser::parse_str(&circuit, "b=1\n").unwrap();
    let result = engine::run(EngineKind::Auto, &circuit, &rows, 0);
    assert!(matches!(result, Err(SimError::CombinationalLoop)));
    assert!(!ans_path.exists());
}

#[test]
fn test_forged_expected_output_rejected_before_write() {
    let dir = tempfile::tempdir().unwrap();
    let ans_path = dir.path().join("and2.ans");

    let circuit = netlist_parser::parse_str(AND2).unwrap();
    // circuit computes y=1 for a=b=1; the row claims y=0
    let rows = pattern_parser::parse_str(&circuit, "a=1, b=1 | y=0\n").unwrap();
    let result = engine::run(EngineKind::Auto, &circuit, &rows, 0);
    assert!(matches!(
        result,
        Err(SimError::ExpectedOutputMismatch { pattern: 0, .. })
    ));
    assert!(!ans_path.exists());
}

#[test]
fn test_levelization_idempotent_through_parser() {
    let circuit = netlist_parser::parse_str(AND2).unwrap();
    let first = Levelization::build(&circuit).unwrap();
    let second = Levelization::build(&circuit).unwrap();
    assert_eq!(first.net_levels, second.net_levels);
    assert_eq!(first.topo_order, second.topo_order);
}
