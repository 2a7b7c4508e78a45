// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Thread-parallel fault sweep.
//!
//! Same per-fault word-parallel DFS as the demand-driven engine, with the
//! fault loop flattened across a rayon pool: every fault net is an
//! independent iteration ending in a disjoint result slot, so the inner
//! loop needs no locking. Pattern windows stay sequential. Results are
//! collected per window and committed to the answer table on the calling
//! thread, keeping the table free of concurrent writers.

use rayon::prelude::*;

use crate::answers::AnswerTable;
use crate::batch::{build_batches, PatternBatch};
use crate::circuit::Circuit;
use crate::error::{Result, SimError};
use crate::eval::SimWord;
use crate::levelize::Levelization;
use crate::pattern::PatternRow;

use super::word_dfs::fault_equality_word;

pub struct ThreadedEngine<'a> {
    circuit: &'a Circuit,
    levels: Levelization,
    batches: Vec<PatternBatch>,
    answers: AnswerTable,
    pool: rayon::ThreadPool,
}

impl<'a> ThreadedEngine<'a> {
    /// `num_threads == 0` leaves the pool size to rayon.
    pub fn new(
        circuit: &'a Circuit,
        rows: &[PatternRow],
        num_threads: usize,
    ) -> Result<ThreadedEngine<'a>> {
        let levels = Levelization::build(circuit)?;
        let batches = build_batches(circuit, &levels, rows)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| SimError::Transport(format!("unable to build thread pool: {}", e)))?;
        Ok(ThreadedEngine {
            circuit,
            levels,
            batches,
            answers: AnswerTable::new(rows.len(), circuit.net_count()),
            pool,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let circuit = self.circuit;
        let levels = &self.levels;
        let answers = &mut self.answers;
        let net_count = circuit.net_count();

        for batch in &self.batches {
            // (stuck0_eq, stuck1_eq) equality words per fault net
            let fault_words: Vec<(u64, u64)> = self.pool.install(|| {
                (0..net_count)
                    .into_par_iter()
                    .map_init(
                        || {
                            (
                                vec![0u64; net_count],
                                vec![false; net_count],
                                Vec::new(),
                            )
                        },
                        |(values, visited, stack), net| {
                            let eq0 = fault_equality_word(
                                circuit, levels, batch, net, false, values, visited, stack,
                            )?;
                            let eq1 = fault_equality_word(
                                circuit, levels, batch, net, true, values, visited, stack,
                            )?;
                            Ok((eq0, eq1))
                        },
                    )
                    .collect::<Result<Vec<_>>>()
            })?;

            for (net, &(eq0, eq1)) in fault_words.iter().enumerate() {
                for offset in 0..batch.chunk_size {
                    answers.set(batch.base + offset, net, true, eq0.lane(offset));
                    answers.set(batch.base + offset, net, false, eq1.lane(offset));
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
}
