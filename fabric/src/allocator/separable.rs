// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::arbiter::{new_arbiter, Arbiter};
use super::{Allocator, ArbiterKind, Matching, Request};
use log::trace;

/// Two rounds of independent arbiters, one per input and one per output.
///
/// Input-first: every unmatched input nominates one output (by input
/// priority), then every output picks one nominating input (by output
/// priority). Output-first swaps the roles. Unmatched ports retry in the
/// following iterations.
pub struct SeparableAllocator {
    matching: Matching,
    input_arbiters: Vec<Box<dyn Arbiter>>,
    output_arbiters: Vec<Box<dyn Arbiter>>,
    iterations: usize,
    input_first: bool,
}

impl SeparableAllocator {
    pub fn new(
        arbiter: ArbiterKind,
        inputs: usize,
        outputs: usize,
        iterations: usize,
        input_first: bool,
    ) -> Self {
        Self {
            matching: Matching::new(inputs, outputs),
            input_arbiters: (0..inputs).map(|_| new_arbiter(arbiter, outputs)).collect(),
            output_arbiters: (0..outputs).map(|_| new_arbiter(arbiter, inputs)).collect(),
            iterations: iterations.max(1),
            input_first,
        }
    }

    fn input_first_round(&mut self) {
        let outputs = self.outputs();
        let mut nominations: Vec<Vec<(usize, i64)>> = vec![Vec::new(); outputs];
        for (input, requests) in self.matching.requests.iter().enumerate() {
            if self.matching.inmatch[input].is_some() {
                continue;
            }
            let candidates: Vec<(usize, i64)> = requests
                .iter()
                .filter(|(&output, _)| self.matching.outmatch[output].is_none())
                .map(|(&output, r)| (output, r.in_priority))
                .collect();
            if let Some(output) = self.input_arbiters[input].pick(&candidates) {
                nominations[output].push((input, requests[&output].out_priority));
            }
        }
        for (output, candidates) in nominations.iter().enumerate() {
            if let Some(input) = self.output_arbiters[output].pick(candidates) {
                trace!("input-first grant {} -> {}", input, output);
                self.matching.grant(input, output);
                self.output_arbiters[output].update(input);
                self.input_arbiters[input].update(output);
            }
        }
    }

    fn output_first_round(&mut self) {
        let inputs = self.inputs();
        let outputs = self.outputs();
        let mut offers: Vec<Vec<(usize, i64)>> = vec![Vec::new(); inputs];
        for output in 0..outputs {
            if self.matching.outmatch[output].is_some() {
                continue;
            }
            let candidates: Vec<(usize, i64)> = (0..inputs)
                .filter(|&input| self.matching.inmatch[input].is_none())
                .filter_map(|input| {
                    self.matching
                        .read_request(input, output)
                        .map(|r| (input, r.out_priority))
                })
                .collect();
            if let Some(input) = self.output_arbiters[output].pick(&candidates) {
                let r = self.matching.requests[input][&output];
                offers[input].push((output, r.in_priority));
            }
        }
        for (input, candidates) in offers.iter().enumerate() {
            if let Some(output) = self.input_arbiters[input].pick(candidates) {
                trace!("output-first grant {} -> {}", input, output);
                self.matching.grant(input, output);
                self.input_arbiters[input].update(output);
                self.output_arbiters[output].update(input);
            }
        }
    }
}

impl Allocator for SeparableAllocator {
    fn inputs(&self) -> usize {
        self.matching.inmatch.len()
    }

    fn outputs(&self) -> usize {
        self.matching.outmatch.len()
    }

    fn clear(&mut self) {
        self.matching.clear();
    }

    fn add_request(
        &mut self,
        input: usize,
        output: usize,
        label: usize,
        in_priority: i64,
        out_priority: i64,
    ) {
        self.matching.add_request(
            input,
            output,
            Request {
                label,
                in_priority,
                out_priority,
            },
        );
    }

    fn read_request(&self, input: usize, output: usize) -> Option<Request> {
        self.matching.read_request(input, output)
    }

    fn allocate(&mut self) {
        self.matching.clear_matches();
        for _ in 0..self.iterations {
            if self.input_first {
                self.input_first_round();
            } else {
                self.output_first_round();
            }
        }
    }

    fn output_assigned(&self, input: usize) -> Option<usize> {
        self.matching.inmatch[input]
    }

    fn input_assigned(&self, output: usize) -> Option<usize> {
        self.matching.outmatch[output]
    }
}
