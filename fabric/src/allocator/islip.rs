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

/// iSLIP: outputs grant, inputs accept, arbiter state moves only for matches
/// made in the first iteration.
pub struct IslipAllocator {
    matching: Matching,
    grant_arbiters: Vec<Box<dyn Arbiter>>,
    accept_arbiters: Vec<Box<dyn Arbiter>>,
    iterations: usize,
}

impl IslipAllocator {
    pub fn new(arbiter: ArbiterKind, inputs: usize, outputs: usize, iterations: usize) -> Self {
        Self {
            matching: Matching::new(inputs, outputs),
            grant_arbiters: (0..outputs).map(|_| new_arbiter(arbiter, inputs)).collect(),
            accept_arbiters: (0..inputs).map(|_| new_arbiter(arbiter, outputs)).collect(),
            iterations: iterations.max(1),
        }
    }
}

impl Allocator for IslipAllocator {
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
        let inputs = self.inputs();
        let outputs = self.outputs();
        for iteration in 0..self.iterations {
            // grant phase
            let mut grants: Vec<Vec<(usize, i64)>> = vec![Vec::new(); inputs];
            for output in 0..outputs {
                if self.matching.outmatch[output].is_some() {
                    continue;
                }
                let requesters: Vec<(usize, i64)> = (0..inputs)
                    .filter(|&input| self.matching.inmatch[input].is_none())
                    .filter_map(|input| {
                        self.matching
                            .read_request(input, output)
                            .map(|r| (input, r.out_priority))
                    })
                    .collect();
                if let Some(input) = self.grant_arbiters[output].pick(&requesters) {
                    let r = self.matching.requests[input][&output];
                    grants[input].push((output, r.in_priority));
                }
            }
            // accept phase
            for (input, offers) in grants.iter().enumerate() {
                if let Some(output) = self.accept_arbiters[input].pick(offers) {
                    trace!("islip iteration {} match {} -> {}", iteration, input, output);
                    self.matching.grant(input, output);
                    if iteration == 0 {
                        self.grant_arbiters[output].update(input);
                        self.accept_arbiters[input].update(output);
                    }
                }
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
