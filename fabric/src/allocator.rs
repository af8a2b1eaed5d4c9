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

//! Bipartite matching of requesters (router inputs or input VCs) to resources
//! (router outputs or output VCs).
//!
//! An allocator collects requests with [`Allocator::add_request`], computes a
//! matching with [`Allocator::allocate`] and is queried afterwards. Every input
//! is matched to at most one output and vice versa.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

mod arbiter;
mod islip;
mod separable;

pub use arbiter::{new_arbiter, Arbiter};
use islip::IslipAllocator;
use separable::SeparableAllocator;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    SeparableInputFirst,
    SeparableOutputFirst,
    Islip,
}

impl FromStr for AllocatorKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "separable_input_first" => Ok(Self::SeparableInputFirst),
            "separable_output_first" => Ok(Self::SeparableOutputFirst),
            "islip" => Ok(Self::Islip),
            _ => Err(Error::UnknownAllocator(name.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterKind {
    RoundRobin,
    Matrix,
}

impl FromStr for ArbiterKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "round_robin" => Ok(Self::RoundRobin),
            "matrix" => Ok(Self::Matrix),
            _ => Err(Error::UnknownArbiter(name.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request {
    pub label: usize,
    pub in_priority: i64,
    pub out_priority: i64,
}

pub trait Allocator {
    fn inputs(&self) -> usize;
    fn outputs(&self) -> usize;
    /// Forget all requests and the last matching.
    fn clear(&mut self);
    /// Request `output` for `input`. A second request for the same pair
    /// replaces the first only if its input priority is higher.
    fn add_request(
        &mut self,
        input: usize,
        output: usize,
        label: usize,
        in_priority: i64,
        out_priority: i64,
    );
    fn read_request(&self, input: usize, output: usize) -> Option<Request>;
    fn allocate(&mut self);
    fn output_assigned(&self, input: usize) -> Option<usize>;
    fn input_assigned(&self, output: usize) -> Option<usize>;
}

pub fn new_allocator(
    kind: AllocatorKind,
    arbiter: ArbiterKind,
    inputs: usize,
    outputs: usize,
    iterations: usize,
) -> Box<dyn Allocator> {
    match kind {
        AllocatorKind::SeparableInputFirst => Box::new(SeparableAllocator::new(
            arbiter, inputs, outputs, iterations, true,
        )),
        AllocatorKind::SeparableOutputFirst => Box::new(SeparableAllocator::new(
            arbiter, inputs, outputs, iterations, false,
        )),
        AllocatorKind::Islip => Box::new(IslipAllocator::new(arbiter, inputs, outputs, iterations)),
    }
}

/// Requests and the matching built from them, shared by all allocators.
#[derive(Clone, Debug)]
struct Matching {
    /// Per input, requests keyed by output.
    requests: Vec<BTreeMap<usize, Request>>,
    inmatch: Vec<Option<usize>>,
    outmatch: Vec<Option<usize>>,
}

impl Matching {
    fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            requests: vec![BTreeMap::new(); inputs],
            inmatch: vec![None; inputs],
            outmatch: vec![None; outputs],
        }
    }

    fn clear(&mut self) {
        for r in self.requests.iter_mut() {
            r.clear();
        }
        self.clear_matches();
    }

    fn clear_matches(&mut self) {
        self.inmatch.iter_mut().for_each(|m| *m = None);
        self.outmatch.iter_mut().for_each(|m| *m = None);
    }

    fn add_request(&mut self, input: usize, output: usize, request: Request) {
        assert!(
            input < self.inmatch.len() && output < self.outmatch.len(),
            "Request ({}, {}) out of range",
            input,
            output
        );
        let slot = self.requests[input].entry(output).or_insert(request);
        if request.in_priority > slot.in_priority {
            *slot = request;
        }
    }

    fn read_request(&self, input: usize, output: usize) -> Option<Request> {
        self.requests
            .get(input)
            .and_then(|r| r.get(&output))
            .copied()
    }

    fn is_matched(&self, input: usize, output: usize) -> bool {
        self.inmatch[input].is_some() || self.outmatch[output].is_some()
    }

    fn grant(&mut self, input: usize, output: usize) {
        assert!(
            !self.is_matched(input, output),
            "Granting ({}, {}) twice",
            input,
            output
        );
        self.inmatch[input] = Some(output);
        self.outmatch[output] = Some(input);
    }
}
