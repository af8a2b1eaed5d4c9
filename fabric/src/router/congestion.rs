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

//! Per-router congestion counters.
//!
//! Routers update their own counters while they run; neighbours only ever
//! read the [`CongestionSnapshot`] committed at the end of the previous cycle.

use crate::config::CongestionConfiguration;

/// Counter values as observed by the neighbours during one cycle.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CongestionSnapshot {
    /// Flits forwarded since the start of the simulation.
    pub flits_routed: usize,
    /// Flits forwarded per output port.
    pub flits_per_port: Vec<usize>,
    /// Decayed forwarded count per output port.
    pub weighted_flits: Vec<u32>,
    /// Accumulated stall time per output port.
    pub time_out: Vec<u32>,
    /// Lagging fluidity bit per input port and VC.
    pub fluidity: Vec<Vec<bool>>,
    /// Available downstream VCs per output port.
    pub free_vcs: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct CongestionCounters {
    config: CongestionConfiguration,
    flits_routed: usize,
    flits_per_port: Vec<usize>,
    weighted_flits: Vec<u32>,
    time_out_this_cycle: Vec<u32>,
    time_out_prev_cycle: Vec<u32>,
    time_out: Vec<u32>,
    fluidity: Vec<Vec<bool>>,
    new_fluidity: Vec<Vec<bool>>,
    update_fluidity: Vec<Vec<bool>>,
    free_vcs: Vec<usize>,
}

impl CongestionCounters {
    pub fn new(
        config: &CongestionConfiguration,
        inputs: usize,
        outputs: usize,
        num_vcs: usize,
    ) -> Self {
        let all_fluid = vec![vec![true; num_vcs]; inputs];
        Self {
            config: config.clone(),
            flits_routed: 0,
            flits_per_port: vec![0; outputs],
            weighted_flits: vec![0; outputs],
            time_out_this_cycle: vec![0; outputs],
            time_out_prev_cycle: vec![0; outputs],
            time_out: vec![0; outputs],
            fluidity: all_fluid.clone(),
            new_fluidity: all_fluid.clone(),
            update_fluidity: all_fluid,
            free_vcs: vec![num_vcs; outputs],
        }
    }

    /// A flit left through `output`.
    pub fn record_departure(&mut self, output: usize) {
        self.flits_routed += 1;
        self.flits_per_port[output] += 1;
        let w = &mut self.weighted_flits[output];
        *w = (*w + 1).min(self.config.weighted_ceiling);
    }

    /// `output` had a waiting packet but forwarded nothing this cycle.
    pub fn record_stall(&mut self, output: usize) {
        self.time_out_this_cycle[output] += 1;
    }

    /// Whether `vc` of `input` drained or moved a flit this cycle.
    pub fn set_fluid(&mut self, input: usize, vc: usize, fluid: bool) {
        self.update_fluidity[input][vc] = fluid;
    }

    pub fn set_free_vcs(&mut self, output: usize, free: usize) {
        self.free_vcs[output] = free;
    }

    /// Commit the cycle: accumulate stall time and shift the fluidity stages.
    pub fn end_cycle(&mut self) {
        for p in 0..self.time_out.len() {
            let delta = (self.time_out_this_cycle[p] - self.time_out_prev_cycle[p])
                .min(self.config.time_out_delta_cap);
            self.time_out[p] = (self.time_out[p] + delta).min(self.config.time_out_ceiling);
            self.time_out_prev_cycle[p] = self.time_out_this_cycle[p];
        }
        std::mem::swap(&mut self.fluidity, &mut self.new_fluidity);
        for (dst, src) in self.new_fluidity.iter_mut().zip(self.update_fluidity.iter()) {
            dst.copy_from_slice(src);
        }
    }

    /// Periodic decay of the weighted and stall counters.
    pub fn refresh(&mut self) {
        for w in self.weighted_flits.iter_mut() {
            *w = (*w / self.config.weighted_decay).min(self.config.weighted_ceiling);
        }
        for p in 0..self.time_out.len() {
            self.time_out[p] /= self.config.time_out_decay;
            self.time_out_this_cycle[p] = 0;
            self.time_out_prev_cycle[p] = 0;
        }
    }

    pub fn snapshot(&self) -> CongestionSnapshot {
        CongestionSnapshot {
            flits_routed: self.flits_routed,
            flits_per_port: self.flits_per_port.clone(),
            weighted_flits: self.weighted_flits.clone(),
            time_out: self.time_out.clone(),
            fluidity: self.fluidity.clone(),
            free_vcs: self.free_vcs.clone(),
        }
    }

    pub fn weighted_flits(&self, output: usize) -> u32 {
        self.weighted_flits[output]
    }

    pub fn time_out(&self, output: usize) -> u32 {
        self.time_out[output]
    }
}
