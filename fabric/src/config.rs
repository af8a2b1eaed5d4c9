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

use crate::allocator::{AllocatorKind, ArbiterKind};
use crate::router::{PriorityPolicy, RouterKind};
use crate::routing::RoutingKind;
use crate::topology::TopologyKind;
use crate::Error;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Which speculative switch grants are dropped in favour of non-speculative
/// traffic.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecFilter {
    /// Reject if any input made a non-speculative request.
    AnyNonspecGnts,
    /// Reject if another input requested the same output non-speculatively.
    ConflNonspecReqs,
    /// Reject if the output was granted non-speculatively.
    ConflNonspecGnts,
}

impl FromStr for SpecFilter {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "any_nonspec_gnts" => Ok(Self::AnyNonspecGnts),
            "confl_nonspec_reqs" => Ok(Self::ConflNonspecReqs),
            "confl_nonspec_gnts" => Ok(Self::ConflNonspecGnts),
            _ => Err(Error::UnknownSpecFilter(name.to_string())),
        }
    }
}

/// Parameters of a single router; all routers of a network share them.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfiguration {
    pub router: RouterKind,
    pub num_vcs: usize,
    pub vc_buf_size: usize,
    /// Keep an output VC reserved until the credit for its tail returns.
    pub wait_for_tail_credit: bool,
    pub vc_allocator: AllocatorKind,
    pub vc_alloc_arb_type: ArbiterKind,
    /// 0 selects `alloc_iters`.
    pub vc_alloc_iters: usize,
    pub sw_allocator: AllocatorKind,
    pub sw_alloc_arb_type: ArbiterKind,
    /// 0 selects `alloc_iters`.
    pub sw_alloc_iters: usize,
    pub alloc_iters: usize,
    /// 0: off, 1: shared allocator, 2: separate allocator, 3: separate
    /// allocator, only when an output VC is available.
    pub speculative: u8,
    pub filter_spec_grants: SpecFilter,
    pub routing_delay: usize,
    pub vc_alloc_delay: usize,
    pub sw_alloc_delay: usize,
    pub st_prepare_delay: usize,
    pub st_final_delay: usize,
    pub credit_delay: usize,
    pub input_speedup: usize,
    pub output_speedup: usize,
    pub hold_switch_for_packet: bool,
    pub priority: PriorityPolicy,
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            router: RouterKind::Iq,
            num_vcs: 4,
            vc_buf_size: 8,
            wait_for_tail_credit: true,
            vc_allocator: AllocatorKind::SeparableInputFirst,
            vc_alloc_arb_type: ArbiterKind::RoundRobin,
            vc_alloc_iters: 0,
            sw_allocator: AllocatorKind::SeparableInputFirst,
            sw_alloc_arb_type: ArbiterKind::RoundRobin,
            sw_alloc_iters: 0,
            alloc_iters: 1,
            speculative: 0,
            filter_spec_grants: SpecFilter::ConflNonspecGnts,
            routing_delay: 1,
            vc_alloc_delay: 1,
            sw_alloc_delay: 1,
            st_prepare_delay: 0,
            st_final_delay: 1,
            credit_delay: 1,
            input_speedup: 1,
            output_speedup: 1,
            hold_switch_for_packet: false,
            priority: PriorityPolicy::Base,
        }
    }
}

impl RouterConfiguration {
    pub fn validate(&self) -> Result<(), Error> {
        if self.num_vcs == 0 || self.vc_buf_size == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "num_vcs ({}) and vc_buf_size ({}) must be positive",
                self.num_vcs, self.vc_buf_size
            )));
        }
        if self.speculative > 3 {
            return Err(Error::InvalidSpeculation(self.speculative));
        }
        if self.input_speedup == 0
            || self.output_speedup == 0
            || self.input_speedup > self.num_vcs
        {
            return Err(Error::InvalidConfiguration(format!(
                "invalid speedup {}x{} for {} VCs",
                self.input_speedup, self.output_speedup, self.num_vcs
            )));
        }
        if self.alloc_iters == 0 {
            return Err(Error::InvalidConfiguration(
                "alloc_iters must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vc_iterations(&self) -> usize {
        if self.vc_alloc_iters > 0 {
            self.vc_alloc_iters
        } else {
            self.alloc_iters
        }
    }

    pub fn sw_iterations(&self) -> usize {
        if self.sw_alloc_iters > 0 {
            self.sw_alloc_iters
        } else {
            self.alloc_iters
        }
    }
}

/// Constants of the congestion counters shared with the neighbours.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CongestionConfiguration {
    /// Cycles between two decays of the counters.
    pub refresh_interval: usize,
    pub weighted_ceiling: u32,
    pub weighted_decay: u32,
    pub time_out_delta_cap: u32,
    pub time_out_ceiling: u32,
    pub time_out_decay: u32,
    /// Combined metric: BOFAR difference below which TRACKER may decide.
    pub bofar_window: i64,
    /// Combined metric: TRACKER difference up to which BOFAR still decides.
    pub tracker_window: i64,
}

impl Default for CongestionConfiguration {
    fn default() -> Self {
        Self {
            refresh_interval: 16,
            weighted_ceiling: 15,
            weighted_decay: 4,
            time_out_delta_cap: 7,
            time_out_ceiling: 63,
            time_out_decay: 8,
            bofar_window: 16,
            tracker_window: 4,
        }
    }
}

impl CongestionConfiguration {
    pub fn validate(&self) -> Result<(), Error> {
        if self.refresh_interval == 0 || self.weighted_decay == 0 || self.time_out_decay == 0 {
            return Err(Error::InvalidConfiguration(
                "refresh interval and decay factors must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Provides the parameters to build a network.
///
/// Constructed programmatically or read from a config file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfiguration {
    pub topology: TopologyKind,
    pub dims: Vec<usize>,
    pub link_latency: usize,
    pub routing_function: RoutingKind,
    pub router: RouterConfiguration,
    pub congestion: CongestionConfiguration,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            topology: TopologyKind::Mesh,
            dims: vec![4, 4],
            link_latency: 1,
            routing_function: RoutingKind::DimOrder,
            router: RouterConfiguration::default(),
            congestion: CongestionConfiguration::default(),
        }
    }
}

impl NetworkConfiguration {
    pub fn from_file(file_name: &str) -> anyhow::Result<Self> {
        let file = File::open(Path::new(file_name))
            .with_context(|| format!("File {} not found.", file_name))?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)
            .with_context(|| format!("Malformed configuration in {}", file_name))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(config)
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.router.validate()?;
        self.congestion.validate()?;
        if self.dims.is_empty() || self.dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidConfiguration(format!(
                "invalid dimensions {:?}",
                self.dims
            )));
        }
        if self.link_latency == 0 {
            return Err(Error::InvalidLatency(self.link_latency));
        }
        if self.topology == TopologyKind::Torus
            && (self.routing_function != RoutingKind::DimOrder || self.router.num_vcs < 2)
        {
            return Err(Error::UnsupportedTopology(format!(
                "a torus needs dim_order routing and at least 2 VCs, got {:?} with {} VCs",
                self.routing_function, self.router.num_vcs
            )));
        }
        if self.routing_function == RoutingKind::OddEven && self.dims.len() != 2 {
            return Err(Error::UnsupportedTopology(format!(
                "odd-even routing needs a 2-D topology, got {:?}",
                self.dims
            )));
        }
        if self.router.priority.needs_oracle() && self.dims.len() != 2 {
            return Err(Error::UnsupportedTopology(format!(
                "priority policy {:?} needs a 2-D topology, got {:?}",
                self.router.priority, self.dims
            )));
        }
        Ok(())
    }
}
