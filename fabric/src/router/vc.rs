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

use super::OutputSet;
use crate::routing::RoutingFunction;
use crate::topology::Geometry;
use crate::{Cycle, Flit, RouterId};
use std::collections::VecDeque;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VcState {
    Idle,
    Routing,
    VcAlloc,
    /// Waiting for a VC while also bidding for the switch.
    VcSpec,
    /// VC granted this cycle after a speculative switch bid.
    VcSpecGrant,
    Active,
}

impl VcState {
    /// Numeric code used in waveform traces.
    pub fn code(self) -> u64 {
        match self {
            Self::Idle => 0,
            Self::Routing => 1,
            Self::VcAlloc => 2,
            Self::VcSpec => 3,
            Self::VcSpecGrant => 4,
            Self::Active => 5,
        }
    }
}

impl fmt::Display for VcState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::VcAlloc => "vc_alloc",
            Self::VcSpec => "vc_spec",
            Self::VcSpecGrant => "vc_spec_grant",
            Self::Active => "active",
        };
        write!(f, "{}", name)
    }
}

/// One input virtual channel of a router: a flit FIFO plus the state of the
/// packet at its head.
#[derive(Debug)]
pub struct VirtualChannel {
    buffer: VecDeque<Flit>,
    state: VcState,
    state_time: Cycle,
    out_port: Option<usize>,
    out_vc: Option<usize>,
    route_set: OutputSet,
    priority: i64,
}

impl Default for VirtualChannel {
    fn default() -> Self {
        Self {
            buffer: VecDeque::new(),
            state: VcState::Idle,
            state_time: 0,
            out_port: None,
            out_vc: None,
            route_set: OutputSet::new(),
            priority: 0,
        }
    }
}

impl VirtualChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> VcState {
        self.state
    }

    pub fn state_time(&self) -> Cycle {
        self.state_time
    }

    /// Change state. Entering speculation or winning a VC while speculating
    /// keeps the time already spent waiting.
    pub fn set_state(&mut self, state: VcState) {
        let pseudo = matches!(
            (self.state, state),
            (VcState::VcAlloc, VcState::VcSpec) | (VcState::VcSpec, VcState::VcSpecGrant)
        );
        if let Some(f) = self.buffer.front() {
            if f.watch {
                log::info!("{} VC state {} -> {}", f, self.state, state);
            }
        }
        if !pseudo {
            self.state_time = 0;
        }
        if state == VcState::Idle {
            self.out_port = None;
            self.out_vc = None;
        }
        self.state = state;
    }

    pub fn advance_time(&mut self) {
        self.state_time += 1;
    }

    pub fn add_flit(&mut self, flit: Flit) {
        if self.buffer.is_empty() {
            self.priority = flit.pri;
        }
        self.buffer.push_back(flit);
    }

    pub fn remove_flit(&mut self) -> Option<Flit> {
        let flit = self.buffer.pop_front();
        if let Some(next) = self.buffer.front() {
            self.priority = next.pri;
        }
        flit
    }

    pub fn front_flit(&self) -> Option<&Flit> {
        self.buffer.front()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn occupancy(&self) -> usize {
        self.buffer.len()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn set_output(&mut self, port: usize, vc: usize) {
        self.out_port = Some(port);
        self.out_vc = Some(vc);
    }

    pub fn output_port(&self) -> Option<usize> {
        self.out_port
    }

    pub fn output_vc(&self) -> Option<usize> {
        self.out_vc
    }

    pub fn route_set(&self) -> &OutputSet {
        &self.route_set
    }

    /// Compute the candidate outputs of the head flit.
    pub fn route(
        &mut self,
        routing: &dyn RoutingFunction,
        geometry: &Geometry,
        router: RouterId,
        in_port: usize,
        num_vcs: usize,
    ) {
        let flit = self
            .buffer
            .front()
            .expect("Routing a virtual channel without flits");
        assert!(flit.head, "Routing a non-head flit: {}", flit);
        self.route_set = routing.route(geometry, router, flit, in_port, num_vcs);
        assert!(
            !self.route_set.is_empty(),
            "{} returned no route for {}",
            routing.name(),
            flit
        );
        if flit.watch {
            log::info!(
                "router {} routed {} to {:?}",
                router,
                flit,
                self.route_set.iter().map(|e| e.output_port).collect::<Vec<_>>()
            );
        }
    }
}
