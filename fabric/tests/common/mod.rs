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

#![allow(dead_code)]

use fabric::router::{CongestionSnapshot, IqRouter};
use fabric::topology::mesh;
use fabric::{
    new_routing_function, CongestionConfiguration, Credit, Flit, Geometry, RouterConfiguration,
    RouterId, RouterSpec, RoutingFunction, RoutingKind, StepContext,
};

pub const EAST: usize = 0;
pub const WEST: usize = 1;
pub const NORTH: usize = 2;
pub const SOUTH: usize = 3;
pub const LOCAL: usize = 4;
pub const PORTS: usize = 5;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A single router of a 4x4 mesh driven port by port.
pub struct RouterBench {
    pub geometry: Geometry,
    pub routing: Box<dyn RoutingFunction>,
    pub neighbors: Vec<Vec<Option<RouterId>>>,
    pub snapshots: Vec<CongestionSnapshot>,
    pub router: IqRouter,
    pub cycle: usize,
}

impl RouterBench {
    pub fn new(id: RouterId, config: RouterConfiguration, routing: RoutingKind) -> Self {
        init_logging();
        let topology = mesh(&[4, 4], 1);
        let congestion = CongestionConfiguration::default();
        let router = IqRouter::new(id, &format!("router_{}", id), PORTS, &config, &congestion)
            .expect("valid router configuration");
        let snapshot = CongestionSnapshot {
            flits_routed: 0,
            flits_per_port: vec![0; PORTS],
            weighted_flits: vec![0; PORTS],
            time_out: vec![0; PORTS],
            fluidity: vec![vec![true; config.num_vcs]; PORTS],
            free_vcs: vec![config.num_vcs; PORTS],
        };
        Self {
            geometry: topology.geometry().clone(),
            routing: new_routing_function(routing),
            neighbors: topology.neighbor_table(),
            snapshots: vec![snapshot; 16],
            router,
            cycle: 0,
        }
    }

    pub fn step(
        &mut self,
        flits: Vec<Option<Flit>>,
        credits: Vec<Option<Credit>>,
    ) -> (Vec<Option<Flit>>, Vec<Option<Credit>>) {
        let ctx = StepContext {
            cycle: self.cycle,
            geometry: &self.geometry,
            routing: self.routing.as_ref(),
            neighbors: &self.neighbors,
            snapshots: &self.snapshots,
        };
        self.router.read_inputs(&ctx, flits, credits);
        self.router.internal_step(&ctx);
        let outputs = self.router.write_outputs();
        self.router.end_cycle();
        self.cycle += 1;
        outputs
    }

    pub fn idle_step(&mut self) -> (Vec<Option<Flit>>, Vec<Option<Credit>>) {
        self.step(vec![None; PORTS], vec![None; PORTS])
    }
}

pub fn on_inputs(flits: Vec<(usize, Flit)>) -> Vec<Option<Flit>> {
    let mut ports = vec![None; PORTS];
    for (port, flit) in flits {
        ports[port] = Some(flit);
    }
    ports
}

pub fn credit_on(output: usize, vc: usize) -> Vec<Option<Credit>> {
    let mut credits = vec![None; PORTS];
    credits[output] = Some(Credit::new(vc));
    credits
}

/// A one-flit packet already assigned to `vc` of the receiving input.
pub fn single_flit(id: usize, src: RouterId, dest: RouterId, vc: usize) -> Flit {
    let mut flit = Flit::new(fabric::FlitId(id));
    flit.pid = id;
    flit.head = true;
    flit.tail = true;
    flit.src = src;
    flit.dest = dest;
    flit.vc = Some(vc);
    flit
}
