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

//! Lock-step simulation of a router network.
//!
//! Each cycle has four phases: every router and terminal reads its input
//! channels, every router runs its internal pipeline, every router and
//! terminal writes its output channels, and finally the congestion counters
//! are committed. Routers only see the counters of their neighbours as they
//! were at the end of the previous cycle.

use crate::config::NetworkConfiguration;
use crate::router::{BufferState, CongestionSnapshot, PipelineEvents, Router, RouterSpec};
use crate::routing::{new_routing_function, RoutingFunction};
use crate::topology::{Geometry, Topology};
use crate::vcd::{VcdWriter, DEFAULT_TOP_MODULE};
use crate::{Channel, Credit, Cycle, Error, Flit, RouterId};
use log::{debug, info, trace};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const TERMINAL_LATENCY: usize = 1;

/// Read-only state shared by all routers during one cycle.
pub struct StepContext<'a> {
    pub cycle: Cycle,
    pub geometry: &'a Geometry,
    pub routing: &'a dyn RoutingFunction,
    pub neighbors: &'a [Vec<Option<RouterId>>],
    /// Congestion counters of every router as of the previous cycle.
    pub snapshots: &'a [CongestionSnapshot],
}

#[derive(Default)]
pub struct SimulationCallbacks {
    vcd_writer: Option<Rc<RefCell<VcdWriter>>>,
}

impl SimulationCallbacks {
    pub fn get_vcd_writer(&mut self) -> Option<Rc<RefCell<VcdWriter>>> {
        self.vcd_writer.as_ref().map(Rc::clone)
    }

    pub fn create_vcd_callbacks() -> Self {
        Self {
            vcd_writer: Some(Rc::new(RefCell::new(VcdWriter::default()))),
        }
    }

    pub fn with_vcd_writer(writer: VcdWriter) -> Self {
        Self {
            vcd_writer: Some(Rc::new(RefCell::new(writer))),
        }
    }

    pub fn vcd<F>(&mut self, f: F)
    where
        F: FnOnce(Rc<RefCell<VcdWriter>>),
    {
        if let Some(writer) = self.get_vcd_writer() {
            f(writer)
        }
    }
}

struct WrapAroundCounter {
    value: usize,
    limit: usize,
}

impl WrapAroundCounter {
    fn new(limit: usize) -> Self {
        assert!(limit > 0);
        Self { value: 0, limit }
    }

    fn advance(&mut self) {
        self.value = if self.value + 1 == self.limit {
            0
        } else {
            self.value + 1
        };
    }

    fn test(&self) -> bool {
        self.value == 0
    }
}

/// Traffic source and sink attached to the local port of a router.
struct Terminal {
    router: RouterId,
    queue: VecDeque<Flit>,
    // the router's local input buffers
    buffer_state: BufferState,
    current_vc: Option<usize>,
    inject: Channel<Flit>,
    inject_credit: Channel<Credit>,
    eject: Channel<Flit>,
    eject_credit: Channel<Credit>,
    pending_credit: Option<Credit>,
    delivered: Vec<Flit>,
}

impl Terminal {
    fn new(router: RouterId, buffer_state: BufferState) -> Self {
        Self {
            router,
            queue: VecDeque::new(),
            buffer_state,
            current_vc: None,
            inject: Channel::new(TERMINAL_LATENCY),
            inject_credit: Channel::new(TERMINAL_LATENCY),
            eject: Channel::new(TERMINAL_LATENCY),
            eject_credit: Channel::new(TERMINAL_LATENCY),
            pending_credit: None,
            delivered: vec![],
        }
    }

    fn receive(&mut self, cycle: Cycle) {
        if let Some(mut flit) = self.eject.receive() {
            assert_eq!(
                flit.dest, self.router,
                "{} ejected at router {}",
                flit, self.router
            );
            let vc = flit.vc.expect("Flit ejected without a VC");
            self.pending_credit = Some(Credit {
                vcs: vec![vc],
                dest_router: flit.from_router,
            });
            flit.arrival_time = Some(cycle);
            if flit.watch {
                info!(
                    "{} delivered at router {} after {} hops, {} cycles",
                    flit,
                    self.router,
                    flit.hops,
                    cycle - flit.inject_time
                );
            }
            self.delivered.push(flit);
        }
        if let Some(credit) = self.inject_credit.receive() {
            self.buffer_state.process_credit(&credit);
        }
    }

    fn next_flit(&mut self) -> Option<Flit> {
        let front = self.queue.front()?;
        if self.current_vc.is_none() {
            assert!(front.head, "Packet injected without a head flit: {}", front);
            let buffer_state = &self.buffer_state;
            let vc = (0..buffer_state.num_vcs()).find(|&vc| {
                buffer_state.is_available_for(vc) && !buffer_state.is_full_for(vc)
            })?;
            self.buffer_state.take_buffer(vc);
            self.current_vc = Some(vc);
        }
        let vc = self.current_vc?;
        if self.buffer_state.is_full_for(vc) {
            return None;
        }
        let mut flit = self.queue.pop_front()?;
        flit.vc = Some(vc);
        self.buffer_state.sending_flit(&flit);
        if flit.tail {
            self.current_vc = None;
        }
        Some(flit)
    }

    fn send(&mut self) {
        let flit = self.next_flit();
        if let Some(flit) = &flit {
            trace!("terminal {} injects {}", self.router, flit);
        }
        self.inject.send(flit);
        self.eject_credit.send(self.pending_credit.take());
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.current_vc.is_none()
            && self.pending_credit.is_none()
            && self.inject.is_empty()
            && self.inject_credit.is_empty()
            && self.eject.is_empty()
            && self.eject_credit.is_empty()
    }
}

pub struct Network {
    topology: Topology,
    geometry: Geometry,
    neighbors: Vec<Vec<Option<RouterId>>>,
    routing: Box<dyn RoutingFunction>,
    routers: Vec<Router>,
    terminals: Vec<Terminal>,
    // by link index; credits travel against the link direction
    flit_channels: Vec<Channel<Flit>>,
    credit_channels: Vec<Channel<Credit>>,
    // [router][port] -> link index
    input_links: Vec<Vec<Option<usize>>>,
    output_links: Vec<Vec<Option<usize>>>,
    snapshots: Vec<CongestionSnapshot>,
    refresh_counter: WrapAroundCounter,
    cycle: Cycle,
}

impl Network {
    pub fn new(config: &NetworkConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let topology = Topology::from_config(config)?;
        let geometry = topology.geometry().clone();
        let neighbors = topology.neighbor_table();
        let ports = geometry.num_ports();
        let num_routers = topology.num_routers();

        let routers = (0..num_routers)
            .map(|id| {
                Router::new(
                    id,
                    &topology.router(id).name,
                    ports,
                    &config.router,
                    &config.congestion,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let terminals = (0..num_routers)
            .map(|id| {
                Terminal::new(
                    id,
                    BufferState::new(
                        config.router.num_vcs,
                        config.router.vc_buf_size,
                        config.router.wait_for_tail_credit,
                    ),
                )
            })
            .collect();

        let mut flit_channels = vec![];
        let mut credit_channels = vec![];
        let mut input_links = vec![vec![None; ports]; num_routers];
        let mut output_links = vec![vec![None; ports]; num_routers];
        for (idx, src, dst, link) in topology.links() {
            assert_eq!(idx, flit_channels.len());
            flit_channels.push(Channel::new(link.latency));
            credit_channels.push(Channel::new(link.latency));
            output_links[src][link.src_port] = Some(idx);
            input_links[dst][link.dst_port] = Some(idx);
        }
        debug!(
            "network of {} routers, {} links, {:?} routing",
            num_routers,
            flit_channels.len(),
            config.routing_function
        );

        let snapshots = routers.iter().map(|r| r.congestion_snapshot()).collect();
        Ok(Self {
            topology,
            geometry,
            neighbors,
            routing: new_routing_function(config.routing_function),
            routers,
            terminals,
            flit_channels,
            credit_channels,
            input_links,
            output_links,
            snapshots,
            refresh_counter: WrapAroundCounter::new(config.congestion.refresh_interval),
            cycle: 0,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn router(&self, id: RouterId) -> Result<&Router, Error> {
        self.routers.get(id).ok_or(Error::InvalidRouter(id))
    }

    /// Counters committed at the end of the last cycle.
    pub fn snapshots(&self) -> &[CongestionSnapshot] {
        &self.snapshots
    }

    /// Upstream view of the local input buffers of `router`.
    pub fn injection_buffer_state(&self, router: RouterId) -> Result<&BufferState, Error> {
        self.terminals
            .get(router)
            .map(|t| &t.buffer_state)
            .ok_or(Error::InvalidRouter(router))
    }

    pub fn events(&self) -> PipelineEvents {
        self.routers
            .iter()
            .filter_map(|r| r.as_iq_router())
            .fold(PipelineEvents::default(), |acc, r| {
                let e = r.events();
                PipelineEvents {
                    vc_grants: acc.vc_grants + e.vc_grants,
                    switch_traversals: acc.switch_traversals + e.switch_traversals,
                    misspeculations: acc.misspeculations + e.misspeculations,
                }
            })
    }

    /// Queue `flit` at the terminal of its source router. Flits of a packet
    /// must be injected in order, head first, and packets may not interleave.
    pub fn inject(&mut self, flit: Flit) -> Result<(), Error> {
        let num_routers = self.routers.len();
        if flit.dest >= num_routers {
            return Err(Error::InvalidRouter(flit.dest));
        }
        let terminal = self
            .terminals
            .get_mut(flit.src)
            .ok_or(Error::InvalidRouter(flit.src))?;
        let open = match terminal.queue.back() {
            Some(last) => !last.tail,
            None => terminal.current_vc.is_some(),
        };
        if open && flit.head {
            return Err(Error::InvalidPacket(format!(
                "{} starts a packet while another is still open at router {}",
                flit, flit.src
            )));
        }
        if !open && !flit.head {
            return Err(Error::InvalidPacket(format!(
                "{} is not a head flit and no packet is open at router {}",
                flit, flit.src
            )));
        }
        if flit.watch {
            info!("{} queued for injection", flit);
        }
        terminal.queue.push_back(flit);
        Ok(())
    }

    /// Flits delivered at `router` since the last call.
    pub fn take_delivered(&mut self, router: RouterId) -> Result<Vec<Flit>, Error> {
        self.terminals
            .get_mut(router)
            .map(|t| std::mem::take(&mut t.delivered))
            .ok_or(Error::InvalidRouter(router))
    }

    /// Write the VCD header for all routers.
    pub fn write_vcd_header(&self, callbacks: &mut SimulationCallbacks) {
        callbacks.vcd(|writer| VcdWriter::write_header(writer, &self.routers));
    }

    fn receive_all(&mut self) -> Vec<(Vec<Option<Flit>>, Vec<Option<Credit>>)> {
        let local = self.geometry.local_port();
        let mut inputs = Vec::with_capacity(self.routers.len());
        for r in 0..self.routers.len() {
            let mut flits = Vec::with_capacity(local + 1);
            let mut credits = Vec::with_capacity(local + 1);
            for p in 0..local {
                flits.push(match self.input_links[r][p] {
                    Some(link) => self.flit_channels[link].receive(),
                    None => None,
                });
                let credit = match self.output_links[r][p] {
                    Some(link) => self.credit_channels[link].receive(),
                    None => None,
                };
                if let Some(dest) = credit.as_ref().and_then(|c| c.dest_router) {
                    assert_eq!(dest, r, "Credit for router {} arrived at router {}", dest, r);
                }
                credits.push(credit);
            }
            let terminal = &mut self.terminals[r];
            flits.push(terminal.inject.receive());
            credits.push(terminal.eject_credit.receive());
            terminal.receive(self.cycle);
            inputs.push((flits, credits));
        }
        inputs
    }

    fn send_all(&mut self, outputs: Vec<(Vec<Option<Flit>>, Vec<Option<Credit>>)>) {
        let local = self.geometry.local_port();
        for (r, (flits, credits)) in outputs.into_iter().enumerate() {
            for (p, flit) in flits.into_iter().enumerate() {
                if p == local {
                    self.terminals[r].eject.send(flit);
                } else if let Some(link) = self.output_links[r][p] {
                    self.flit_channels[link].send(flit);
                } else {
                    assert!(
                        flit.is_none(),
                        "Router {} sent a flit through unconnected port {}",
                        r,
                        p
                    );
                }
            }
            for (p, credit) in credits.into_iter().enumerate() {
                if p == local {
                    self.terminals[r].inject_credit.send(credit);
                } else if let Some(link) = self.input_links[r][p] {
                    self.credit_channels[link].send(credit);
                } else {
                    assert!(
                        credit.is_none(),
                        "Router {} returned a credit through unconnected port {}",
                        r,
                        p
                    );
                }
            }
            self.terminals[r].send();
        }
    }

    /// Advance the whole network by one cycle.
    pub fn step(&mut self, callbacks: &mut SimulationCallbacks) {
        trace!("cycle {}", self.cycle);
        let inputs = self.receive_all();
        {
            let ctx = StepContext {
                cycle: self.cycle,
                geometry: &self.geometry,
                routing: self.routing.as_ref(),
                neighbors: &self.neighbors,
                snapshots: &self.snapshots,
            };
            for (router, (flits, credits)) in self.routers.iter_mut().zip(inputs) {
                router.read_inputs(&ctx, flits, credits);
            }
            for router in self.routers.iter_mut() {
                router.internal_step(&ctx);
            }
        }
        let outputs = self
            .routers
            .iter_mut()
            .map(|router| router.write_outputs())
            .collect();
        self.send_all(outputs);

        for router in self.routers.iter_mut() {
            router.end_cycle();
        }
        self.refresh_counter.advance();
        if self.refresh_counter.test() {
            trace!("refreshing congestion counters at cycle {}", self.cycle);
            for router in self.routers.iter_mut() {
                router.refresh_congestion();
            }
        }
        for (snapshot, router) in self.snapshots.iter_mut().zip(self.routers.iter()) {
            *snapshot = router.congestion_snapshot();
        }

        self.cycle += 1;
        let cycle = self.cycle;
        let routers = &self.routers;
        callbacks.vcd(|writer| {
            let _vcd_trace_scope =
                VcdWriter::managed_trace_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
            writer.borrow_mut().enter_cycle();
            writer.borrow_mut().change("sim_cycles", cycle as u64);
            for router in routers.iter() {
                router.vcd_trace(Rc::clone(&writer));
            }
            writer.borrow_mut().end_cycle();
        });
    }

    pub fn run(&mut self, cycles: usize) {
        let mut callbacks = SimulationCallbacks::default();
        for _ in 0..cycles {
            self.step(&mut callbacks);
        }
    }

    /// Step until nothing is queued or in flight, for at most `max_cycles`.
    /// Returns whether the network drained.
    pub fn drain(&mut self, max_cycles: usize) -> bool {
        let mut callbacks = SimulationCallbacks::default();
        for _ in 0..max_cycles {
            if self.is_idle() {
                return true;
            }
            self.step(&mut callbacks);
        }
        self.is_idle()
    }

    pub fn is_idle(&self) -> bool {
        self.routers.iter().all(|r| r.is_idle())
            && self.terminals.iter().all(|t| t.is_idle())
            && self.flit_channels.iter().all(|c| c.is_empty())
            && self.credit_channels.iter().all(|c| c.is_empty())
    }
}
