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

//! Input-queued virtual-channel router.
//!
//! Every cycle a router latches arriving flits into its input VCs, computes
//! routes for new packets, allocates output VCs, allocates the crossbar
//! (optionally speculating on the VC allocation of the same cycle), moves the
//! winning flits into the crossbar pipeline and returns one credit per input
//! upstream. Downstream buffers are tracked per output port by a
//! [`BufferState`].

use super::{
    BufferState, CongestionCounters, CongestionSnapshot, CongestionView, PriorityFunction,
    PriorityHistory, RouterSpec, VcState, VirtualChannel,
};
use crate::allocator::{new_allocator, Allocator};
use crate::config::{CongestionConfiguration, RouterConfiguration, SpecFilter};
use crate::sim::StepContext;
use crate::vcd::{VcdComponent, VcdWriter};
use crate::{Channel, Credit, Error, Flit, RouterId};
use log::{debug, info, trace};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

/// Totals of what happened in the pipeline since construction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PipelineEvents {
    pub vc_grants: usize,
    pub switch_traversals: usize,
    /// Switch grants that could not be used because the VC was not granted.
    pub misspeculations: usize,
}

pub struct IqRouter {
    id: RouterId,
    name: String,
    inputs: usize,
    outputs: usize,
    num_vcs: usize,
    config: RouterConfiguration,

    // [input][vc]
    vcs: Vec<Vec<VirtualChannel>>,
    // downstream buffers, per output
    next_vcs: Vec<BufferState>,

    routing_vcs: VecDeque<(usize, usize)>,
    // input * num_vcs + vc
    vcalloc_vcs: BTreeSet<usize>,

    vc_allocator: Box<dyn Allocator>,
    sw_allocator: Box<dyn Allocator>,
    spec_sw_allocator: Option<Box<dyn Allocator>>,
    sw_rr_offset: Vec<usize>,

    // held crossbar connections, by expanded input and expanded output
    switch_hold_in: Vec<Option<usize>>,
    switch_hold_vc: Vec<Option<usize>>,
    switch_hold_out: Vec<Option<usize>>,

    // one lane per expanded output
    crossbar_pipe: Vec<Channel<Flit>>,
    crossbar_stage: Vec<Option<Flit>>,
    // one lane per input
    credit_pipe: Vec<Channel<Credit>>,
    credit_stage: Vec<Option<Credit>>,
    output_buffer: Vec<VecDeque<Flit>>,
    credit_buffer: Vec<VecDeque<Credit>>,

    counters: CongestionCounters,
    priority: PriorityFunction,
    history: PriorityHistory,
    departed: Vec<Vec<bool>>,
    forwarded: Vec<bool>,
    events: PipelineEvents,
}

impl IqRouter {
    pub fn new(
        id: RouterId,
        name: &str,
        ports: usize,
        config: &RouterConfiguration,
        congestion: &CongestionConfiguration,
    ) -> Result<Self, Error> {
        config.validate()?;
        congestion.validate()?;
        if ports == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "router {} needs at least one port",
                name
            )));
        }
        let inputs = ports;
        let outputs = ports;
        let num_vcs = config.num_vcs;
        let expanded_inputs = inputs * config.input_speedup;
        let expanded_outputs = outputs * config.output_speedup;

        let vc_allocator = new_allocator(
            config.vc_allocator,
            config.vc_alloc_arb_type,
            inputs * num_vcs,
            outputs * num_vcs,
            config.vc_iterations(),
        );
        let sw_allocator = new_allocator(
            config.sw_allocator,
            config.sw_alloc_arb_type,
            expanded_inputs,
            expanded_outputs,
            config.sw_iterations(),
        );
        let spec_sw_allocator = if config.speculative >= 2 {
            Some(new_allocator(
                config.sw_allocator,
                config.sw_alloc_arb_type,
                expanded_inputs,
                expanded_outputs,
                config.sw_iterations(),
            ))
        } else {
            None
        };
        let crossbar_latency = config.st_prepare_delay + config.st_final_delay;
        debug!(
            "router {} ({}): {} ports, {} VCs x {} flits, speculation {}, crossbar latency {}",
            id, name, ports, num_vcs, config.vc_buf_size, config.speculative, crossbar_latency
        );

        Ok(Self {
            id,
            name: name.to_string(),
            inputs,
            outputs,
            num_vcs,
            config: config.clone(),
            vcs: (0..inputs)
                .map(|_| (0..num_vcs).map(|_| VirtualChannel::new()).collect())
                .collect(),
            next_vcs: (0..outputs)
                .map(|_| BufferState::new(num_vcs, config.vc_buf_size, config.wait_for_tail_credit))
                .collect(),
            routing_vcs: VecDeque::new(),
            vcalloc_vcs: BTreeSet::new(),
            vc_allocator,
            sw_allocator,
            spec_sw_allocator,
            sw_rr_offset: vec![0; expanded_inputs],
            switch_hold_in: vec![None; expanded_inputs],
            switch_hold_vc: vec![None; expanded_inputs],
            switch_hold_out: vec![None; expanded_outputs],
            crossbar_pipe: (0..expanded_outputs)
                .map(|_| Channel::new(crossbar_latency))
                .collect(),
            crossbar_stage: (0..expanded_outputs).map(|_| None).collect(),
            credit_pipe: (0..inputs)
                .map(|_| Channel::new(config.credit_delay))
                .collect(),
            credit_stage: (0..inputs).map(|_| None).collect(),
            output_buffer: (0..outputs).map(|_| VecDeque::new()).collect(),
            credit_buffer: (0..inputs).map(|_| VecDeque::new()).collect(),
            counters: CongestionCounters::new(congestion, inputs, outputs, num_vcs),
            priority: PriorityFunction::new(config.priority, congestion),
            history: PriorityHistory::default(),
            departed: vec![vec![false; num_vcs]; inputs],
            forwarded: vec![false; outputs],
            events: PipelineEvents::default(),
        })
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn num_vcs(&self) -> usize {
        self.num_vcs
    }

    pub fn vc(&self, input: usize, vc: usize) -> &VirtualChannel {
        &self.vcs[input][vc]
    }

    /// Upstream view of the buffers behind `output`.
    pub fn buffer_state(&self, output: usize) -> &BufferState {
        &self.next_vcs[output]
    }

    pub fn events(&self) -> PipelineEvents {
        self.events
    }

    pub fn counters(&self) -> &CongestionCounters {
        &self.counters
    }

    /// Start a new packet at `vc` of `input`, whose head is queued there.
    fn start_packet(&mut self, ctx: &StepContext, input: usize, vc: usize) {
        let cur_vc = &mut self.vcs[input][vc];
        if self.config.routing_delay > 0 {
            cur_vc.set_state(VcState::Routing);
            self.routing_vcs.push_back((input, vc));
        } else {
            cur_vc.route(ctx.routing, ctx.geometry, self.id, input, self.num_vcs);
            cur_vc.set_state(VcState::VcAlloc);
            self.vcalloc_vcs.insert(input * self.num_vcs + vc);
        }
    }

    fn route_stage(&mut self, ctx: &StepContext) {
        while let Some(&(input, vc)) = self.routing_vcs.front() {
            let cur_vc = &mut self.vcs[input][vc];
            assert_eq!(cur_vc.state(), VcState::Routing);
            if cur_vc.state_time() < self.config.routing_delay {
                break;
            }
            self.routing_vcs.pop_front();
            cur_vc.route(ctx.routing, ctx.geometry, self.id, input, self.num_vcs);
            cur_vc.set_state(VcState::VcAlloc);
            self.vcalloc_vcs.insert(input * self.num_vcs + vc);
        }
    }

    fn vc_alloc(&mut self, ctx: &StepContext) {
        let nv = self.num_vcs;
        self.vc_allocator.clear();
        let view = CongestionView {
            router: self.id,
            cycle: ctx.cycle,
            radix: ctx.geometry.radix(),
            local_port: ctx.geometry.local_port(),
            neighbors: ctx.neighbors,
            snapshots: ctx.snapshots,
        };

        let eligible: Vec<usize> = self.vcalloc_vcs.iter().copied().collect();
        for encoded in eligible {
            let (input, vc) = (encoded / nv, encoded % nv);
            if self.config.speculative > 0 && self.vcs[input][vc].state() == VcState::VcAlloc {
                self.vcs[input][vc].set_state(VcState::VcSpec);
            }
            let cur_vc = &self.vcs[input][vc];
            if cur_vc.state_time() < self.config.vc_alloc_delay {
                continue;
            }
            let flit = cur_vc
                .front_flit()
                .expect("VC waiting for allocation without flits");
            if flit.watch {
                info!(
                    "router {} VC {} at input {} requests VC allocation for {}",
                    self.id, vc, input, flit
                );
            }
            let out_priority = cur_vc.priority();
            for element in cur_vc.route_set().iter() {
                let dest = &self.next_vcs[element.output_port];
                let in_priority =
                    self.priority
                        .priority(&mut self.history, &view, flit, element, dest);
                for out_vc in element.vcs() {
                    if dest.is_available_for(out_vc) {
                        trace!(
                            "router {} vc request {}:{} -> {}:{} ({}, {})",
                            self.id,
                            input,
                            vc,
                            element.output_port,
                            out_vc,
                            in_priority,
                            out_priority
                        );
                        self.vc_allocator.add_request(
                            encoded,
                            element.output_port * nv + out_vc,
                            out_vc,
                            in_priority,
                            out_priority,
                        );
                    }
                }
            }
        }

        self.vc_allocator.allocate();

        for output in 0..self.outputs {
            for out_vc in 0..nv {
                if let Some(encoded) = self.vc_allocator.input_assigned(output * nv + out_vc) {
                    let (input, vc) = (encoded / nv, encoded % nv);
                    let cur_vc = &mut self.vcs[input][vc];
                    cur_vc.set_state(if self.config.speculative > 0 {
                        VcState::VcSpecGrant
                    } else {
                        VcState::Active
                    });
                    self.vcalloc_vcs.remove(&encoded);
                    cur_vc.set_output(output, out_vc);
                    self.next_vcs[output].take_buffer(out_vc);
                    self.events.vc_grants += 1;
                    debug!(
                        "router {} granted VC {} at output {} to VC {} at input {}",
                        self.id, out_vc, output, vc, input
                    );
                }
            }
        }
    }

    fn sw_requests(&mut self) -> (bool, Vec<bool>) {
        let nv = self.num_vcs;
        let input_speedup = self.config.input_speedup;
        let output_speedup = self.config.output_speedup;
        let speculative = self.config.speculative;
        let mut any_nonspec_reqs = false;
        let mut any_nonspec_output_reqs = vec![false; self.outputs * output_speedup];

        self.sw_allocator.clear();
        if let Some(spec_allocator) = self.spec_sw_allocator.as_mut() {
            spec_allocator.clear();
        }

        for input in 0..self.inputs {
            for s in 0..input_speedup {
                let expanded_input = s * self.inputs + input;
                let mut vc = self.sw_rr_offset[expanded_input];
                for _ in 0..nv {
                    // this VC belongs to another switch input
                    if vc % input_speedup != s {
                        vc = (vc + 1) % nv;
                        continue;
                    }
                    let cur_vc = &self.vcs[input][vc];
                    if !cur_vc.is_empty() && cur_vc.state_time() >= self.config.sw_alloc_delay {
                        match cur_vc.state() {
                            VcState::Active => {
                                let output = cur_vc.output_port().expect("Active VC without output");
                                let out_vc = cur_vc.output_vc().expect("Active VC without output");
                                let expanded_output = (input % output_speedup) * self.outputs + output;
                                if !self.next_vcs[output].is_full_for(out_vc)
                                    && self.switch_hold_in[expanded_input].is_none()
                                    && self.switch_hold_out[expanded_output].is_none()
                                {
                                    let priority = if speculative == 1 {
                                        1
                                    } else {
                                        cur_vc.priority()
                                    };
                                    self.sw_allocator.add_request(
                                        expanded_input,
                                        expanded_output,
                                        vc,
                                        priority,
                                        priority,
                                    );
                                    any_nonspec_reqs = true;
                                    any_nonspec_output_reqs[expanded_output] = true;
                                }
                            }
                            VcState::VcSpec | VcState::VcSpecGrant => {
                                for element in cur_vc.route_set().iter() {
                                    let dest = &self.next_vcs[element.output_port];
                                    if speculative >= 3
                                        && !element.vcs().any(|v| dest.is_available_for(v))
                                    {
                                        continue;
                                    }
                                    let expanded_output =
                                        (input % output_speedup) * self.outputs + element.output_port;
                                    if self.switch_hold_in[expanded_input].is_some()
                                        || self.switch_hold_out[expanded_output].is_some()
                                    {
                                        continue;
                                    }
                                    if speculative == 1 {
                                        self.sw_allocator.add_request(
                                            expanded_input,
                                            expanded_output,
                                            vc,
                                            0,
                                            0,
                                        );
                                    } else if let Some(spec_allocator) =
                                        self.spec_sw_allocator.as_mut()
                                    {
                                        spec_allocator.add_request(
                                            expanded_input,
                                            expanded_output,
                                            vc,
                                            cur_vc.priority(),
                                            cur_vc.priority(),
                                        );
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    vc = (vc + 1) % nv;
                }
            }
        }
        (any_nonspec_reqs, any_nonspec_output_reqs)
    }

    /// The expanded output and VC that `expanded_input` may use this cycle.
    fn sw_grant(
        &self,
        input: usize,
        expanded_input: usize,
        any_nonspec_reqs: bool,
        any_nonspec_output_reqs: &[bool],
    ) -> Option<(usize, usize)> {
        if let (Some(expanded_output), Some(vc)) = (
            self.switch_hold_in[expanded_input],
            self.switch_hold_vc[expanded_input],
        ) {
            if self.vcs[input][vc].is_empty() {
                return None;
            }
            return Some((expanded_output, vc));
        }
        if let Some(expanded_output) = self.sw_allocator.output_assigned(expanded_input) {
            let request = self
                .sw_allocator
                .read_request(expanded_input, expanded_output)
                .expect("Switch granted without a request");
            return Some((expanded_output, request.label));
        }
        let spec_allocator = self.spec_sw_allocator.as_ref()?;
        let expanded_output = spec_allocator.output_assigned(expanded_input)?;
        let keep = match self.config.filter_spec_grants {
            SpecFilter::AnyNonspecGnts => !any_nonspec_reqs,
            SpecFilter::ConflNonspecReqs => !any_nonspec_output_reqs[expanded_output],
            SpecFilter::ConflNonspecGnts => self
                .sw_allocator
                .input_assigned(expanded_output)
                .is_none(),
        };
        if !keep {
            return None;
        }
        let request = spec_allocator
            .read_request(expanded_input, expanded_output)
            .expect("Speculative switch granted without a request");
        Some((expanded_output, request.label))
    }

    fn sw_alloc(&mut self, ctx: &StepContext) {
        let nv = self.num_vcs;
        let (any_nonspec_reqs, any_nonspec_output_reqs) = self.sw_requests();
        self.sw_allocator.allocate();
        if let Some(spec_allocator) = self.spec_sw_allocator.as_mut() {
            spec_allocator.allocate();
        }

        for input in 0..self.inputs {
            let mut credit: Option<Credit> = None;
            for s in 0..self.config.input_speedup {
                let expanded_input = s * self.inputs + input;
                let (expanded_output, vc) = match self.sw_grant(
                    input,
                    expanded_input,
                    any_nonspec_reqs,
                    &any_nonspec_output_reqs,
                ) {
                    Some(grant) => grant,
                    None => continue,
                };
                let output = expanded_output % self.outputs;

                let cur_vc = &mut self.vcs[input][vc];
                let ready = matches!(cur_vc.state(), VcState::VcSpecGrant | VcState::Active)
                    && cur_vc.output_port() == Some(output);
                if !ready {
                    self.events.misspeculations += 1;
                    trace!(
                        "router {} speculation failed for VC {} at input {} on output {}",
                        self.id,
                        vc,
                        input,
                        output
                    );
                    continue;
                }

                if self.config.hold_switch_for_packet {
                    self.switch_hold_in[expanded_input] = Some(expanded_output);
                    self.switch_hold_vc[expanded_input] = Some(vc);
                    self.switch_hold_out[expanded_output] = Some(expanded_input);
                }

                let out_vc = cur_vc.output_vc().expect("Granted VC without output VC");
                if self.next_vcs[output].is_full_for(out_vc) {
                    continue;
                }

                let mut flit = cur_vc.remove_flit().expect("Switch granted to an empty VC");
                assert_eq!(flit.vc, Some(vc), "{} queued on the wrong VC", flit);
                flit.hops += 1;
                self.counters.record_departure(output);
                self.departed[input][vc] = true;
                self.forwarded[output] = true;

                let c = credit.get_or_insert_with(Credit::default);
                c.vcs.push(vc);
                c.dest_router = flit.from_router;

                flit.vc = Some(out_vc);
                self.next_vcs[output].sending_flit(&flit);
                if flit.watch {
                    info!(
                        "router {} forwards {} through crossbar ({} -> {})",
                        self.id, flit, expanded_input, expanded_output
                    );
                }
                let tail = flit.tail;
                assert!(
                    self.crossbar_stage[expanded_output].is_none(),
                    "Two flits granted crossbar output {}",
                    expanded_output
                );
                self.crossbar_stage[expanded_output] = Some(flit);
                self.events.switch_traversals += 1;

                if tail {
                    if cur_vc.is_empty() {
                        cur_vc.set_state(VcState::Idle);
                    } else if self.config.routing_delay > 0 {
                        cur_vc.set_state(VcState::Routing);
                        self.routing_vcs.push_back((input, vc));
                    } else {
                        cur_vc.route(ctx.routing, ctx.geometry, self.id, input, nv);
                        cur_vc.set_state(VcState::VcAlloc);
                        self.vcalloc_vcs.insert(input * nv + vc);
                    }
                    self.switch_hold_in[expanded_input] = None;
                    self.switch_hold_vc[expanded_input] = None;
                    self.switch_hold_out[expanded_output] = None;
                } else {
                    // restart the state timer for the next flit
                    cur_vc.set_state(VcState::Active);
                }
                self.sw_rr_offset[expanded_input] = (vc + 1) % nv;
            }

            for cur_vc in self.vcs[input].iter_mut() {
                if cur_vc.state() == VcState::VcSpecGrant {
                    cur_vc.set_state(VcState::Active);
                }
            }
            self.credit_stage[input] = credit;
        }
    }

    fn advance_pipelines(&mut self) {
        for (lane, pipe) in self.crossbar_pipe.iter_mut().enumerate() {
            pipe.send(self.crossbar_stage[lane].take());
            if let Some(flit) = pipe.receive() {
                self.output_buffer[lane % self.outputs].push_back(flit);
            }
        }
        for (input, pipe) in self.credit_pipe.iter_mut().enumerate() {
            pipe.send(self.credit_stage[input].take());
            if let Some(credit) = pipe.receive() {
                self.credit_buffer[input].push_back(credit);
            }
        }
    }

    /// Record the current signal values in an open trace scope of `writer`.
    fn record_signals(&self, writer: &mut VcdWriter) {
        for (input, vcs) in self.vcs.iter().enumerate() {
            for (vc, cur_vc) in vcs.iter().enumerate() {
                writer.change(
                    format!("vc_state_{}_{}", input, vc).as_str(),
                    cur_vc.state().code(),
                );
            }
        }
        for output in 0..self.outputs {
            writer.change(
                format!("weighted_flits_{}", output).as_str(),
                self.counters.weighted_flits(output) as u64,
            );
            writer.change(
                format!("time_out_{}", output).as_str(),
                self.counters.time_out(output) as u64,
            );
        }
    }

    /// Trace this cycle's signals.
    pub fn vcd_trace(&self, writer: Rc<RefCell<VcdWriter>>) {
        let _vcd_name_scope = VcdWriter::managed_trace_scope(Rc::clone(&writer), &self.name);
        self.record_signals(&mut writer.borrow_mut());
    }
}

impl RouterSpec for IqRouter {
    fn id(&self) -> RouterId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn read_inputs(
        &mut self,
        ctx: &StepContext,
        flits: Vec<Option<Flit>>,
        credits: Vec<Option<Credit>>,
    ) {
        assert_eq!(flits.len(), self.inputs);
        assert_eq!(credits.len(), self.outputs);
        for (input, flit) in flits.into_iter().enumerate() {
            let mut flit = match flit {
                Some(flit) => flit,
                None => continue,
            };
            let vc = flit.vc.expect("Flit arrived without a VC");
            assert!(vc < self.num_vcs, "{} arrived on unknown VC", flit);
            flit.arrival_time = Some(ctx.cycle);
            if flit.watch {
                info!("router {} received {} at input {}", self.id, flit, input);
            }
            let cur_vc = &mut self.vcs[input][vc];
            assert!(
                cur_vc.occupancy() < self.config.vc_buf_size,
                "Input buffer overflow on VC {} of input {} at router {}",
                vc,
                input,
                self.id
            );
            let idle = cur_vc.state() == VcState::Idle;
            if idle {
                assert!(
                    flit.head,
                    "Non-head {} arrived at idle VC {} of input {} at router {}",
                    flit,
                    vc,
                    input,
                    self.id
                );
            }
            cur_vc.add_flit(flit);
            if idle {
                self.start_packet(ctx, input, vc);
            }
        }
        for (output, credit) in credits.into_iter().enumerate() {
            if let Some(credit) = credit {
                trace!("router {} credit {:?} at output {}", self.id, credit.vcs, output);
                self.next_vcs[output].process_credit(&credit);
            }
        }
    }

    fn internal_step(&mut self, ctx: &StepContext) {
        self.route_stage(ctx);
        self.vc_alloc(ctx);
        self.sw_alloc(ctx);
        for cur_vc in self.vcs.iter_mut().flatten() {
            cur_vc.advance_time();
        }
        self.advance_pipelines();
    }

    fn write_outputs(&mut self) -> (Vec<Option<Flit>>, Vec<Option<Credit>>) {
        let id = self.id;
        let flits = self
            .output_buffer
            .iter_mut()
            .map(|queue| {
                queue.pop_front().map(|mut flit| {
                    flit.from_router = Some(id);
                    flit
                })
            })
            .collect();
        let credits = self
            .credit_buffer
            .iter_mut()
            .map(|queue| queue.pop_front())
            .collect();
        (flits, credits)
    }

    fn end_cycle(&mut self) {
        let mut waiting = vec![false; self.outputs];
        for (input, vcs) in self.vcs.iter().enumerate() {
            for (vc, cur_vc) in vcs.iter().enumerate() {
                let departed = self.departed[input][vc];
                self.counters
                    .set_fluid(input, vc, cur_vc.is_empty() || departed);
                if cur_vc.state() == VcState::Active && !cur_vc.is_empty() && !departed {
                    if let Some(output) = cur_vc.output_port() {
                        waiting[output] = true;
                    }
                }
                self.departed[input][vc] = false;
            }
        }
        let all_vcs = 0..=self.num_vcs - 1;
        for output in 0..self.outputs {
            if waiting[output] && !self.forwarded[output] {
                self.counters.record_stall(output);
            }
            self.forwarded[output] = false;
            self.counters
                .set_free_vcs(output, self.next_vcs[output].free_vcs(all_vcs.clone()));
        }
        self.counters.end_cycle();
    }

    fn refresh_congestion(&mut self) {
        self.counters.refresh();
    }

    fn congestion_snapshot(&self) -> CongestionSnapshot {
        self.counters.snapshot()
    }

    fn is_idle(&self) -> bool {
        self.vcs.iter().flatten().all(|vc| vc.is_empty())
            && self.output_buffer.iter().all(|q| q.is_empty())
            && self.credit_buffer.iter().all(|q| q.is_empty())
            && self.crossbar_pipe.iter().all(|p| p.is_empty())
            && self.credit_pipe.iter().all(|p| p.is_empty())
    }
}

impl VcdComponent for IqRouter {
    fn vcd_write_scope(&self, writer: Rc<RefCell<VcdWriter>>) {
        let _vcd_name_scope = VcdWriter::managed_decl_scope(Rc::clone(&writer), &self.name);
        for input in 0..self.inputs {
            for vc in 0..self.num_vcs {
                writer
                    .borrow_mut()
                    .add_integer_var(format!("vc_state_{}_{}", input, vc).as_str(), 3);
            }
        }
        for output in 0..self.outputs {
            writer
                .borrow_mut()
                .add_integer_var(format!("weighted_flits_{}", output).as_str(), 8);
            writer
                .borrow_mut()
                .add_integer_var(format!("time_out_{}", output).as_str(), 8);
        }
    }

    fn vcd_init(&self, writer: Rc<RefCell<VcdWriter>>) {
        self.vcd_trace(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{new_routing_function, RoutingFunction, RoutingKind};
    use crate::topology::{mesh, Geometry};
    use crate::{FlitId, FlitPool};

    const EAST: usize = 0;
    const WEST: usize = 1;
    const LOCAL: usize = 4;
    // router 5 of a 4x4 mesh, east neighbour is 6
    const ROUTER: RouterId = 5;

    struct Bench {
        geometry: Geometry,
        routing: Box<dyn RoutingFunction>,
        neighbors: Vec<Vec<Option<RouterId>>>,
        snapshots: Vec<CongestionSnapshot>,
        router: IqRouter,
        cycle: usize,
    }

    impl Bench {
        fn new(config: RouterConfiguration) -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let topology = mesh(&[4, 4], 1);
            let congestion = CongestionConfiguration::default();
            let router = IqRouter::new(ROUTER, "router_5", 5, &config, &congestion).unwrap();
            let snapshot = CongestionCounters::new(&congestion, 5, 5, config.num_vcs).snapshot();
            Self {
                geometry: topology.geometry().clone(),
                routing: new_routing_function(RoutingKind::DimOrder),
                neighbors: topology.neighbor_table(),
                snapshots: vec![snapshot; 16],
                router,
                cycle: 0,
            }
        }

        fn step(
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

        fn idle_step(&mut self) -> (Vec<Option<Flit>>, Vec<Option<Credit>>) {
            self.step(vec![None; 5], vec![None; 5])
        }
    }

    fn on_input(input: usize, flit: Flit) -> Vec<Option<Flit>> {
        let mut flits = vec![None; 5];
        flits[input] = Some(flit);
        flits
    }

    fn credit_on(output: usize, vc: usize) -> Vec<Option<Credit>> {
        let mut credits = vec![None; 5];
        credits[output] = Some(Credit::new(vc));
        credits
    }

    fn packet(pool: &mut FlitPool, dest: RouterId, len: usize) -> Vec<Flit> {
        let mut flits = pool.packet(0, ROUTER, dest, len, 0, 0);
        for flit in flits.iter_mut() {
            flit.vc = Some(0);
        }
        flits
    }

    #[test]
    fn test_single_hop_timing() {
        let mut bench = Bench::new(RouterConfiguration {
            num_vcs: 2,
            ..Default::default()
        });
        let mut pool = FlitPool::new();
        let flit = packet(&mut pool, 6, 1).remove(0);

        let (out, credits) = bench.step(on_input(LOCAL, flit), vec![None; 5]);
        assert!(out.iter().all(|f| f.is_none()) && credits.iter().all(|c| c.is_none()));
        assert_eq!(bench.router.vc(LOCAL, 0).state(), VcState::Routing);
        bench.idle_step();
        assert_eq!(bench.router.vc(LOCAL, 0).state(), VcState::VcAlloc);
        bench.idle_step();
        assert_eq!(bench.router.vc(LOCAL, 0).state(), VcState::Active);
        assert_eq!(bench.router.events().vc_grants, 1);
        let (out, _) = bench.idle_step();
        assert!(out.iter().all(|f| f.is_none()));
        assert_eq!(bench.router.vc(LOCAL, 0).state(), VcState::Idle);
        assert_eq!(bench.router.events().switch_traversals, 1);

        let (mut out, credits) = bench.idle_step();
        let flit = out[EAST].take().expect("flit leaves east");
        assert_eq!(flit.id, FlitId(0));
        assert_eq!(flit.vc, Some(0));
        assert_eq!(flit.hops, 1);
        assert_eq!(flit.from_router, Some(ROUTER));
        assert_eq!(credits[LOCAL].as_ref().map(|c| c.vcs.clone()), Some(vec![0]));
        assert!(out.iter().all(|f| f.is_none()));
        assert_eq!(bench.router.events().misspeculations, 0);
        assert_eq!(bench.router.counters().snapshot().flits_per_port[EAST], 1);

        // the downstream VC stays reserved until its credit returns
        assert!(!bench.router.buffer_state(EAST).is_available_for(0));
        bench.step(vec![None; 5], credit_on(EAST, 0));
        assert!(bench.router.buffer_state(EAST).is_available_for(0));
        assert!(bench.router.is_idle());
    }

    #[test]
    fn test_speculation_saves_a_cycle() {
        let mut bench = Bench::new(RouterConfiguration {
            speculative: 1,
            ..Default::default()
        });
        let mut pool = FlitPool::new();
        let flit = packet(&mut pool, 6, 1).remove(0);
        bench.step(on_input(LOCAL, flit), vec![None; 5]);
        bench.idle_step();
        let (out, _) = bench.idle_step();
        assert!(out[EAST].is_none());
        assert_eq!(bench.router.events().switch_traversals, 1);
        let (out, _) = bench.idle_step();
        assert!(out[EAST].is_some());
        assert_eq!(bench.router.events().misspeculations, 0);
    }

    #[test]
    fn test_misspeculation_moves_nothing() {
        let mut bench = Bench::new(RouterConfiguration {
            num_vcs: 1,
            speculative: 2,
            ..Default::default()
        });
        let mut pool = FlitPool::new();
        let a = packet(&mut pool, 6, 1).remove(0);
        let b = packet(&mut pool, 6, 1).remove(0);
        let mut flits = vec![None; 5];
        flits[WEST] = Some(a);
        flits[LOCAL] = Some(b);
        bench.step(flits, vec![None; 5]);

        let mut delivered = 0;
        for _ in 0..6 {
            let (out, _) = bench.idle_step();
            delivered += out.iter().flatten().count();
        }
        // one VC downstream and no credit: only one packet can leave
        assert_eq!(delivered, 1);
        assert_eq!(bench.router.events().switch_traversals, 1);
        assert!(bench.router.events().misspeculations >= 1);
        let waiting = bench.router.vc(WEST, 0).occupancy() + bench.router.vc(LOCAL, 0).occupancy();
        assert_eq!(waiting, 1);

        bench.step(vec![None; 5], credit_on(EAST, 0));
        for _ in 0..6 {
            let (out, _) = bench.idle_step();
            delivered += out.iter().flatten().count();
        }
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_backpressure_with_single_slot() {
        let mut bench = Bench::new(RouterConfiguration {
            num_vcs: 1,
            vc_buf_size: 1,
            ..Default::default()
        });
        let mut pool = FlitPool::new();
        let mut flits = packet(&mut pool, 6, 2);
        let body = flits.pop().unwrap();
        let head = flits.pop().unwrap();
        // the input buffer holds one flit: the body follows once the head left
        bench.step(on_input(LOCAL, head), vec![None; 5]);
        bench.idle_step();
        bench.idle_step();
        let (out, _) = bench.idle_step();
        assert!(out[EAST].is_none());
        let (out, credits) = bench.step(on_input(LOCAL, body), vec![None; 5]);
        assert!(out[EAST].as_ref().map_or(false, |f| f.head));
        assert!(credits[LOCAL].is_some());

        for _ in 0..4 {
            let (out, _) = bench.idle_step();
            assert!(out[EAST].is_none(), "body must wait for a credit");
        }
        assert!(bench.router.buffer_state(EAST).is_full_for(0));

        bench.step(vec![None; 5], credit_on(EAST, 0));
        let (out, _) = bench.idle_step();
        assert!(out[EAST].as_ref().map_or(false, |f| f.tail));
        assert_eq!(bench.router.vc(LOCAL, 0).state(), VcState::Idle);
    }

    #[test]
    fn test_stall_and_fluidity_counters() {
        let mut bench = Bench::new(RouterConfiguration {
            num_vcs: 1,
            vc_buf_size: 1,
            ..Default::default()
        });
        let mut pool = FlitPool::new();
        let mut flits = packet(&mut pool, 6, 2);
        let body = flits.pop().unwrap();
        let head = flits.pop().unwrap();
        bench.step(on_input(LOCAL, head), vec![None; 5]);
        for _ in 0..3 {
            bench.idle_step();
        }
        bench.step(on_input(LOCAL, body), vec![None; 5]);
        for _ in 0..4 {
            bench.idle_step();
        }
        assert!(bench.router.counters().time_out(EAST) > 0);
        assert!(!bench.router.counters().snapshot().fluidity[LOCAL][0]);
        assert_eq!(bench.router.counters().snapshot().free_vcs[EAST], 0);
    }

    #[test]
    #[should_panic(expected = "Non-head")]
    fn test_body_flit_at_idle_vc_panics() {
        let mut bench = Bench::new(RouterConfiguration::default());
        let mut pool = FlitPool::new();
        let body = packet(&mut pool, 6, 2).pop().unwrap();
        bench.step(on_input(LOCAL, body), vec![None; 5]);
    }
}
