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

//! Routers and the pieces they are built from.

use crate::config::{CongestionConfiguration, RouterConfiguration};
use crate::sim::StepContext;
use crate::vcd::{VcdComponent, VcdWriter};
use crate::{Credit, Error, Flit, RouterId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

mod buffer_state;
mod congestion;
mod iq;
pub mod oracle;
mod output_set;
mod priority;
mod vc;

pub use buffer_state::BufferState;
pub use congestion::{CongestionCounters, CongestionSnapshot};
pub use iq::{IqRouter, PipelineEvents};
pub use output_set::{OutputSet, OutputSetElement};
pub use priority::{CongestionView, PriorityFunction, PriorityHistory, PriorityPolicy};
pub use vc::{VcState, VirtualChannel};

/// Router micro-architectures known by name.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    Iq,
    IqCombined,
    IqSplit,
    Event,
    Chaos,
}

impl RouterKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Iq => "iq",
            Self::IqCombined => "iq_combined",
            Self::IqSplit => "iq_split",
            Self::Event => "event",
            Self::Chaos => "chaos",
        }
    }
}

impl FromStr for RouterKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "iq" => Ok(Self::Iq),
            "iq_combined" => Ok(Self::IqCombined),
            "iq_split" => Ok(Self::IqSplit),
            "event" => Ok(Self::Event),
            "chaos" => Ok(Self::Chaos),
            _ => Err(Error::UnknownRouterType(name.to_string())),
        }
    }
}

/// The phases a router goes through every cycle, in call order.
pub trait RouterSpec {
    fn id(&self) -> RouterId;

    fn name(&self) -> &str;

    /// Latch the flits arriving on each input and the credits arriving on
    /// each output.
    fn read_inputs(
        &mut self,
        ctx: &StepContext,
        flits: Vec<Option<Flit>>,
        credits: Vec<Option<Credit>>,
    );

    /// Routing, allocation and switch traversal.
    fn internal_step(&mut self, ctx: &StepContext);

    /// Flits leaving through each output and credits leaving through each
    /// input.
    fn write_outputs(&mut self) -> (Vec<Option<Flit>>, Vec<Option<Credit>>);

    /// Commit this cycle's congestion counters.
    fn end_cycle(&mut self);

    fn refresh_congestion(&mut self);

    fn congestion_snapshot(&self) -> CongestionSnapshot;

    /// No flits buffered or in flight inside the router.
    fn is_idle(&self) -> bool;
}

pub enum Router {
    InputQueued(IqRouter),
}

impl Router {
    pub fn new(
        id: RouterId,
        name: &str,
        ports: usize,
        config: &RouterConfiguration,
        congestion: &CongestionConfiguration,
    ) -> Result<Self, Error> {
        match config.router {
            RouterKind::Iq => Ok(IqRouter::new(id, name, ports, config, congestion)?.into()),
            kind => Err(Error::UnsupportedRouterType(kind.name().to_string())),
        }
    }

    fn inner_router_spec(&self) -> &dyn RouterSpec {
        match self {
            Self::InputQueued(iq) => iq as &dyn RouterSpec,
        }
    }

    fn mut_inner_router_spec(&mut self) -> &mut dyn RouterSpec {
        match self {
            Self::InputQueued(iq) => iq as &mut dyn RouterSpec,
        }
    }

    fn inner_vcd_component(&self) -> &dyn VcdComponent {
        match self {
            Self::InputQueued(iq) => iq as &dyn VcdComponent,
        }
    }

    pub fn as_iq_router(&self) -> Option<&IqRouter> {
        match self {
            Self::InputQueued(iq) => Some(iq),
        }
    }

    /// Record this cycle's signals.
    pub fn vcd_trace(&self, vcd_writer: Rc<RefCell<VcdWriter>>) {
        match self {
            Self::InputQueued(iq) => iq.vcd_trace(vcd_writer),
        }
    }
}

impl RouterSpec for Router {
    fn id(&self) -> RouterId {
        self.inner_router_spec().id()
    }

    fn name(&self) -> &str {
        self.inner_router_spec().name()
    }

    fn read_inputs(
        &mut self,
        ctx: &StepContext,
        flits: Vec<Option<Flit>>,
        credits: Vec<Option<Credit>>,
    ) {
        self.mut_inner_router_spec().read_inputs(ctx, flits, credits)
    }

    fn internal_step(&mut self, ctx: &StepContext) {
        self.mut_inner_router_spec().internal_step(ctx)
    }

    fn write_outputs(&mut self) -> (Vec<Option<Flit>>, Vec<Option<Credit>>) {
        self.mut_inner_router_spec().write_outputs()
    }

    fn end_cycle(&mut self) {
        self.mut_inner_router_spec().end_cycle()
    }

    fn refresh_congestion(&mut self) {
        self.mut_inner_router_spec().refresh_congestion()
    }

    fn congestion_snapshot(&self) -> CongestionSnapshot {
        self.inner_router_spec().congestion_snapshot()
    }

    fn is_idle(&self) -> bool {
        self.inner_router_spec().is_idle()
    }
}

impl VcdComponent for Router {
    fn vcd_write_scope(&self, vcd_writer: Rc<RefCell<VcdWriter>>) {
        self.inner_vcd_component().vcd_write_scope(vcd_writer)
    }

    fn vcd_init(&self, vcd_writer: Rc<RefCell<VcdWriter>>) {
        self.inner_vcd_component().vcd_init(vcd_writer)
    }
}

impl From<IqRouter> for Router {
    fn from(iq: IqRouter) -> Router {
        Router::InputQueued(iq)
    }
}
