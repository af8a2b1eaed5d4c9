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

//! Cycle-accurate model of an input-queued virtual-channel router fabric.
//!
//! Routers are stepped in lock-step by [`Network`]: every cycle reads the
//! inputs of all routers, runs VC and switch allocation, writes the outputs,
//! and commits the congestion counters that neighbours observe in the next
//! cycle.

mod allocator;
mod channel;
mod config;
mod error;
mod flit;
pub mod router;
mod routing;
mod sim;
pub mod topology;
mod vcd;

// Public types
// type to use for cycles
pub type Cycle = usize;

/// Dense index of a router in the network arena.
pub type RouterId = usize;

pub use crate::allocator::{new_allocator, Allocator, AllocatorKind, ArbiterKind};
pub use crate::channel::Channel;
pub use crate::config::{
    CongestionConfiguration, NetworkConfiguration, RouterConfiguration, SpecFilter,
};
pub use crate::error::Error;
pub use crate::flit::{Credit, Flit, FlitId, FlitPool, FlitType};
pub use crate::router::{PriorityPolicy, Router, RouterKind, RouterSpec, VcState};
pub use crate::routing::{new_routing_function, RoutingFunction, RoutingKind};
pub use crate::sim::{Network, SimulationCallbacks, StepContext};
pub use crate::topology::{Geometry, Topology, TopologyKind};
pub use crate::vcd::{VcdComponent, VcdWriter};
