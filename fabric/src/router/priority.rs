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

//! Congestion-aware input priorities for VC allocation.
//!
//! Each policy turns the congestion seen behind a candidate output into an
//! integer, larger is better. Values are only compared between the
//! candidates of one packet.

use super::congestion::CongestionSnapshot;
use super::oracle::predict_next_hops;
use super::{BufferState, OutputSetElement};
use crate::config::CongestionConfiguration;
use crate::{Cycle, Error, Flit, FlitId, RouterId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Priority assigned by the routing function.
    Base,
    /// Available VCs at the downstream buffer.
    FreeVcs,
    /// Flits forwarded by the neighbour.
    FlitsRouter,
    /// Flits forwarded by the neighbour on the ports the packet may use next.
    FlitsPorts,
    /// Flits forwarded by this router on the candidate port.
    FlitsChannel,
    /// Free VCs of the neighbour on the ports the packet may use next.
    Nop,
    Tracker,
    Bofar,
    Fluidity,
    BofarTracker,
}

impl FromStr for PriorityPolicy {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "base" => Ok(Self::Base),
            "free_vcs" => Ok(Self::FreeVcs),
            "flits_router" => Ok(Self::FlitsRouter),
            "flits_ports" => Ok(Self::FlitsPorts),
            "flits_channel" => Ok(Self::FlitsChannel),
            "nop" => Ok(Self::Nop),
            "tracker" => Ok(Self::Tracker),
            "bofar" => Ok(Self::Bofar),
            "fluidity" => Ok(Self::Fluidity),
            "bofar_tracker" => Ok(Self::BofarTracker),
            _ => Err(Error::UnknownPriorityPolicy(name.to_string())),
        }
    }
}

impl PriorityPolicy {
    /// Whether the policy predicts the hops after the neighbour.
    pub fn needs_oracle(self) -> bool {
        matches!(
            self,
            Self::FlitsPorts
                | Self::Nop
                | Self::Tracker
                | Self::Bofar
                | Self::Fluidity
                | Self::BofarTracker
        )
    }
}

/// What a router may observe about the network while allocating.
pub struct CongestionView<'a> {
    pub router: RouterId,
    pub cycle: Cycle,
    /// Routers per row of the 2-D mesh.
    pub radix: usize,
    pub local_port: usize,
    pub neighbors: &'a [Vec<Option<RouterId>>],
    /// Previous-cycle counters of every router.
    pub snapshots: &'a [CongestionSnapshot],
}

impl<'a> CongestionView<'a> {
    /// The router behind `candidate` and the input the flit would use there;
    /// `None` when the candidate ejects or reaches the destination directly.
    fn downstream(&self, flit: &Flit, candidate: &OutputSetElement) -> Option<(RouterId, usize)> {
        if candidate.output_port == self.local_port {
            return None;
        }
        let next = self.neighbors[self.router][candidate.output_port]?;
        if next == flit.dest {
            None
        } else {
            Some((next, candidate.output_port ^ 1))
        }
    }

    fn paths(&self, flit: &Flit, next: RouterId, in_channel: usize) -> Vec<usize> {
        predict_next_hops(next, flit.src, flit.dest, Some(in_channel), self.radix)
    }
}

#[derive(Clone, Copy, Debug)]
struct HistoryEntry {
    flit: FlitId,
    cycle: Cycle,
    bofar: i64,
    tracker: i64,
    priority: i64,
}

/// One-slot memory of the previous candidate scored for a flit.
#[derive(Clone, Debug, Default)]
pub struct PriorityHistory {
    entry: Option<HistoryEntry>,
}

impl PriorityHistory {
    /// Consume the entry of `flit` in `cycle`; any other entry is evicted.
    fn take(&mut self, flit: FlitId, cycle: Cycle) -> Option<HistoryEntry> {
        self.entry
            .take()
            .filter(|e| e.flit == flit && e.cycle == cycle)
    }

    fn store(&mut self, entry: HistoryEntry) {
        self.entry = Some(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct PriorityFunction {
    policy: PriorityPolicy,
    bofar_window: i64,
    tracker_window: i64,
}

impl PriorityFunction {
    pub fn new(policy: PriorityPolicy, config: &CongestionConfiguration) -> Self {
        Self {
            policy,
            bofar_window: config.bofar_window,
            tracker_window: config.tracker_window,
        }
    }

    /// Input priority of `flit` requesting `candidate`, whose downstream
    /// buffers are described by `dest`.
    pub fn priority(
        &self,
        history: &mut PriorityHistory,
        view: &CongestionView,
        flit: &Flit,
        candidate: &OutputSetElement,
        dest: &BufferState,
    ) -> i64 {
        let base = candidate.priority;
        let free = dest.free_vcs(candidate.vcs()) as i64;
        match self.policy {
            PriorityPolicy::Base => base,
            PriorityPolicy::FreeVcs => free,
            PriorityPolicy::FlitsChannel => {
                if candidate.output_port == view.local_port {
                    base
                } else {
                    -(view.snapshots[view.router].flits_per_port[candidate.output_port] as i64)
                }
            }
            _ => match view.downstream(flit, candidate) {
                None => base,
                Some((next, in_channel)) => {
                    self.downstream_priority(history, view, flit, base, free, next, in_channel)
                }
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn downstream_priority(
        &self,
        history: &mut PriorityHistory,
        view: &CongestionView,
        flit: &Flit,
        base: i64,
        free: i64,
        next: RouterId,
        in_channel: usize,
    ) -> i64 {
        let snapshot = &view.snapshots[next];
        if self.policy == PriorityPolicy::FlitsRouter {
            return -(snapshot.flits_routed as i64);
        }
        let paths = view.paths(flit, next, in_channel);
        if paths.is_empty() {
            return base;
        }
        let count = paths.len() as i64;
        match self.policy {
            PriorityPolicy::FlitsPorts => {
                let sum: i64 = paths
                    .iter()
                    .map(|&p| snapshot.flits_per_port[p] as i64)
                    .sum();
                -per_free_vc(sum / count, free)
            }
            PriorityPolicy::Nop => paths.iter().map(|&p| snapshot.free_vcs[p] as i64).sum(),
            PriorityPolicy::Tracker => tracker(snapshot, &paths, free),
            PriorityPolicy::Bofar => bofar(snapshot, &paths),
            PriorityPolicy::Fluidity => paths
                .iter()
                .filter_map(|&p| view.neighbors[next][p].map(|nn| (nn, p ^ 1)))
                .map(|(nn, input)| {
                    view.snapshots[nn].fluidity[input]
                        .iter()
                        .filter(|&&fluid| fluid)
                        .count() as i64
                })
                .sum(),
            PriorityPolicy::BofarTracker => {
                let present_bofar = bofar(snapshot, &paths);
                let present_tracker = tracker(snapshot, &paths, free);
                match history.take(flit.id, view.cycle) {
                    Some(prev) => {
                        let present_better = if (prev.bofar - present_bofar).abs() < self.bofar_window
                        {
                            if (prev.tracker - present_tracker).abs() <= self.tracker_window {
                                prev.bofar <= present_bofar
                            } else {
                                prev.tracker <= present_tracker
                            }
                        } else {
                            prev.bofar <= present_bofar
                        };
                        if present_better {
                            prev.priority + 1
                        } else {
                            prev.priority - 1
                        }
                    }
                    None => {
                        history.store(HistoryEntry {
                            flit: flit.id,
                            cycle: view.cycle,
                            bofar: present_bofar,
                            tracker: present_tracker,
                            priority: base,
                        });
                        base
                    }
                }
            }
            PriorityPolicy::Base
            | PriorityPolicy::FreeVcs
            | PriorityPolicy::FlitsRouter
            | PriorityPolicy::FlitsChannel => unreachable!(),
        }
    }
}

fn per_free_vc(value: i64, free: i64) -> i64 {
    if free > 0 {
        value / free
    } else {
        value
    }
}

fn tracker(snapshot: &CongestionSnapshot, paths: &[usize], free: i64) -> i64 {
    let sum: i64 = paths
        .iter()
        .map(|&p| snapshot.weighted_flits[p] as i64)
        .sum();
    -per_free_vc(sum / paths.len() as i64, free)
}

fn bofar(snapshot: &CongestionSnapshot, paths: &[usize]) -> i64 {
    -paths
        .iter()
        .map(|&p| snapshot.time_out[p] as i64)
        .sum::<i64>()
}
