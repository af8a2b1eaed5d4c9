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

use crate::router::oracle;
use crate::router::OutputSet;
use crate::topology::Geometry;
use crate::{Error, Flit, RouterId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    DimOrder,
    MinAdapt,
    OddEven,
}

impl FromStr for RoutingKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "dim_order" => Ok(Self::DimOrder),
            "min_adapt" => Ok(Self::MinAdapt),
            "odd_even" => Ok(Self::OddEven),
            _ => Err(Error::UnknownRoutingFunction(name.to_string())),
        }
    }
}

/// Computes the candidate outputs of a head flit at a router.
pub trait RoutingFunction {
    fn route(
        &self,
        geometry: &Geometry,
        router: RouterId,
        flit: &Flit,
        in_port: usize,
        num_vcs: usize,
    ) -> OutputSet;

    fn name(&self) -> &'static str;
}

pub fn new_routing_function(kind: RoutingKind) -> Box<dyn RoutingFunction> {
    match kind {
        RoutingKind::DimOrder => Box::new(DimensionOrder),
        RoutingKind::MinAdapt => Box::new(MinimalAdaptive),
        RoutingKind::OddEven => Box::new(OddEven),
    }
}

/// A productive output port and whether the remaining way in its dimension
/// still crosses the wrap-around link.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Hop {
    port: usize,
    crosses_dateline: bool,
}

/// Output ports that bring `cur` closer to `dest`, lowest dimension first.
fn productive_hops(geometry: &Geometry, cur: RouterId, dest: RouterId) -> Vec<Hop> {
    let c = geometry.coords(cur);
    let t = geometry.coords(dest);
    let mut hops = Vec::new();
    for (d, &m) in geometry.dims.iter().enumerate() {
        if c[d] == t[d] {
            continue;
        }
        let up = if geometry.wrap {
            // shortest way around the ring, ties go up
            (t[d] + m - c[d]) % m <= (c[d] + m - t[d]) % m
        } else {
            t[d] > c[d]
        };
        hops.push(Hop {
            port: if up { 2 * d } else { 2 * d + 1 },
            crosses_dateline: geometry.wrap && (up == (t[d] < c[d])),
        });
    }
    hops
}

fn productive_ports(geometry: &Geometry, cur: RouterId, dest: RouterId) -> Vec<usize> {
    productive_hops(geometry, cur, dest)
        .into_iter()
        .map(|hop| hop.port)
        .collect()
}

fn local_set(geometry: &Geometry, flit: &Flit, num_vcs: usize) -> OutputSet {
    let mut set = OutputSet::new();
    set.add_range(geometry.local_port(), 0, num_vcs - 1, flit.pri);
    set
}

/// Deterministic routing: correct the lowest dimension first.
///
/// On a torus the VCs of every ring are split at the dateline: packets that
/// still have to take the wrap-around link use the lower half, all others the
/// upper half.
pub struct DimensionOrder;

impl RoutingFunction for DimensionOrder {
    fn route(
        &self,
        geometry: &Geometry,
        router: RouterId,
        flit: &Flit,
        _in_port: usize,
        num_vcs: usize,
    ) -> OutputSet {
        let hop = match productive_hops(geometry, router, flit.dest).first() {
            None => return local_set(geometry, flit, num_vcs),
            Some(&hop) => hop,
        };
        let (vc_start, vc_end) = if geometry.wrap && num_vcs >= 2 {
            let half = num_vcs / 2;
            if hop.crosses_dateline {
                (0, half - 1)
            } else {
                (half, num_vcs - 1)
            }
        } else {
            (0, num_vcs - 1)
        };
        let mut set = OutputSet::new();
        set.add_range(hop.port, vc_start, vc_end, flit.pri);
        set
    }

    fn name(&self) -> &'static str {
        "dim_order"
    }
}

/// Every productive direction is a candidate.
pub struct MinimalAdaptive;

impl RoutingFunction for MinimalAdaptive {
    fn route(
        &self,
        geometry: &Geometry,
        router: RouterId,
        flit: &Flit,
        _in_port: usize,
        num_vcs: usize,
    ) -> OutputSet {
        let ports = productive_ports(geometry, router, flit.dest);
        if ports.is_empty() {
            return local_set(geometry, flit, num_vcs);
        }
        let mut set = OutputSet::new();
        for port in ports {
            set.add_range(port, 0, num_vcs - 1, flit.pri);
        }
        set
    }

    fn name(&self) -> &'static str {
        "min_adapt"
    }
}

/// Adaptive routing restricted by the odd-even turn model (2-D mesh only).
pub struct OddEven;

impl RoutingFunction for OddEven {
    fn route(
        &self,
        geometry: &Geometry,
        router: RouterId,
        flit: &Flit,
        in_port: usize,
        num_vcs: usize,
    ) -> OutputSet {
        assert_eq!(geometry.dims.len(), 2, "odd-even routing needs a 2-D mesh");
        let arrived = if in_port == geometry.local_port() {
            None
        } else {
            Some(in_port)
        };
        let ports =
            oracle::predict_next_hops(router, flit.src, flit.dest, arrived, geometry.radix());
        assert!(
            !ports.is_empty(),
            "odd-even routing found no output for {} at router {}",
            flit,
            router
        );
        let mut set = OutputSet::new();
        for port in ports {
            set.add_range(port, 0, num_vcs - 1, flit.pri);
        }
        set
    }

    fn name(&self) -> &'static str {
        "odd_even"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flit_to(src: RouterId, dest: RouterId) -> Flit {
        Flit {
            src,
            dest,
            head: true,
            pri: 3,
            ..Default::default()
        }
    }

    fn ports(set: &OutputSet) -> Vec<usize> {
        set.iter().map(|e| e.output_port).collect()
    }

    #[test]
    fn test_dim_order() {
        let geometry = Geometry::new(&[4, 4], false);
        let rf = new_routing_function(RoutingKind::DimOrder);
        // x first
        assert_eq!(ports(&rf.route(&geometry, 0, &flit_to(0, 15), 4, 2)), vec![0]);
        // then y
        assert_eq!(ports(&rf.route(&geometry, 3, &flit_to(0, 15), 1, 2)), vec![2]);
        let set = rf.route(&geometry, 15, &flit_to(0, 15), 3, 2);
        assert_eq!(ports(&set), vec![4]);
        let element = set.iter().next().unwrap();
        assert_eq!((element.vc_start, element.vc_end, element.priority), (0, 1, 3));
    }

    #[test]
    fn test_torus_takes_short_way() {
        let geometry = Geometry::new(&[4, 4], true);
        let rf = new_routing_function(RoutingKind::DimOrder);
        // 0 -> 3 is one hop west around the ring
        assert_eq!(ports(&rf.route(&geometry, 0, &flit_to(0, 3), 4, 2)), vec![1]);
    }

    fn vcs(set: &OutputSet) -> (usize, usize) {
        let element = set.iter().next().unwrap();
        (element.vc_start, element.vc_end)
    }

    #[test]
    fn test_torus_dateline_split() {
        let geometry = Geometry::new(&[4, 4], true);
        let rf = new_routing_function(RoutingKind::DimOrder);
        // 3 -> 1 goes east through the wrap link 3 -> 0: lower half
        assert_eq!(vcs(&rf.route(&geometry, 3, &flit_to(3, 1), 4, 4)), (0, 1));
        // after the wrap, 0 -> 1 stays on the upper half
        assert_eq!(vcs(&rf.route(&geometry, 0, &flit_to(3, 1), 0, 4)), (2, 3));
        // 1 -> 2 never wraps
        assert_eq!(vcs(&rf.route(&geometry, 1, &flit_to(1, 2), 4, 4)), (2, 3));
        // 0 -> 3 goes west through the wrap link 0 -> 3
        assert_eq!(vcs(&rf.route(&geometry, 0, &flit_to(0, 3), 4, 4)), (0, 1));
        // y dimension, 12 -> 4 goes north through the wrap link 12 -> 0
        let set = rf.route(&geometry, 12, &flit_to(12, 4), 4, 2);
        assert_eq!((ports(&set), vcs(&set)), (vec![2], (0, 0)));
        // ejection and meshes use every VC
        assert_eq!(vcs(&rf.route(&geometry, 1, &flit_to(3, 1), 1, 4)), (0, 3));
        let mesh = Geometry::new(&[4, 4], false);
        assert_eq!(vcs(&rf.route(&mesh, 0, &flit_to(0, 3), 4, 4)), (0, 3));
    }

    #[test]
    fn test_min_adapt() {
        let geometry = Geometry::new(&[3, 3], false);
        let rf = new_routing_function(RoutingKind::MinAdapt);
        assert_eq!(ports(&rf.route(&geometry, 0, &flit_to(0, 4), 4, 2)), vec![0, 2]);
        assert_eq!(ports(&rf.route(&geometry, 8, &flit_to(8, 0), 4, 2)), vec![1, 3]);
    }

    #[test]
    fn test_odd_even() {
        let geometry = Geometry::new(&[4, 4], false);
        let rf = new_routing_function(RoutingKind::OddEven);
        assert_eq!(ports(&rf.route(&geometry, 0, &flit_to(0, 14), 4, 2)), vec![2, 0]);
        assert_eq!(rf.name(), "odd_even");
        assert_eq!("valiant".parse::<RoutingKind>().is_err(), true);
    }
}
