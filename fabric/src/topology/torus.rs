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

use super::{Geometry, Link, RouterNode, Topology};
use itertools::Itertools;

/// A <dim>-D grid of routers whose border links wrap around.
pub fn torus(dims: &[usize], latency: usize) -> Topology {
    let geometry = Geometry::new(dims, true);
    let mut topology = Topology::new(geometry);

    for n in 0..dims.iter().product() {
        let coords = topology.geometry().coords(n);
        topology.add_router(RouterNode {
            name: format!("router_{}", n),
            coords,
        });
    }

    // build the links: for each router, add the connections to their
    // "higher" router pairs, wrapping at the border.
    for e in dims.iter().map(|&ub| 0..ub).multi_cartesian_product() {
        for (d, &m) in dims.iter().enumerate() {
            if m < 2 {
                continue;
            }
            let mut n = e.clone();
            n[d] = (e[d] + 1) % m;
            let src = topology.geometry().index(&e);
            let dst = topology.geometry().index(&n);

            topology.link_simplex(
                src,
                dst,
                Link {
                    src_port: 2 * d,
                    dst_port: 2 * d + 1,
                    latency,
                },
            );
            topology.link_simplex(
                dst,
                src,
                Link {
                    src_port: 2 * d + 1,
                    dst_port: 2 * d,
                    latency,
                },
            );
        }
    }

    topology
}
