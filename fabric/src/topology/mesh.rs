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

/// A <dim>-D grid of routers.
///
/// All the links have the same latency. Ports facing the outside of the grid
/// stay unconnected.
///
/// For example a 2D mesh looks like this:
/// <pre>
/// x --- x --- x --- x   ^
/// |     |     |     |   |
/// x --- x --- x --- x   y-dim (north is up)
/// |     |     |     |   |
/// x --- x --- x --- x   v
/// < ----- x-dim ---->   (east is right)
/// </pre>
pub fn mesh(dims: &[usize], latency: usize) -> Topology {
    let geometry = Geometry::new(dims, false);
    let mut topology = Topology::new(geometry);

    for n in 0..dims.iter().product() {
        let coords = topology.geometry().coords(n);
        let name = format!("router_{}", n);
        log::debug!("router {}, index {}, coords {:?}", name, n, coords);
        let id = topology.add_router(RouterNode { name, coords });
        assert_eq!(id, n);
    }

    // build the links: for each router, add the connections to their
    // "higher" router pairs.
    for e in dims.iter().map(|&d| 0..d).multi_cartesian_product() {
        // e is a vector that contains the coordinates of a router
        for (d, &m) in dims.iter().enumerate() {
            if e[d] + 1 < m {
                let mut n = e.clone();
                n[d] = e[d] + 1;
                let src = topology.geometry().index(&e);
                let dst = topology.geometry().index(&n);

                // all the links are bidirectional
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
    }

    topology
}
