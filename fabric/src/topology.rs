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

//! Router graph and the k-ary n-cube port convention.
//!
//! Every router of an `n`-dimensional topology has `2n + 1` ports: port `2d`
//! leads to the neighbour one step up in dimension `d`, port `2d + 1` one step
//! down, and port `2n` is the local terminal. A flit leaving through output
//! `p` enters the neighbour through input `p ^ 1`.

use crate::config::NetworkConfiguration;
use crate::{Error, RouterId};
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod mesh;
mod torus;

pub use mesh::mesh;
pub use torus::torus;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Mesh,
    Torus,
}

impl FromStr for TopologyKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "mesh" => Ok(Self::Mesh),
            "torus" => Ok(Self::Torus),
            _ => Err(Error::UnknownTopology(name.to_string())),
        }
    }
}

/// Shape of a k-ary n-cube.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Geometry {
    pub dims: Vec<usize>,
    /// Ports on the border wrap around (torus).
    pub wrap: bool,
}

impl Geometry {
    pub fn new(dims: &[usize], wrap: bool) -> Self {
        assert!(!dims.is_empty() && dims.iter().all(|&d| d > 0));
        Self {
            dims: dims.to_vec(),
            wrap,
        }
    }

    pub fn num_routers(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn num_ports(&self) -> usize {
        2 * self.dims.len() + 1
    }

    pub fn local_port(&self) -> usize {
        2 * self.dims.len()
    }

    /// Routers per row; the `k` of a square 2-D mesh.
    pub fn radix(&self) -> usize {
        self.dims[0]
    }

    /// Coordinates of `router`, lowest dimension first.
    pub fn coords(&self, router: RouterId) -> Vec<usize> {
        let mut rest = router;
        let mut coords = Vec::with_capacity(self.dims.len());
        for &size in self.dims.iter() {
            coords.push(rest % size);
            rest /= size;
        }
        coords
    }

    pub fn index(&self, coords: &[usize]) -> RouterId {
        coords
            .iter()
            .zip(self.dims.iter())
            .rev()
            .fold(0, |index, (&c, &size)| index * size + c)
    }

    /// Input port at the neighbour for a flit leaving through `port`.
    pub fn reverse_port(port: usize) -> usize {
        port ^ 1
    }
}

#[derive(Clone, Debug)]
pub struct RouterNode {
    pub name: String,
    pub coords: Vec<usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Link {
    pub src_port: usize,
    pub dst_port: usize,
    pub latency: usize,
}

/// Routers and the simplex links between them.
#[derive(Clone, Debug)]
pub struct Topology {
    graph: Graph<RouterNode, Link>,
    geometry: Geometry,
}

impl Topology {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            graph: Graph::new(),
            geometry,
        }
    }

    pub fn from_config(config: &NetworkConfiguration) -> Result<Self, Error> {
        config.validate()?;
        Ok(match config.topology {
            TopologyKind::Mesh => mesh(&config.dims, config.link_latency),
            TopologyKind::Torus => torus(&config.dims, config.link_latency),
        })
    }

    pub fn add_router(&mut self, node: RouterNode) -> RouterId {
        self.graph.add_node(node).index()
    }

    /// Connect `src` output `link.src_port` to `dst` input `link.dst_port`.
    pub fn link_simplex(&mut self, src: RouterId, dst: RouterId, link: Link) {
        let local = self.geometry.local_port();
        assert!(
            link.src_port < local && link.dst_port < local,
            "Port out of range: {:?}",
            link
        );
        assert!(
            self.output_link(src, link.src_port).is_none(),
            "Output port {} of router {} already connected",
            link.src_port,
            src
        );
        assert!(
            self.input_link(dst, link.dst_port).is_none(),
            "Input port {} of router {} already connected",
            link.dst_port,
            dst
        );
        self.graph
            .add_edge(NodeIndex::new(src), NodeIndex::new(dst), link);
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn num_routers(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_links(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn router(&self, router: RouterId) -> &RouterNode {
        &self.graph[NodeIndex::new(router)]
    }

    /// All links as `(link index, src, dst, link)`.
    pub fn links(&self) -> impl Iterator<Item = (usize, RouterId, RouterId, &Link)> + '_ {
        self.graph.edge_references().map(|e| {
            (
                e.id().index(),
                e.source().index(),
                e.target().index(),
                e.weight(),
            )
        })
    }

    /// Link index leaving `router` through output `port`.
    pub fn output_link(&self, router: RouterId, port: usize) -> Option<usize> {
        self.graph
            .edges_directed(NodeIndex::new(router), Direction::Outgoing)
            .find(|e| e.weight().src_port == port)
            .map(|e| e.id().index())
    }

    /// Link index entering `router` through input `port`.
    pub fn input_link(&self, router: RouterId, port: usize) -> Option<usize> {
        self.graph
            .edges_directed(NodeIndex::new(router), Direction::Incoming)
            .find(|e| e.weight().dst_port == port)
            .map(|e| e.id().index())
    }

    /// For every router, the neighbour behind each output port.
    pub fn neighbor_table(&self) -> Vec<Vec<Option<RouterId>>> {
        let ports = self.geometry.num_ports();
        self.graph
            .node_indices()
            .map(|n| {
                let mut neighbors = vec![None; ports];
                for e in self.graph.edges_directed(n, Direction::Outgoing) {
                    neighbors[e.weight().src_port] = Some(e.target().index());
                }
                neighbors
            })
            .collect()
    }

    pub fn to_graphviz(&self) -> String {
        use petgraph::dot::{Config, Dot};

        let generator = Dot::with_attr_getters(
            &self.graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, edge| {
                format!(
                    "label=\"Link {}\nlatency = {}\"; headlabel=\"{}\"; taillabel=\"{}\"",
                    edge.id().index(),
                    edge.weight().latency,
                    edge.weight().dst_port,
                    edge.weight().src_port
                )
            },
            &|_, node| format!("label=\"{}\n(id: {})\"", node.1.name, node.0.index()),
        );
        format!("{:?}", generator)
    }
}

#[cfg(test)]
mod topology_tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn test_coords() {
        let geometry = Geometry::new(&[4, 3], false);
        assert_eq!(geometry.coords(5), vec![1, 1]);
        assert_eq!(geometry.coords(11), vec![3, 2]);
        assert_eq!(geometry.index(&[2, 1]), 6);
        let cube = Geometry::new(&[2, 3, 4], true);
        for e in cube.dims.iter().map(|&d| 0..d).multi_cartesian_product() {
            assert_eq!(cube.coords(cube.index(&e)), e);
        }
        assert_eq!(cube.index(&[1, 2, 3]), cube.num_routers() - 1);
    }

    #[test]
    fn test_geometry_ports() {
        let geometry = Geometry::new(&[4, 4], false);
        assert_eq!(geometry.num_ports(), 5);
        assert_eq!(geometry.local_port(), 4);
        assert_eq!(geometry.radix(), 4);
        assert_eq!(geometry.coords(6), vec![2, 1]);
        assert_eq!(Geometry::reverse_port(0), 1);
        assert_eq!(Geometry::reverse_port(3), 2);
    }

    #[test]
    fn test_from_config() {
        let mut config = NetworkConfiguration::default();
        config.topology = TopologyKind::Torus;
        config.dims = vec![3, 3];
        let topology = Topology::from_config(&config).unwrap();
        assert_eq!(topology.num_routers(), 9);
        assert_eq!(topology.num_links(), 36);
        assert!(topology.to_graphviz().contains("router_8"));
        assert_eq!("ring".parse::<TopologyKind>(), Err(Error::UnknownTopology("ring".into())));
    }
}
