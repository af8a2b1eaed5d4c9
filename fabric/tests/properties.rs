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

//! Invariants that must hold for any traffic.

mod common;

use common::init_logging;
use fabric::router::IqRouter;
use fabric::{
    Flit, FlitId, FlitPool, Network, NetworkConfiguration, PriorityPolicy, RoutingKind, SpecFilter,
    TopologyKind, VcState,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

const INJECTION_CYCLES: usize = 300;
const DRAIN_CYCLES: usize = 50_000;

fn iq(network: &Network, id: usize) -> &IqRouter {
    network
        .router(id)
        .unwrap()
        .as_iq_router()
        .expect("input-queued router")
}

/// No two input VCs of a router hold the same output VC.
fn check_vc_exclusivity(network: &Network) {
    for id in 0..network.topology().num_routers() {
        let router = iq(network, id);
        let mut owners = HashSet::new();
        for input in 0..router.inputs() {
            for vc in 0..router.num_vcs() {
                let cur_vc = router.vc(input, vc);
                if matches!(cur_vc.state(), VcState::Active | VcState::VcSpecGrant) {
                    let owned = (cur_vc.output_port().unwrap(), cur_vc.output_vc().unwrap());
                    assert!(
                        owners.insert(owned),
                        "router {} output VC {:?} held twice",
                        id,
                        owned
                    );
                }
            }
        }
    }
}

/// Every output VC that was handed out got all its credits back.
fn check_credit_conservation(network: &Network) {
    for id in 0..network.topology().num_routers() {
        let router = iq(network, id);
        for output in 0..router.outputs() {
            let state = router.buffer_state(output);
            for vc in 0..router.num_vcs() {
                let (taken, sent, credited) = state.counters(vc);
                assert_eq!(sent, credited, "router {} output {} vc {}", id, output, vc);
                assert!(taken <= sent);
                assert_eq!(state.occupancy(vc), 0);
                assert!(state.is_available_for(vc));
            }
        }
        let injection = network.injection_buffer_state(id).unwrap();
        for vc in 0..router.num_vcs() {
            let (taken, sent, credited) = injection.counters(vc);
            assert_eq!(sent, credited);
            assert!(taken <= sent);
        }
    }
}

fn hops(network: &Network, src: usize, dest: usize) -> usize {
    let geometry = network.topology().geometry();
    let (s, d) = (geometry.coords(src), geometry.coords(dest));
    s.iter()
        .zip(d.iter())
        .zip(geometry.dims.iter())
        .map(|((&a, &b), &size)| {
            let straight = if a > b { a - b } else { b - a };
            if geometry.wrap {
                straight.min(size - straight)
            } else {
                straight
            }
        })
        .sum::<usize>()
        + 1
}

fn run_random_traffic(config: NetworkConfiguration, seed: u64, load: f64) {
    run_traffic(config, seed, load, 1..=4);
}

fn run_traffic(
    config: NetworkConfiguration,
    seed: u64,
    load: f64,
    packet_lengths: RangeInclusive<usize>,
) {
    init_logging();
    let mut network = Network::new(&config).unwrap();
    let routers = network.topology().num_routers();
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let mut pool = FlitPool::new();
    let mut sent: HashMap<usize, Vec<FlitId>> = HashMap::new();
    let mut received: HashMap<usize, Vec<Flit>> = HashMap::new();
    let mut pid = 0;

    let mut collect = |network: &mut Network, pool: &mut FlitPool| {
        for router in 0..routers {
            for flit in network.take_delivered(router).unwrap() {
                assert_eq!(flit.dest, router);
                received.entry(flit.pid).or_default().push(flit.clone());
                pool.release(flit);
            }
        }
    };

    for _ in 0..INJECTION_CYCLES {
        for src in 0..routers {
            if rng.gen_bool(load) {
                let dest = rng.gen_range(0..routers);
                let len = rng.gen_range(packet_lengths.clone());
                let flits = pool.packet(pid, src, dest, len, rng.gen_range(0..4), network.cycle());
                sent.insert(pid, flits.iter().map(|f| f.id).collect());
                for flit in flits {
                    network.inject(flit).unwrap();
                }
                pid += 1;
            }
        }
        network.run(1);
        check_vc_exclusivity(&network);
        collect(&mut network, &mut pool);
    }
    let mut drained = false;
    for _ in 0..DRAIN_CYCLES {
        if network.is_idle() {
            drained = true;
            break;
        }
        network.run(1);
        check_vc_exclusivity(&network);
        collect(&mut network, &mut pool);
    }
    assert!(drained, "network did not drain");
    collect(&mut network, &mut pool);

    // every packet arrives complete and in order
    assert_eq!(received.len(), sent.len());
    let mut total_hops = 0;
    for (pid, ids) in sent.iter() {
        let flits = &received[pid];
        assert_eq!(&flits.iter().map(|f| f.id).collect::<Vec<_>>(), ids);
        assert!(flits[0].head && flits[flits.len() - 1].tail);
        for flit in flits {
            assert_eq!(flit.hops, hops(&network, flit.src, flit.dest));
            total_hops += flit.hops;
        }
    }
    // misspeculated grants never moved a flit
    assert_eq!(network.events().switch_traversals, total_hops);

    check_credit_conservation(&network);

    // released flits come back clean
    let recycled = pool.acquire();
    assert_eq!(recycled, Flit::new(recycled.id));
}

fn mesh_config() -> NetworkConfiguration {
    NetworkConfiguration {
        dims: vec![4, 4],
        ..Default::default()
    }
}

#[test]
fn baseline_dim_order() {
    run_random_traffic(mesh_config(), 1, 0.05);
}

#[test]
fn speculation_levels() {
    for speculative in 1..=3 {
        let mut config = mesh_config();
        config.router.speculative = speculative;
        run_random_traffic(config, 10 + speculative as u64, 0.08);
    }
}

#[test]
fn speculative_grant_filters() {
    for filter in [
        SpecFilter::AnyNonspecGnts,
        SpecFilter::ConflNonspecReqs,
        SpecFilter::ConflNonspecGnts,
    ] {
        let mut config = mesh_config();
        config.router.speculative = 2;
        config.router.filter_spec_grants = filter;
        run_random_traffic(config, 20, 0.08);
    }
}

#[test]
fn odd_even_with_congestion_priorities() {
    for policy in [
        PriorityPolicy::FreeVcs,
        PriorityPolicy::FlitsRouter,
        PriorityPolicy::FlitsPorts,
        PriorityPolicy::FlitsChannel,
        PriorityPolicy::Nop,
        PriorityPolicy::Tracker,
        PriorityPolicy::Bofar,
        PriorityPolicy::Fluidity,
        PriorityPolicy::BofarTracker,
    ] {
        let mut config = mesh_config();
        config.routing_function = RoutingKind::OddEven;
        config.router.priority = policy;
        run_random_traffic(config, 30, 0.06);
    }
}

#[test]
fn speedup_and_switch_hold() {
    let mut config = mesh_config();
    config.router.input_speedup = 2;
    config.router.output_speedup = 2;
    config.router.hold_switch_for_packet = true;
    config.router.speculative = 1;
    run_random_traffic(config, 40, 0.08);
}

#[test]
fn shallow_buffers_without_tail_credit_wait() {
    let mut config = mesh_config();
    config.router.num_vcs = 2;
    config.router.vc_buf_size = 1;
    config.router.wait_for_tail_credit = false;
    config.router.routing_delay = 0;
    config.router.credit_delay = 2;
    config.router.st_prepare_delay = 1;
    run_random_traffic(config, 50, 0.04);
}

#[test]
fn islip_and_matrix_arbiters() {
    let mut config = mesh_config();
    config.router.vc_allocator = fabric::AllocatorKind::Islip;
    config.router.sw_allocator = fabric::AllocatorKind::SeparableOutputFirst;
    config.router.sw_alloc_arb_type = fabric::ArbiterKind::Matrix;
    config.router.alloc_iters = 2;
    run_random_traffic(config, 60, 0.06);
}

#[test]
fn loaded_torus_drains() {
    for seed in 0..5 {
        let mut config = NetworkConfiguration {
            topology: TopologyKind::Torus,
            dims: vec![4, 4],
            ..Default::default()
        };
        config.router.num_vcs = 2;
        config.router.vc_buf_size = 2;
        run_traffic(config, seed, 0.3, 4..=4);
    }
}
