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

use bencher::Bencher;
use bencher::{benchmark_group, benchmark_main};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use fabric::{FlitPool, Network, NetworkConfiguration, PriorityPolicy, SimulationCallbacks};

const CYCLES: usize = 1000;
const PACKET_LEN: usize = 4;
// packets injected per router per cycle
const LOAD: f64 = 0.05;

fn loaded_mesh(policy: PriorityPolicy, bench: &mut Bencher) {
    let mut config = NetworkConfiguration {
        dims: vec![8, 8],
        ..Default::default()
    };
    config.router.priority = policy;
    let mut network = Network::new(&config).unwrap();
    let routers = network.topology().num_routers();
    let mut rng = Xoshiro256StarStar::seed_from_u64(0xfab);
    let mut pool = FlitPool::new();
    let mut callbacks = SimulationCallbacks::default();
    let mut pid = 0;

    bench.iter(|| {
        for _ in 0..CYCLES {
            for src in 0..routers {
                if rng.gen_bool(LOAD) {
                    let dest = rng.gen_range(0..routers);
                    let now = network.cycle();
                    for flit in pool.packet(pid, src, dest, PACKET_LEN, 0, now) {
                        network.inject(flit).unwrap();
                    }
                    pid += 1;
                }
            }
            network.step(&mut callbacks);
            for router in 0..routers {
                for flit in network.take_delivered(router).unwrap() {
                    pool.release(flit);
                }
            }
        }
    });
}

fn base(bench: &mut Bencher) {
    loaded_mesh(PriorityPolicy::Base, bench)
}

fn tracker(bench: &mut Bencher) {
    loaded_mesh(PriorityPolicy::Tracker, bench)
}

fn bofar_tracker(bench: &mut Bencher) {
    loaded_mesh(PriorityPolicy::BofarTracker, bench)
}

benchmark_group!(benches, base, tracker, bofar_tracker);
benchmark_main!(benches);
