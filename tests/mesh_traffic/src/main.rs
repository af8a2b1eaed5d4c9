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

//! Uniform random traffic on a mesh.
//!
//! Usage: `mesh_traffic [config.yaml] [--vcd]`. Without a configuration file
//! the default 4x4 mesh is simulated.
use anyhow::{bail, Context};
use fabric::{FlitPool, FlitType, Network, NetworkConfiguration, SimulationCallbacks};
use log::info;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

const INJECTION_CYCLES: usize = 2000;
const DRAIN_CYCLES: usize = 20000;
const INJECTION_RATE: f64 = 0.05;
const PACKET_SIZE: usize = 4;
const SEED: u64 = 0x5eed;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut config_file = None;
    let mut trace = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--vcd" => trace = true,
            _ if config_file.is_none() => config_file = Some(arg),
            _ => bail!("unexpected argument {}", arg),
        }
    }
    let config = match config_file {
        Some(file) => NetworkConfiguration::from_file(&file)?,
        None => NetworkConfiguration::default(),
    };
    info!("simulating {:?}", config);

    let mut network = Network::new(&config).context("building the network")?;
    let mut callbacks = if trace {
        SimulationCallbacks::create_vcd_callbacks()
    } else {
        SimulationCallbacks::default()
    };
    network.write_vcd_header(&mut callbacks);

    let routers = network.topology().num_routers();
    let mut rng = Xoshiro256StarStar::seed_from_u64(SEED);
    let mut pool = FlitPool::new();
    let mut packets = 0;
    let mut flits = 0;
    let mut latency = 0;
    let mut hops = 0;
    let mut reads = 0;
    let mut writes = 0;

    let mut collect = |network: &mut Network, pool: &mut FlitPool| -> anyhow::Result<()> {
        for router in 0..routers {
            for flit in network.take_delivered(router)? {
                if let Some(arrival) = flit.arrival_time {
                    latency += arrival - flit.inject_time;
                }
                hops += flit.hops;
                flits += 1;
                match flit.flit_type {
                    FlitType::ReadRequest if flit.tail => reads += 1,
                    FlitType::WriteRequest if flit.tail => writes += 1,
                    _ => {}
                }
                pool.release(flit);
            }
        }
        Ok(())
    };

    for _ in 0..INJECTION_CYCLES {
        for src in 0..routers {
            if rng.gen_bool(INJECTION_RATE) {
                let dest = rng.gen_range(0..routers);
                let flit_type = if rng.gen_bool(0.5) {
                    FlitType::ReadRequest
                } else {
                    FlitType::WriteRequest
                };
                let now = network.cycle();
                for mut flit in pool.packet(packets, src, dest, PACKET_SIZE, 0, now) {
                    flit.flit_type = flit_type;
                    network.inject(flit)?;
                }
                packets += 1;
            }
        }
        network.step(&mut callbacks);
        collect(&mut network, &mut pool)?;
    }
    let mut drained = false;
    for _ in 0..DRAIN_CYCLES {
        if network.is_idle() {
            drained = true;
            break;
        }
        network.step(&mut callbacks);
        collect(&mut network, &mut pool)?;
    }
    collect(&mut network, &mut pool)?;
    callbacks.vcd(|writer| writer.borrow_mut().finish());

    if !drained {
        bail!("network did not drain after {} cycles", DRAIN_CYCLES);
    }
    let events = network.events();
    info!(
        "{} packets, {} flits delivered in {} cycles",
        packets,
        flits,
        network.cycle()
    );
    info!("{} read and {} write requests delivered", reads, writes);
    info!(
        "average flit latency {:.2}, average hops {:.2}",
        latency as f64 / flits.max(1) as f64,
        hops as f64 / flits.max(1) as f64
    );
    info!(
        "{} VC grants, {} switch traversals, {} misspeculations",
        events.vc_grants, events.switch_traversals, events.misspeculations
    );
    Ok(())
}
