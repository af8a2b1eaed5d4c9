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

use crate::{Credit, Flit};
use log::trace;

/// Upstream view of the input buffers behind one output port.
///
/// Tracks, per downstream VC, whether a packet owns it and how many of its
/// slots are occupied. Occupancy grows when a flit is committed to the
/// crossbar and shrinks when the matching credit comes back.
#[derive(Clone, Debug)]
pub struct BufferState {
    vc_buf_size: usize,
    wait_for_tail_credit: bool,
    in_use: Vec<bool>,
    tail_sent: Vec<bool>,
    occupancy: Vec<usize>,
    // conservation counters, per VC
    taken: Vec<usize>,
    sent: Vec<usize>,
    credited: Vec<usize>,
}

impl BufferState {
    pub fn new(num_vcs: usize, vc_buf_size: usize, wait_for_tail_credit: bool) -> Self {
        Self {
            vc_buf_size,
            wait_for_tail_credit,
            in_use: vec![false; num_vcs],
            tail_sent: vec![false; num_vcs],
            occupancy: vec![0; num_vcs],
            taken: vec![0; num_vcs],
            sent: vec![0; num_vcs],
            credited: vec![0; num_vcs],
        }
    }

    pub fn num_vcs(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_available_for(&self, vc: usize) -> bool {
        !self.in_use[vc]
    }

    pub fn is_full_for(&self, vc: usize) -> bool {
        self.occupancy[vc] >= self.vc_buf_size
    }

    pub fn occupancy(&self, vc: usize) -> usize {
        self.occupancy[vc]
    }

    /// Number of available VCs in `vcs`.
    pub fn free_vcs(&self, vcs: std::ops::RangeInclusive<usize>) -> usize {
        vcs.filter(|&vc| self.is_available_for(vc)).count()
    }

    pub fn take_buffer(&mut self, vc: usize) {
        assert!(
            !self.in_use[vc],
            "Buffer for VC {} taken while still in use",
            vc
        );
        self.in_use[vc] = true;
        self.tail_sent[vc] = false;
        self.taken[vc] += 1;
    }

    pub fn sending_flit(&mut self, flit: &Flit) {
        let vc = flit.vc.expect("flit sent without output VC");
        assert!(self.in_use[vc], "Flit sent on VC {} that was never taken", vc);
        assert!(
            self.occupancy[vc] < self.vc_buf_size,
            "Flit sent on full VC {} ({} slots)",
            vc,
            self.vc_buf_size
        );
        self.occupancy[vc] += 1;
        self.sent[vc] += 1;
        if flit.tail {
            self.tail_sent[vc] = true;
            if !self.wait_for_tail_credit {
                self.in_use[vc] = false;
            }
        }
        trace!("sending {} occupancy {}", flit, self.occupancy[vc]);
    }

    pub fn process_credit(&mut self, credit: &Credit) {
        for &vc in credit.vcs.iter() {
            assert!(vc < self.num_vcs(), "Credit for unknown VC {}", vc);
            assert!(
                self.occupancy[vc] > 0,
                "Credit for VC {} without an outstanding flit",
                vc
            );
            self.occupancy[vc] -= 1;
            self.credited[vc] += 1;
            if self.wait_for_tail_credit
                && self.in_use[vc]
                && self.tail_sent[vc]
                && self.occupancy[vc] == 0
            {
                self.in_use[vc] = false;
            }
        }
    }

    /// `(taken, sent, credited)` totals of `vc`.
    pub fn counters(&self, vc: usize) -> (usize, usize, usize) {
        (self.taken[vc], self.sent[vc], self.credited[vc])
    }
}
