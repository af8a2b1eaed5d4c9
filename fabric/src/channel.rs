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

use log::trace;

/// Fixed-latency delay line carrying at most one item per cycle.
///
/// The same structure serves inter-router links (receive, then send, each
/// cycle) and router-internal pipelines (send, then receive). In both cases an
/// item sent in cycle `t` is received in cycle `t + latency`. A link therefore
/// needs `latency >= 1`, a pipeline may have `latency == 0`.
#[derive(Debug)]
pub struct Channel<T> {
    /// Circular buffer holding the items in flight.
    slots: Vec<Option<T>>,

    /// The write pointer into the circular buffer (source of items).
    write_idx: usize,

    /// The read pointer into the circular buffer (sink of items).
    read_idx: usize,

    /// The number of slots, occupied or not, between the two pointers.
    occupancy: usize,
}

impl<T> Channel<T> {
    pub fn new(latency: usize) -> Self {
        Self {
            slots: (0..latency + 1).map(|_| None).collect(),
            write_idx: latency,
            read_idx: 0,
            occupancy: latency,
        }
    }

    pub fn latency(&self) -> usize {
        self.slots.len() - 1
    }

    /// Put the item of this cycle (or a bubble) on the line.
    pub fn send(&mut self, item: Option<T>) {
        assert!(
            self.occupancy < self.slots.len(),
            "May not send more items than the channel holds."
        );
        trace!(
            "(pre) send write_idx: {}, occupancy: {}",
            self.write_idx,
            self.occupancy
        );
        self.slots[self.write_idx] = item;
        self.write_idx = (self.write_idx + 1) % self.slots.len();
        self.occupancy += 1;
    }

    /// Take the item that has reached the end of the line.
    pub fn receive(&mut self) -> Option<T> {
        assert!(
            self.occupancy > 0,
            "May not receive more items than were sent."
        );
        trace!(
            "(pre) receive read_idx: {}, occupancy: {}",
            self.read_idx,
            self.occupancy
        );
        let item = self.slots[self.read_idx].take();
        self.read_idx = (self.read_idx + 1) % self.slots.len();
        self.occupancy -= 1;
        item
    }

    /// True if no item is in flight.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}
