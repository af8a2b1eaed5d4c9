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

use crate::{Cycle, RouterId};
use std::fmt;

/// Reusable identifier of a flit slot in the [`FlitPool`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FlitId(pub usize);

impl fmt::Display for FlitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traffic class of the packet a flit belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlitType {
    ReadRequest,
    WriteRequest,
    ReadReply,
    WriteReply,
    Any,
}

impl Default for FlitType {
    fn default() -> Self {
        Self::Any
    }
}

/// The unit of link-level flow control.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Flit {
    pub id: FlitId,
    /// Packet this flit belongs to.
    pub pid: usize,
    pub head: bool,
    pub tail: bool,
    pub flit_type: FlitType,
    pub src: RouterId,
    pub dest: RouterId,
    pub inject_time: Cycle,
    pub arrival_time: Option<Cycle>,
    /// Virtual channel on the link the flit currently travels on.
    pub vc: Option<usize>,
    pub hops: usize,
    pub pri: i64,
    /// Log every pipeline step of this flit.
    pub watch: bool,
    /// Router that forwarded the flit last; credits are addressed to it.
    pub from_router: Option<RouterId>,
}

impl Flit {
    pub fn new(id: FlitId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "flit {} ({:?} packet {}{}{}, {} -> {}, vc {:?})",
            self.id,
            self.flit_type,
            self.pid,
            if self.head { ", head" } else { "" },
            if self.tail { ", tail" } else { "" },
            self.src,
            self.dest,
            self.vc
        )
    }
}

/// Buffer slots returned upstream, one entry per freed VC slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credit {
    pub vcs: Vec<usize>,
    pub dest_router: Option<RouterId>,
}

impl Credit {
    pub fn new(vc: usize) -> Self {
        Self {
            vcs: vec![vc],
            dest_router: None,
        }
    }
}

/// Free list of flits.
///
/// Released flits keep their id and are handed out again before new ids are
/// minted, so ids stay dense over a long simulation.
#[derive(Debug, Default)]
pub struct FlitPool {
    free: Vec<Flit>,
    next_id: usize,
}

impl FlitPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self) -> Flit {
        match self.free.pop() {
            Some(flit) => flit,
            None => {
                let id = FlitId(self.next_id);
                self.next_id += 1;
                Flit::new(id)
            }
        }
    }

    pub fn release(&mut self, flit: Flit) {
        self.free.push(Flit::new(flit.id));
    }

    /// Number of flit ids minted so far.
    pub fn allocated(&self) -> usize {
        self.next_id
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Acquire the flits of a `len`-flit packet from `src` to `dest`.
    pub fn packet(
        &mut self,
        pid: usize,
        src: RouterId,
        dest: RouterId,
        len: usize,
        pri: i64,
        now: Cycle,
    ) -> Vec<Flit> {
        assert!(len > 0, "A packet needs at least one flit.");
        (0..len)
            .map(|i| {
                let mut flit = self.acquire();
                flit.pid = pid;
                flit.head = i == 0;
                flit.tail = i + 1 == len;
                flit.src = src;
                flit.dest = dest;
                flit.pri = pri;
                flit.inject_time = now;
                flit
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_resets_all_but_id() {
        let mut pool = FlitPool::new();
        let mut flit = pool.acquire();
        let id = flit.id;
        flit.head = true;
        flit.vc = Some(3);
        flit.hops = 7;
        flit.pri = -2;
        flit.watch = true;
        flit.from_router = Some(4);
        pool.release(flit);
        let recycled = pool.acquire();
        assert_eq!(recycled, Flit::new(id));
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_packet_flags() {
        let mut pool = FlitPool::new();
        let flits = pool.packet(9, 1, 5, 3, 2, 100);
        assert_eq!(flits.len(), 3);
        assert!(flits[0].head && !flits[0].tail);
        assert!(!flits[1].head && !flits[1].tail);
        assert!(!flits[2].head && flits[2].tail);
        assert!(flits.iter().all(|f| f.pid == 9 && f.dest == 5 && f.pri == 2));
        let single = pool.packet(10, 0, 1, 1, 0, 0);
        assert!(single[0].head && single[0].tail);
        for f in flits.into_iter().chain(single) {
            pool.release(f);
        }
        assert_eq!(pool.available(), 4);
    }
}
