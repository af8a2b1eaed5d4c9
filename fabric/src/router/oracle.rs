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

//! Odd-even turn model over a 2-D mesh.
//!
//! Used to guess which output ports a flit will use at a downstream router,
//! independently of the routing function actually configured.

use crate::RouterId;

pub const EAST: usize = 0;
pub const WEST: usize = 1;
pub const NORTH: usize = 2;
pub const SOUTH: usize = 3;
pub const LOCAL: usize = 4;

/// Output ports allowed by the odd-even turn model for a flit from `src` to
/// `dest` currently at `cur`, skipping the port it `arrived` through.
pub fn predict_next_hops(
    cur: RouterId,
    src: RouterId,
    dest: RouterId,
    arrived: Option<usize>,
    radix: usize,
) -> Vec<usize> {
    let (s0, _) = xy(src, radix);
    let (d0, d1) = xy(dest, radix);
    let (c0, c1) = xy(cur, radix);
    let e0 = d0 - c0;
    let e1 = d1 - c1;

    let mut paths = Vec::with_capacity(2);
    let mut add = |port: usize| {
        if arrived != Some(port) {
            paths.push(port);
        }
    };
    let vertical = if e1 > 0 { NORTH } else { SOUTH };

    if e0 == 0 && e1 == 0 {
        add(LOCAL);
    } else if e0 == 0 {
        add(vertical);
    } else if e0 > 0 {
        if e1 == 0 {
            add(EAST);
        } else {
            // north/south turns are allowed in odd columns and at the source
            if c0 % 2 == 1 || c0 == s0 {
                add(vertical);
            }
            // odd destination column or at least two columns left
            if d0 % 2 == 1 || e0 != 1 {
                add(EAST);
            }
        }
    } else {
        add(WEST);
        if c0 % 2 == 0 && e1 != 0 {
            add(vertical);
        }
    }
    paths
}

fn xy(router: RouterId, radix: usize) -> (i64, i64) {
    ((router % radix) as i64, (router / radix) as i64)
}
