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

use super::ArbiterKind;

/// Picks one winner among indexed candidates.
///
/// Candidates with the highest priority always win; the arbiter's own state
/// only breaks ties, so the outcome stays deterministic.
pub trait Arbiter {
    /// `candidates` are `(index, priority)` pairs with distinct indices.
    fn pick(&self, candidates: &[(usize, i64)]) -> Option<usize>;
    /// Record that `winner` was served.
    fn update(&mut self, winner: usize);
}

pub fn new_arbiter(kind: ArbiterKind, size: usize) -> Box<dyn Arbiter> {
    match kind {
        ArbiterKind::RoundRobin => Box::new(RoundRobinArbiter::new(size)),
        ArbiterKind::Matrix => Box::new(MatrixArbiter::new(size)),
    }
}

fn top_priority(candidates: &[(usize, i64)]) -> impl Iterator<Item = usize> + '_ {
    let best = candidates.iter().map(|&(_, p)| p).max();
    candidates
        .iter()
        .filter(move |&&(_, p)| Some(p) == best)
        .map(|&(i, _)| i)
}

/// Serves the first tied candidate at or after the last winner + 1.
#[derive(Clone, Debug)]
pub struct RoundRobinArbiter {
    size: usize,
    pointer: usize,
}

impl RoundRobinArbiter {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        Self { size, pointer: 0 }
    }
}

impl Arbiter for RoundRobinArbiter {
    fn pick(&self, candidates: &[(usize, i64)]) -> Option<usize> {
        top_priority(candidates).min_by_key(|&i| (i + self.size - self.pointer) % self.size)
    }

    fn update(&mut self, winner: usize) {
        self.pointer = (winner + 1) % self.size;
    }
}

/// Least-recently-served arbitration.
#[derive(Clone, Debug)]
pub struct MatrixArbiter {
    /// `beats[i][j]`: `i` wins over `j`.
    beats: Vec<Vec<bool>>,
}

impl MatrixArbiter {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        Self {
            beats: (0..size)
                .map(|i| (0..size).map(|j| i < j).collect())
                .collect(),
        }
    }
}

impl Arbiter for MatrixArbiter {
    fn pick(&self, candidates: &[(usize, i64)]) -> Option<usize> {
        let tied: Vec<usize> = top_priority(candidates).collect();
        tied.iter()
            .copied()
            .find(|&i| tied.iter().all(|&j| i == j || self.beats[i][j]))
            .or_else(|| tied.first().copied())
    }

    fn update(&mut self, winner: usize) {
        for j in 0..self.beats.len() {
            if j != winner {
                self.beats[winner][j] = false;
                self.beats[j][winner] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_rotates() {
        let mut arbiter = RoundRobinArbiter::new(4);
        let candidates = [(1, 0), (3, 0)];
        assert_eq!(arbiter.pick(&candidates), Some(1));
        arbiter.update(1);
        assert_eq!(arbiter.pick(&candidates), Some(3));
        arbiter.update(3);
        assert_eq!(arbiter.pick(&candidates), Some(1));
        assert_eq!(arbiter.pick(&[]), None);
    }

    #[test]
    fn test_priority_beats_pointer() {
        let mut arbiter = RoundRobinArbiter::new(4);
        arbiter.update(0);
        assert_eq!(arbiter.pick(&[(0, 5), (1, 0), (2, 0)]), Some(0));
        let matrix = MatrixArbiter::new(4);
        assert_eq!(matrix.pick(&[(0, 0), (3, 1)]), Some(3));
    }

    #[test]
    fn test_matrix_least_recently_served() {
        let mut arbiter = MatrixArbiter::new(3);
        let candidates = [(0, 0), (1, 0), (2, 0)];
        assert_eq!(arbiter.pick(&candidates), Some(0));
        arbiter.update(0);
        assert_eq!(arbiter.pick(&candidates), Some(1));
        arbiter.update(1);
        assert_eq!(arbiter.pick(&[(0, 0), (1, 0)]), Some(0));
        arbiter.update(2);
        assert_eq!(arbiter.pick(&candidates), Some(0));
    }
}
