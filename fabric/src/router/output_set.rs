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

/// A candidate output port together with the range of VCs a packet may use
/// there.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutputSetElement {
    pub output_port: usize,
    pub vc_start: usize,
    /// Inclusive.
    pub vc_end: usize,
    pub priority: i64,
}

impl OutputSetElement {
    pub fn vcs(&self) -> std::ops::RangeInclusive<usize> {
        self.vc_start..=self.vc_end
    }
}

/// Ordered candidates produced by a routing function.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputSet {
    elements: Vec<OutputSetElement>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn add_range(&mut self, output_port: usize, vc_start: usize, vc_end: usize, priority: i64) {
        assert!(vc_start <= vc_end, "Empty VC range {}..={}", vc_start, vc_end);
        self.elements.push(OutputSetElement {
            output_port,
            vc_start,
            vc_end,
            priority,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputSetElement> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains_port(&self, output_port: usize) -> bool {
        self.elements.iter().any(|e| e.output_port == output_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_range_keeps_order() {
        let mut set = OutputSet::new();
        set.add_range(2, 0, 3, 1);
        set.add_range(0, 1, 1, -1);
        let ports: Vec<usize> = set.iter().map(|e| e.output_port).collect();
        assert_eq!(ports, vec![2, 0]);
        assert!(set.contains_port(0));
        assert!(!set.contains_port(1));
        assert_eq!(set.iter().nth(1).unwrap().vcs().count(), 1);
        set.clear();
        assert!(set.is_empty());
    }
}
