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

use std::fmt;

use crate::RouterId;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    UnknownRouterType(String),
    UnsupportedRouterType(String),
    UnknownAllocator(String),
    UnknownArbiter(String),
    UnknownPriorityPolicy(String),
    UnknownSpecFilter(String),
    UnknownRoutingFunction(String),
    UnknownTopology(String),
    InvalidSpeculation(u8),
    InvalidLatency(usize),
    InvalidConfiguration(String),
    UnsupportedTopology(String),
    InvalidRouter(RouterId),
    InvalidPort(RouterId, usize),
    InvalidPacket(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownRouterType(name) => write!(f, "ERROR: Unknown router type {}", name),
            Self::UnsupportedRouterType(name) => {
                write!(f, "ERROR: Router type {} is not supported", name)
            }
            Self::UnknownAllocator(name) => write!(f, "ERROR: Unknown allocator {}", name),
            Self::UnknownArbiter(name) => write!(f, "ERROR: Unknown arbiter {}", name),
            Self::UnknownPriorityPolicy(name) => {
                write!(f, "ERROR: Unknown priority policy {}", name)
            }
            Self::UnknownSpecFilter(name) => {
                write!(f, "ERROR: Unknown speculative grant filter {}", name)
            }
            Self::UnknownRoutingFunction(name) => {
                write!(f, "ERROR: Unknown routing function {}", name)
            }
            Self::UnknownTopology(name) => write!(f, "ERROR: Unknown topology {}", name),
            Self::InvalidSpeculation(level) => {
                write!(f, "ERROR: Invalid speculation level {} (expected 0-3)", level)
            }
            Self::InvalidLatency(latency) => {
                write!(f, "ERROR: Invalid channel latency {}", latency)
            }
            Self::InvalidPort(r, p) => write!(f, "ERROR: Invalid port {} for router {}", p, r),
            Self::InvalidRouter(r) => write!(f, "ERROR: Invalid router {}", r),
            Self::InvalidPacket(msg) => write!(f, "ERROR: Malformed packet: {}", msg),
            Self::InvalidConfiguration(msg) | Self::UnsupportedTopology(msg) => {
                write!(f, "ERROR: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}
