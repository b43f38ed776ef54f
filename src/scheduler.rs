// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! # Round Scheduler 🕸️
//!
//! Decides, purely from the finalized height and the relayer's index, which
//! relayer is "on shift" at each moment. Every relayer observes the same
//! finalized chain, so the shift assignment is identical everywhere without
//! any direct coordination: only one relayer burns fees per round, and if it
//! is offline the next block rotates the shift to another.

/// The deterministic round rotation shared by all relayers.
///
/// A relayer with index `i` is on shift at height `h` iff
/// `h mod (n * stride) == (i + 1) * stride - 1 mod (n * stride)`,
/// where `n` is the total number of relayers. With the nominal stride of 1
/// the shift at height `h` simply belongs to relayer `h mod n`.
#[derive(Debug, Copy, Clone)]
pub struct RoundScheduler {
    total_relayers: u64,
    stride: u64,
}

impl RoundScheduler {
    /// Creates a scheduler for `total_relayers` relayers with the given
    /// rotation stride (nominally 1).
    ///
    /// # Panics
    ///
    /// Panics when either parameter is zero; config validation rejects those
    /// before a scheduler is ever built.
    pub fn new(total_relayers: u64, stride: u64) -> Self {
        assert!(total_relayers > 0, "total relayers must be non-zero");
        assert!(stride > 0, "stride must be non-zero");
        Self {
            total_relayers,
            stride,
        }
    }

    /// The length of one full rotation in blocks.
    pub fn period(&self) -> u64 {
        self.total_relayers * self.stride
    }

    /// The current round within the rotation at the given height.
    pub fn round(&self, height: u64) -> u64 {
        height % self.period()
    }

    /// The round in which the relayer with the given index is on shift.
    pub fn slot(&self, relayer_index: u64) -> u64 {
        // the last round of the relayer's stride window.
        (relayer_index * self.stride + self.stride - 1) % self.period()
    }

    /// Whether the relayer with the given index is on shift at this height.
    pub fn is_my_turn(&self, height: u64, relayer_index: u64) -> bool {
        self.round(height) == self.slot(relayer_index)
    }
}
