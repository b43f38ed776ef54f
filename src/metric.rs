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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{register_counter, register_gauge, Encoder, TextEncoder};

use crate::error::Result;

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// The highest finalized block the node has reported.
    pub latest_known_block: GenericGauge<AtomicF64>,
    /// The highest block the follower fully processed.
    pub latest_processed_block: GenericGauge<AtomicF64>,
    /// How many blocks the follower processed since start.
    pub blocks_processed: GenericCounter<AtomicF64>,
    /// How many outbound transfers were handed to the router.
    pub transfers_routed: GenericCounter<AtomicF64>,
    /// How many multisig extrinsics the submitter signed and sent.
    pub multisig_submissions: GenericCounter<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a
    /// registry for the counters and registers the counters.
    pub fn new() -> Result<Self> {
        let latest_known_block = register_gauge!(
            "latest_known_block",
            "The highest finalized block reported by the source chain node",
        )?;

        let latest_processed_block = register_gauge!(
            "latest_processed_block",
            "The highest block fully processed by the follower",
        )?;

        let blocks_processed = register_counter!(
            "blocks_processed",
            "The total number of blocks processed by the follower",
        )?;

        let transfers_routed = register_counter!(
            "transfers_routed",
            "The total number of outbound transfers handed to the router",
        )?;

        let multisig_submissions = register_counter!(
            "multisig_submissions",
            "The total number of multisig extrinsics submitted",
        )?;

        Ok(Self {
            latest_known_block,
            latest_processed_block,
            blocks_processed,
            transfers_routed,
            multisig_submissions,
        })
    }

    /// Gathers the whole relayer metrics in the text exposition format.
    pub fn gather_metrics() -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        // Gather the metrics.
        let metric_families = prometheus::gather();
        // Encode them to send.
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)
            .expect("text encoder always produces utf-8"))
    }
}
