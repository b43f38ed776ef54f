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
//! Shared fakes for the unit tests: a scripted in-memory chain view and a
//! ready-made configuration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use subxt::utils::H256;

use crate::chain::{AsMultiSubmission, ChainView, ExtrinsicResponse};
use crate::config::{
    BridgeConfig, FeeConfig, MultisigConfig, RelayerConfig, RoundConfig,
    SourceChainConfig,
};
use crate::error::{Error, Result};
use crate::types::ResourceId;

/// A scripted chain: blocks are keyed by height, the hash of height `n` is
/// `H256::from_low_u64_be(n)`, and submissions are recorded instead of sent.
pub struct MockChainView {
    finalized: AtomicU64,
    blocks: Mutex<HashMap<u64, Vec<ExtrinsicResponse>>>,
    /// Everything `submit_as_multi` was called with, in order.
    pub submissions: Mutex<Vec<AsMultiSubmission>>,
}

impl MockChainView {
    /// A chain finalized up to the given height, with no extrinsics yet.
    pub fn new(finalized: u64) -> Self {
        Self {
            finalized: AtomicU64::new(finalized),
            blocks: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the extrinsics of one block.
    pub fn put_block(&self, number: u64, responses: Vec<ExtrinsicResponse>) {
        self.blocks.lock().insert(number, responses);
    }

    /// Moves the finalized head.
    pub fn set_finalized(&self, number: u64) {
        self.finalized.store(number, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainView for MockChainView {
    async fn finalized_head(&self) -> Result<H256> {
        Ok(H256::from_low_u64_be(self.finalized.load(Ordering::SeqCst)))
    }

    async fn header_number(&self, hash: H256) -> Result<u64> {
        Ok(hash.to_low_u64_be())
    }

    async fn block_hash(&self, number: u64) -> Result<H256> {
        if number > self.finalized.load(Ordering::SeqCst) {
            return Err(Error::BlockNotReady { number });
        }
        Ok(H256::from_low_u64_be(number))
    }

    async fn block_number(&self, hash: H256) -> Result<u64> {
        Ok(hash.to_low_u64_be())
    }

    async fn extrinsics_for_account(
        &self,
        number: u64,
    ) -> Result<Vec<ExtrinsicResponse>> {
        Ok(self.blocks.lock().get(&number).cloned().unwrap_or_default())
    }

    async fn refresh_runtime(&self) -> Result<()> {
        Ok(())
    }

    async fn submit_as_multi(&self, submission: AsMultiSubmission) -> Result<()> {
        self.submissions.lock().push(submission);
        Ok(())
    }
}

/// A small, valid configuration with fast pacing for the tests.
pub fn sample_config() -> RelayerConfig {
    RelayerConfig {
        source: SourceChainConfig {
            name: "source".into(),
            ws_endpoint: "ws://127.0.0.1:9944".parse().unwrap(),
            chain_id: 1,
            start_block: 1,
            suri: None,
            multisig: MultisigConfig {
                threshold: 2,
                signatories: vec![
                    "11".repeat(32),
                    "22".repeat(32),
                    "33".repeat(32),
                ],
                relayer_index: 0,
                total_relayers: 3,
                max_weight: 2_269_800_000,
            },
        },
        bridge: BridgeConfig {
            destination_chain_id: 2,
            resource_id: ResourceId::default(),
            one_token: 1_000_000,
        },
        fees: FeeConfig {
            fixed: 0,
            rate_milli: 1,
        },
        rounds: RoundConfig {
            interval_ms: 1,
            block_retry_interval_ms: 1,
            stride: 1,
            submit_retry_limit: 5,
        },
    }
}
