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
//! # Block Follower 🕸️
//!
//! The long-running task that tails finalized blocks of the source chain,
//! classifies every multisig extrinsic into the coordination ledger and
//! turns user deposits into outbound transfer messages.
//!
//! The follower is strictly single threaded over block heights: ledger
//! updates for block N are visible before any update for block N+1. On
//! transient fetch errors it sleeps and retries the same block, so a block
//! is only ever checkpointed after it was fully processed.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainView;
use crate::classifier::{self, BatchDeposit, MultiSigEvent};
use crate::config::{FeeConfig, RelayerConfig};
use crate::context::Shutdown;
use crate::error::{Error, Result};
use crate::ledger::CoordinationLedger;
use crate::metric::Metrics;
use crate::router::Router;
use crate::store::BlockStore;
use crate::types::{
    derive_deposit_nonce, ChainId, MultiSigRecord, MultiSignTxKey, ResourceId,
    TransferMessage,
};

/// The finalized-block follower.
pub struct Follower<V, R, S> {
    chain: Arc<V>,
    router: Arc<R>,
    store: Arc<S>,
    ledger: Arc<CoordinationLedger>,
    chain_id: ChainId,
    destination_chain_id: ChainId,
    resource_id: ResourceId,
    start_block: u64,
    fees: FeeConfig,
    block_retry_interval: Duration,
    metrics: Option<Metrics>,
    current_block: u64,
}

impl<V, R, S> Follower<V, R, S>
where
    V: ChainView + 'static,
    R: Router + 'static,
    S: BlockStore + 'static,
{
    /// Creates a follower over the given chain view, router and block store.
    pub fn new(
        chain: Arc<V>,
        router: Arc<R>,
        store: Arc<S>,
        ledger: Arc<CoordinationLedger>,
        config: &RelayerConfig,
        metrics: Option<Metrics>,
    ) -> Self {
        let start_block = config.source.start_block;
        Self {
            chain,
            router,
            store,
            ledger,
            chain_id: config.source.chain_id,
            destination_chain_id: config.bridge.destination_chain_id,
            resource_id: config.bridge.resource_id,
            start_block,
            fees: config.fees,
            block_retry_interval: config.rounds.block_retry_interval(),
            metrics,
            current_block: start_block,
        }
    }

    /// Where this follower will resume: the configured start block, or right
    /// after the stored checkpoint when that is further along.
    fn effective_start(&self) -> Result<u64> {
        let stored = self
            .store
            .last_block(self.chain_id, self.start_block.saturating_sub(1))?;
        Ok(self.start_block.max(stored.saturating_add(1)))
    }

    /// Validates the starting position against the finalized chain and
    /// spawns the polling loop.
    ///
    /// Fails fast with [`Error::StartBlockAhead`] when the configured start
    /// block does not exist yet; a checkpoint that caught up with the head
    /// is fine and just waits for new blocks.
    pub async fn start(
        mut self,
        shutdown: Shutdown,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let latest = self.chain.finalized_number().await?;
        if self.start_block > latest {
            return Err(Error::StartBlockAhead {
                start_block: self.start_block,
                latest,
            });
        }
        self.current_block = self.effective_start()?;
        Ok(tokio::task::spawn(self.run(shutdown)))
    }

    /// The polling loop. Exits only through the shutdown signal.
    #[tracing::instrument(skip_all, fields(chain_id = %self.chain_id))]
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        tracing::info!(from = self.current_block, "Polling blocks ...");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::warn!("follower received the stop signal");
                    return Err(Error::Terminated);
                }
                outcome = self.step() => match outcome {
                    Ok(()) => {}
                    Err(Error::BlockNotReady { .. }) => {
                        // the chain simply has not finalized this height on
                        // this endpoint yet.
                        tokio::time::sleep(self.block_retry_interval).await;
                    }
                    Err(e) => {
                        tracing::error!(
                            block = self.current_block,
                            "Failed to process block: {e}",
                        );
                        tokio::time::sleep(self.block_retry_interval).await;
                    }
                },
            }
        }
    }

    /// One tick: process the block under the cursor and advance it.
    async fn step(&mut self) -> Result<()> {
        let finalized = self.chain.finalized_number().await?;
        if let Some(metrics) = &self.metrics {
            metrics.latest_known_block.set(finalized as f64);
        }
        if self.current_block > finalized {
            // caught up; wait for the chain to move.
            return Err(Error::BlockNotReady {
                number: self.current_block,
            });
        }

        let hash = self.chain.block_hash(self.current_block).await?;
        self.process_block(hash).await?;

        if let Err(e) = self.store.store_block(self.chain_id, self.current_block)
        {
            tracing::error!("Failed to write to the block store: {e}");
        }
        if let Some(metrics) = &self.metrics {
            metrics.blocks_processed.inc();
            metrics.latest_processed_block.set(self.current_block as f64);
        }
        self.current_block += 1;
        Ok(())
    }

    /// Classifies every extrinsic of interest in the block and applies it to
    /// the ledger, or routes it out as a transfer.
    async fn process_block(&self, hash: subxt::utils::H256) -> Result<()> {
        let number = self.chain.block_number(hash).await?;
        let responses = self.chain.extrinsics_for_account(number).await?;
        for response in &responses {
            let current_tx = MultiSignTxKey::new(number, response.extrinsic_index);
            let Some(event) = classifier::classify(response) else {
                tracing::debug!(
                    block = number,
                    index = response.extrinsic_index,
                    "skipping an extrinsic with no actionable payload",
                );
                continue;
            };
            match event {
                MultiSigEvent::AsMultiNew(call) => {
                    tracing::info!(block = number, "Find a MultiSign New extrinsic");
                    let record = MultiSigRecord {
                        executed: false,
                        threshold: call.threshold,
                        maybe_timepoint: call.maybe_timepoint,
                        dest_address: call.dest_address,
                        dest_amount: call.dest_amount,
                        others: vec![call.other_signatories],
                        store_call: call.store_call,
                        max_weight: call.max_weight,
                        origin_key: current_tx,
                    };
                    self.ledger.insert_new(current_tx, record);
                }
                MultiSigEvent::AsMultiApprove(vote) => {
                    tracing::info!(
                        block = number,
                        "Find a MultiSign Approve extrinsic",
                    );
                    let matched = self.ledger.append_vote(
                        &vote.dest_address,
                        &vote.dest_amount,
                        vote.other_signatories,
                    );
                    if matched > 0 {
                        tracing::info!(
                            voter = %response.from_address,
                            "relayer vote recorded",
                        );
                    }
                }
                MultiSigEvent::AsMultiExecuted(vote) => {
                    tracing::info!(
                        block = number,
                        "Find a MultiSign Executed extrinsic",
                    );
                    self.ledger.append_vote(
                        &vote.dest_address,
                        &vote.dest_amount,
                        vote.other_signatories,
                    );
                    let executed = self
                        .ledger
                        .mark_executed(&vote.dest_address, &vote.dest_amount);
                    if executed > 0 {
                        tracing::info!(
                            dest = %vote.dest_address,
                            amount = %vote.dest_amount,
                            "Tx executed!",
                        );
                    }
                }
                MultiSigEvent::UtilityBatch(deposit) => {
                    tracing::info!(
                        block = number,
                        "Find a MultiSign Batch extrinsic",
                    );
                    self.route_deposit(number, deposit).await?;
                }
            }
        }
        Ok(())
    }

    /// Applies the fee policy to a deposit and hands the resulting transfer
    /// to the router. Router failures are logged, not propagated; an
    /// unparsable amount or an overflowing nonce aborts the block so the
    /// caller can retry it.
    async fn route_deposit(&self, number: u64, deposit: BatchDeposit) -> Result<()> {
        let amount: u128 = deposit.amount.parse().map_err(|_| {
            Error::Decode(format!("unparsable deposit amount: {}", deposit.amount))
        })?;
        let Some(actual) = self.fees.apply(amount) else {
            tracing::info!(
                amount = %deposit.amount,
                "deposit does not cover the fee, dropped",
            );
            return Ok(());
        };
        let nonce = derive_deposit_nonce(number, deposit.extrinsic_index)?;
        let message = TransferMessage::fungible(
            self.chain_id,
            self.destination_chain_id,
            nonce,
            actual,
            self.resource_id,
            deposit.recipient,
        );
        tracing::info!(
            amount = actual as u64,
            nonce,
            from = %deposit.from_address,
            "Ready to route an outbound transfer ...",
        );
        match self.router.send(message).await {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.transfers_routed.inc();
                }
            }
            Err(e) => {
                tracing::error!("failed to hand the transfer to the router: {e}");
            }
        }
        Ok(())
    }
}
