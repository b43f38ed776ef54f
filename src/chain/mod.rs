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
//! # Chain View 🕸️
//!
//! A thin read-and-submit interface over the source chain node. The follower
//! and the submitter only ever talk to the chain through [`ChainView`], which
//! keeps the transport swappable and the tasks testable against an in-memory
//! fake. The subxt-backed implementation lives in [`substrate`].

use async_trait::async_trait;
use subxt::utils::{AccountId32, H256};

use crate::error::Result;
use crate::types::Timepoint;

/// The subxt backed implementation of [`ChainView`].
pub mod substrate;

pub use substrate::SubstrateChainView;

/// One decoded extrinsic of interest from a finalized block: either a
/// multisig call over the watched account or a user deposit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtrinsicResponse {
    /// On-chain index of the extrinsic within its block.
    pub extrinsic_index: u32,
    /// Hex encoded signer account, no `0x` prefix.
    pub from_address: String,
    /// The decoded call payload.
    pub kind: ExtrinsicKind,
}

/// The decoded payload of an [`ExtrinsicResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtrinsicKind {
    /// A `multisig.as_multi` call over the watched multisig account.
    AsMulti(AsMultiCall),
    /// A user deposit: a `utility.batch` transferring into the multisig
    /// account with the destination recipient attached.
    BatchTransfer(BatchTransfer),
}

/// Decoded arguments of a `multisig.as_multi` extrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsMultiCall {
    /// The M in M-of-N.
    pub threshold: u16,
    /// The caller's view of the other N-1 signatories.
    pub other_signatories: Vec<AccountId32>,
    /// Reference to the initiating call; absent on the initiating one.
    pub maybe_timepoint: Option<Timepoint>,
    /// The encoded inner call bytes as carried on the wire.
    pub call_bytes: Vec<u8>,
    /// The weight limit carried by the call.
    pub max_weight: u64,
    /// Whether this call completed the multisig, per the block's
    /// `Multisig::MultisigExecuted` events.
    pub executed: bool,
    /// The inner `balances.transfer_keep_alive` target, when decodable.
    pub transfer: Option<(AccountId32, u128)>,
}

/// Decoded payload of a deposit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTransfer {
    /// Amount transferred into the multisig account, base units.
    pub amount: u128,
    /// Recipient bytes for the destination chain, from the batched remark.
    pub recipient: Vec<u8>,
}

/// Arguments for one signed `multisig.as_multi` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsMultiSubmission {
    /// The M in M-of-N.
    pub threshold: u16,
    /// The relayer's peers, sorted as the pallet requires.
    pub other_signatories: Vec<AccountId32>,
    /// Present when approving an in-flight multisig, absent when initiating.
    pub maybe_timepoint: Option<Timepoint>,
    /// Recipient of the inner `balances.transfer_keep_alive`.
    pub dest: AccountId32,
    /// Amount of the inner transfer, base units.
    pub amount: u128,
    /// Weight limit: 0 when initiating, the configured limit when approving.
    pub max_weight: u64,
}

/// Thin read interface over a Substrate node plus the single submission
/// entry point the submitter needs. No business logic lives behind it.
#[async_trait]
pub trait ChainView: Send + Sync {
    /// The hash of the highest finalized block.
    async fn finalized_head(&self) -> Result<H256>;

    /// The height of the block with the given hash, from its header.
    async fn header_number(&self, hash: H256) -> Result<u64>;

    /// The hash of the block at the given height.
    ///
    /// Fails with [`Error::BlockNotReady`](crate::Error::BlockNotReady) when
    /// the node does not have the block yet.
    async fn block_hash(&self, number: u64) -> Result<H256>;

    /// The height of the full block with the given hash.
    async fn block_number(&self, hash: H256) -> Result<u64>;

    /// The decoded extrinsics of interest in the block at the given height:
    /// multisig calls over the watched account and deposit batches into it.
    async fn extrinsics_for_account(
        &self,
        number: u64,
    ) -> Result<Vec<ExtrinsicResponse>>;

    /// Re-fetches runtime metadata and version so call encoding stays in
    /// sync across runtime upgrades.
    async fn refresh_runtime(&self) -> Result<()>;

    /// Signs and submits one `multisig.as_multi` extrinsic and returns as
    /// soon as it is handed to the node; inclusion is observed through the
    /// ledger, not awaited here.
    async fn submit_as_multi(&self, submission: AsMultiSubmission) -> Result<()>;

    /// The height of the highest finalized block.
    async fn finalized_number(&self) -> Result<u64> {
        let head = self.finalized_head().await?;
        self.header_number(head).await
    }
}
