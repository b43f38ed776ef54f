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
//! # Relayer Store Module 🕸️
//!
//! Persistence for the follower's block checkpoint, so a restarted relayer
//! re-scans only blocks whose height exceeds what it already processed.

use std::sync::Arc;

use crate::error::Result;
use crate::types::ChainId;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
pub mod sled;

pub use self::sled::SledBlockStore;
pub use mem::InMemoryStore;

/// BlockStore is a simple trait for persisting and retrieving the highest
/// fully-processed block height per chain.
pub trait BlockStore: Send + Sync {
    /// Persists the highest fully-processed block for the chain.
    fn store_block(&self, chain_id: ChainId, block_number: u64) -> Result<()>;

    /// Get the last stored block for the chain.
    /// if not found, returns the `default_block_number`.
    fn last_block(
        &self,
        chain_id: ChainId,
        default_block_number: u64,
    ) -> Result<u64>;
}

impl<S: BlockStore> BlockStore for Arc<S> {
    fn store_block(&self, chain_id: ChainId, block_number: u64) -> Result<()> {
        S::store_block(self, chain_id, block_number)
    }

    fn last_block(
        &self,
        chain_id: ChainId,
        default_block_number: u64,
    ) -> Result<u64> {
        S::last_block(self, chain_id, default_block_number)
    }
}
