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
use std::path::Path;

use super::BlockStore;
use crate::error::Result;
use crate::types::ChainId;

/// SledBlockStore is a store that persists block checkpoints in a
/// [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledBlockStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledBlockStore").finish()
    }
}

impl SledBlockStore {
    /// Create a new SledBlockStore.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledBlockStore.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }
}

impl BlockStore for SledBlockStore {
    #[tracing::instrument(skip(self))]
    fn store_block(&self, chain_id: ChainId, block_number: u64) -> Result<()> {
        let tree = self.db.open_tree("last_block_numbers")?;
        tree.insert([chain_id], &block_number.to_le_bytes())?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn last_block(
        &self,
        chain_id: ChainId,
        default_block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree("last_block_numbers")?;
        let val = tree.get([chain_id])?;
        match val {
            Some(v) => {
                let mut output = [0u8; 8];
                output.copy_from_slice(&v);
                Ok(u64::from_le_bytes(output))
            }
            None => Ok(default_block_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips() {
        let store = SledBlockStore::temporary().unwrap();
        assert_eq!(store.last_block(1, 42).unwrap(), 42);
        store.store_block(1, 100).unwrap();
        store.store_block(1, 101).unwrap();
        assert_eq!(store.last_block(1, 42).unwrap(), 101);
        // other chains are unaffected.
        assert_eq!(store.last_block(2, 7).unwrap(), 7);
    }
}
