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
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::BlockStore;
use crate::error::Result;
use crate::types::ChainId;

/// InMemoryStore keeps block checkpoints in memory, mainly for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    last_block_numbers: Arc<RwLock<HashMap<ChainId, u64>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl BlockStore for InMemoryStore {
    fn store_block(&self, chain_id: ChainId, block_number: u64) -> Result<()> {
        self.last_block_numbers
            .write()
            .insert(chain_id, block_number);
        Ok(())
    }

    fn last_block(
        &self,
        chain_id: ChainId,
        default_block_number: u64,
    ) -> Result<u64> {
        let guard = self.last_block_numbers.read();
        Ok(guard.get(&chain_id).copied().unwrap_or(default_block_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_until_written() {
        let store = InMemoryStore::default();
        assert_eq!(store.last_block(1, 5).unwrap(), 5);
        store.store_block(1, 9).unwrap();
        assert_eq!(store.last_block(1, 5).unwrap(), 9);
    }
}
