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
//! The seam between the follower and whatever writes to the destination
//! chain. The router owns durability and retry on its side; the follower
//! only logs a failed hand-off and keeps going.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::TransferMessage;

/// The sole path from source-chain observation to destination settlement.
#[async_trait]
pub trait Router: Send + Sync {
    /// Accepts one outbound transfer for settlement.
    async fn send(&self, message: TransferMessage) -> Result<()>;
}

/// A router backed by an unbounded channel; the consuming half is handed to
/// the destination-chain writer.
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    tx: mpsc::UnboundedSender<TransferMessage>,
}

impl ChannelRouter {
    /// Creates the router and the receiving half for the writer.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<TransferMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Router for ChannelRouter {
    async fn send(&self, message: TransferMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Generic("destination router channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceId;

    #[tokio::test]
    async fn messages_reach_the_receiving_half() {
        let (router, mut rx) = ChannelRouter::unbounded();
        let message = TransferMessage::fungible(
            1,
            2,
            2004,
            999_000,
            ResourceId::default(),
            b"0xdead".to_vec(),
        );
        router.send(message.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), message);
    }

    #[tokio::test]
    async fn closed_receiver_reports_an_error() {
        let (router, rx) = ChannelRouter::unbounded();
        drop(rx);
        let message = TransferMessage::fungible(
            1,
            2,
            1,
            1,
            ResourceId::default(),
            vec![],
        );
        assert!(router.send(message).await.is_err());
    }
}
