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
//! # Relayer Service Module 🕸️
//!
//! Builds the chain view from the configuration and ignites the long
//! running tasks: the follower over the source chain and the dispatcher
//! that turns inbound destination messages into submitter tasks.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chain::SubstrateChainView;
use crate::context::RelayerContext;
use crate::error::Result;
use crate::follower::Follower;
use crate::ledger::CoordinationLedger;
use crate::router::Router;
use crate::store::SledBlockStore;
use crate::submitter::Submitter;
use crate::types::TransferMessage;

/// Starts all background services of the relayer.
///
/// The `router` carries outbound transfers towards the destination chain;
/// `inbound` delivers the messages coming back from it. Both halves are
/// external collaborators, so the caller owns their other ends.
///
/// This does not block; every service runs on its own task under the
/// context's shutdown signal.
pub async fn ignite<R>(
    ctx: &RelayerContext,
    store: Arc<SledBlockStore>,
    router: Arc<R>,
    mut inbound: mpsc::UnboundedReceiver<TransferMessage>,
) -> Result<()>
where
    R: Router + 'static,
{
    let identity = Arc::new(ctx.relayer_identity()?);
    let multisig_account = ctx.multisig_account()?;
    tracing::info!(
        chain = %ctx.config.source.name,
        multisig = %hex::encode(multisig_account.0),
        relayer_index = identity.index,
        "starting the relayer services",
    );

    let chain = Arc::new(
        SubstrateChainView::connect(
            ctx.config.source.ws_endpoint.as_str(),
            identity.signer.clone(),
            multisig_account,
        )
        .await?,
    );
    let ledger = Arc::new(CoordinationLedger::new());

    let follower = Follower::new(
        chain.clone(),
        router,
        store,
        ledger.clone(),
        &ctx.config,
        Some(ctx.metrics.clone()),
    );
    // fails fast on a start block the chain does not have yet.
    let follower_task = follower.start(ctx.shutdown_signal()).await?;
    tokio::task::spawn(async move {
        match follower_task.await {
            Ok(Err(e)) => tracing::error!("follower stopped: {e}"),
            Err(e) => tracing::error!("follower task panicked: {e}"),
            Ok(Ok(())) => {}
        }
    });

    let submitter = Submitter::new(
        chain,
        ledger,
        identity,
        &ctx.config,
        Some(ctx.metrics.clone()),
    );
    let mut shutdown = ctx.shutdown_signal();
    tokio::task::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                maybe_message = inbound.recv() => match maybe_message {
                    Some(message) => {
                        submitter.resolve_message(message);
                    }
                    None => {
                        tracing::warn!("inbound message channel closed");
                        break;
                    }
                },
            }
        }
    });
    Ok(())
}
