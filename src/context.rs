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
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.

use subxt::utils::AccountId32;
use subxt_signer::sr25519::Keypair;
use tokio::sync::broadcast;

use crate::chain::substrate::multi_account_id;
use crate::config::RelayerConfig;
use crate::error::{Error, Result};
use crate::metric::Metrics;
use crate::types::RelayerIdentity;

/// RelayerContext contains the relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: RelayerConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// The initial `shutdown` trigger is provided by the binary. Each
    /// long-running task holds a broadcast receiver handle; when a graceful
    /// shutdown is initiated, a `()` value is sent and every task reaches a
    /// safe terminal state.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the relayer.
    pub metrics: Metrics,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(config: RelayerConfig) -> Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Metrics::new()?;
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Sets up and returns the relayer's Substrate signing key.
    pub fn substrate_wallet(&self) -> Result<Keypair> {
        let suri = self
            .config
            .source
            .suri
            .clone()
            .ok_or(Error::MissingSecrets)?;
        Ok(suri.into())
    }

    /// Builds this relayer's identity within the configured signatory set:
    /// its key, its index, and its peers sorted the way the multisig pallet
    /// expects them.
    pub fn relayer_identity(&self) -> Result<RelayerIdentity> {
        let multisig = &self.config.source.multisig;
        let signer = self.substrate_wallet()?;
        let own_account = AccountId32(signer.public_key().0);
        let signatories = multisig.signatory_accounts()?;
        if !signatories.contains(&own_account) {
            return Err(Error::SignatoryNotInSet);
        }
        let mut other_signatories: Vec<AccountId32> = signatories
            .into_iter()
            .filter(|a| a != &own_account)
            .collect();
        other_signatories.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(RelayerIdentity {
            signer,
            index: multisig.relayer_index,
            total: multisig.total_relayers,
            threshold: multisig.threshold,
            other_signatories,
            max_weight: multisig.max_weight,
        })
    }

    /// The account id of the watched multisig, derived from the configured
    /// signatory set and threshold.
    pub fn multisig_account(&self) -> Result<AccountId32> {
        let multisig = &self.config.source.multisig;
        let signatories = multisig.signatory_accounts()?;
        Ok(multi_account_id(&signatories, multisig.threshold))
    }
}

/// Listens for the relayer shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value
/// is ever sent. Once a value has been sent via the broadcast channel, every
/// task should shut down.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal
/// has been received. Callers may query for whether the shutdown signal has
/// been received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received.
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
