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
//! # Multisig Submitter 🕸️
//!
//! Per message arriving from the destination chain, a background task that
//! lands exactly one matching multisig effect on the source chain. The task
//! paces itself on the round rotation, consults the ledger the follower
//! keeps fresh, and infers its own past votes from the signatory lists the
//! pallet reports, so replays and races submit nothing twice.

use std::sync::Arc;
use std::time::Duration;

use subxt::utils::AccountId32;

use crate::chain::{AsMultiSubmission, ChainView};
use crate::config::{FeeConfig, RelayerConfig};
use crate::error::{Error, Result};
use crate::ledger::CoordinationLedger;
use crate::metric::Metrics;
use crate::scheduler::RoundScheduler;
use crate::types::{
    MultiSigRecord, MultiSignTxKey, RelayerIdentity, Timepoint, TransferMessage,
    NOT_EXECUTED,
};

/// What one redeem attempt concluded.
#[derive(Debug, PartialEq, Eq)]
enum RedeemOutcome {
    /// The transfer needs no further submissions. A real origin key means
    /// the multisig executed and its record can be dropped; the sentinel
    /// means there is simply nothing left for this relayer to do.
    Finished(MultiSignTxKey),
    /// One extrinsic was handed to the chain; the ledger will show whether
    /// it was enough.
    Pending,
}

/// The multisig submitter.
pub struct Submitter<V> {
    chain: Arc<V>,
    ledger: Arc<CoordinationLedger>,
    identity: Arc<RelayerIdentity>,
    scheduler: RoundScheduler,
    fees: FeeConfig,
    one_token: u128,
    round_interval: Duration,
    retry_limit: u32,
    metrics: Option<Metrics>,
}

impl<V> Clone for Submitter<V> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            ledger: self.ledger.clone(),
            identity: self.identity.clone(),
            scheduler: self.scheduler,
            fees: self.fees,
            one_token: self.one_token,
            round_interval: self.round_interval,
            retry_limit: self.retry_limit,
            metrics: self.metrics.clone(),
        }
    }
}

impl<V> Submitter<V>
where
    V: ChainView + 'static,
{
    /// Creates a submitter bound to one relayer identity.
    pub fn new(
        chain: Arc<V>,
        ledger: Arc<CoordinationLedger>,
        identity: Arc<RelayerIdentity>,
        config: &RelayerConfig,
        metrics: Option<Metrics>,
    ) -> Self {
        let scheduler =
            RoundScheduler::new(identity.total, config.rounds.stride);
        Self {
            chain,
            ledger,
            identity,
            scheduler,
            fees: config.fees,
            one_token: config.bridge.one_token.into(),
            round_interval: config.rounds.interval(),
            retry_limit: config.rounds.submit_retry_limit,
            metrics,
        }
    }

    /// Accepts one inbound message and spawns the background task that will
    /// see it through. Always returns `true`; progress and failure are
    /// reported through the logs.
    pub fn resolve_message(&self, message: TransferMessage) -> bool {
        let this = self.clone();
        tokio::spawn(async move {
            this.redeem_loop(message).await;
        });
        true
    }

    /// The bounded retry loop around single redeem attempts.
    async fn redeem_loop(&self, message: TransferMessage) {
        tracing::info!(nonce = message.deposit_nonce, "Start a redeem task ...");
        let mut retries = self.retry_limit;
        loop {
            match self.redeem(&message).await {
                Ok(RedeemOutcome::Finished(origin)) => {
                    tracing::info!(
                        nonce = message.deposit_nonce,
                        "finish a redeem task",
                    );
                    if origin != NOT_EXECUTED {
                        tracing::info!(
                            nonce = message.deposit_nonce,
                            block = origin.block_number,
                            "MultiSig extrinsic executed!",
                        );
                        self.ledger.remove(&origin);
                    }
                    return;
                }
                Ok(RedeemOutcome::Pending) => {}
                Err(e) => {
                    tracing::warn!(
                        nonce = message.deposit_nonce,
                        "redeem attempt failed: {e}",
                    );
                }
            }
            retries -= 1;
            if retries == 0 {
                tracing::error!(
                    nonce = message.deposit_nonce,
                    "Can't finish the redeem task, check it",
                );
                return;
            }
            // one submission per round; the follower needs a round to show
            // us the effects before the next read.
            tokio::time::sleep(self.round_interval).await;
        }
    }

    /// One attempt: wait for our shift, then either initiate the multisig,
    /// approve the in-flight one, or conclude that nothing is left to do.
    async fn redeem(&self, message: &TransferMessage) -> Result<RedeemOutcome> {
        // keep call encoding in sync across runtime upgrades.
        self.chain.refresh_runtime().await?;

        let raw = message.amount_u128().ok_or_else(|| {
            Error::Decode("amount payload is wider than 128 bits".into())
        })?;
        // the source token carries more decimals than the destination one.
        let adjusted = raw / self.one_token;
        let Some(actual) = self.fees.apply(adjusted) else {
            tracing::info!(
                nonce = message.deposit_nonce,
                "Transfer amount is too low to pay the fee, skip",
            );
            return Ok(RedeemOutcome::Finished(NOT_EXECUTED));
        };
        let dest_hex = message.recipient_hex().ok_or_else(|| {
            Error::Decode("recipient payload is not a hex account".into())
        })?;
        let dest = account_from_hex(&dest_hex)?;
        let dest_amount = actual.to_string();

        loop {
            let height = self.chain.finalized_number().await?;
            if !self.scheduler.is_my_turn(height, self.identity.index) {
                // round over, wait for ours.
                tokio::time::sleep(self.round_interval).await;
                continue;
            }

            let (maybe_timepoint, max_weight) =
                match self.ledger.find_matching(&dest_hex, &dest_amount) {
                    Some(record) => match self.is_finish(&record) {
                        Some(origin) => {
                            return Ok(RedeemOutcome::Finished(origin))
                        }
                        None => (
                            Some(Timepoint::from(record.origin_key)),
                            self.identity.max_weight,
                        ),
                    },
                    None => (None, 0),
                };

            match maybe_timepoint {
                Some(tp) => tracing::info!(
                    block = tp.height,
                    index = tp.index,
                    nonce = message.deposit_nonce,
                    "Try to approve a MultiSign tx!",
                ),
                None => tracing::info!(
                    nonce = message.deposit_nonce,
                    "Try to make a new MultiSign tx!",
                ),
            }

            self.chain
                .submit_as_multi(AsMultiSubmission {
                    threshold: self.identity.threshold,
                    other_signatories: self.identity.other_signatories.clone(),
                    maybe_timepoint,
                    dest,
                    amount: actual,
                    max_weight,
                })
                .await?;
            if let Some(metrics) = &self.metrics {
                metrics.multisig_submissions.inc();
            }
            return Ok(RedeemOutcome::Pending);
        }
    }

    /// Whether the record needs anything more from this relayer.
    ///
    /// `Some(origin)` reports execution, `Some(NOT_EXECUTED)` reports "we
    /// already voted, stop", `None` means proceed with an approval.
    fn is_finish(&self, record: &MultiSigRecord) -> Option<MultiSignTxKey> {
        if record.executed {
            return Some(record.origin_key);
        }
        let me = self.identity.account_hex();
        for others in &record.others {
            // the pallet reports each vote's signatories as the caller's
            // peers, so our absence from a list means we were that caller.
            let voted = !others.iter().any(|signatory| signatory == &me);
            if voted {
                tracing::info!(
                    block = record.origin_key.block_number,
                    index = record.origin_key.index,
                    "relayer has voted, exit!",
                );
                return Some(NOT_EXECUTED);
            }
        }
        None
    }
}

fn account_from_hex(hex_account: &str) -> Result<AccountId32> {
    let bytes = hex::decode(hex_account)
        .map_err(|e| Error::Decode(format!("invalid recipient hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Decode("recipient must be 32 bytes".into()))?;
    Ok(AccountId32(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_config, MockChainView};
    use crate::types::ResourceId;
    use subxt_signer::sr25519::dev;

    fn identity() -> Arc<RelayerIdentity> {
        let signer = dev::alice();
        let mut other_signatories = vec![
            AccountId32(dev::bob().public_key().0),
            AccountId32(dev::charlie().public_key().0),
        ];
        other_signatories.sort_by(|a, b| a.0.cmp(&b.0));
        Arc::new(RelayerIdentity {
            signer,
            index: 0,
            total: 3,
            threshold: 2,
            other_signatories,
            max_weight: 2_269_800_000,
        })
    }

    /// A finalized height on which relayer 0 of 3 is on shift.
    const MY_HEIGHT: u64 = 201;

    fn submitter(chain: Arc<MockChainView>) -> Submitter<MockChainView> {
        chain.set_finalized(MY_HEIGHT);
        Submitter::new(
            chain,
            Arc::new(CoordinationLedger::new()),
            identity(),
            &sample_config(),
            None,
        )
    }

    fn dest_account() -> AccountId32 {
        AccountId32([0xcd; 32])
    }

    /// A message whose payload carries one source token, which adjusts to
    /// 1_000_000 destination base units and nets 999_000 after the fee.
    fn message() -> TransferMessage {
        TransferMessage::fungible(
            2,
            1,
            2004,
            1_000_000_000_000,
            ResourceId::default(),
            format!("0x{}", "cd".repeat(32)).into_bytes(),
        )
    }

    fn in_flight_record(others: Vec<Vec<String>>, executed: bool) -> MultiSigRecord {
        MultiSigRecord {
            executed,
            threshold: 2,
            maybe_timepoint: None,
            dest_address: "cd".repeat(32),
            dest_amount: "999000".into(),
            others,
            store_call: vec![],
            max_weight: 0,
            origin_key: MultiSignTxKey::new(100, 3),
        }
    }

    #[tokio::test]
    async fn no_match_initiates_a_new_multisig() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());

        let outcome = submitter.redeem(&message()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Pending);

        let submissions = chain.submissions.lock();
        assert_eq!(submissions.len(), 1);
        let s = &submissions[0];
        assert_eq!(s.maybe_timepoint, None);
        assert_eq!(s.max_weight, 0);
        assert_eq!(s.amount, 999_000);
        assert_eq!(s.dest, dest_account());
        assert_eq!(s.threshold, 2);
        assert_eq!(s.other_signatories.len(), 2);
    }

    #[tokio::test]
    async fn a_match_gets_an_approval_with_its_timepoint() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        // someone else initiated; their peer list contains us, so we have
        // not voted yet.
        let me = submitter.identity.account_hex();
        submitter.ledger.insert_new(
            MultiSignTxKey::new(100, 3),
            in_flight_record(vec![vec![me, "bb".repeat(32)]], false),
        );

        let outcome = submitter.redeem(&message()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Pending);

        let submissions = chain.submissions.lock();
        assert_eq!(submissions.len(), 1);
        let s = &submissions[0];
        assert_eq!(
            s.maybe_timepoint,
            Some(Timepoint {
                height: 100,
                index: 3,
            }),
        );
        assert_eq!(s.max_weight, 2_269_800_000);
    }

    #[tokio::test]
    async fn own_vote_is_inferred_from_the_signatory_lists() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        // one observed vote whose peer list omits us: we were its caller.
        submitter.ledger.insert_new(
            MultiSignTxKey::new(100, 3),
            in_flight_record(vec![vec!["bb".repeat(32)]], false),
        );

        let outcome = submitter.redeem(&message()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Finished(NOT_EXECUTED));
        assert!(chain.submissions.lock().is_empty());
        // nothing executed, so the record stays for the other relayers.
        assert_eq!(submitter.ledger.len(), 1);
    }

    #[tokio::test]
    async fn executed_records_are_deleted_by_the_loop() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        let origin = MultiSignTxKey::new(100, 3);
        submitter
            .ledger
            .insert_new(origin, in_flight_record(vec![vec!["bb".repeat(32)]], true));

        submitter.redeem_loop(message()).await;
        assert!(chain.submissions.lock().is_empty());
        assert!(submitter.ledger.get(&origin).is_none());
    }

    #[tokio::test]
    async fn dust_after_decimal_adjustment_terminates_quietly() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        // less than one source token adjusts down to nothing.
        let message = TransferMessage::fungible(
            2,
            1,
            7,
            999_999,
            ResourceId::default(),
            format!("0x{}", "cd".repeat(32)).into_bytes(),
        );
        let outcome = submitter.redeem(&message).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Finished(NOT_EXECUTED));
        assert!(chain.submissions.lock().is_empty());
    }

    #[tokio::test]
    async fn one_vote_per_relayer_across_rounds() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        let me = submitter.identity.account_hex();
        let origin = MultiSignTxKey::new(100, 3);
        submitter.ledger.insert_new(
            origin,
            in_flight_record(vec![vec![me, "bb".repeat(32)]], false),
        );

        // first round: we approve.
        let outcome = submitter.redeem(&message()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Pending);
        assert_eq!(chain.submissions.lock().len(), 1);

        // the follower then observes our approval; its peer list is our
        // peers, which do not include us.
        let peers: Vec<String> = submitter
            .identity
            .other_signatories
            .iter()
            .map(|a| hex::encode(a.0))
            .collect();
        submitter.ledger.append_vote(&"cd".repeat(32), "999000", peers);

        // next round: the membership check stops us from double voting.
        let outcome = submitter.redeem(&message()).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::Finished(NOT_EXECUTED));
        assert_eq!(chain.submissions.lock().len(), 1);
    }

    #[tokio::test]
    async fn garbled_recipient_is_an_error() {
        let chain = Arc::new(MockChainView::new(0));
        let submitter = submitter(chain.clone());
        let mut message = message();
        message.recipient = vec![0xff, 0x00];
        assert!(submitter.redeem(&message).await.is_err());
    }
}
