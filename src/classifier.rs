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
//! A pure four-way classifier from decoded extrinsics to multisig events.
//! No I/O happens here; the transport already did the decoding and the
//! follower does the state changes.

use crate::chain::{ExtrinsicKind, ExtrinsicResponse};
use crate::types::Timepoint;

/// The four events the follower reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiSigEvent {
    /// A multisig transfer was initiated.
    AsMultiNew(NewMultisigCall),
    /// An in-flight multisig gathered one more approval.
    AsMultiApprove(MultisigVote),
    /// A multisig reached its threshold and executed.
    AsMultiExecuted(MultisigVote),
    /// A user deposited into the multisig account, requesting an outbound
    /// transfer.
    UtilityBatch(BatchDeposit),
}

/// Payload of an initiating `as_multi` observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMultisigCall {
    /// The M in M-of-N.
    pub threshold: u16,
    /// The initiator's peers, hex encoded.
    pub other_signatories: Vec<String>,
    /// Timepoint carried by the call; absent on the initiating one.
    pub maybe_timepoint: Option<Timepoint>,
    /// Hex encoded recipient of the inner transfer, no `0x` prefix.
    pub dest_address: String,
    /// Inner transfer amount in base units, decimal string.
    pub dest_amount: String,
    /// The encoded inner call bytes.
    pub store_call: Vec<u8>,
    /// Weight limit carried by the call.
    pub max_weight: u64,
}

/// Payload of an approval or execution observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigVote {
    /// Hex encoded recipient of the inner transfer, no `0x` prefix.
    pub dest_address: String,
    /// Inner transfer amount in base units, decimal string.
    pub dest_amount: String,
    /// The voter's peers, hex encoded.
    pub other_signatories: Vec<String>,
    /// The originating timepoint the vote references; kept for the logs,
    /// the ledger keys on `(dest_address, dest_amount)` matching instead.
    pub timepoint: Option<Timepoint>,
}

/// Payload of a deposit observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDeposit {
    /// Deposited amount in base units, decimal string.
    pub amount: String,
    /// Recipient bytes for the destination chain.
    pub recipient: Vec<u8>,
    /// Hex encoded depositor account.
    pub from_address: String,
    /// On-chain index of the deposit extrinsic.
    pub extrinsic_index: u32,
}

/// Classifies one decoded extrinsic into its event, or `None` when the
/// extrinsic carries nothing this relayer can act on (for instance an
/// `as_multi` whose inner call could not be decoded).
pub fn classify(response: &ExtrinsicResponse) -> Option<MultiSigEvent> {
    match &response.kind {
        ExtrinsicKind::AsMulti(call) => {
            let (dest, amount) = call.transfer.as_ref()?;
            let dest_address = hex::encode(dest.0);
            let dest_amount = amount.to_string();
            let other_signatories: Vec<String> = call
                .other_signatories
                .iter()
                .map(|a| hex::encode(a.0))
                .collect();
            if call.executed {
                return Some(MultiSigEvent::AsMultiExecuted(MultisigVote {
                    dest_address,
                    dest_amount,
                    other_signatories,
                    timepoint: call.maybe_timepoint,
                }));
            }
            if call.maybe_timepoint.is_none() {
                return Some(MultiSigEvent::AsMultiNew(NewMultisigCall {
                    threshold: call.threshold,
                    other_signatories,
                    maybe_timepoint: call.maybe_timepoint,
                    dest_address,
                    dest_amount,
                    store_call: call.call_bytes.clone(),
                    max_weight: call.max_weight,
                }));
            }
            Some(MultiSigEvent::AsMultiApprove(MultisigVote {
                dest_address,
                dest_amount,
                other_signatories,
                timepoint: call.maybe_timepoint,
            }))
        }
        ExtrinsicKind::BatchTransfer(batch) => {
            Some(MultiSigEvent::UtilityBatch(BatchDeposit {
                amount: batch.amount.to_string(),
                recipient: batch.recipient.clone(),
                from_address: response.from_address.clone(),
                extrinsic_index: response.extrinsic_index,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AsMultiCall, BatchTransfer};
    use subxt::utils::AccountId32;

    fn as_multi(
        maybe_timepoint: Option<Timepoint>,
        executed: bool,
    ) -> ExtrinsicResponse {
        ExtrinsicResponse {
            extrinsic_index: 3,
            from_address: "11".repeat(32),
            kind: ExtrinsicKind::AsMulti(AsMultiCall {
                threshold: 2,
                other_signatories: vec![AccountId32([0xaa; 32])],
                maybe_timepoint,
                call_bytes: vec![1, 2, 3],
                max_weight: 500,
                executed,
                transfer: Some((AccountId32([0xcd; 32]), 1_000_000)),
            }),
        }
    }

    #[test]
    fn initiating_call_classifies_as_new() {
        let event = classify(&as_multi(None, false)).unwrap();
        match event {
            MultiSigEvent::AsMultiNew(call) => {
                assert_eq!(call.threshold, 2);
                assert_eq!(call.dest_address, "cd".repeat(32));
                assert_eq!(call.dest_amount, "1000000");
                assert_eq!(call.other_signatories, vec!["aa".repeat(32)]);
                assert_eq!(call.store_call, vec![1, 2, 3]);
            }
            other => panic!("expected AsMultiNew, got {other:?}"),
        }
    }

    #[test]
    fn referencing_call_classifies_as_approve() {
        let tp = Timepoint {
            height: 100,
            index: 3,
        };
        let event = classify(&as_multi(Some(tp), false)).unwrap();
        match event {
            MultiSigEvent::AsMultiApprove(vote) => {
                assert_eq!(vote.timepoint, Some(tp));
                assert_eq!(vote.dest_amount, "1000000");
            }
            other => panic!("expected AsMultiApprove, got {other:?}"),
        }
    }

    #[test]
    fn executed_flag_wins_over_timepoint() {
        let tp = Timepoint {
            height: 100,
            index: 3,
        };
        let event = classify(&as_multi(Some(tp), true)).unwrap();
        assert!(matches!(event, MultiSigEvent::AsMultiExecuted(_)));
    }

    #[test]
    fn undecodable_inner_call_is_skipped() {
        let mut response = as_multi(None, false);
        if let ExtrinsicKind::AsMulti(call) = &mut response.kind {
            call.transfer = None;
        }
        assert_eq!(classify(&response), None);
    }

    #[test]
    fn batch_deposits_carry_their_position() {
        let response = ExtrinsicResponse {
            extrinsic_index: 4,
            from_address: "ee".repeat(32),
            kind: ExtrinsicKind::BatchTransfer(BatchTransfer {
                amount: 1_000_000,
                recipient: b"0xdead".to_vec(),
            }),
        };
        let event = classify(&response).unwrap();
        match event {
            MultiSigEvent::UtilityBatch(deposit) => {
                assert_eq!(deposit.amount, "1000000");
                assert_eq!(deposit.recipient, b"0xdead".to_vec());
                assert_eq!(deposit.extrinsic_index, 4);
            }
            other => panic!("expected UtilityBatch, got {other:?}"),
        }
    }
}
