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
use std::fmt;

use serde::{Deserialize, Serialize};
use subxt::utils::AccountId32;
use subxt_signer::sr25519::Keypair;

use crate::error::{Error, Result};

/// A custom type to support `Suri` deserialization from environment variables.
pub mod suri;

/// A chain identifier on the bridge, one byte like the wire format expects.
pub type ChainId = u8;

/// The nonce that uniquely identifies one deposit on the bridge.
pub type DepositNonce = u64;

/// A 32-byte identifier disambiguating asset types across the bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceId(pub [u8; 32]);

impl ResourceId {
    /// Parses a resource id from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| Error::Decode(format!("invalid resource id: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Decode("resource id must be 32 bytes".into())
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Identity of a multisig origin: the `(block, index)` pair of the extrinsic
/// that initiated it.
///
/// The sentinel [`NOT_EXECUTED`] marks "not executed / not applicable".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MultiSignTxKey {
    /// Height of the initiating extrinsic, `-1` for the sentinel.
    pub block_number: i64,
    /// On-chain index of the initiating extrinsic within its block.
    pub index: u32,
}

/// The sentinel key denoting "not executed / not applicable".
pub const NOT_EXECUTED: MultiSignTxKey = MultiSignTxKey {
    block_number: -1,
    index: 0,
};

impl MultiSignTxKey {
    /// Creates a key for a real on-chain origin.
    pub fn new(block_number: u64, index: u32) -> Self {
        Self {
            block_number: block_number as i64,
            index,
        }
    }
}

impl fmt::Display for MultiSignTxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block_number, self.index)
    }
}

/// The `(height, index)` pair that the multisig pallet uses to reference the
/// initiating `as_multi` call from every subsequent approval.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timepoint {
    /// Height of the initiating extrinsic.
    pub height: u32,
    /// Extrinsic index of the initiating extrinsic.
    pub index: u32,
}

impl From<MultiSignTxKey> for Timepoint {
    fn from(key: MultiSignTxKey) -> Self {
        Self {
            height: key.block_number.max(0) as u32,
            index: key.index,
        }
    }
}

/// The coordination ledger entry tracking one in-flight multisig transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSigRecord {
    /// Whether the multisig executed on chain. Transitions to `true` once
    /// and never back.
    pub executed: bool,
    /// The M in M-of-N.
    pub threshold: u16,
    /// Timepoint carried by the observed call; absent on the initiating one.
    pub maybe_timepoint: Option<Timepoint>,
    /// Hex encoded recipient on the source chain, no `0x` prefix.
    pub dest_address: String,
    /// Planned transfer amount in base units, as a decimal string.
    pub dest_amount: String,
    /// One `other_signatories` list per observed vote, in observation order.
    pub others: Vec<Vec<String>>,
    /// The encoded inner call, preserved so late joiners can verify.
    pub store_call: Vec<u8>,
    /// Weight limit carried by the observed call.
    pub max_weight: u64,
    /// The key of the initiating extrinsic. Records are keyed by this.
    pub origin_key: MultiSignTxKey,
}

/// An outbound event produced for every observed deposit, handed to the
/// [`Router`](crate::router::Router) for settlement on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMessage {
    /// The chain the deposit was observed on.
    pub source: ChainId,
    /// The chain the funds are heading to.
    pub destination: ChainId,
    /// Deterministic nonce derived from the deposit's `(block, index)`.
    pub deposit_nonce: DepositNonce,
    /// Asset identifier across the bridge.
    pub resource_id: ResourceId,
    /// Transfer amount in base units, big-endian bytes.
    pub amount: Vec<u8>,
    /// Recipient, as raw bytes understood by the receiving side.
    pub recipient: Vec<u8>,
}

impl TransferMessage {
    /// Builds a fungible transfer message.
    pub fn fungible(
        source: ChainId,
        destination: ChainId,
        deposit_nonce: DepositNonce,
        amount: u128,
        resource_id: ResourceId,
        recipient: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            deposit_nonce,
            resource_id,
            amount: amount.to_be_bytes().to_vec(),
            recipient,
        }
    }

    /// Interprets the amount payload as a big-endian unsigned integer.
    ///
    /// Returns `None` when the payload is wider than 128 bits.
    pub fn amount_u128(&self) -> Option<u128> {
        let stripped: Vec<u8> = self
            .amount
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        if stripped.len() > 16 {
            return None;
        }
        let mut buf = [0u8; 16];
        buf[16 - stripped.len()..].copy_from_slice(&stripped);
        Some(u128::from_be_bytes(buf))
    }

    /// Interprets the recipient payload as a hex account string and strips
    /// any `0x` prefix. Returns `None` when the payload is not valid hex.
    pub fn recipient_hex(&self) -> Option<String> {
        let s = std::str::from_utf8(&self.recipient).ok()?;
        let s = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(s).ok()?;
        Some(s.to_lowercase())
    }
}

/// Derives the deterministic deposit nonce from the deposit's position on
/// chain: the decimal digits of the block number followed by the decimal
/// digits of the extrinsic index, read back as one integer.
///
/// The concatenation is injective over `(block, index)` pairs within the
/// 63-bit range; anything wider is rejected instead of wrapping.
pub fn derive_deposit_nonce(block: u64, index: u32) -> Result<DepositNonce> {
    format!("{block}{index}")
        .parse::<i64>()
        .map(|n| n as u64)
        .map_err(|_| Error::NonceOutOfRange { block, index })
}

/// Everything the submitter needs to know about this relayer's place in the
/// signatory set.
pub struct RelayerIdentity {
    /// The relayer's signing key.
    pub signer: Keypair,
    /// Index of this relayer in `[0, total)`.
    pub index: u64,
    /// Total number of relayers in the set.
    pub total: u64,
    /// The M in M-of-N.
    pub threshold: u16,
    /// The N-1 peer accounts, sorted as the multisig pallet requires.
    pub other_signatories: Vec<AccountId32>,
    /// Weight limit to attach to approvals.
    pub max_weight: u64,
}

impl RelayerIdentity {
    /// The relayer's own account id.
    pub fn account(&self) -> AccountId32 {
        AccountId32(self.signer.public_key().0)
    }

    /// The relayer's own account, hex encoded without a `0x` prefix.
    pub fn account_hex(&self) -> String {
        hex::encode(self.signer.public_key().0)
    }
}

impl fmt::Debug for RelayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayerIdentity")
            .field("index", &self.index)
            .field("total", &self.total)
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_nonce_concatenates_decimal_digits() {
        assert_eq!(derive_deposit_nonce(200, 4).unwrap(), 2004);
        assert_eq!(derive_deposit_nonce(100, 3).unwrap(), 1003);
        assert_eq!(derive_deposit_nonce(1, 0).unwrap(), 10);
    }

    #[test]
    fn deposit_nonce_is_injective_for_nearby_positions() {
        let mut seen = std::collections::HashSet::new();
        for block in 990..1010u64 {
            for index in 0..12u32 {
                assert!(seen.insert(derive_deposit_nonce(block, index).unwrap()));
            }
        }
    }

    #[test]
    fn deposit_nonce_rejects_63_bit_overflow() {
        let err = derive_deposit_nonce(u64::MAX, 99).unwrap_err();
        assert!(matches!(err, Error::NonceOutOfRange { .. }));
    }

    #[test]
    fn amount_payload_round_trips() {
        let m = TransferMessage::fungible(
            1,
            2,
            2004,
            999_000,
            ResourceId::default(),
            b"0xdead".to_vec(),
        );
        assert_eq!(m.amount_u128(), Some(999_000));
    }

    #[test]
    fn recipient_hex_strips_prefix() {
        let m = TransferMessage::fungible(
            1,
            2,
            1,
            1,
            ResourceId::default(),
            b"0xDEADBEEF".to_vec(),
        );
        assert_eq!(m.recipient_hex().as_deref(), Some("deadbeef"));
    }

    #[test]
    fn recipient_hex_rejects_garbage() {
        let m = TransferMessage::fungible(
            1,
            2,
            1,
            1,
            ResourceId::default(),
            vec![0xff, 0xfe],
        );
        assert_eq!(m.recipient_hex(), None);
    }

    #[test]
    fn resource_id_hex_round_trip() {
        let id = ResourceId::from_hex(
            "0x00000000000000000000000000000000000000000000000000000000000000ff",
        )
        .unwrap();
        assert_eq!(id.0[31], 0xff);
        assert_eq!(ResourceId::from_hex(&id.to_string()).unwrap(), id);
        assert!(ResourceId::from_hex("0xdead").is_err());
    }

    #[test]
    fn timepoint_from_sentinel_clamps_height() {
        let tp = Timepoint::from(NOT_EXECUTED);
        assert_eq!(tp.height, 0);
        assert_eq!(tp.index, 0);
    }
}
