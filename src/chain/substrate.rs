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
use async_trait::async_trait;
use parity_scale_codec::Encode;
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::RpcClient;
use subxt::config::Header as _;
use subxt::ext::scale_value::{self, Composite, Primitive, ValueDef};
use subxt::tx::TxStatus;
use subxt::utils::{AccountId32, H256};
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;

use super::{
    AsMultiCall, AsMultiSubmission, BatchTransfer, ChainView, ExtrinsicKind,
    ExtrinsicResponse,
};
use crate::error::{Error, Result};
use crate::types::Timepoint;

/// A decoded value carrying the registry type id it was decoded with.
type DecodedValue = scale_value::Value<u32>;

/// Derives the deterministic account id of the multisig formed by the given
/// signatories and threshold, the way the multisig pallet does.
pub fn multi_account_id(
    signatories: &[AccountId32],
    threshold: u16,
) -> AccountId32 {
    let mut sorted: Vec<AccountId32> = signatories.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut entropy = b"modlpy/utilisuba".to_vec();
    sorted.encode_to(&mut entropy);
    threshold.encode_to(&mut entropy);
    AccountId32(sp_core_hashing::blake2_256(&entropy))
}

/// The subxt backed [`ChainView`] over a Substrate node.
///
/// Watches one multisig account and signs submissions with one relayer key.
pub struct SubstrateChainView {
    client: OnlineClient<PolkadotConfig>,
    rpc: LegacyRpcMethods<PolkadotConfig>,
    signer: Keypair,
    signer_account: AccountId32,
    multisig_account: AccountId32,
}

impl SubstrateChainView {
    /// Connects to the node and watches the given multisig account.
    pub async fn connect(
        ws_endpoint: &str,
        signer: Keypair,
        multisig_account: AccountId32,
    ) -> Result<Self> {
        let rpc_client = RpcClient::from_url(ws_endpoint).await?;
        let rpc = LegacyRpcMethods::new(rpc_client.clone());
        let client =
            OnlineClient::<PolkadotConfig>::from_rpc_client(rpc_client).await?;
        let signer_account = AccountId32(signer.public_key().0);
        Ok(Self {
            client,
            rpc,
            signer,
            signer_account,
            multisig_account,
        })
    }

    /// The multisig account this view watches.
    pub fn multisig_account(&self) -> &AccountId32 {
        &self.multisig_account
    }

    fn decode_call_bytes(&self, bytes: &[u8]) -> Option<DecodedValue> {
        let metadata = self.client.metadata();
        let call_ty = metadata.outer_enums().call_enum_ty();
        let mut cursor = bytes;
        match scale_value::scale::decode_as_type(
            &mut cursor,
            call_ty,
            metadata.types(),
        ) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("failed to decode inner call bytes: {e}");
                None
            }
        }
    }

    fn decode_as_multi(
        &self,
        signer: &AccountId32,
        fields: &Composite<u32>,
        own_timepoint: Timepoint,
        executed_timepoints: &[Timepoint],
    ) -> Option<AsMultiCall> {
        let threshold = field(fields, "threshold", 0)
            .and_then(value_as_u128)
            .and_then(|v| u16::try_from(v).ok())?;
        let other_signatories = field(fields, "other_signatories", 1)
            .map(value_as_accounts)?;

        // Only calls over the watched multisig account are of interest.
        let mut full_set = other_signatories.clone();
        full_set.push(signer.clone());
        if multi_account_id(&full_set, threshold) != self.multisig_account {
            return None;
        }

        let maybe_timepoint = field(fields, "maybe_timepoint", 2)
            .and_then(value_as_timepoint_option)?;
        let call_field = field(fields, "call", 3)?;
        let (call_bytes, call_value) = match value_as_bytes(call_field) {
            // The wire shape this relayer targets carries the inner call as
            // opaque bytes next to a store_call flag.
            Some(bytes) => {
                let decoded = self.decode_call_bytes(&bytes);
                (bytes, decoded)
            }
            // Runtimes that inline the call give us the decoded value
            // directly, with no opaque bytes to preserve.
            None => (Vec::new(), Some(call_field.clone())),
        };
        let max_weight = field(fields, "max_weight", 5)
            .or_else(|| field(fields, "max_weight", 4))
            .and_then(value_as_weight)
            .unwrap_or_default();

        let transfer = call_value.as_ref().and_then(transfer_from_call);
        let reference = maybe_timepoint.unwrap_or(own_timepoint);
        let executed = executed_timepoints.contains(&reference);

        Some(AsMultiCall {
            threshold,
            other_signatories,
            maybe_timepoint,
            call_bytes,
            max_weight,
            executed,
            transfer,
        })
    }

    fn decode_batch(&self, fields: &Composite<u32>) -> Option<BatchTransfer> {
        let calls = field(fields, "calls", 0)?;
        let calls = match &calls.value {
            ValueDef::Composite(Composite::Unnamed(values)) => values,
            _ => return None,
        };
        let mut amount = None;
        let mut recipient = None;
        for call in calls {
            if let Some((dest, value)) = transfer_from_call(call) {
                if dest == self.multisig_account {
                    amount = Some(value);
                }
            }
            if let Some(bytes) = remark_from_call(call) {
                recipient = Some(bytes);
            }
        }
        Some(BatchTransfer {
            amount: amount?,
            recipient: recipient?,
        })
    }
}

#[async_trait]
impl ChainView for SubstrateChainView {
    async fn finalized_head(&self) -> Result<H256> {
        Ok(self.rpc.chain_get_finalized_head().await?)
    }

    async fn header_number(&self, hash: H256) -> Result<u64> {
        let header = self
            .rpc
            .chain_get_header(Some(hash))
            .await?
            .ok_or(Error::Generic("no header found for the requested hash"))?;
        Ok(header.number().into())
    }

    async fn block_hash(&self, number: u64) -> Result<H256> {
        let maybe_hash =
            self.rpc.chain_get_block_hash(Some(number.into())).await?;
        // A missing hash is the node's way of saying the block is not
        // finalized on this endpoint yet.
        maybe_hash.ok_or(Error::BlockNotReady { number })
    }

    async fn block_number(&self, hash: H256) -> Result<u64> {
        let block = self
            .rpc
            .chain_get_block(Some(hash))
            .await?
            .ok_or(Error::Generic("no block found for the requested hash"))?;
        Ok(block.block.header.number().into())
    }

    async fn extrinsics_for_account(
        &self,
        number: u64,
    ) -> Result<Vec<ExtrinsicResponse>> {
        let hash = self.block_hash(number).await?;
        let block = self.client.blocks().at(hash).await?;
        let events = block.events().await?;

        // The pallet reports execution through events, not through the call
        // itself, so gather the executed timepoints first.
        let mut executed_timepoints = Vec::new();
        for event in events.iter() {
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("skipping undecodable event: {e}");
                    continue;
                }
            };
            if event.pallet_name() != "Multisig"
                || event.variant_name() != "MultisigExecuted"
            {
                continue;
            }
            let fields = match event.field_values() {
                Ok(f) => f,
                Err(e) => {
                    tracing::debug!("skipping undecodable event fields: {e}");
                    continue;
                }
            };
            let account =
                field(&fields, "multisig", 2).and_then(value_as_account);
            if account.as_ref() != Some(&self.multisig_account) {
                continue;
            }
            if let Some(tp) =
                field(&fields, "timepoint", 1).and_then(value_as_timepoint)
            {
                executed_timepoints.push(tp);
            }
        }

        let extrinsics = block.extrinsics().await?;
        let mut responses = Vec::new();
        for extrinsic in extrinsics.iter() {
            let extrinsic = match extrinsic {
                Ok(xt) => xt,
                Err(e) => {
                    tracing::debug!("skipping undecodable extrinsic: {e}");
                    continue;
                }
            };
            let Some(signer) =
                extrinsic.address_bytes().and_then(account_from_address)
            else {
                continue;
            };
            let index = extrinsic.index();
            let (pallet, variant) = match (
                extrinsic.pallet_name(),
                extrinsic.variant_name(),
            ) {
                (Ok(p), Ok(v)) => (p, v),
                _ => continue,
            };
            let kind = match (pallet, variant) {
                ("Multisig", "as_multi") => {
                    let fields = match extrinsic.field_values() {
                        Ok(f) => f,
                        Err(e) => {
                            tracing::debug!(
                                "skipping undecodable as_multi fields: {e}"
                            );
                            continue;
                        }
                    };
                    let own_timepoint = Timepoint {
                        height: number as u32,
                        index,
                    };
                    self.decode_as_multi(
                        &signer,
                        &fields,
                        own_timepoint,
                        &executed_timepoints,
                    )
                    .map(ExtrinsicKind::AsMulti)
                }
                ("Utility", "batch" | "batch_all" | "force_batch") => {
                    let fields = match extrinsic.field_values() {
                        Ok(f) => f,
                        Err(e) => {
                            tracing::debug!(
                                "skipping undecodable batch fields: {e}"
                            );
                            continue;
                        }
                    };
                    self.decode_batch(&fields).map(ExtrinsicKind::BatchTransfer)
                }
                _ => None,
            };
            if let Some(kind) = kind {
                responses.push(ExtrinsicResponse {
                    extrinsic_index: index,
                    from_address: hex::encode(signer.0),
                    kind,
                });
            }
        }
        Ok(responses)
    }

    async fn refresh_runtime(&self) -> Result<()> {
        let metadata = self.rpc.state_get_metadata(None).await?;
        self.client.set_metadata(metadata);
        let version = self.rpc.state_get_runtime_version(None).await?;
        self.client.set_runtime_version(subxt::backend::RuntimeVersion {
            spec_version: version.spec_version,
            transaction_version: version.transaction_version,
        });
        Ok(())
    }

    async fn submit_as_multi(&self, submission: AsMultiSubmission) -> Result<()> {
        use subxt::dynamic::{tx, Value};

        let inner = tx(
            "Balances",
            "transfer_keep_alive",
            vec![
                Value::unnamed_variant(
                    "Id",
                    [Value::from_bytes(submission.dest.0)],
                ),
                Value::u128(submission.amount),
            ],
        );
        let call_bytes = self.client.tx().call_data(&inner)?;

        let maybe_timepoint = match submission.maybe_timepoint {
            Some(tp) => Value::unnamed_variant(
                "Some",
                [Value::named_composite([
                    ("height", Value::u128(tp.height.into())),
                    ("index", Value::u128(tp.index.into())),
                ])],
            ),
            None => Value::unnamed_variant("None", []),
        };
        let outer = tx(
            "Multisig",
            "as_multi",
            vec![
                Value::u128(submission.threshold.into()),
                Value::unnamed_composite(
                    submission
                        .other_signatories
                        .iter()
                        .map(|a| Value::from_bytes(a.0)),
                ),
                maybe_timepoint,
                Value::from_bytes(call_bytes),
                Value::bool(false),
                Value::u128(submission.max_weight.into()),
            ],
        );

        let nonce = self
            .rpc
            .system_account_next_index(&self.signer_account)
            .await?;
        // Era stays immortal and the checkpoint is the genesis hash, which
        // is exactly what the default params produce.
        let signed = self.client.tx().create_signed_with_nonce(
            &outer,
            &self.signer,
            nonce,
            Default::default(),
        )?;
        let mut progress = signed.submit_and_watch().await?;

        // Fire and observe: inclusion feeds back through the ledger, the
        // watcher below is for the logs only.
        tokio::spawn(async move {
            while let Some(status) = progress.next().await {
                match status {
                    Ok(TxStatus::InBestBlock(block)) => {
                        tracing::debug!(
                            block_hash = %block.block_hash(),
                            "multisig extrinsic included in block",
                        );
                    }
                    Ok(TxStatus::InFinalizedBlock(block)) => {
                        tracing::debug!(
                            block_hash = %block.block_hash(),
                            "multisig extrinsic finalized",
                        );
                        break;
                    }
                    Ok(TxStatus::Dropped { message }) => {
                        tracing::warn!("multisig extrinsic dropped: {message}");
                    }
                    Ok(TxStatus::Invalid { message }) => {
                        tracing::warn!("multisig extrinsic invalid: {message}");
                    }
                    Ok(TxStatus::Error { message }) => {
                        tracing::warn!("multisig extrinsic errored: {message}");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::trace!("extrinsic subscription error: {e}");
                        break;
                    }
                }
            }
        });
        Ok(())
    }
}

/// Looks a field up by name, falling back to its position for unnamed
/// composites.
fn field<'a>(
    fields: &'a Composite<u32>,
    name: &str,
    position: usize,
) -> Option<&'a DecodedValue> {
    match fields {
        Composite::Named(named) => named
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v)),
        Composite::Unnamed(values) => values.get(position),
    }
}

fn value_as_u128(value: &DecodedValue) -> Option<u128> {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) => Some(*n),
        ValueDef::Composite(Composite::Unnamed(inner)) if inner.len() == 1 => {
            value_as_u128(&inner[0])
        }
        ValueDef::Composite(Composite::Named(inner)) if inner.len() == 1 => {
            value_as_u128(&inner[0].1)
        }
        _ => None,
    }
}

/// Collects the value's primitive leaves into bytes. Works for `Vec<u8>`,
/// fixed byte arrays and newtype wrappers around either.
fn value_as_bytes(value: &DecodedValue) -> Option<Vec<u8>> {
    fn walk(value: &DecodedValue, out: &mut Vec<u8>) -> bool {
        match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => {
                u8::try_from(*n).map(|b| out.push(b)).is_ok()
            }
            ValueDef::Composite(Composite::Unnamed(inner)) => {
                inner.iter().all(|v| walk(v, out))
            }
            ValueDef::Composite(Composite::Named(inner)) => {
                inner.iter().all(|(_, v)| walk(v, out))
            }
            _ => false,
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out).then_some(out)
}

fn value_as_account(value: &DecodedValue) -> Option<AccountId32> {
    // Unwrap a MultiAddress::Id layer when present.
    if let ValueDef::Variant(variant) = &value.value {
        return match variant.name.as_str() {
            "Id" => field(&variant.values, "", 0).and_then(value_as_account),
            _ => None,
        };
    }
    let bytes = value_as_bytes(value)?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    Some(AccountId32(bytes))
}

fn value_as_accounts(value: &DecodedValue) -> Vec<AccountId32> {
    match &value.value {
        ValueDef::Composite(Composite::Unnamed(values)) => {
            values.iter().filter_map(value_as_account).collect()
        }
        _ => Vec::new(),
    }
}

fn value_as_timepoint(value: &DecodedValue) -> Option<Timepoint> {
    let fields = match &value.value {
        ValueDef::Composite(c) => c,
        _ => return None,
    };
    let height = field(fields, "height", 0).and_then(value_as_u128)?;
    let index = field(fields, "index", 1).and_then(value_as_u128)?;
    Some(Timepoint {
        height: u32::try_from(height).ok()?,
        index: u32::try_from(index).ok()?,
    })
}

fn value_as_timepoint_option(
    value: &DecodedValue,
) -> Option<Option<Timepoint>> {
    match &value.value {
        ValueDef::Variant(variant) if variant.name == "None" => Some(None),
        ValueDef::Variant(variant) if variant.name == "Some" => {
            field(&variant.values, "", 0)
                .and_then(value_as_timepoint)
                .map(Some)
        }
        _ => None,
    }
}

/// Old runtimes carry the weight limit as a plain integer, newer ones as a
/// two-field struct whose `ref_time` is the part this relayer compares.
fn value_as_weight(value: &DecodedValue) -> Option<u64> {
    if let Some(n) = value_as_u128(value) {
        return u64::try_from(n).ok();
    }
    if let ValueDef::Composite(fields) = &value.value {
        return field(fields, "ref_time", 0)
            .and_then(value_as_u128)
            .and_then(|n| u64::try_from(n).ok());
    }
    None
}

/// Extracts `(dest, amount)` from a decoded `RuntimeCall` value when it is a
/// balances transfer.
fn transfer_from_call(call: &DecodedValue) -> Option<(AccountId32, u128)> {
    let (pallet, inner) = unwrap_call(call)?;
    if pallet != "Balances" {
        return None;
    }
    let (name, fields) = match &inner.value {
        ValueDef::Variant(v) => (v.name.as_str(), &v.values),
        _ => return None,
    };
    if !matches!(
        name,
        "transfer" | "transfer_keep_alive" | "transfer_allow_death"
    ) {
        return None;
    }
    let dest = field(fields, "dest", 0).and_then(value_as_account)?;
    let amount = field(fields, "value", 1).and_then(value_as_u128)?;
    Some((dest, amount))
}

/// Extracts the remark bytes from a decoded `RuntimeCall` value when it is a
/// system remark.
fn remark_from_call(call: &DecodedValue) -> Option<Vec<u8>> {
    let (pallet, inner) = unwrap_call(call)?;
    if pallet != "System" {
        return None;
    }
    let (name, fields) = match &inner.value {
        ValueDef::Variant(v) => (v.name.as_str(), &v.values),
        _ => return None,
    };
    if !matches!(name, "remark" | "remark_with_event") {
        return None;
    }
    field(fields, "remark", 0).and_then(value_as_bytes)
}

/// Splits a `RuntimeCall` value into its pallet name and the pallet-level
/// call variant.
fn unwrap_call(call: &DecodedValue) -> Option<(&str, &DecodedValue)> {
    match &call.value {
        ValueDef::Variant(outer) => {
            let inner = field(&outer.values, "", 0)?;
            Some((outer.name.as_str(), inner))
        }
        _ => None,
    }
}

/// Reads an account id out of a SCALE encoded `MultiAddress` (or a bare
/// account id on runtimes without address lookup).
fn account_from_address(bytes: &[u8]) -> Option<AccountId32> {
    match bytes.len() {
        // MultiAddress::Id discriminant followed by the account id.
        33 if bytes[0] == 0 => {
            let id: [u8; 32] = bytes[1..].try_into().ok()?;
            Some(AccountId32(id))
        }
        32 => {
            let id: [u8; 32] = bytes.try_into().ok()?;
            Some(AccountId32(id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId32 {
        AccountId32([byte; 32])
    }

    #[test]
    fn multi_account_id_ignores_signatory_order() {
        let a = multi_account_id(&[account(1), account(2), account(3)], 2);
        let b = multi_account_id(&[account(3), account(1), account(2)], 2);
        assert_eq!(a, b);
    }

    #[test]
    fn multi_account_id_depends_on_threshold_and_set() {
        let base = multi_account_id(&[account(1), account(2)], 2);
        assert_ne!(base, multi_account_id(&[account(1), account(2)], 1));
        assert_ne!(base, multi_account_id(&[account(1), account(9)], 2));
    }

    #[test]
    fn address_bytes_unwrap_both_shapes() {
        let mut multi = vec![0u8];
        multi.extend_from_slice(&[7u8; 32]);
        assert_eq!(account_from_address(&multi), Some(account(7)));
        assert_eq!(account_from_address(&[7u8; 32]), Some(account(7)));
        assert_eq!(account_from_address(&[1u8, 2, 3]), None);
    }

    #[test]
    fn byte_walker_handles_nested_composites() {
        use super::scale_value::Value;
        let value: DecodedValue = Value::unnamed_composite([
            Value::u128(1),
            Value::unnamed_composite([Value::u128(2), Value::u128(3)]),
        ])
        .map_context(|_| 0u32);
        assert_eq!(value_as_bytes(&value), Some(vec![1, 2, 3]));

        let too_wide: DecodedValue =
            Value::unnamed_composite([Value::u128(300)]).map_context(|_| 0u32);
        assert_eq!(value_as_bytes(&too_wide), None);
    }

    #[test]
    fn weight_accepts_both_runtime_shapes() {
        use super::scale_value::Value;
        let plain: DecodedValue = Value::u128(42).map_context(|_| 0u32);
        assert_eq!(value_as_weight(&plain), Some(42));

        let structured: DecodedValue = Value::named_composite([
            ("ref_time", Value::u128(7)),
            ("proof_size", Value::u128(9)),
        ])
        .map_context(|_| 0u32);
        assert_eq!(value_as_weight(&structured), Some(7));
    }

    #[test]
    fn timepoint_option_decodes_both_arms() {
        use super::scale_value::Value;
        let none: DecodedValue =
            Value::unnamed_variant("None", []).map_context(|_| 0u32);
        assert_eq!(value_as_timepoint_option(&none), Some(None));

        let some: DecodedValue = Value::unnamed_variant(
            "Some",
            [Value::named_composite([
                ("height", Value::u128(100)),
                ("index", Value::u128(3)),
            ])],
        )
        .map_context(|_| 0u32);
        assert_eq!(
            value_as_timepoint_option(&some),
            Some(Some(Timepoint {
                height: 100,
                index: 3
            })),
        );
    }
}
