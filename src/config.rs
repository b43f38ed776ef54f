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
//! # Relayer Configuration 🕸️
//!
//! Configuration records for the relayer and the directory based loader.
//! Everything the relayer tunes at runtime flows through these records;
//! nothing hides in module globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use serde::{Deserialize, Serialize};
use subxt::utils::AccountId32;

use crate::error::{Error, Result};
use crate::types::suri::Suri;
use crate::types::{ChainId, ResourceId};

const fn default_start_block() -> u64 {
    1
}

const fn default_stride() -> u64 {
    1
}

const fn default_round_interval_ms() -> u64 {
    6_000
}

const fn default_block_retry_interval_ms() -> u64 {
    5_000
}

const fn default_submit_retry_limit() -> u32 {
    5
}

const fn default_fee_rate_milli() -> u64 {
    1
}

const fn default_one_token() -> u64 {
    1_000_000
}

/// RelayerConfig is the top level configuration of the multisig relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// The Substrate source chain this relayer watches and writes to.
    pub source: SourceChainConfig,
    /// The bridge level parameters shared with the destination chain.
    pub bridge: BridgeConfig,
    /// Fee policy applied to transfers in both directions.
    #[serde(default)]
    pub fees: FeeConfig,
    /// Round rotation and pacing knobs.
    #[serde(default)]
    pub rounds: RoundConfig,
}

/// SourceChainConfig is the configuration of the Substrate source chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Websocket Endpoint for long living connections.
    #[serde(skip_serializing)]
    pub ws_endpoint: url::Url,
    /// The bridge chain id of the source chain.
    pub chain_id: ChainId,
    /// First block to process when there is no stored checkpoint yet.
    #[serde(default = "default_start_block")]
    pub start_block: u64,
    /// Interprets the string in order to generate a key pair for this
    /// relayer, a [SURI](https://polkadot.js.org/docs/keyring/start/suri/)
    /// or a mnemonic phrase. A `$VAR` value reads the secret from the
    /// environment instead of the file.
    #[serde(skip_serializing)]
    pub suri: Option<Suri>,
    /// The watched multisig account and this relayer's place in it.
    pub multisig: MultisigConfig,
}

/// MultisigConfig describes the M-of-N signatory set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MultisigConfig {
    /// The M in M-of-N.
    pub threshold: u16,
    /// Hex encoded account ids of the full N-member set, own key included.
    pub signatories: Vec<String>,
    /// Index of this relayer in `[0, total-relayers)`.
    pub relayer_index: u64,
    /// Total number of relayers in the set.
    pub total_relayers: u64,
    /// Weight limit attached to approvals.
    pub max_weight: u64,
}

impl MultisigConfig {
    /// Parses the configured signatory set into account ids.
    pub fn signatory_accounts(&self) -> Result<Vec<AccountId32>> {
        self.signatories
            .iter()
            .map(|s| {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|e| {
                    Error::Decode(format!("invalid signatory hex: {e}"))
                })?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    Error::Decode("signatory must be 32 bytes".into())
                })?;
                Ok(AccountId32(bytes))
            })
            .collect()
    }
}

/// BridgeConfig is the configuration shared with the destination chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeConfig {
    /// The bridge chain id of the destination chain.
    pub destination_chain_id: ChainId,
    /// Asset identifier across the bridge.
    pub resource_id: ResourceId,
    /// Decimal adjustment divisor applied to inbound payload amounts; the
    /// source token carries this many more base units per token than the
    /// destination one.
    #[serde(default = "default_one_token")]
    pub one_token: u64,
}

/// FeeConfig is the fee policy, in base-unit integer arithmetic.
#[derive(Debug, Copy, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeeConfig {
    /// Flat fee per transfer, base units.
    #[serde(default)]
    pub fixed: u64,
    /// Proportional fee in thousandths (1 = 0.1%).
    #[serde(default = "default_fee_rate_milli")]
    pub rate_milli: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fixed: 0,
            rate_milli: default_fee_rate_milli(),
        }
    }
}

impl FeeConfig {
    /// Applies the fee to an amount, truncating toward zero, and returns the
    /// amount actually transferred. `None` means the transfer is dropped
    /// because nothing would be left after the fee.
    pub fn apply(&self, amount: u128) -> Option<u128> {
        let fee = u128::from(self.fixed) + amount * u128::from(self.rate_milli) / 1000;
        amount.checked_sub(fee).filter(|actual| *actual > 0)
    }
}

/// RoundConfig tunes the rotation and retry pacing.
#[derive(Debug, Copy, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoundConfig {
    /// How long one submitter round lasts, in milliseconds.
    #[serde(default = "default_round_interval_ms")]
    pub interval_ms: u64,
    /// How long the follower waits before retrying a block fetch.
    #[serde(default = "default_block_retry_interval_ms")]
    pub block_retry_interval_ms: u64,
    /// Rotation stride; nominally 1.
    #[serde(default = "default_stride")]
    pub stride: u64,
    /// How many submission attempts the submitter makes per message.
    #[serde(default = "default_submit_retry_limit")]
    pub submit_retry_limit: u32,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_round_interval_ms(),
            block_retry_interval_ms: default_block_retry_interval_ms(),
            stride: default_stride(),
            submit_retry_limit: default_submit_retry_limit(),
        }
    }
}

impl RoundConfig {
    /// The submitter's round pacing interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The follower's block retry interval.
    pub fn block_retry_interval(&self) -> Duration {
        Duration::from_millis(self.block_retry_interval_ms)
    }
}

/// A helper function that will search for all config files in the given
/// directory and return them as a vec of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(base_dir: P) -> Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory
    // and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Try to parse the [`RelayerConfig`] from the given config file(s).
pub fn parse_from_files(files: &[PathBuf]) -> Result<RelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder =
            builder.add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of WEBB).
    let builder = builder
        .add_source(config::Environment::with_prefix("WEBB").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: std::result::Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Loads and validates the configuration from all config files found under
/// the given directory.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration.
pub fn postloading_process(config: RelayerConfig) -> Result<RelayerConfig> {
    tracing::trace!("Checking configuration sanity ...");
    let multisig = &config.source.multisig;
    if multisig.threshold == 0 {
        return Err(Error::Generic("multisig threshold must be at least 1"));
    }
    if u64::from(multisig.threshold) > multisig.total_relayers {
        return Err(Error::Generic(
            "multisig threshold cannot exceed the total number of relayers",
        ));
    }
    if multisig.signatories.len() as u64 != multisig.total_relayers {
        return Err(Error::Generic(
            "the signatory set must list exactly total-relayers accounts",
        ));
    }
    if multisig.relayer_index >= multisig.total_relayers {
        return Err(Error::Generic(
            "relayer-index must be within [0, total-relayers)",
        ));
    }
    // surface bad hex early instead of at first submission.
    multisig.signatory_accounts()?;
    if config.rounds.stride == 0 {
        return Err(Error::Generic("rounds.stride must be at least 1"));
    }
    if config.bridge.one_token == 0 {
        return Err(Error::Generic("bridge.one-token must be non-zero"));
    }
    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_multisig() -> MultisigConfig {
        MultisigConfig {
            threshold: 2,
            signatories: vec![
                "11".repeat(32),
                "22".repeat(32),
                "33".repeat(32),
            ],
            relayer_index: 0,
            total_relayers: 3,
            max_weight: 2_269_800_000,
        }
    }

    fn sample_config() -> RelayerConfig {
        RelayerConfig {
            source: SourceChainConfig {
                name: "source".into(),
                ws_endpoint: "ws://127.0.0.1:9944".parse().unwrap(),
                chain_id: 1,
                start_block: 1,
                suri: None,
                multisig: sample_multisig(),
            },
            bridge: BridgeConfig {
                destination_chain_id: 2,
                resource_id: ResourceId::default(),
                one_token: 1_000_000,
            },
            fees: FeeConfig::default(),
            rounds: RoundConfig::default(),
        }
    }

    #[test]
    fn fee_policy_truncates_toward_zero() {
        let fees = FeeConfig {
            fixed: 0,
            rate_milli: 1,
        };
        assert_eq!(fees.apply(1_000_000), Some(999_000));
        // below one thousandth the proportional fee truncates to zero.
        assert_eq!(fees.apply(999), Some(999));
    }

    #[test]
    fn fee_policy_drops_dust() {
        let fees = FeeConfig {
            fixed: 10,
            rate_milli: 0,
        };
        // fee >= amount, nothing left to transfer.
        assert_eq!(fees.apply(10), None);
        assert_eq!(fees.apply(5), None);
        assert_eq!(fees.apply(0), None);
        assert_eq!(fees.apply(11), Some(1));
    }

    #[test]
    fn validation_accepts_a_sane_config() {
        assert!(postloading_process(sample_config()).is_ok());
    }

    #[test]
    fn validation_rejects_a_short_signatory_set() {
        let mut config = sample_config();
        config.source.multisig.signatories.pop();
        assert!(postloading_process(config).is_err());
    }

    #[test]
    fn validation_rejects_an_out_of_range_index() {
        let mut config = sample_config();
        config.source.multisig.relayer_index = 3;
        assert!(postloading_process(config).is_err());
    }

    #[test]
    fn validation_rejects_a_threshold_above_the_set() {
        let mut config = sample_config();
        config.source.multisig.threshold = 4;
        assert!(postloading_process(config).is_err());
    }

    #[test]
    fn loads_from_a_directory_of_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.toml");
        std::fs::write(
            &path,
            r#"
[source]
name = "source"
ws-endpoint = "ws://127.0.0.1:9944"
chain-id = 1
start-block = 100

[source.multisig]
threshold = 2
signatories = [
  "1111111111111111111111111111111111111111111111111111111111111111",
  "2222222222222222222222222222222222222222222222222222222222222222",
  "3333333333333333333333333333333333333333333333333333333333333333",
]
relayer-index = 1
total-relayers = 3
max-weight = 2269800000

[bridge]
destination-chain-id = 2
resource-id = "0x0000000000000000000000000000000000000000000000000000000000000001"
"#,
        )
        .unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.source.start_block, 100);
        assert_eq!(config.source.multisig.relayer_index, 1);
        assert_eq!(config.bridge.resource_id.0[31], 1);
        // defaults kick in for the sections left out.
        assert_eq!(config.rounds.interval_ms, 6_000);
        assert_eq!(config.fees.rate_milli, 1);
        assert_eq!(config.bridge.one_token, 1_000_000);
    }
}
