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

/// An enum of all possible errors that could be encountered during the
/// execution of the multisig relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Basic error for the substrate transport.
    #[error(transparent)]
    Subxt(#[from] subxt::Error),
    /// SCALE Codec error.
    #[error(transparent)]
    ScaleCodec(#[from] parity_scale_codec::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Prometheus error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Substrate node not found in the configuration.
    #[error("Node Not Found: {}", chain)]
    NodeNotFound {
        /// The name of the misconfigured chain.
        chain: String,
    },
    /// Missing Secrets in the config, the SURI of the relayer key.
    #[error("Missing required SURI in the config")]
    MissingSecrets,
    /// The requested block is not yet available on the node.
    ///
    /// The transport maps the node's "result to be 32 bytes, but got 0"
    /// family of responses to this variant, so callers can retry without
    /// string matching.
    #[error("Block #{} is not yet available", number)]
    BlockNotReady {
        /// The height that was asked for.
        number: u64,
    },
    /// The configured start block is ahead of the finalized chain.
    #[error(
        "starting block ({}) is greater than latest known block ({})",
        start_block,
        latest
    )]
    StartBlockAhead {
        /// The configured start block.
        start_block: u64,
        /// The latest finalized height reported by the node.
        latest: u64,
    },
    /// Failed to decode on-chain data into the expected shape.
    #[error("Decode error: {}", _0)]
    Decode(String),
    /// The deposit nonce derived from (block, index) does not fit in 63 bits.
    #[error("deposit nonce out of range for block {} extrinsic {}", block, index)]
    NonceOutOfRange {
        /// Block height of the deposit.
        block: u64,
        /// Extrinsic index of the deposit.
        index: u32,
    },
    /// The relayer key is not part of the configured signatory set.
    #[error("relayer account is not in the configured signatory set")]
    SignatoryNotInSet,
    /// The follower received a shutdown signal.
    #[error("terminated")]
    Terminated,
    /// A background task failed and stopped abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

/// A type alias for the result of the multisig relayer, using the [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;
