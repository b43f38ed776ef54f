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
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Multisig Bridge Relayer Crate 🕸️
//!
//! A crate for relaying assets one way between a Substrate based source chain
//! and a smart-contract destination chain, with the return path settled
//! through an M-of-N multisig account on the source chain.
//!
//! ## Overview
//!
//! Several relayer processes run independently, each holding one of the N
//! multisig keys. They never talk to each other; all coordination happens by
//! observing the shared source chain:
//!
//!   1. The [`follower`] tails finalized blocks, classifies every extrinsic
//!      touching the multisig account and keeps the in-memory
//!      [`ledger::CoordinationLedger`] up to date. User deposits (batch
//!      extrinsics) are turned into outbound [`types::TransferMessage`]s and
//!      handed to the [`router::Router`].
//!   2. The [`submitter`] reacts to messages arriving from the destination
//!      chain. It waits for its slot in the deterministic round rotation
//!      computed by the [`scheduler`], then signs and submits either a new
//!      `as_multi` extrinsic or an approval for one that is already in
//!      flight, using the ledger to decide which.
//!
//! Because every relayer sees the same finalized chain, the rotation and the
//! vote-membership inference are identical everywhere, which gives at-least
//! once delivery with exactly one on-chain effect and no direct relayer to
//! relayer channel.

/// Decoded extrinsic access over the source chain and the subxt transport.
pub mod chain;
/// A pure classifier from decoded extrinsics to multisig events.
pub mod classifier;
/// Configuration types and directory based config loading.
pub mod config;
/// A module for managing the context of the relayer.
pub mod context;
/// An enum of all possible errors this crate can produce.
pub mod error;
/// The finalized-block follower task.
pub mod follower;
/// The in-memory multisig coordination ledger.
pub mod ledger;
/// Metrics functionality.
pub mod metric;
/// The outbound message seam towards the destination chain.
pub mod router;
/// The deterministic round-robin submission scheduler.
pub mod scheduler;
/// A module for starting the long-running relayer tasks.
pub mod service;
/// Block checkpoint persistence.
pub mod store;
/// The multisig extrinsic submitter task.
pub mod submitter;
/// Shared data model of the relayer.
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
