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
//! # Coordination Ledger 🕸️
//!
//! The only shared mutable state between the follower and the submitter: an
//! in-memory map from a multisig origin `(block, index)` to the record of
//! everything observed about it. The follower mutates it while sweeping
//! finalized blocks; the submitter reads it and deletes records once their
//! execution is confirmed. It is rebuilt from chain history on restart.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{MultiSigRecord, MultiSignTxKey};

/// In-memory mapping from a multisig origin key to its record.
///
/// All operations take the lock for the duration of a single map lookup or a
/// linear scan; no lock is ever held across I/O.
#[derive(Debug, Default)]
pub struct CoordinationLedger {
    records: Mutex<HashMap<MultiSignTxKey, MultiSigRecord>>,
}

impl CoordinationLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the record of a freshly initiated multisig, keyed by the
    /// initiating extrinsic's `(block, index)`.
    ///
    /// The caller (the follower) must only insert on an initiating event;
    /// with that discipline there is never more than one un-executed record
    /// per `(dest_address, dest_amount)`.
    pub fn insert_new(&self, key: MultiSignTxKey, record: MultiSigRecord) {
        let mut records = self.records.lock();
        let in_flight = records.values().any(|r| {
            !r.executed
                && r.dest_address == record.dest_address
                && r.dest_amount == record.dest_amount
        });
        if in_flight {
            tracing::warn!(
                dest = %record.dest_address,
                amount = %record.dest_amount,
                "a matching multisig is already in flight",
            );
        }
        records.insert(key, record);
    }

    /// Appends one observed vote's `other_signatories` list to every
    /// un-executed record matching the destination and amount.
    ///
    /// Returns how many records matched.
    pub fn append_vote(
        &self,
        dest_address: &str,
        dest_amount: &str,
        other_signatories: Vec<String>,
    ) -> usize {
        let mut records = self.records.lock();
        let mut matched = 0;
        for record in records.values_mut() {
            if !record.executed
                && record.dest_address == dest_address
                && record.dest_amount == dest_amount
            {
                record.others.push(other_signatories.clone());
                matched += 1;
            }
        }
        matched
    }

    /// Marks every un-executed record matching the destination and amount as
    /// executed. The flag never transitions back.
    ///
    /// Returns how many records were flipped.
    pub fn mark_executed(&self, dest_address: &str, dest_amount: &str) -> usize {
        let mut records = self.records.lock();
        let mut matched = 0;
        for record in records.values_mut() {
            if !record.executed
                && record.dest_address == dest_address
                && record.dest_amount == dest_amount
            {
                record.executed = true;
                matched += 1;
            }
        }
        matched
    }

    /// Returns a copy of the record with the given destination and amount.
    ///
    /// The un-executed record wins when one exists (there is at most one in
    /// flight per destination and amount); otherwise an executed record is
    /// returned so the submitter can observe the execution and clean it up.
    pub fn find_matching(
        &self,
        dest_address: &str,
        dest_amount: &str,
    ) -> Option<MultiSigRecord> {
        let records = self.records.lock();
        let mut executed_match = None;
        for record in records.values() {
            if record.dest_address != dest_address
                || record.dest_amount != dest_amount
            {
                continue;
            }
            if !record.executed {
                return Some(record.clone());
            }
            executed_match = Some(record.clone());
        }
        executed_match
    }

    /// Returns a copy of the record under the given origin key.
    pub fn get(&self, key: &MultiSignTxKey) -> Option<MultiSigRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Removes and returns the record under the given origin key. Only the
    /// submitter does this, and only after confirmed execution.
    pub fn remove(&self, key: &MultiSignTxKey) -> Option<MultiSigRecord> {
        self.records.lock().remove(key)
    }

    /// How many records are currently tracked.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the ledger tracks no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dest: &str, amount: &str, origin: MultiSignTxKey) -> MultiSigRecord {
        MultiSigRecord {
            executed: false,
            threshold: 2,
            maybe_timepoint: None,
            dest_address: dest.into(),
            dest_amount: amount.into(),
            others: vec![vec!["aa".into()]],
            store_call: vec![],
            max_weight: 0,
            origin_key: origin,
        }
    }

    #[test]
    fn votes_aggregate_on_the_matching_record() {
        let ledger = CoordinationLedger::new();
        let origin = MultiSignTxKey::new(100, 3);
        ledger.insert_new(origin, record("abcd", "1000000", origin));

        let matched =
            ledger.append_vote("abcd", "1000000", vec!["bb".into()]);
        assert_eq!(matched, 1);

        let r = ledger.get(&origin).unwrap();
        assert_eq!(r.others, vec![vec!["aa".to_string()], vec!["bb".to_string()]]);
        assert!(!r.executed);
    }

    #[test]
    fn execution_flips_the_flag_and_keeps_votes() {
        let ledger = CoordinationLedger::new();
        let origin = MultiSignTxKey::new(100, 3);
        ledger.insert_new(origin, record("abcd", "1000000", origin));
        ledger.append_vote("abcd", "1000000", vec!["bb".into()]);
        ledger.append_vote("abcd", "1000000", vec!["cc".into()]);
        assert_eq!(ledger.mark_executed("abcd", "1000000"), 1);

        let r = ledger.get(&origin).unwrap();
        assert!(r.executed);
        assert_eq!(r.others.len(), 3);
        // a second execution pass finds nothing to flip.
        assert_eq!(ledger.mark_executed("abcd", "1000000"), 0);
    }

    #[test]
    fn mismatched_votes_touch_nothing() {
        let ledger = CoordinationLedger::new();
        let origin = MultiSignTxKey::new(100, 3);
        ledger.insert_new(origin, record("abcd", "1000000", origin));

        assert_eq!(ledger.append_vote("abcd", "2000000", vec!["bb".into()]), 0);
        assert_eq!(ledger.append_vote("ffff", "1000000", vec!["bb".into()]), 0);
        assert_eq!(ledger.get(&origin).unwrap().others.len(), 1);
    }

    #[test]
    fn find_matching_prefers_in_flight_records() {
        let ledger = CoordinationLedger::new();
        let first = MultiSignTxKey::new(10, 0);
        ledger.insert_new(first, record("abcd", "5", first));
        ledger.mark_executed("abcd", "5");
        // an executed match is still visible so its observer can remove it.
        let found = ledger.find_matching("abcd", "5").unwrap();
        assert!(found.executed);

        // but a new in-flight round for the same destination and amount
        // takes precedence.
        let second = MultiSignTxKey::new(20, 1);
        ledger.insert_new(second, record("abcd", "5", second));
        let found = ledger.find_matching("abcd", "5").unwrap();
        assert_eq!(found.origin_key, second);
        assert!(!found.executed);
    }

    #[test]
    fn remove_only_deletes_the_given_origin() {
        let ledger = CoordinationLedger::new();
        let a = MultiSignTxKey::new(1, 0);
        let b = MultiSignTxKey::new(2, 0);
        ledger.insert_new(a, record("aa", "1", a));
        ledger.insert_new(b, record("bb", "2", b));
        assert_eq!(ledger.len(), 2);
        assert!(ledger.remove(&a).is_some());
        assert!(ledger.remove(&a).is_none());
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(&b).is_some());
    }
}
