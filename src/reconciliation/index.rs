use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

use super::record::{TransactionRecord, DATE_FORMAT};

/// `date:amount`, the only criterion records are deduplicated and matched on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReconciliationKey(String);

impl ReconciliationKey {
    pub fn new(date: NaiveDate, amount: &str) -> ReconciliationKey {
        ReconciliationKey(format!("{}:{}", date.format(DATE_FORMAT), amount))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReconciliationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One merged record per key. Read-only once built.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordIndex {
    records: BTreeMap<ReconciliationKey, TransactionRecord>,
}

impl RecordIndex {
    /// Folds records into the index in the order given. Records sharing a key are merged, the
    /// earlier one on the left, so the order matters for the merged remark and rows.
    pub fn build<I>(records: I) -> RecordIndex
    where
        I: IntoIterator<Item = TransactionRecord>,
    {
        let mut index: BTreeMap<ReconciliationKey, TransactionRecord> = BTreeMap::new();

        for record in records {
            let key = record.key();
            let merged = match index.remove(&key) {
                Some(existing) => existing.absorb(record),
                None => record,
            };
            index.insert(key, merged);
        }

        RecordIndex { records: index }
    }

    pub fn get(&self, key: &ReconciliationKey) -> Option<&TransactionRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, ReconciliationKey, TransactionRecord> {
        self.records.iter()
    }

    pub fn duplicate_count(&self) -> usize {
        self.records.values().filter(|record| record.is_duplicate()).count()
    }
}

impl<'a> IntoIterator for &'a RecordIndex {
    type Item = (&'a ReconciliationKey, &'a TransactionRecord);
    type IntoIter = Iter<'a, ReconciliationKey, TransactionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
