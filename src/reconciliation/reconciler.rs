use getset::{CopyGetters, Getters};

use super::index::{RecordIndex, ReconciliationKey};
use super::MAIN_DUPLICATE_MARKER;

/// Text to write into every main ledger row of one matched key.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Annotation {
    key: ReconciliationKey,
    text: String,
    /// 0-based row positions in the main ledger.
    rows: Vec<usize>,
}

impl Annotation {
    /// 1-based spreadsheet row numbers to write to.
    pub fn cell_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().map(|row| row + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Reconciliation {
    #[getset(get = "pub")]
    annotations: Vec<Annotation>,
    #[getset(get_copy = "pub")]
    matched: usize,
}

/// Joins the main ledger against the sub ledgers. Every main key also present in `sub` yields
/// one annotation carrying the sub remark; main keys without a counterpart and sub keys nobody
/// asks for are skipped.
pub fn reconcile(main: &RecordIndex, sub: &RecordIndex) -> Reconciliation {
    let annotations: Vec<Annotation> = main
        .iter()
        .filter_map(|(key, main_record)| {
            let sub_record = sub.get(key)?;

            let text = if main_record.is_duplicate() {
                format!("{}{}", MAIN_DUPLICATE_MARKER, sub_record.remark())
            } else {
                sub_record.remark().clone()
            };

            Some(Annotation {
                key: key.clone(),
                text,
                rows: main_record.source_rows().clone(),
            })
        })
        .collect();

    Reconciliation {
        matched: annotations.len(),
        annotations,
    }
}
