use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use getset::{CopyGetters, Getters};
use rust_decimal::{Decimal, RoundingStrategy};

use super::index::ReconciliationKey;
use super::{ColumnLayout, ExtractError, RowReader, DUPLICATE_MARKER, REMARK_SEPARATOR};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct TransactionRecord {
    /// 0-based row positions in the originating sheet(s), in encounter order.
    #[getset(get = "pub")]
    source_rows: Vec<usize>,
    #[getset(get_copy = "pub")]
    date: NaiveDate,
    #[getset(get = "pub")]
    amount: String,
    #[getset(get = "pub")]
    remark: String,
    #[getset(get_copy = "pub")]
    is_duplicate: bool,
}

impl TransactionRecord {
    pub fn new(source_row: usize, date: NaiveDate, amount: Decimal, remark: &str) -> TransactionRecord {
        TransactionRecord {
            source_rows: vec![source_row],
            date,
            amount: format_amount(amount),
            remark: remark.trim().to_string(),
            is_duplicate: false,
        }
    }

    /// Builds a record from a data row, validating the date and amount cells.
    pub fn from_row(
        file: &Path,
        source_row: usize,
        row: &[String],
        layout: &ColumnLayout,
    ) -> Result<TransactionRecord, ExtractError> {
        if row.len() < layout.required_width() {
            return Err(ExtractError::MalformedRow {
                file: file.to_path_buf(),
                row: row.to_vec(),
                date_column: layout.date,
                amount_column: layout.amount,
            });
        }

        let date_cell = &row[layout.date];
        let date = parse_date(date_cell).ok_or_else(|| ExtractError::InvalidDate {
            file: file.to_path_buf(),
            row: row.to_vec(),
            column: layout.date,
            value: date_cell.clone(),
        })?;

        let amount_cell = &row[layout.amount];
        let amount = parse_amount(amount_cell).ok_or_else(|| ExtractError::InvalidAmount {
            file: file.to_path_buf(),
            row: row.to_vec(),
            column: layout.amount,
            value: amount_cell.clone(),
        })?;

        let remark = row.get(layout.remark).map(String::as_str).unwrap_or_default();

        Ok(TransactionRecord::new(source_row, date, amount, remark))
    }

    /// Composite key used for both deduplication and matching.
    pub fn key(&self) -> ReconciliationKey {
        ReconciliationKey::new(self.date, &self.amount)
    }

    /// Folds a record with the same key into this one. The result is always flagged as a
    /// duplicate and keeps the rows and remarks of both sides, this record's first.
    pub fn absorb(self, incoming: TransactionRecord) -> TransactionRecord {
        let mut source_rows = self.source_rows;
        source_rows.extend(incoming.source_rows);

        TransactionRecord {
            source_rows,
            date: incoming.date,
            amount: incoming.amount,
            remark: format!("{}{}{}{}", DUPLICATE_MARKER, self.remark, REMARK_SEPARATOR, incoming.remark),
            is_duplicate: true,
        }
    }
}

/// Strict `YYYY-MM-DD`: four-digit year, two-digit month and day, nothing else.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 {
        return None;
    }

    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !well_formed {
        return None;
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Parses a finite decimal number, plain or in scientific notation. Digit separators are not
/// accepted.
pub fn parse_amount(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if value.contains('_') {
        return None;
    }

    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

/// Renders an amount with exactly two fraction digits, rounding half to even.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    rounded.rescale(AMOUNT_SCALE);

    rounded.to_string()
}

/// Extracts the records of one file's rows. The first row is a header and is skipped; each
/// record remembers the position of its row within the file.
pub fn extract_rows(
    file: &Path,
    rows: &[Vec<String>],
    layout: &ColumnLayout,
) -> Result<Vec<TransactionRecord>, ExtractError> {
    let mut records = Vec::with_capacity(rows.len().saturating_sub(1));
    for (index, row) in rows.iter().enumerate().skip(1) {
        records.push(TransactionRecord::from_row(file, index, row, layout)?);
    }

    Ok(records)
}

/// Reads every file in order and extracts its records into one flat sequence. The first
/// failure aborts the whole extraction.
pub fn extract_records<R, P>(reader: &R, files: &[P], layout: &ColumnLayout) -> Result<Vec<TransactionRecord>, ExtractError>
where
    R: RowReader + ?Sized,
    P: AsRef<Path>,
{
    let mut records = Vec::new();
    for file in files {
        let file = file.as_ref();
        let rows = reader.read_rows(file).map_err(|source| ExtractError::Read {
            file: file.to_path_buf(),
            source,
        })?;

        records.extend(extract_rows(file, &rows, layout)?);
    }

    Ok(records)
}
