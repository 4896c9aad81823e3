use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::index::RecordIndex;
use super::reconciler::reconcile;
use super::record::{extract_records, extract_rows, format_amount, parse_amount, parse_date, TransactionRecord};
use super::*;

struct MemoryReader {
    files: HashMap<PathBuf, Vec<Vec<String>>>,
}

impl MemoryReader {
    fn new(files: &[(&str, Vec<Vec<&str>>)]) -> MemoryReader {
        let files = files
            .iter()
            .map(|(path, rows)| {
                let rows = rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect();
                (PathBuf::from(path), rows)
            })
            .collect();

        MemoryReader { files }
    }
}

impl RowReader for MemoryReader {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<String>>, SheetError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SheetError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")))
    }
}

fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

fn date(value: &str) -> NaiveDate {
    parse_date(value).unwrap()
}

fn record(source_row: usize, day: &str, amount: &str, remark: &str) -> TransactionRecord {
    TransactionRecord::new(source_row, date(day), parse_amount(amount).unwrap(), remark)
}

const SUB: ColumnLayout = ColumnLayout::SUB_DEFAULT;

#[test]
fn test_amount_has_two_fraction_digits() {
    assert_eq!(format_amount(parse_amount("12.5").unwrap()), "12.50");
    assert_eq!(format_amount(parse_amount("12.50").unwrap()), "12.50");
    assert_eq!(format_amount(parse_amount("5").unwrap()), "5.00");
    assert_eq!(format_amount(parse_amount("-3.1").unwrap()), "-3.10");
    assert_eq!(format_amount(parse_amount("1e3").unwrap()), "1000.00");
    assert_eq!(format_amount(parse_amount(" 7.25 ").unwrap()), "7.25");
}

#[test]
fn test_amount_rounds_half_to_even() {
    assert_eq!(parse_amount("12.005"), Some(dec!(12.005)));
    assert_eq!(format_amount(dec!(12.005)), "12.00");
    assert_eq!(format_amount(dec!(12.015)), "12.02");
    assert_eq!(format_amount(dec!(12.0151)), "12.02");
    assert_eq!(format_amount(dec!(-0.001)), "0.00");
}

#[test]
fn test_amount_rejects_non_numbers() {
    assert_eq!(parse_amount("abc"), None);
    assert_eq!(parse_amount(""), None);
    assert_eq!(parse_amount("1,000.00"), None);
    assert_eq!(parse_amount("1_000"), None);
    assert_eq!(parse_amount("1_2.5_0"), None);
    assert_eq!(parse_amount(" 1_000 "), None);
    assert_eq!(parse_amount("NaN"), None);
    assert_eq!(parse_amount("inf"), None);
}

#[test]
fn test_date_is_strict() {
    assert_eq!(parse_date("2024-01-31"), NaiveDate::from_ymd_opt(2024, 1, 31));
    assert_eq!(parse_date("2024-1-31"), None);
    assert_eq!(parse_date("2024/01/31"), None);
    assert_eq!(parse_date("2024-02-30"), None);
    assert_eq!(parse_date(" 2024-01-31"), None);
    assert_eq!(parse_date(" 2024-1-31"), None);
    assert_eq!(parse_date("2024-01- 1"), None);
    assert_eq!(parse_date("+202-01-01"), None);
    assert_eq!(parse_date("2024-1-031"), None);
    assert_eq!(parse_date("2024-01-3a"), None);
    assert_eq!(parse_date("0202-01-01"), NaiveDate::from_ymd_opt(202, 1, 1));
    assert_eq!(parse_date("31-01-2024"), None);
}

#[test]
fn test_extract_skips_header_and_keeps_row_positions() -> Result<()> {
    let file = Path::new("sub.xlsx");
    let records = extract_rows(
        file,
        &rows(&[
            &["date", "remark", "amount"],
            &["2024-01-01", "  lunch ", "12.5"],
            &["2024-01-02", "taxi", "-8"],
        ]),
        &SUB,
    )?;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source_rows(), &vec![1]);
    assert_eq!(records[0].date(), date("2024-01-01"));
    assert_eq!(records[0].amount(), "12.50");
    assert_eq!(records[0].remark(), "lunch");
    assert_eq!(records[0].is_duplicate(), false);
    assert_eq!(records[1].source_rows(), &vec![2]);
    assert_eq!(records[1].amount(), "-8.00");

    Ok(())
}

#[test]
fn test_extract_header_only_file() -> Result<()> {
    let records = extract_rows(Path::new("sub.csv"), &rows(&[&["date", "remark", "amount"]]), &SUB)?;
    assert_eq!(records.is_empty(), true);

    Ok(())
}

#[test]
fn test_extract_missing_remark_cell_is_empty() -> Result<()> {
    let layout = ColumnLayout::new(0, 5, 1);
    let records = extract_rows(Path::new("sub.csv"), &rows(&[&["h"], &["2024-01-01", "3"]]), &layout)?;

    assert_eq!(records[0].remark(), "");

    Ok(())
}

#[test]
fn test_extract_malformed_row() -> Result<()> {
    let result = extract_rows(
        Path::new("sub.csv"),
        &rows(&[&["date", "remark", "amount"], &["2024-01-01", "ok", "1"], &["2024-01-02", "short"]]),
        &SUB,
    );

    match result {
        Err(ExtractError::MalformedRow {
            file,
            row,
            date_column,
            amount_column,
        }) => {
            assert_eq!(file, PathBuf::from("sub.csv"));
            assert_eq!(row, vec!["2024-01-02".to_string(), "short".to_string()]);
            assert_eq!(date_column, 0);
            assert_eq!(amount_column, 2);
        },
        other => bail!("expected a malformed row error, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_extract_invalid_date() -> Result<()> {
    let result = extract_rows(Path::new("sub.csv"), &rows(&[&["h"], &["01/02/2024", "x", "1"]]), &SUB);

    if let Err(ExtractError::InvalidDate { value, column, .. }) = result {
        assert_eq!(value, "01/02/2024");
        assert_eq!(column, 0);
    } else {
        bail!("date should be rejected");
    }

    Ok(())
}

#[test]
fn test_extract_rejects_loose_date_cell() -> Result<()> {
    let result = extract_rows(Path::new("sub.csv"), &rows(&[&["h"], &["2024-01- 1", "x", "1"]]), &SUB);

    if let Err(ExtractError::InvalidDate { value, .. }) = result {
        assert_eq!(value, "2024-01- 1");
    } else {
        bail!("padded day should be rejected");
    }

    Ok(())
}

#[test]
fn test_extract_invalid_amount() -> Result<()> {
    let result = extract_rows(Path::new("sub.csv"), &rows(&[&["h"], &["2024-01-02", "x", "ten"]]), &SUB);

    if let Err(ExtractError::InvalidAmount { value, column, .. }) = result {
        assert_eq!(value, "ten");
        assert_eq!(column, 2);
    } else {
        bail!("amount should be rejected");
    }

    Ok(())
}

#[test]
fn test_extract_records_concatenates_files_in_order() -> Result<()> {
    let reader = MemoryReader::new(&[
        ("a.csv", vec![vec!["h"], vec!["2024-01-01", "a1", "1"], vec!["2024-01-02", "a2", "2"]]),
        ("b.csv", vec![vec!["h"], vec!["2024-01-03", "b1", "3"]]),
    ]);

    let records = extract_records(&reader, &["b.csv", "a.csv"], &SUB)?;
    let remarks: Vec<&str> = records.iter().map(|record| record.remark().as_str()).collect();

    assert_eq!(remarks, vec!["b1", "a1", "a2"]);
    assert_eq!(records[0].source_rows(), &vec![1]);
    assert_eq!(records[2].source_rows(), &vec![2]);

    Ok(())
}

#[test]
fn test_extract_records_wraps_read_errors() -> Result<()> {
    let reader = MemoryReader::new(&[("a.csv", vec![vec!["h"]])]);

    match extract_records(&reader, &["a.csv", "missing.csv"], &SUB) {
        Err(ExtractError::Read { file, source }) => {
            assert_eq!(file, PathBuf::from("missing.csv"));
            assert!(matches!(source, SheetError::Io(_)));
        },
        other => bail!("expected a read error, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_extract_records_stops_at_first_bad_row() -> Result<()> {
    let reader = MemoryReader::new(&[
        ("a.csv", vec![vec!["h"], vec!["2024-01-01", "a1"]]),
        ("b.csv", vec![vec!["h"], vec!["bad", "b1", "3"]]),
    ]);

    if let Err(err) = extract_records(&reader, &["a.csv", "b.csv"], &SUB) {
        assert!(matches!(err, ExtractError::MalformedRow { .. }));
    } else {
        bail!("extraction should fail on the first file");
    }

    Ok(())
}

#[test]
fn test_key_uses_canonical_amount() {
    let a = record(1, "2024-01-01", "5", "a");
    let b = record(2, "2024-01-01", "5.00", "b");

    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().as_str(), "2024-01-01:5.00");
    assert_eq!(a.key().to_string(), "2024-01-01:5.00");
}

#[test]
fn test_key_ignores_remark() {
    let a = record(1, "2024-01-01", "5", "a");
    let b = record(1, "2024-01-01", "5", "something else");

    assert_eq!(a.key(), b.key());
}

#[test]
fn test_index_collapses_equal_keys() {
    let index = RecordIndex::build(vec![
        record(1, "2024-01-01", "5", "a"),
        record(2, "2024-01-01", "5.00", "b"),
        record(3, "2024-01-02", "5", "c"),
    ]);

    assert_eq!(index.len(), 2);
    assert_eq!(index.duplicate_count(), 1);

    let merged = index.get(&record(0, "2024-01-01", "5", "").key()).unwrap();
    assert_eq!(merged.remark(), "DUPLICATE_TODO:a:::b");
    assert_eq!(merged.source_rows(), &vec![1, 2]);
    assert_eq!(merged.is_duplicate(), true);

    let single = index.get(&record(0, "2024-01-02", "5", "").key()).unwrap();
    assert_eq!(single, &record(3, "2024-01-02", "5", "c"));
}

#[test]
fn test_index_chains_repeated_collisions() {
    let a = record(2, "2024-01-01", "5", "a");
    let key = a.key();

    let two = RecordIndex::build(vec![a.clone(), record(5, "2024-01-01", "5", "b")]);
    assert_eq!(two.get(&key).unwrap().remark(), "DUPLICATE_TODO:a:::b");

    let three = RecordIndex::build(vec![
        a,
        record(5, "2024-01-01", "5", "b"),
        record(9, "2024-01-01", "5", "c"),
    ]);
    let merged = three.get(&key).unwrap();

    assert_eq!(merged.remark(), "DUPLICATE_TODO:DUPLICATE_TODO:a:::b:::c");
    assert_eq!(merged.source_rows(), &vec![2, 5, 9]);
    assert_eq!(merged.amount(), "5.00");
    assert_eq!(merged.is_duplicate(), true);
}

#[test]
fn test_index_merge_follows_encounter_order() {
    let forward = RecordIndex::build(vec![record(1, "2024-01-01", "5", "a"), record(2, "2024-01-01", "5", "b")]);
    let backward = RecordIndex::build(vec![record(2, "2024-01-01", "5", "b"), record(1, "2024-01-01", "5", "a")]);
    let key = record(0, "2024-01-01", "5", "").key();

    assert_eq!(forward.get(&key).unwrap().remark(), "DUPLICATE_TODO:a:::b");
    assert_eq!(backward.get(&key).unwrap().remark(), "DUPLICATE_TODO:b:::a");
    assert_eq!(backward.get(&key).unwrap().source_rows(), &vec![2, 1]);
}

#[test]
fn test_index_empty() {
    let index = RecordIndex::build(Vec::new());

    assert_eq!(index.is_empty(), true);
    assert_eq!(index.duplicate_count(), 0);
}

#[test]
fn test_reconcile_copies_sub_remark() {
    let main = RecordIndex::build(vec![record(4, "2024-01-01", "12.5", "main remark")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "12.50", "lunch")]);

    let reconciliation = reconcile(&main, &sub);

    assert_eq!(reconciliation.matched(), 1);
    let annotation = &reconciliation.annotations()[0];
    assert_eq!(annotation.text(), "lunch");
    assert_eq!(annotation.rows(), &vec![4]);
    assert_eq!(annotation.cell_rows().collect::<Vec<_>>(), vec![5usize]);
    assert_eq!(annotation.key().as_str(), "2024-01-01:12.50");
}

#[test]
fn test_reconcile_flags_main_duplicates() {
    let main = RecordIndex::build(vec![record(1, "2024-01-01", "3", "x"), record(7, "2024-01-01", "3", "y")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "3", "lunch")]);

    let reconciliation = reconcile(&main, &sub);
    let annotation = &reconciliation.annotations()[0];

    assert_eq!(annotation.text(), "MAIN_DUPLICATE_TODO:lunch");
    assert_eq!(annotation.cell_rows().collect::<Vec<_>>(), vec![2, 8]);
}

#[test]
fn test_reconcile_passes_sub_duplicates_through() {
    let main = RecordIndex::build(vec![record(1, "2024-01-01", "3", "m")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "3", "x"), record(2, "2024-01-01", "3", "y")]);

    let reconciliation = reconcile(&main, &sub);

    assert_eq!(reconciliation.annotations()[0].text(), "DUPLICATE_TODO:x:::y");
}

#[test]
fn test_reconcile_both_sides_duplicated() {
    let main = RecordIndex::build(vec![record(1, "2024-01-01", "3", "m"), record(2, "2024-01-01", "3", "n")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "3", "x"), record(2, "2024-01-01", "3", "y")]);

    let reconciliation = reconcile(&main, &sub);

    assert_eq!(
        reconciliation.annotations()[0].text(),
        "MAIN_DUPLICATE_TODO:DUPLICATE_TODO:x:::y"
    );
}

#[test]
fn test_reconcile_skips_unmatched_keys() {
    let main = RecordIndex::build(vec![record(1, "2024-01-01", "3", "m"), record(2, "2024-01-02", "4", "n")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "3", "x"), record(2, "2024-03-01", "9", "unused")]);

    let reconciliation = reconcile(&main, &sub);

    assert_eq!(reconciliation.matched(), 1);
    assert_eq!(reconciliation.annotations().len(), 1);
    assert_eq!(reconciliation.annotations()[0].text(), "x");
}

#[test]
fn test_reconcile_nothing_matches() {
    let main = RecordIndex::build(vec![record(1, "2024-01-01", "3", "m")]);
    let sub = RecordIndex::build(vec![record(1, "2024-01-01", "3.01", "x")]);

    let reconciliation = reconcile(&main, &sub);

    assert_eq!(reconciliation.matched(), 0);
    assert_eq!(reconciliation.annotations().is_empty(), true);
}

#[test]
fn test_reconcile_is_repeatable() {
    let build = || {
        let main = RecordIndex::build(vec![
            record(1, "2024-01-03", "3", "m"),
            record(2, "2024-01-01", "4", "n"),
            record(3, "2024-01-01", "4", "o"),
        ]);
        let sub = RecordIndex::build(vec![record(1, "2024-01-01", "4", "x"), record(2, "2024-01-03", "3", "y")]);
        (main, sub)
    };

    let (main, sub) = build();
    let first = reconcile(&main, &sub);
    let second = reconcile(&main, &sub);
    let (main, sub) = build();
    let rebuilt = reconcile(&main, &sub);

    assert_eq!(first, second);
    assert_eq!(first, rebuilt);
    assert_eq!(first.matched(), 2);
}
