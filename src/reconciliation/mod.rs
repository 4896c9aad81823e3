use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod index;
pub mod reconciler;
pub mod record;

#[cfg(test)]
mod reconciliation_tests;

use crate::data::SheetError;

pub const DUPLICATE_MARKER: &str = "DUPLICATE_TODO:";
pub const MAIN_DUPLICATE_MARKER: &str = "MAIN_DUPLICATE_TODO:";
pub const REMARK_SEPARATOR: &str = ":::";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(
        "row is shorter than the configured columns, date column: {date_column}, amount column: {amount_column}, \
         file: {}, row: {row:?}",
        .file.display()
    )]
    MalformedRow {
        file: PathBuf,
        row: Vec<String>,
        date_column: usize,
        amount_column: usize,
    },
    #[error("invalid date {value:?} in column {column}, file: {}, row: {row:?}", .file.display())]
    InvalidDate {
        file: PathBuf,
        row: Vec<String>,
        column: usize,
        value: String,
    },
    #[error("invalid amount {value:?} in column {column}, file: {}, row: {row:?}", .file.display())]
    InvalidAmount {
        file: PathBuf,
        row: Vec<String>,
        column: usize,
        value: String,
    },
    #[error("failed to read {}", .file.display())]
    Read {
        file: PathBuf,
        #[source]
        source: SheetError,
    },
}

/// Zero-based positions of the columns a record set is extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: usize,
    pub remark: usize,
    pub amount: usize,
}

impl ColumnLayout {
    pub const SUB_DEFAULT: ColumnLayout = ColumnLayout {
        date: 0,
        remark: 1,
        amount: 2,
    };

    pub const MAIN_DEFAULT: ColumnLayout = ColumnLayout {
        date: 1,
        remark: 3,
        amount: 7,
    };

    pub fn new(date: usize, remark: usize, amount: usize) -> ColumnLayout {
        ColumnLayout { date, remark, amount }
    }

    /// Minimum row width a data row needs. The remark column is not part of it.
    pub fn required_width(&self) -> usize {
        self.date.max(self.amount) + 1
    }
}

/// Source of raw rows for the extractor. Only the first sheet of a file is read.
pub trait RowReader {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<String>>, SheetError>;
}
