use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::data::{self, Sheet, SheetError, Workbook};
use crate::reconciliation::index::RecordIndex;
use crate::reconciliation::reconciler::{self, Annotation, Reconciliation};
use crate::reconciliation::record::extract_records;
use crate::reconciliation::{ColumnLayout, ExtractError, RowReader};

pub const DEFAULT_RESULT_COLUMN: &str = "E";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub main_file: PathBuf,
    pub sub_files: Vec<PathBuf>,
    pub main_layout: ColumnLayout,
    pub sub_layout: ColumnLayout,
    /// Column letter the annotations are written to.
    pub result_column: String,
    /// Explicit output path. When unset a timestamped file is created in `output_dir`.
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Reconcile without writing a result workbook.
    pub dry_run: bool,
}

impl Config {
    pub fn new(main_file: PathBuf, sub_files: Vec<PathBuf>) -> Config {
        Config {
            main_file,
            sub_files,
            main_layout: ColumnLayout::MAIN_DEFAULT,
            sub_layout: ColumnLayout::SUB_DEFAULT,
            result_column: DEFAULT_RESULT_COLUMN.to_string(),
            output: None,
            output_dir: PathBuf::from("."),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Main,
    Sub,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Main => f.write_str("main"),
            LedgerKind::Sub => f.write_str("sub"),
        }
    }
}

/// Receives progress from a pipeline run.
pub trait Observer {
    fn indexed(&mut self, _kind: LedgerKind, _index: &RecordIndex) {}

    fn matched(&mut self, _annotation: &Annotation) {}

    fn finished(&mut self, _matched: usize) {}

    fn saved(&mut self, _path: &Path, _sheet_name: &str) {}
}

/// Forwards pipeline progress to the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn indexed(&mut self, kind: LedgerKind, index: &RecordIndex) {
        info!(
            "{} ledger indexed, keys={}, duplicates={}",
            kind,
            index.len(),
            index.duplicate_count()
        );
        for (key, record) in index {
            debug!("{} bill, key={}, remark={:?}", kind, key, record.remark());
        }
    }

    fn matched(&mut self, annotation: &Annotation) {
        debug!("match, key={}, remark={:?}", annotation.key(), annotation.text());
    }

    fn finished(&mut self, matched: usize) {
        info!("matched count={}", matched);
    }

    fn saved(&mut self, path: &Path, sheet_name: &str) {
        info!("annotated sheet {:?} saved to {}", sheet_name, path.display());
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub reconciliation: Reconciliation,
    /// Where the annotated workbook went, `None` on a dry run.
    pub saved_to: Option<PathBuf>,
}

/// Extracts every file's records in order and folds them into one index, so duplicates across
/// files are merged too.
pub fn index_files<R, P>(reader: &R, files: &[P], layout: &ColumnLayout) -> Result<RecordIndex, ExtractError>
where
    R: RowReader + ?Sized,
    P: AsRef<Path>,
{
    let records = extract_records(reader, files, layout)?;
    Ok(RecordIndex::build(records))
}

/// Writes every annotation into `column` of its main ledger rows. Returns the number of cells
/// written.
pub fn annotate<S: Sheet>(sheet: &mut S, column: &str, reconciliation: &Reconciliation) -> Result<usize, SheetError> {
    let mut written = 0;
    for annotation in reconciliation.annotations() {
        for row in annotation.cell_rows() {
            sheet.set_cell(column, row, annotation.text())?;
            written += 1;
        }
    }

    Ok(written)
}

pub fn run<R>(config: &Config, reader: &R, observer: &mut dyn Observer) -> Result<Outcome>
where
    R: RowReader + ?Sized,
{
    data::column_index(&config.result_column)?;

    let sub = index_files(reader, &config.sub_files, &config.sub_layout).context("failed to index sub ledgers")?;
    observer.indexed(LedgerKind::Sub, &sub);

    let main = index_files(reader, &[&config.main_file], &config.main_layout).context("failed to index main ledger")?;
    observer.indexed(LedgerKind::Main, &main);

    let reconciliation = reconciler::reconcile(&main, &sub);
    for annotation in reconciliation.annotations() {
        observer.matched(annotation);
    }
    observer.finished(reconciliation.matched());

    if config.dry_run {
        return Ok(Outcome {
            reconciliation,
            saved_to: None,
        });
    }

    let mut workbook = Workbook::open(&config.main_file)
        .with_context(|| format!("failed to open main ledger {}", config.main_file.display()))?;
    annotate(&mut workbook, &config.result_column, &reconciliation)?;

    let path = match &config.output {
        Some(path) => path.clone(),
        None => data::timestamped_path(&config.output_dir, workbook.extension()),
    };
    workbook
        .save_as(&path)
        .with_context(|| format!("failed to save result to {}", path.display()))?;
    observer.saved(&path, workbook.sheet_name());

    Ok(Outcome {
        reconciliation,
        saved_to: Some(path),
    })
}
