use std::path::PathBuf;

use clap::Parser;

use billmatch::pipeline::{Config, DEFAULT_RESULT_COLUMN};
use billmatch::reconciliation::ColumnLayout;

/// Copies sub ledger remarks into the main ledger for transactions matching on date and amount.
#[derive(Debug, Parser)]
#[command(name = "billmatch", version)]
pub struct Cli {
    /// Main ledger to annotate (.xlsx, .xls, .ods or .csv)
    #[arg(long = "main")]
    pub main_file: PathBuf,

    /// Sub ledgers the remarks are taken from
    #[arg(required = true)]
    pub sub_files: Vec<PathBuf>,

    /// Zero-based date column of the main ledger
    #[arg(long, default_value_t = ColumnLayout::MAIN_DEFAULT.date)]
    pub main_date_col: usize,

    /// Zero-based remark column of the main ledger
    #[arg(long, default_value_t = ColumnLayout::MAIN_DEFAULT.remark)]
    pub main_remark_col: usize,

    /// Zero-based amount column of the main ledger
    #[arg(long, default_value_t = ColumnLayout::MAIN_DEFAULT.amount)]
    pub main_amount_col: usize,

    /// Zero-based date column of the sub ledgers
    #[arg(long, default_value_t = ColumnLayout::SUB_DEFAULT.date)]
    pub sub_date_col: usize,

    /// Zero-based remark column of the sub ledgers
    #[arg(long, default_value_t = ColumnLayout::SUB_DEFAULT.remark)]
    pub sub_remark_col: usize,

    /// Zero-based amount column of the sub ledgers
    #[arg(long, default_value_t = ColumnLayout::SUB_DEFAULT.amount)]
    pub sub_amount_col: usize,

    /// Column letter the matched remarks are written to
    #[arg(long, default_value = DEFAULT_RESULT_COLUMN)]
    pub result_col: String,

    /// Write the result here instead of a timestamped file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Directory for the timestamped result file
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Print the annotations as csv instead of saving a workbook
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Config {
        Config {
            main_file: cli.main_file,
            sub_files: cli.sub_files,
            main_layout: ColumnLayout::new(cli.main_date_col, cli.main_remark_col, cli.main_amount_col),
            sub_layout: ColumnLayout::new(cli.sub_date_col, cli.sub_remark_col, cli.sub_amount_col),
            result_column: cli.result_col,
            output: cli.output,
            output_dir: cli.output_dir,
            dry_run: cli.dry_run,
        }
    }
}
