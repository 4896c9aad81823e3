use anyhow::Result;
use clap::Parser;
use log::info;

use billmatch::data::{self, WorkbookReader};
use billmatch::pipeline::{self, Config, LogObserver};

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config: Config = cli.into();
    info!("main={}, subs={:?}", config.main_file.display(), config.sub_files);

    let outcome = pipeline::run(&config, &WorkbookReader, &mut LogObserver)?;
    if config.dry_run {
        data::export_annotations(std::io::stdout(), &outcome.reconciliation)?;
    }

    Ok(())
}
