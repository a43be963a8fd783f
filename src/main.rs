#[macro_use]
extern crate log;

mod config;
mod context;
mod error;
mod import;
mod irods;
mod models;
mod normalize;
mod reconcile;
mod samplesheet;
mod store;
mod tables;
mod taxonomy;
mod trackdb;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDate};
use env_logger::{Env, Target};
use structopt::StructOpt;

use crate::config::{Opt, Settings};
use crate::context::Context;
use crate::reconcile::WritePolicy;
use crate::samplesheet::{SheetParser, Spreadsheet};
use crate::tables::IdentifierScheme;
use crate::taxonomy::{NcbiTaxonomy, Offline, Taxonomy};
use crate::trackdb::MysqlStore;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Runs of the same day share one log file.
fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_logging(opt: &Opt, settings: &Settings, today: NaiveDate) -> Result<()> {
    let level = if opt.verbose { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {} - {}",
            record.level(),
            Local::now().format("%Y/%m/%d %H:%M:%S"),
            record.args()
        )
    });

    let log_file = opt
        .log_file
        .clone()
        .or_else(|| settings.result_dir.as_ref().map(|d| d.join(format!("import_{}.log", today))));
    if let Some(path) = &log_file {
        builder.target(Target::Pipe(Box::new(open_log(path)?)));
    }
    builder.init();
    if let Some(path) = &log_file {
        info!("Logging to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let opt = Opt::from_args();
    let settings = Settings::load(&opt.config, opt.connstr.is_none())?;
    let today = Local::now().date_naive();

    init_logging(&opt, &settings, today)?;

    if opt.json.is_none() && opt.spreadsheet.is_none() {
        warn!("Nothing to import. Please use --json or --spreadsheet or both.");
        return Ok(());
    }

    let url = match &opt.connstr {
        Some(url) => url.clone(),
        None => settings.database_url()?,
    };
    info!("Connecting to the tracking database");
    let mut store = MysqlStore::connect(&url)?;

    let taxonomy: Box<dyn Taxonomy> = if opt.offline {
        Box::new(Offline)
    } else {
        Box::new(NcbiTaxonomy::new()?)
    };
    let policy = if opt.overwrite {
        WritePolicy::Overwrite
    } else {
        WritePolicy::NewVersion
    };
    let ctx = Context::load(&mut store, today, taxonomy.as_ref())?;

    if let Some(path) = &opt.json {
        let batch = irods::read_export(path, &ctx)?;
        import::import_source(&mut store, &batch, IdentifierScheme::Irods, "json", today, policy, opt.dry_run)?;
    }

    if let Some(selector) = &opt.spreadsheet {
        let sheet = Spreadsheet::resolve(selector, &settings.spreadsheet_url, &settings.data_directory, opt.layout)?;
        info!("Opening the {} spreadsheet {}", sheet.layout, sheet.location);
        let rows = sheet.read()?;
        let batch = SheetParser::new(sheet.layout, &ctx).parse(&rows);
        import::import_source(&mut store, &batch, sheet.layout.scheme(), "spreadsheet", today, policy, opt.dry_run)?;
    }

    info!("End of run");
    Ok(())
}
