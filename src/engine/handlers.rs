//! Command handlers: scan and the classification jobs.

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use colored::Colorize;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Opts;
use crate::engine::arg_parser::{Cli, Commands, CommonArgs, ExifArgs, ThresholdArgs};
use crate::engine::db_ops::{SqliteTransaction, add_files, file_count, load_files, open_db};
use crate::engine::decode::{Decoder, ExifTool, FsDecoder};
use crate::engine::progress::{BarObserver, LogObserver, ProgressObserver};
use crate::engine::scan::scan_dir;
use crate::jobs::{Classifier, DarkReclassify, PopulateMetadata, Reclassify, RereadDateTime};
use crate::pipeline::{CancelToken, Pipeline, RunState};
use crate::utils::setup_logging;
use crate::utils::trapscan_toml::{apply_file_to_opts, load_trapscan_toml};

/// Defaults, then `.trapscan.toml` in DIR, then CLI flags. Also installs the logger.
fn setup_opts(common: &CommonArgs) -> Opts {
    let mut opts = Opts::default();
    if let Some(file) = load_trapscan_toml(&common.dir) {
        apply_file_to_opts(&file, &mut opts);
    }
    if common.db.is_some() {
        opts.db_path = common.db.clone();
    }
    if let Some(v) = common.verbose {
        opts.verbose = v;
    }
    opts.io_workers = common.io_workers.or(opts.io_workers);
    opts.compute_workers = common.compute_workers.or(opts.compute_workers);
    opts.batch_size = common.batch_size.or(opts.batch_size);
    opts.atom_size = common.atom_size.or(opts.atom_size);
    setup_logging(opts.verbose);
    opts
}

fn apply_thresholds(opts: &mut Opts, args: &ThresholdArgs) {
    if let Some(l) = args.luminance {
        opts.thresholds.luminance_threshold = l;
    }
    if let Some(r) = args.ratio {
        opts.thresholds.dark_pixel_ratio = r;
    }
}

fn db_path(common: &CommonArgs, opts: &Opts) -> PathBuf {
    opts.db_path.clone().unwrap_or_else(|| common.db_path())
}

/// Parse a `+HH:MM` / `-HH:MM` offset.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => (1, s),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: u32 = h.parse().with_context(|| format!("bad offset hours in '{}'", s))?;
    let m: u32 = m.parse().with_context(|| format!("bad offset minutes in '{}'", s))?;
    if h > 23 || m > 59 {
        bail!("offset '{}' out of range", s);
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60) as i32)
        .with_context(|| format!("offset '{}' out of range", s))
}

fn exif_decoder(opts: &mut Opts, exif: &ExifArgs) -> Result<Arc<dyn Decoder>> {
    if exif.exiftool.is_some() {
        opts.exiftool = exif.exiftool.clone();
    }
    let tool = match &opts.exiftool {
        Some(p) => ExifTool::with_program(p),
        None => ExifTool::default(),
    };
    if !tool.is_available() {
        bail!("exiftool not found; install it or pass --exiftool <path>");
    }
    Ok(Arc::new(FsDecoder::with_metadata_reader(Box::new(tool))))
}

/// Register media files under DIR.
pub fn handle_scan(common: &CommonArgs, exclude: &[String], follow_links: Option<bool>) -> Result<()> {
    let mut opts = setup_opts(common);
    if !exclude.is_empty() {
        opts.exclude = exclude.to_vec();
    }
    if let Some(f) = follow_links {
        opts.follow_links = f;
    }
    let mut conn = open_db(&db_path(common, &opts))?;
    let before = file_count(&conn)?;
    let scan = scan_dir(&common.dir, &opts.exclude, opts.follow_links)?;
    let added = add_files(&mut conn, &scan.files)?;
    info!(
        "scan: {} media files found, {} new, {} indexed ({} before)",
        scan.files.len(),
        added,
        before + added,
        before
    );
    if !scan.skipped.is_empty() {
        warn!("Skipped {} paths due to walk errors", scan.skipped.len());
    }
    Ok(())
}

/// Run `classifier` over every indexed file of the image set at `root`.
pub fn run_job(
    root: &Path,
    db_path: &Path,
    opts: &Opts,
    classifier: Arc<dyn Classifier>,
    decoder: Arc<dyn Decoder>,
) -> Result<RunState> {
    let conn = open_db(db_path)?;
    let records = load_files(&conn)?;
    if records.is_empty() {
        warn!("no files indexed in {}; run `scan` first", db_path.display());
        return Ok(RunState::Completed);
    }

    let cancel = CancelToken::new();
    let cancel_handler = cancel.clone();
    ctrlc::set_handler(move || cancel_handler.cancel()).context("set Ctrl+C handler")?;

    let observer: Box<dyn ProgressObserver> = if opts.verbose {
        Box::new(BarObserver::new(classifier.name(), records.len()))
    } else {
        Box::new(LogObserver)
    };
    let transaction = SqliteTransaction::new(conn, classifier.columns());
    let outcome = Pipeline::new(root, classifier, decoder, transaction)
        .with_tuning(opts.tuning())
        .with_observer(observer)
        .with_cancel_token(cancel)
        .run(records)?;

    outcome.transaction.checkpoint()?;
    for (label, count) in &outcome.tally {
        info!("  {:<20} {}", label, count.to_string().green());
    }
    info!(
        "{} of {} files processed, {} changed, {} transactions",
        outcome.processed,
        outcome.records.len(),
        outcome.changed,
        outcome.flushes
    );
    if outcome.state == RunState::Cancelled {
        warn!("Cancelled by user; processed files were saved");
    }
    Ok(outcome.state)
}

fn handle_job(
    common: &CommonArgs,
    mut opts: Opts,
    classifier: Arc<dyn Classifier>,
    decoder: Arc<dyn Decoder>,
) -> Result<()> {
    let db = db_path(common, &opts);
    opts.db_path = Some(db.clone());
    log::debug!("{} CONFIG: {:#?}", env!("CARGO_PKG_NAME").to_uppercase(), opts);
    run_job(&common.dir, &db, &opts, classifier, decoder)?;
    Ok(())
}

/// Dispatch a parsed command line.
pub fn handle_run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Scan {
            common,
            exclude,
            follow_links,
        } => handle_scan(common, exclude, *follow_links),
        Commands::Dark { common, thresholds } => {
            let mut opts = setup_opts(common);
            apply_thresholds(&mut opts, thresholds);
            let job = Arc::new(DarkReclassify::new(opts.thresholds.clone()));
            handle_job(common, opts, job, Arc::new(FsDecoder::new()))
        }
        Commands::Classify { common, thresholds } => {
            let mut opts = setup_opts(common);
            apply_thresholds(&mut opts, thresholds);
            let job = Arc::new(Reclassify::new(opts.thresholds.clone()));
            handle_job(common, opts, job, Arc::new(FsDecoder::new()))
        }
        Commands::Metadata {
            common,
            tag,
            label,
            clear_if_absent,
            exif,
        } => {
            let mut opts = setup_opts(common);
            let decoder = exif_decoder(&mut opts, exif)?;
            let label = label.clone().unwrap_or_else(|| tag.clone());
            let job = Arc::new(PopulateMetadata::new(
                tag.clone(),
                label,
                clear_if_absent.unwrap_or(false),
            ));
            handle_job(common, opts, job, decoder)
        }
        Commands::Datetime {
            common,
            offset,
            exif,
        } => {
            let mut opts = setup_opts(common);
            let decoder = exif_decoder(&mut opts, exif)?;
            let job = match offset {
                Some(s) => RereadDateTime::new(parse_offset(s)?),
                None => RereadDateTime::default(),
            };
            handle_job(common, opts, Arc::new(job), decoder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_offset;

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_offset("3").unwrap().local_minus_utc(), 10800);
        assert!(parse_offset("+xx").is_err());
        assert!(parse_offset("+30:00").is_err());
        assert!(parse_offset("+05:75").is_err());
        assert!(parse_offset("+999999:00").is_err());
        assert!(parse_offset("-4294967295:00").is_err());
    }
}
