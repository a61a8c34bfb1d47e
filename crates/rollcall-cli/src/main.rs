use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::config::DEFAULT_CONFIG_PATH;
use rollcall_core::{run_batch, AttendanceRun, Config, EuclideanMatcher, Gallery, LoadStats, OnnxFaceEngine};
use rollcall_ledger::record::DATE_FORMAT;
use rollcall_ledger::{read_day_file, write_report, Ledger, RecordedRun};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face-matching attendance from group photos")]
struct Cli {
    /// Config file, written with defaults if it does not exist
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,
    /// Load the registered faces and report what was found
    Scan,
    /// Mark attendance from one or more photos
    Mark {
        /// Group photos to match
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Also write today's PDF report
        #[arg(long)]
        pdf: bool,
    },
    /// Render an attendance file to PDF
    Report {
        /// Day to render (DD-MM-YYYY), today if omitted
        #[arg(short, long, conflicts_with = "file")]
        date: Option<String>,
        /// Attendance CSV to render instead of a recorded day
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output path, defaults to the reports directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List recorded days
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Scan => scan(&config)?,
        Commands::Mark { images, pdf } => {
            let (run, recorded) = mark_attendance(&config, &images)?;
            for record in &recorded.records {
                let (id, name, date, time) = record.to_tuple();
                let note = if recorded.appended.contains(record) { "" } else { "\t(already recorded today)" };
                println!("{id}\t{name}\t{date}\t{time}{note}");
            }
            println!("{}", run_summary(&run, &recorded));
            if pdf {
                let today = Local::now().date_naive();
                let ledger = Ledger::new(&config.output.attendance_dir);
                let records = ledger.read_day(today)?;
                let output = default_report_path(&config, &ledger.day_path(today));
                write_report(&output, &records, Local::now().naive_local())?;
                println!("Report written to {}", output.display());
            }
        }
        Commands::Report { date, file, output } => {
            let ledger = Ledger::new(&config.output.attendance_dir);
            let source = match (file, date) {
                (Some(file), _) => file,
                (None, Some(date)) => {
                    let day = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                        .with_context(|| format!("date must be DD-MM-YYYY, got {date:?}"))?;
                    ledger.day_path(day)
                }
                (None, None) => ledger.day_path(Local::now().date_naive()),
            };
            if !source.exists() {
                bail!("no attendance file at {}", source.display());
            }

            let records = read_day_file(&source)?;
            let output = output.unwrap_or_else(|| default_report_path(&config, &source));
            write_report(&output, &records, Local::now().naive_local())?;
            println!("Report written to {} ({} rows)", output.display(), records.len());
        }
        Commands::List => {
            let ledger = Ledger::new(&config.output.attendance_dir);
            let days = ledger.list_days()?;
            if days.is_empty() {
                println!("No attendance recorded in {}", ledger.dir().display());
            }
            for (date, path) in days {
                let rows = match read_day_file(&path) {
                    Ok(rows) => rows.len().to_string(),
                    Err(err) => {
                        tracing::warn!(error = %err, "cannot read attendance file");
                        "unreadable".to_string()
                    }
                };
                println!("{}\t{rows}\t{}", date.format(DATE_FORMAT), path.display());
            }
        }
    }

    Ok(())
}

fn load_gallery(config: &Config) -> Result<(OnnxFaceEngine, Gallery, LoadStats)> {
    let engine = OnnxFaceEngine::load(config).context("loading face models")?;
    let (gallery, stats) = Gallery::load(&config.data.dataset_path, &engine)?;
    Ok((engine, gallery, stats))
}

fn scan(config: &Config) -> Result<()> {
    let (_, gallery, stats) = load_gallery(config)?;

    for identity in gallery.identities() {
        println!("{}\t{} samples", identity.label, identity.embeddings.len());
    }
    println!(
        "{} identities, {} of {} samples used ({} unreadable, {} without a face, {} failed)",
        gallery.len(),
        stats.samples_used,
        stats.samples_seen,
        stats.unreadable,
        stats.no_face,
        stats.failed_embedding,
    );
    Ok(())
}

/// Match `images` against the gallery and append the result to today's file.
/// Returns the run counters and every record accepted in the run.
fn mark_attendance(config: &Config, images: &[PathBuf]) -> Result<(AttendanceRun, RecordedRun)> {
    let (engine, gallery, _) = load_gallery(config)?;
    let run = run_batch(
        &engine,
        &gallery,
        &EuclideanMatcher,
        config.matching.threshold,
        images,
    );
    let ledger = Ledger::new(&config.output.attendance_dir);
    let recorded = ledger.record(run.present.as_slice(), Local::now().naive_local())?;
    Ok((run, recorded))
}

fn run_summary(run: &AttendanceRun, recorded: &RecordedRun) -> String {
    format!(
        "{} present, {} newly recorded; {} of {} images read, {} faces ({} unknown, {} skipped)",
        recorded.records.len(),
        recorded.appended.len(),
        run.images_processed,
        run.images_processed + run.images_skipped,
        run.faces_detected,
        run.faces_unknown,
        run.faces_skipped,
    )
}

/// `<reports_dir>/<source stem>.pdf`
fn default_report_path(config: &Config, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attendance".to_string());
    config.output.reports_dir.join(format!("{stem}.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_explains_empty_result() {
        let run = AttendanceRun {
            present: vec![],
            images_processed: 2,
            images_skipped: 1,
            faces_detected: 3,
            faces_unknown: 2,
            faces_skipped: 1,
        };
        assert_eq!(
            run_summary(&run, &RecordedRun::default()),
            "0 present, 0 newly recorded; 2 of 3 images read, 3 faces (2 unknown, 1 skipped)"
        );
    }
}
