use fsconform::cli::{Cli, Command};
use fsconform::features::{Features, FeaturesError};
use fsconform::fuzz::FuzzConfig;
use fsconform::host::HostStore;
use fsconform::report::RunReport;
use fsconform::store::Store;
use fsconform::suite::{RunConfig, quick_check, run_suite};
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Event, Level, Subscriber, error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct ConformExitCode;

impl ConformExitCode {
    /// Exit code used when verification produced findings.
    fn findings() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for other errors (I/O errors, invalid arguments, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Change working directory if -C was specified
    if let Some(directory) = cli.directory
        && let Err(e) = std::env::set_current_dir(&directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return ConformExitCode::any_error();
    }

    let result: anyhow::Result<ExitCode> = match cli.command {
        Command::Run {
            path,
            features,
            keep,
            skip,
        } => handle_run(path, &features, keep, skip),
        Command::Quick { path } => handle_quick(path),
        Command::Fuzz {
            path,
            seed,
            iterations,
        } => handle_fuzz(path, seed, iterations),
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            ConformExitCode::any_error()
        }
    }
}

fn resolve_features(spec: &str) -> anyhow::Result<Features> {
    match Features::preset(spec) {
        Ok(features) => Ok(features),
        Err(FeaturesError::UnknownPreset(_)) if Path::new(spec).exists() => {
            Ok(Features::from_toml_file(Path::new(spec))?)
        }
        Err(e) => Err(e.into()),
    }
}

fn finish(report: &RunReport) -> ExitCode {
    print!("{report}");

    if report.is_clean() {
        info!(
            "{} cases passed ({} skipped)",
            report.case_count() - report.skip_count(),
            report.skip_count()
        );
        return ExitCode::SUCCESS;
    }

    println!();
    println!("Fingerprint: {}", report.fingerprint());
    error!(
        "{} of {} cases failed",
        report.failure_count(),
        report.case_count()
    );
    ConformExitCode::findings()
}

fn handle_run(
    path: PathBuf,
    features: &str,
    keep: bool,
    skip: Vec<String>,
) -> anyhow::Result<ExitCode> {
    let store = HostStore::new(path)?;
    let config = RunConfig {
        features: resolve_features(features)?,
        keep_artifacts: keep,
        skip_groups: skip,
        ..RunConfig::default()
    };

    let report = run_suite(&store, &config)?;
    Ok(finish(&report))
}

fn handle_quick(path: PathBuf) -> anyhow::Result<ExitCode> {
    let store = HostStore::new(path)?;

    let report = quick_check(&store, &RunConfig::default())?;
    Ok(finish(&report))
}

fn handle_fuzz(path: PathBuf, seed: u64, iterations: u32) -> anyhow::Result<ExitCode> {
    let store = HostStore::new(path)?;
    let config = FuzzConfig { seed, iterations };

    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let root = PathBuf::from(format!("/fsconform_fuzz_{nanos}"));
    store
        .mkdir_all(&root)
        .map_err(|e| anyhow::anyhow!("failed to create fuzz root: {e}"))?;

    let reports = fsconform::fuzz::run_all(&store, &root, &config);
    let _ = store.remove_all(&root);

    let mut findings = 0;
    for report in &reports {
        println!("{report}");
        if !report.is_clean() {
            findings += 1;
        }
    }

    if findings == 0 {
        info!("all {} fuzz drivers clean (seed {seed})", reports.len());
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{findings} fuzz drivers reported violations (seed {seed})");
        Ok(ConformExitCode::findings())
    }
}

fn init_tracing(verbose: u8) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
