//! `pws-analyze`: run PWS analyses over acquisitions and inspect saved results.
//!
//! Subcommands:
//! - `run`: analyze one or more acquisitions against a reference and save the results
//! - `inspect`: list the analyses of an acquisition, or validate and summarize one

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use pws_analysis::analysis::{BatchJob, run_batch};
use pws_analysis::config::{LogLevel, ToolConfig};
use pws_analysis::data::npy;
use pws_analysis::results::{FieldValue, LazyResults, ResultField, list_analyses};
use pws_analysis::{Analysis, AnalysisSettings};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// PWS analysis tool
#[derive(Parser, Debug)]
#[command(name = "pws-analyze")]
#[command(about = "Partial Wave Spectroscopy analysis of hyperspectral acquisitions")]
#[command(version)]
struct Args {
    /// Tool configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze acquisitions and save results next to each of them
    Run {
        /// Analysis settings file (JSON)
        #[arg(short, long)]
        settings: PathBuf,

        /// Reference acquisition directory
        #[arg(short, long)]
        reference: PathBuf,

        /// Extra reflectance calibration directory
        #[arg(short, long)]
        extra_reflectance: Option<PathBuf>,

        /// Analysis name used for the results files
        #[arg(short, long)]
        name: String,

        /// Acquisition directories to analyze
        #[arg(required = true)]
        cubes: Vec<PathBuf>,
    },

    /// List saved analyses, or load every field of one and print a summary
    Inspect {
        /// Acquisition directory
        cube: PathBuf,

        /// Analysis name; lists all analyses when omitted
        name: Option<String>,
    },
}

fn main() -> CliResult<()> {
    let args = Args::parse();

    let (config, config_dir) = match &args.config {
        Some(path) => (
            ToolConfig::load(path)?,
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
        ),
        None => (ToolConfig::default(), PathBuf::new()),
    };
    let log_level = args.log_level.unwrap_or(config.log_level);
    env_logger::Builder::new()
        .filter_level(log_level.to_level_filter())
        .init();
    log::debug!("Log level {}", log_level.name());

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
        log::info!("Using {} worker threads", threads);
    }

    match args.command {
        Command::Run {
            settings,
            reference,
            extra_reflectance,
            name,
            cubes,
        } => run(
            &config,
            &config_dir,
            &settings,
            &reference,
            extra_reflectance.as_deref(),
            &name,
            &cubes,
        ),
        Command::Inspect { cube, name } => match name {
            Some(name) => inspect(&cube, &name),
            None => list(&cube),
        },
    }
}

fn run(
    config: &ToolConfig,
    config_dir: &Path,
    settings: &Path,
    reference: &Path,
    extra_reflectance: Option<&Path>,
    name: &str,
    cubes: &[PathBuf],
) -> CliResult<()> {
    let settings = AnalysisSettings::load_file(settings)?;
    let lookup = config.build_lookup(config_dir)?;
    let reference = npy::load_cube(reference)?;
    let extra_reflectance = extra_reflectance
        .map(npy::load_extra_reflectance)
        .transpose()?;
    let analysis = Analysis::new(settings, reference, extra_reflectance.as_ref(), &lookup)?;

    let mut load_failures = 0;
    let mut jobs = Vec::with_capacity(cubes.len());
    for dir in cubes {
        match npy::load_cube(dir) {
            Ok(cube) => jobs.push(BatchJob::saved(cube, dir, name)),
            Err(e) => {
                log::error!("Failed to load {:?}: {}", dir, e);
                load_failures += 1;
            }
        }
    }

    let cancel = AtomicBool::new(false);
    let report = run_batch(&analysis, jobs, &cancel);
    print!("{}", report);

    if load_failures > 0 || !report.is_success() {
        return Err(format!(
            "{} acquisitions failed to load, {} analyses failed",
            load_failures,
            report.failed().len()
        )
        .into());
    }
    Ok(())
}

fn list(cube: &Path) -> CliResult<()> {
    let names = list_analyses(cube)?;
    if names.is_empty() {
        println!("No analyses for {:?}", cube);
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn inspect(cube: &Path, name: &str) -> CliResult<()> {
    let mut results = LazyResults::open_named(cube, name)?;
    results.load_all()?;

    println!("Analysis '{}' of {:?}", name, cube);
    println!("  created:   {}", results.time()?);
    println!("  cube:      {}", results.im_cube_id_tag()?);
    println!("  reference: {}", results.reference_id_tag()?);
    if let Some(tag) = results.extra_reflection_tag()? {
        println!("  extra reflection: {}", tag);
    }
    let reflectance = results.reflectance()?;
    println!(
        "  reflectance: {:?} over {} wavenumbers",
        reflectance.data.dim(),
        reflectance.wavenumbers.len()
    );
    for field in [
        ResultField::MeanReflectance,
        ResultField::Rms,
        ResultField::PolynomialRms,
        ResultField::AutoCorrelationSlope,
        ResultField::RSquared,
        ResultField::Ld,
    ] {
        if !results.has_field(field) {
            println!("  {}: not computed", field.name());
            continue;
        }
        if let FieldValue::Map(map) = results.get(field)? {
            let finite: Vec<f32> = map.iter().copied().filter(|v| v.is_finite()).collect();
            let mean =
                finite.iter().map(|&v| f64::from(v)).sum::<f64>() / finite.len().max(1) as f64;
            println!(
                "  {}: {:?}, mean {:.4e} ({} non-finite)",
                field.name(),
                map.dim(),
                mean,
                map.len() - finite.len()
            );
        }
    }
    if results.has_field(ResultField::Opd) {
        let opd = results.opd()?;
        println!("  opd: {:?}", opd.data.dim());
    }
    results.close();
    Ok(())
}
