//! Capsule Kernels CLI Application
//!
//! Command-line front end for the capsule-kernels library. It adds:
//! - TOML job files with built-in or externally loaded kernels
//! - Parallel execution of input series against a shared capsule
//! - Context blob accounting and allocation budgets
//! - Report generation (TXT/JSON)

use anyhow::{bail, Context, Result};
use capsule_kernels::{BlobAllocator, BudgetAllocator, ContextData, CountingAllocator};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod callbacks;
mod config;
mod jobs;
mod report;

use config::{AppConfig, JobConfig, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KernelArg {
    MovingAverage,
    WeightedStencil,
    CoordinateShift,
}

/// Capsule Kernels - Build callback capsules and run them through the host harness
#[derive(Parser, Debug)]
#[command(name = "capsule-cli")]
#[command(about = "Build and run owned callback capsules", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a job file (jobs.toml)
    #[arg(short, long, value_name = "FILE", conflicts_with = "kernel")]
    config: Option<PathBuf>,

    /// Built-in kernel to run in quick mode
    #[arg(short, long, value_enum)]
    kernel: Option<KernelArg>,

    /// Window size for the moving average
    #[arg(long, value_name = "N")]
    window: Option<usize>,

    /// Comma-separated stencil weights
    #[arg(long, value_name = "W,..", value_delimiter = ',', allow_negative_numbers = true)]
    weights: Vec<f64>,

    /// Coordinate shift
    #[arg(long, value_name = "S", allow_negative_numbers = true)]
    shift: Option<f64>,

    /// Comma-separated input series (filters)
    #[arg(short, long, value_name = "X,..", value_delimiter = ',', allow_negative_numbers = true)]
    input: Vec<f64>,

    /// Host-side filter size (default: window size or weight count)
    #[arg(long, value_name = "N")]
    size: Option<usize>,

    /// Output coordinate, comma-separated (transforms; can be repeated)
    #[arg(long, value_name = "I,..", allow_negative_numbers = true)]
    point: Vec<String>,

    /// Input rank for transforms (default: rank of the first point)
    #[arg(long, value_name = "N")]
    rank: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Capsule Kernels CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using capsule-kernels library v{}", capsule_kernels::VERSION);

    let mut app = if let Some(config_path) = &args.config {
        log::info!("Loading configuration from: {:?}", config_path);
        config::load_config(config_path)?
    } else if let Some(kernel) = args.kernel {
        quick_config(kernel, &args)?
    } else {
        println!("Capsule Kernels - No job specified");
        println!("\nQuick Start:");
        println!("  capsule-cli --kernel moving-average --window 3 --input 1,2,3,4,5");
        println!("  capsule-cli --kernel weighted-stencil --weights 0.5,0.5,0.5 --input 1,2,3");
        println!("  capsule-cli --kernel coordinate-shift --shift 2 --point 5,5");
        println!("\nFor job files:");
        println!("  capsule-cli --config jobs.toml");
        println!("\nUse --help for more options");
        return Ok(());
    };

    if let Some(format) = args.format {
        app.output.format = format;
    }
    if let Some(path) = &args.output {
        app.output.path = Some(path.clone());
    }

    run(&app)
}

/// Run every job and emit the report
fn run(app: &AppConfig) -> Result<()> {
    let counter = match app.limits.max_context_bytes {
        Some(limit) => {
            log::debug!("Context blob budget: {} bytes", limit);
            Accounting::Budgeted(Arc::new(CountingAllocator::wrap(BudgetAllocator::new(limit))))
        }
        None => Accounting::Unlimited(Arc::new(CountingAllocator::new())),
    };

    let mut results = Vec::with_capacity(app.jobs.len());
    for job in &app.jobs {
        results.push(jobs::run_job(job, counter.allocator())?);
    }

    let accounting = app.output.include_accounting.then(|| counter.stats());
    let report = report::Report::new(results, accounting);
    let rendered = match app.output.format {
        OutputFormat::Txt => report.to_txt()?,
        OutputFormat::Json => report.to_json()?,
    };

    match &app.output.path {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report: {:?}", path))?;
            log::info!("Report written to {:?}", path);
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// Counting allocator, optionally over a byte budget
enum Accounting {
    Unlimited(Arc<CountingAllocator>),
    Budgeted(Arc<CountingAllocator<BudgetAllocator>>),
}

impl Accounting {
    fn allocator(&self) -> Arc<dyn BlobAllocator> {
        match self {
            Accounting::Unlimited(a) => a.clone() as Arc<dyn BlobAllocator>,
            Accounting::Budgeted(a) => a.clone() as Arc<dyn BlobAllocator>,
        }
    }

    fn stats(&self) -> capsule_kernels::AllocationStats {
        match self {
            Accounting::Unlimited(a) => a.stats(),
            Accounting::Budgeted(a) => a.stats(),
        }
    }
}

/// Build a single-job configuration from command-line flags
fn quick_config(kernel: KernelArg, args: &Args) -> Result<AppConfig> {
    let job = match kernel {
        KernelArg::MovingAverage => {
            let window = args.window.context("--window is required for moving-average")?;
            JobConfig::new("moving-average", ContextData::window(window))
                .with_input(require_input(args)?)
        }
        KernelArg::WeightedStencil => {
            if args.weights.is_empty() {
                bail!("--weights is required for weighted-stencil");
            }
            JobConfig::new("weighted-stencil", ContextData::weights(args.weights.clone()))
                .with_input(require_input(args)?)
        }
        KernelArg::CoordinateShift => {
            let shift = args.shift.context("--shift is required for coordinate-shift")?;
            if args.point.is_empty() {
                bail!("at least one --point is required for coordinate-shift");
            }
            let mut job = JobConfig::new("coordinate-shift", ContextData::shift(shift));
            for point in &args.point {
                job = job.with_point(parse_point(point)?);
            }
            if let Some(rank) = args.rank {
                job = job.with_input_rank(rank);
            }
            job
        }
    };
    let job = match args.size {
        Some(size) if kernel != KernelArg::CoordinateShift => job.with_filter_size(size),
        _ => job,
    };

    let app = AppConfig {
        jobs: vec![job],
        ..AppConfig::default()
    };
    app.validate()?;
    Ok(app)
}

fn require_input(args: &Args) -> Result<Vec<f64>> {
    if args.input.is_empty() {
        bail!("--input is required for filter kernels");
    }
    Ok(args.input.clone())
}

fn parse_point(text: &str) -> Result<Vec<isize>> {
    text.split(',')
        .map(|part| {
            part.trim()
                .parse::<isize>()
                .with_context(|| format!("Invalid coordinate '{}' in point '{}'", part, text))
        })
        .collect()
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("5, 5").unwrap(), vec![5, 5]);
        assert_eq!(parse_point("-1,0,3").unwrap(), vec![-1, 0, 3]);
        assert!(parse_point("1,x").is_err());
    }

    #[test]
    fn test_quick_config_moving_average() {
        let args = Args::parse_from([
            "capsule-cli",
            "--kernel",
            "moving-average",
            "--window",
            "3",
            "--input",
            "1,2,3,4,5",
        ]);
        let app = quick_config(KernelArg::MovingAverage, &args).unwrap();
        assert_eq!(app.jobs.len(), 1);
        assert_eq!(app.jobs[0].inputs[0], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(app.jobs[0].effective_filter_size(), Some(3));
    }

    #[test]
    fn test_quick_config_shift_requires_point() {
        let args = Args::parse_from(["capsule-cli", "--kernel", "coordinate-shift", "--shift", "2"]);
        assert!(quick_config(KernelArg::CoordinateShift, &args).is_err());
    }

    #[test]
    fn test_budget_refusal_fails_run() {
        let mut app = AppConfig::default();
        app.limits.max_context_bytes = Some(4);
        app.jobs
            .push(JobConfig::new("tiny", ContextData::shift(1.0)).with_point(vec![1]));
        let err = run(&app).unwrap_err();
        assert!(format!("{:#}", err).contains("allocate"));
    }
}
