//! CLI definition, tracing setup and job execution.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use beacon_core::context::JobContextBuilder;
use beacon_core::pipeline::{PipelineReport, Reporter, run_job};
use beacon_core::runner::ProcessStageRunner;
use beacon_shared::{Arguments, Mode, Stage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// beacon: build Beacon Friendly Format data from a VCF and load it.
#[derive(Parser)]
#[command(
    name = "beacon",
    version,
    about = "Resolve a genomic job and run its vcf2bff / bff2html / bff2mongodb stages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// What to run: info, vcf, mongodb or full.
    pub mode: ModeArg,

    /// Input VCF (.vcf.gz). Required for vcf and full.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Configuration file (defaults to ~/.beacon/config.toml).
    #[arg(short, long, env = "BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Parameter file for this job.
    #[arg(short, long)]
    pub param: Option<PathBuf>,

    /// Number of CPUs the stages may use.
    #[arg(short, long)]
    pub ncpu: Option<u32>,

    /// Debug level passed to the stages.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub debug: Option<u8>,

    /// Verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,
}

/// Pipeline mode.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ModeArg {
    Info,
    Vcf,
    Mongodb,
    Full,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Info => Mode::Info,
            ModeArg::Vcf => Mode::Vcf,
            ModeArg::Mongodb => Mode::Mongodb,
            ModeArg::Full => Mode::Full,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn arguments(&self) -> Arguments {
        let mut args = Arguments::new(self.mode.into());
        args.inputfile = self.input.clone();
        args.configfile = self.config.clone();
        args.paramfile = self.param.clone();
        args.ncpu = self.ncpu;
        args.debug = self.debug;
        args.verbose = self.verbose;
        args
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. `RUST_LOG` takes precedence.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match (cli.debug.unwrap_or(0), cli.verbose) {
        (3.., _) => "beacon=trace",
        (1..=2, _) | (0, true) => "beacon=debug",
        _ => "beacon=info",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Resolve the job described by `cli` and run it.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let args = cli.arguments();
    let builder = JobContextBuilder::from_current_dir()
        .wrap_err("cannot determine working directory")?;

    info!(mode = %args.mode, "starting beacon job");

    let reporter = CliProgress::new();
    let outcome = run_job(args, &builder, &ProcessStageRunner, &reporter);
    reporter.spinner.finish_and_clear();
    let (prepared, report) = outcome.map_err(|e| {
        let context = if e.is_resolution_error() {
            "job could not be resolved; no stage was run"
        } else {
            "beacon pipeline failed"
        };
        color_eyre::eyre::Report::new(e).wrap_err(context)
    })?;

    let stages = if report.stages_run.is_empty() {
        "none".to_string()
    } else {
        report
            .stages_run
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!();
    println!("  Job finished successfully!");
    println!("  ID:      {}", report.job_id);
    println!("  Mode:    {}", prepared.job.mode);
    println!("  Genome:  {}", prepared.job.genome);
    println!("  Project: {}", report.projectdir.display());
    println!("  Log:     {}", prepared.log_path.display());
    println!("  Stages:  {stages}");
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner-backed reporter. Warnings are printed above the spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl Reporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn warning(&self, message: &str) {
        self.spinner.suspend(|| eprintln!("WARNING: {message}"));
    }

    fn stage_started(&self, stage: Stage, position: usize, total: usize) {
        self.spinner
            .set_message(format!("Running [{position}/{total}] {stage}"));
    }

    fn stage_finished(&self, stage: Stage, elapsed: Duration) {
        self.spinner.suspend(|| {
            eprintln!("  {stage} done in {:.1}s", elapsed.as_secs_f64());
        });
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}
