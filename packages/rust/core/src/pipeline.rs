//! End-to-end job pipeline: resolve → build context → write log → run stages.
//!
//! Stages always run in the order `vcf2bff`, `bff2html`, `bff2mongodb`, one at
//! a time, and the first failure stops the run. Finished stages are not undone.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use beacon_shared::{
    Arguments, BeaconError, Configuration, JobId, Result, Stage, load_config, load_params,
};

use crate::context::JobContextBuilder;
use crate::descriptor::JobDescriptor;
use crate::joblog::write_job_log;
use crate::resolve::merge;

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Receives user-facing progress, advisories and the completion signal.
pub trait Reporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// A non-fatal advisory; execution continues.
    fn warning(&self, message: &str);
    /// Called before a stage is invoked. `position` is 1-based among enabled stages.
    fn stage_started(&self, stage: Stage, position: usize, total: usize);
    /// Called after a stage returned success.
    fn stage_finished(&self, stage: Stage, elapsed: Duration);
    /// Called when every enabled stage succeeded.
    fn done(&self, report: &PipelineReport);
}

/// No-op reporter for headless/test usage.
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn phase(&self, _name: &str) {}
    fn warning(&self, _message: &str) {}
    fn stage_started(&self, _stage: Stage, _position: usize, _total: usize) {}
    fn stage_finished(&self, _stage: Stage, _elapsed: Duration) {}
    fn done(&self, _report: &PipelineReport) {}
}

// ---------------------------------------------------------------------------
// Stage runner seam
// ---------------------------------------------------------------------------

/// How a stage terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    /// `code` is `None` when the process was killed by a signal.
    Failed { code: Option<i32> },
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed { code: Some(code) } => write!(f, "exit code {code}"),
            Self::Failed { code: None } => f.write_str("terminated by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for StageStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }
}

/// Result of one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub status: StageStatus,
    /// The stage's own log file.
    pub log: PathBuf,
}

/// Runs one external stage to completion.
pub trait StageRunner {
    /// Block until `stage` has terminated. `Err` means it could not be started.
    fn invoke(&self, stage: Stage, job: &JobDescriptor) -> Result<StageOutcome>;
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Orchestrator state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(Stage),
    Completed,
    Failed(Stage),
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running(stage) => write!(f, "running {stage}"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(stage) => write!(f, "failed at {stage}"),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub job_id: JobId,
    pub projectdir: PathBuf,
    /// Stages that ran, in order.
    pub stages_run: Vec<Stage>,
    pub elapsed: Duration,
}

/// Runs the enabled stages of one job in the fixed order.
pub struct PipelineOrchestrator<'a> {
    runner: &'a dyn StageRunner,
    reporter: &'a dyn Reporter,
    state: RunState,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(runner: &'a dyn StageRunner, reporter: &'a dyn Reporter) -> Self {
        Self {
            runner,
            reporter,
            state: RunState::Pending,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every enabled stage. Only a `Pending` orchestrator can run.
    #[instrument(skip_all, fields(job_id = %job.job_id))]
    pub fn run(&mut self, job: &JobDescriptor) -> Result<PipelineReport> {
        if self.state != RunState::Pending {
            return Err(BeaconError::AlreadyRun {
                state: self.state.to_string(),
            });
        }

        let start = Instant::now();
        let stages = job.pipeline.enabled();
        let total = stages.len();

        for stage in Stage::ORDER {
            if !job.pipeline.is_enabled(stage) {
                debug!(%stage, "stage disabled, skipping");
            }
        }

        info!(stages = ?stages, "starting pipeline");

        for (i, &stage) in stages.iter().enumerate() {
            self.state = RunState::Running(stage);
            self.reporter.stage_started(stage, i + 1, total);
            let stage_start = Instant::now();

            let outcome = match self.runner.invoke(stage, job) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.state = RunState::Failed(stage);
                    error!(%stage, error = %e, "stage could not be started");
                    return Err(e);
                }
            };

            match outcome.status {
                StageStatus::Success => {
                    let elapsed = stage_start.elapsed();
                    info!(%stage, elapsed_ms = elapsed.as_millis(), "stage finished");
                    self.reporter.stage_finished(stage, elapsed);
                }
                status => {
                    self.state = RunState::Failed(stage);
                    error!(%stage, %status, log = %outcome.log.display(), "stage failed");
                    return Err(BeaconError::StageExecution {
                        stage: stage.to_string(),
                        status: status.to_string(),
                        log: outcome.log,
                    });
                }
            }
        }

        self.state = RunState::Completed;

        let report = PipelineReport {
            job_id: job.job_id.clone(),
            projectdir: job.projectdir.clone(),
            stages_run: stages,
            elapsed: start.elapsed(),
        };

        self.reporter.done(&report);
        info!(
            stages_run = report.stages_run.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "pipeline complete"
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

/// A job whose descriptor is built and whose log is on disk.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub args: Arguments,
    pub config: Configuration,
    pub job: JobDescriptor,
    pub log_path: PathBuf,
}

/// Resolve, build and log a job without running any stage.
///
/// 1. Load the configuration (`args.configfile` or the default location)
/// 2. Load the parameter document (`args.paramfile`, optional)
/// 3. Merge all three sources
/// 4. Create the project directory with `builder`
/// 5. Write the job log
#[instrument(skip_all, fields(mode = %args.mode))]
pub fn prepare_job(
    args: Arguments,
    builder: &JobContextBuilder,
    reporter: &dyn Reporter,
) -> Result<PreparedJob> {
    reporter.phase("Loading configuration");
    let config = load_config(args.configfile.as_deref())?;

    reporter.phase("Loading parameters");
    let params = load_params(args.paramfile.as_deref())?;

    reporter.phase("Resolving job");
    let resolved = merge(&config, &params, &args)?;

    reporter.phase("Creating project directory");
    let job = builder.build(resolved, reporter)?;

    reporter.phase("Writing job log");
    let log_path = write_job_log(&args, &config, &job)?;

    Ok(PreparedJob {
        args,
        config,
        job,
        log_path,
    })
}

/// Prepare a job and run its enabled stages with `runner`.
pub fn run_job(
    args: Arguments,
    builder: &JobContextBuilder,
    runner: &dyn StageRunner,
    reporter: &dyn Reporter,
) -> Result<(PreparedJob, PipelineReport)> {
    let prepared = prepare_job(args, builder, reporter)?;

    if prepared.job.pipeline.enabled().is_empty() {
        warn!(mode = %prepared.job.mode, "no stage enabled for this job");
    }

    let mut orchestrator = PipelineOrchestrator::new(runner, reporter);
    let report = orchestrator.run(&prepared.job)?;
    Ok((prepared, report))
}
