//! Job context builder.
//!
//! Gives a resolved job its identity and its own project directory, and
//! rewrites every relative path the stages need into an absolute one.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument};

use beacon_shared::{BeaconError, JobId, Result, Stage};

use crate::descriptor::{BffPaths, JobDescriptor};
use crate::pipeline::Reporter;
use crate::resolve::ResolvedJob;

/// Builds the final [`JobDescriptor`] for a [`ResolvedJob`].
#[derive(Debug, Clone)]
pub struct JobContextBuilder {
    /// Directory relative paths are resolved against.
    base_dir: PathBuf,
    /// Fixed identifier; a fresh one is generated when unset.
    job_id: Option<JobId>,
}

impl JobContextBuilder {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            job_id: None,
        }
    }

    /// Builder rooted at the process working directory.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| BeaconError::io(".", e))?;
        Ok(Self::new(cwd))
    }

    /// Use `job_id` instead of generating one.
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Project directory a job with `job_id` and `prefix` owns.
    pub fn project_dir(&self, prefix: &str, job_id: &JobId) -> PathBuf {
        absolutize(&self.base_dir, Path::new(&format!("{prefix}_{job_id}")))
    }

    /// Create the project directory and produce the job descriptor.
    ///
    /// Advisories collected during resolution, and any found here, go to
    /// `reporter` as warnings.
    #[instrument(skip_all, fields(mode = %resolved.mode, genome = %resolved.genome))]
    pub fn build(&self, resolved: ResolvedJob, reporter: &dyn Reporter) -> Result<JobDescriptor> {
        let job_id = self.job_id.clone().unwrap_or_default();
        let projectdir = self.project_dir(&resolved.projectdir, &job_id);

        ensure_project_dir(&projectdir)?;

        let base = &self.base_dir;
        let inputfile = resolved.inputfile.as_deref().map(|p| absolutize(base, p));
        let bff = bff_paths(base, &projectdir, &resolved);
        let tools = resolved.tools.map_paths(|p| resolve_program(base, p));
        let assets = resolved.assets.map_paths(|p| absolutize(base, &p));

        let job = JobDescriptor {
            job_id,
            created_at: Utc::now(),
            mode: resolved.mode,
            projectdir,
            inputfile,
            genome: resolved.genome,
            datasetid: resolved.datasetid,
            zip: resolved.zip,
            ncpu: resolved.ncpu,
            debug: resolved.debug,
            verbose: resolved.verbose,
            tmpdir: absolutize(base, &resolved.tmpdir),
            mem: resolved.mem,
            dbnsfpset: resolved.dbnsfpset,
            mongodburi: resolved.mongodburi,
            bff,
            pipeline: resolved.pipeline,
            assets,
            tools,
        };

        for advisory in resolved.advisories.iter().chain(check_inputs(&job).iter()) {
            reporter.warning(advisory);
        }

        info!(
            job_id = %job.job_id,
            projectdir = %job.projectdir.display(),
            stages = ?job.pipeline.enabled(),
            "job context ready"
        );

        Ok(job)
    }
}

/// Create `dir` and any missing parents. An existing directory is left as is.
pub fn ensure_project_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| BeaconError::io(dir, e))?;
    debug!(path = %dir.display(), "project directory ready");
    Ok(())
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Bare program names are left for `PATH` lookup; relative paths are anchored.
fn resolve_program(base: &Path, program: PathBuf) -> PathBuf {
    let bare = matches!(
        program.components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if bare {
        program
    } else {
        absolutize(base, &program)
    }
}

fn bff_paths(base: &Path, projectdir: &Path, resolved: &ResolvedJob) -> BffPaths {
    let names = &resolved.bff;
    let metadatadir = absolutize(base, &names.metadatadir);

    // bff2mongodb loads what vcf2bff writes when both run in the same job.
    let genomic_variations_vcf = if resolved.pipeline.is_enabled(Stage::Vcf2Bff) {
        projectdir
            .join(Stage::Vcf2Bff.workdir())
            .join(&names.genomic_variations_vcf)
    } else {
        metadatadir.join(&names.genomic_variations_vcf)
    };

    BffPaths {
        analyses: metadatadir.join(&names.analyses),
        biosamples: metadatadir.join(&names.biosamples),
        cohorts: metadatadir.join(&names.cohorts),
        datasets: metadatadir.join(&names.datasets),
        individuals: metadatadir.join(&names.individuals),
        runs: metadatadir.join(&names.runs),
        genomic_variations_vcf,
        metadatadir,
    }
}

/// Non-fatal checks on files the enabled stages will read.
fn check_inputs(job: &JobDescriptor) -> Vec<String> {
    let mut advisories = Vec::new();

    if job.pipeline.vcf2bff {
        if let Some(input) = job.inputfile.as_deref().filter(|p| !p.exists()) {
            advisories.push(format!("input file {} does not exist", input.display()));
        }
    }

    if job.pipeline.bff2html || job.pipeline.bff2mongodb {
        let missing: Vec<&str> = job
            .bff
            .metadata()
            .into_iter()
            .filter(|doc| !doc.path.exists())
            .map(|doc| doc.collection)
            .collect();
        if !missing.is_empty() {
            advisories.push(format!(
                "metadata documents not found in {}: {}",
                job.bff.metadatadir.display(),
                missing.join(", ")
            ));
        }
    }

    for stage in job.pipeline.enabled() {
        let program = job.tools.stage_program(stage);
        if program.is_absolute() && !program.exists() {
            advisories.push(format!(
                "{stage} program {} does not exist",
                program.display()
            ));
        }
    }

    advisories
}
