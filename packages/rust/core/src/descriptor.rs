//! The resolved job record and its parts.
//!
//! A [`JobDescriptor`] is built once per invocation by
//! [`crate::context::JobContextBuilder`] and only ever handed out by shared
//! reference afterwards. Stages read every value they need from here.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beacon_shared::{
    Artifact, BeaconError, Configuration, Genome, JobId, Mode, Result, Stage, asset_key,
};

/// File name of the job log inside the project directory.
pub const JOB_LOG_FILE: &str = "log.json";

// ---------------------------------------------------------------------------
// StagePlan
// ---------------------------------------------------------------------------

/// Which stages run for this job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    pub vcf2bff: bool,
    pub bff2html: bool,
    pub bff2mongodb: bool,
}

impl StagePlan {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Vcf2Bff => self.vcf2bff,
            Stage::Bff2Html => self.bff2html,
            Stage::Bff2Mongodb => self.bff2mongodb,
        }
    }

    pub fn set(&mut self, stage: Stage, enabled: bool) {
        match stage {
            Stage::Vcf2Bff => self.vcf2bff = enabled,
            Stage::Bff2Html => self.bff2html = enabled,
            Stage::Bff2Mongodb => self.bff2mongodb = enabled,
        }
    }

    /// Enabled stages in execution order.
    pub fn enabled(&self) -> Vec<Stage> {
        Stage::ORDER
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// GenomeAssets
// ---------------------------------------------------------------------------

/// Reference files for the selected genome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeAssets {
    pub clinvar: PathBuf,
    pub cosmic: PathBuf,
    pub dbnsfp: PathBuf,
    pub fasta: PathBuf,
}

impl GenomeAssets {
    /// Look up every artifact of `genome` in the configuration.
    ///
    /// Fails on the first artifact whose key is absent.
    pub fn resolve(config: &Configuration, genome: Genome) -> Result<Self> {
        let lookup = |artifact: Artifact| -> Result<PathBuf> {
            config
                .genome_asset(genome, artifact)
                .map(PathBuf::from)
                .ok_or_else(|| {
                    BeaconError::path_resolution(format!(
                        "configuration has no '{}' entry: the {} file for genome {genome} is required",
                        asset_key(genome, artifact),
                        artifact.as_str(),
                    ))
                })
        };

        Ok(Self {
            clinvar: lookup(Artifact::Clinvar)?,
            cosmic: lookup(Artifact::Cosmic)?,
            dbnsfp: lookup(Artifact::Dbnsfp)?,
            fasta: lookup(Artifact::Fasta)?,
        })
    }

    /// Apply `f` to every asset path.
    pub(crate) fn map_paths(self, f: impl Fn(PathBuf) -> PathBuf) -> Self {
        Self {
            clinvar: f(self.clinvar),
            cosmic: f(self.cosmic),
            dbnsfp: f(self.dbnsfp),
            fasta: f(self.fasta),
        }
    }

    pub fn get(&self, artifact: Artifact) -> &Path {
        match artifact {
            Artifact::Clinvar => &self.clinvar,
            Artifact::Cosmic => &self.cosmic,
            Artifact::Dbnsfp => &self.dbnsfp,
            Artifact::Fasta => &self.fasta,
        }
    }
}

// ---------------------------------------------------------------------------
// Toolchain
// ---------------------------------------------------------------------------

/// Executables the stages use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub bash: PathBuf,
    pub bcftools: PathBuf,
    pub snpeff: PathBuf,
    pub snpsift: PathBuf,
    pub mongoimport: PathBuf,
    pub mongosh: PathBuf,
    pub vcf2bff: PathBuf,
    pub bff2html: PathBuf,
    pub bff2mongodb: PathBuf,
}

impl From<&Configuration> for Toolchain {
    fn from(config: &Configuration) -> Self {
        Self {
            bash: config.bash.clone(),
            bcftools: config.bcftools.clone(),
            snpeff: config.snpeff.clone(),
            snpsift: config.snpsift.clone(),
            mongoimport: config.mongoimport.clone(),
            mongosh: config.mongosh.clone(),
            vcf2bff: config.vcf2bff.clone(),
            bff2html: config.bff2html.clone(),
            bff2mongodb: config.bff2mongodb.clone(),
        }
    }
}

impl Toolchain {
    /// Program run for `stage`.
    pub fn stage_program(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Vcf2Bff => &self.vcf2bff,
            Stage::Bff2Html => &self.bff2html,
            Stage::Bff2Mongodb => &self.bff2mongodb,
        }
    }

    /// Apply `f` to every executable path.
    pub(crate) fn map_paths(self, f: impl Fn(PathBuf) -> PathBuf) -> Self {
        Self {
            bash: f(self.bash),
            bcftools: f(self.bcftools),
            snpeff: f(self.snpeff),
            snpsift: f(self.snpsift),
            mongoimport: f(self.mongoimport),
            mongosh: f(self.mongosh),
            vcf2bff: f(self.vcf2bff),
            bff2html: f(self.bff2html),
            bff2mongodb: f(self.bff2mongodb),
        }
    }
}

// ---------------------------------------------------------------------------
// BffPaths
// ---------------------------------------------------------------------------

/// Absolute locations of the BFF documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BffPaths {
    pub metadatadir: PathBuf,
    pub analyses: PathBuf,
    pub biosamples: PathBuf,
    pub cohorts: PathBuf,
    pub datasets: PathBuf,
    pub individuals: PathBuf,
    pub runs: PathBuf,
    pub genomic_variations_vcf: PathBuf,
}

/// One metadata document of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataDoc<'a> {
    pub collection: &'static str,
    /// Environment variable the stages read its path from.
    pub env_var: &'static str,
    pub path: &'a Path,
}

impl BffPaths {
    /// The six metadata documents.
    pub fn metadata(&self) -> [MetadataDoc<'_>; 6] {
        [
            MetadataDoc::new("analyses", "ANALYSES", &self.analyses),
            MetadataDoc::new("biosamples", "BIOSAMPLES", &self.biosamples),
            MetadataDoc::new("cohorts", "COHORTS", &self.cohorts),
            MetadataDoc::new("datasets", "DATASETS", &self.datasets),
            MetadataDoc::new("individuals", "INDIVIDUALS", &self.individuals),
            MetadataDoc::new("runs", "RUNS", &self.runs),
        ]
    }
}

impl<'a> MetadataDoc<'a> {
    fn new(collection: &'static str, env_var: &'static str, path: &'a Path) -> Self {
        Self {
            collection,
            env_var,
            path,
        }
    }
}

// ---------------------------------------------------------------------------
// JobDescriptor
// ---------------------------------------------------------------------------

/// The fully resolved, immutable record driving one pipeline invocation.
///
/// Recorded in the job log under `param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub mode: Mode,
    /// The job's own working directory.
    pub projectdir: PathBuf,
    pub inputfile: Option<PathBuf>,
    pub genome: Genome,
    pub datasetid: String,
    pub zip: bool,
    pub ncpu: u32,
    /// 0 when no debug level was requested.
    pub debug: u8,
    pub verbose: bool,
    pub tmpdir: PathBuf,
    pub mem: String,
    pub dbnsfpset: String,
    pub mongodburi: String,
    pub bff: BffPaths,
    pub pipeline: StagePlan,
    pub assets: GenomeAssets,
    pub tools: Toolchain,
}

impl JobDescriptor {
    /// Where the job log is written.
    pub fn log_file(&self) -> PathBuf {
        self.projectdir.join(JOB_LOG_FILE)
    }

    /// Working directory of `stage`.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.projectdir.join(stage.workdir())
    }

    /// The stage's own log file.
    pub fn stage_log(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(stage.log_file_name())
    }
}
