//! Core domain types for beacon jobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BeaconError;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Genome / Artifact
// ---------------------------------------------------------------------------

/// Reference assembly selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genome {
    Hg19,
    Hg38,
    Hs37,
}

impl Genome {
    pub const ALL: [Genome; 3] = [Genome::Hg19, Genome::Hg38, Genome::Hs37];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hg19 => "hg19",
            Self::Hg38 => "hg38",
            Self::Hs37 => "hs37",
        }
    }
}

impl std::fmt::Display for Genome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Genome {
    type Err = BeaconError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hg19" => Ok(Self::Hg19),
            "hg38" => Ok(Self::Hg38),
            "hs37" => Ok(Self::Hs37),
            other => Err(BeaconError::path_resolution(format!(
                "unsupported genome '{other}': expected one of hg19, hg38, hs37"
            ))),
        }
    }
}

/// Genome-dependent reference artifact looked up in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Clinvar,
    Cosmic,
    Dbnsfp,
    Fasta,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Clinvar,
        Artifact::Cosmic,
        Artifact::Dbnsfp,
        Artifact::Fasta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clinvar => "clinvar",
            Self::Cosmic => "cosmic",
            Self::Dbnsfp => "dbnsfp",
            Self::Fasta => "fasta",
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the three external pipeline stages.
///
/// Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Vcf2Bff,
    Bff2Html,
    Bff2Mongodb,
}

impl Stage {
    /// Fixed execution order.
    pub const ORDER: [Stage; 3] = [Stage::Vcf2Bff, Stage::Bff2Html, Stage::Bff2Mongodb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vcf2Bff => "vcf2bff",
            Self::Bff2Html => "bff2html",
            Self::Bff2Mongodb => "bff2mongodb",
        }
    }

    /// Zero-based position in [`Stage::ORDER`].
    pub fn rank(&self) -> usize {
        match self {
            Self::Vcf2Bff => 0,
            Self::Bff2Html => 1,
            Self::Bff2Mongodb => 2,
        }
    }

    /// Subdirectory of the project directory the stage works in.
    pub fn workdir(&self) -> &'static str {
        match self {
            Self::Vcf2Bff => "vcf",
            Self::Bff2Html => "browser",
            Self::Bff2Mongodb => "mongodb",
        }
    }

    /// File name of the stage's own log inside its workdir.
    pub fn log_file_name(&self) -> String {
        format!("run_{}.log", self.as_str())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Top-level run mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Resolve and log the job without running any stage.
    Info,
    Vcf,
    Mongodb,
    Full,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Vcf => "vcf",
            Self::Mongodb => "mongodb",
            Self::Full => "full",
        }
    }

    /// Whether the mode permits `stage` to run at all.
    pub fn allows(&self, stage: Stage) -> bool {
        match (self, stage) {
            (Self::Info, _) => false,
            (Self::Vcf, Stage::Bff2Mongodb) => false,
            (Self::Vcf, _) => true,
            (Self::Mongodb, Stage::Bff2Mongodb) => true,
            (Self::Mongodb, _) => false,
            (Self::Full, _) => true,
        }
    }

    /// Enable flag used when the parameter document says nothing about `stage`.
    pub fn default_enabled(&self, stage: Stage) -> bool {
        match (self, stage) {
            (Self::Vcf, Stage::Bff2Html) => false,
            (mode, stage) => mode.allows(stage),
        }
    }

    /// Modes that read a VCF and therefore need an input file.
    pub fn requires_input(&self) -> bool {
        matches!(self, Self::Vcf | Self::Full)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Command-line derived values, recorded verbatim in the job log under `arg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    pub mode: Mode,
    #[serde(default)]
    pub inputfile: Option<PathBuf>,
    #[serde(default)]
    pub configfile: Option<PathBuf>,
    #[serde(default)]
    pub paramfile: Option<PathBuf>,
    #[serde(default)]
    pub ncpu: Option<u32>,
    /// Debug level, 1–5.
    #[serde(default)]
    pub debug: Option<u8>,
    #[serde(default)]
    pub verbose: bool,
}

impl Arguments {
    /// Arguments for `mode` with every optional flag unset.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            inputfile: None,
            configfile: None,
            paramfile: None,
            ncpu: None,
            debug: None,
            verbose: false,
        }
    }
}
