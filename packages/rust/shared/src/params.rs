//! Per-job parameter document.
//!
//! Every field is optional: values left out fall back to the configuration
//! and then to built-in defaults when the job is resolved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};
use crate::types::Stage;

/// Top-level parameter document, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Parameters {
    /// Dataset identifier written into every BFF document.
    #[serde(default)]
    pub datasetid: Option<String>,

    /// Reference genome selector, validated at resolution time.
    #[serde(default)]
    pub genome: Option<String>,

    /// Prefix of the project directory name.
    #[serde(default)]
    pub projectdir: Option<String>,

    /// Compress stage outputs.
    #[serde(default)]
    pub zip: Option<bool>,

    #[serde(default)]
    pub inputfile: Option<PathBuf>,

    #[serde(default)]
    pub ncpu: Option<u32>,

    #[serde(default)]
    pub tmpdir: Option<PathBuf>,

    #[serde(default)]
    pub dbnsfpset: Option<String>,

    /// `[bff]` section.
    #[serde(default)]
    pub bff: BffNames,

    /// `[pipeline]` section.
    #[serde(default)]
    pub pipeline: PipelineFlags,

    /// Experimental and site-specific fields, ignored by the pipeline.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// `[bff]` section: names of the BFF documents a job reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BffNames {
    /// Directory holding the six metadata documents.
    pub metadatadir: PathBuf,
    pub analyses: String,
    pub biosamples: String,
    pub cohorts: String,
    pub datasets: String,
    pub individuals: String,
    pub runs: String,
    /// Genomic variations document produced by `vcf2bff`.
    #[serde(rename = "genomicVariationsVcf")]
    pub genomic_variations_vcf: String,
}

impl Default for BffNames {
    fn default() -> Self {
        Self {
            metadatadir: PathBuf::from("."),
            analyses: "analyses.json".into(),
            biosamples: "biosamples.json".into(),
            cohorts: "cohorts.json".into(),
            datasets: "datasets.json".into(),
            individuals: "individuals.json".into(),
            runs: "runs.json".into(),
            genomic_variations_vcf: "genomicVariationsVcf.json.gz".into(),
        }
    }
}

impl BffNames {
    /// The six metadata documents as `(collection, file name)` pairs.
    pub fn metadata(&self) -> [(&'static str, &str); 6] {
        [
            ("analyses", self.analyses.as_str()),
            ("biosamples", self.biosamples.as_str()),
            ("cohorts", self.cohorts.as_str()),
            ("datasets", self.datasets.as_str()),
            ("individuals", self.individuals.as_str()),
            ("runs", self.runs.as_str()),
        ]
    }
}

/// `[pipeline]` section: per-stage enable flags. Unset means "mode default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFlags {
    #[serde(default)]
    pub vcf2bff: Option<bool>,
    #[serde(default)]
    pub bff2html: Option<bool>,
    #[serde(default)]
    pub bff2mongodb: Option<bool>,
}

impl PipelineFlags {
    pub fn get(&self, stage: Stage) -> Option<bool> {
        match stage {
            Stage::Vcf2Bff => self.vcf2bff,
            Stage::Bff2Html => self.bff2html,
            Stage::Bff2Mongodb => self.bff2mongodb,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter loading
// ---------------------------------------------------------------------------

/// Load the parameter document from `path`; without one, every value is left
/// to the configuration and built-in defaults.
pub fn load_params(path: Option<&Path>) -> Result<Parameters> {
    match path {
        Some(p) => load_params_from(p),
        None => {
            tracing::debug!("no parameter file given, using defaults");
            Ok(Parameters::default())
        }
    }
}

/// Load the parameter document from a specific file path.
pub fn load_params_from(path: &Path) -> Result<Parameters> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            BeaconError::parameter(format!("parameter file not found: {}", path.display()))
        }
        std::io::ErrorKind::InvalidData => {
            BeaconError::parameter(format!("parameter file {} is not valid UTF-8", path.display()))
        }
        _ => BeaconError::io(path, e),
    })?;

    let params: Parameters = toml::from_str(&content).map_err(|e| {
        BeaconError::parameter(format!("failed to parse {}: {e}", path.display()))
    })?;

    if !params.extra.is_empty() {
        let ignored: Vec<&String> = params.extra.keys().collect();
        tracing::debug!(?path, ?ignored, "ignoring unrecognized parameter fields");
    }

    Ok(params)
}
