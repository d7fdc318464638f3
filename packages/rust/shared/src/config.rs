//! System-wide configuration for the beacon pipeline.
//!
//! The configuration lives at `~/.beacon/config.toml` unless overridden on the
//! command line. It holds executable locations, per-genome reference files and
//! database settings. It is read once per job and never modified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};
use crate::types::{Artifact, Genome, Stage};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".beacon";

/// dbNSFP field set used when neither the parameters nor the configuration name one.
pub const DEFAULT_DBNSFP_SET: &str = "all";

/// Accepted `dbnsfpset` values.
pub const DBNSFP_SETS: [&str; 2] = ["all", "ega"];

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// The configuration document, deserialized from TOML.
///
/// Genome asset paths (`hg19fasta`, `hs37clinvar`, ...) and any key the
/// pipeline does not recognize are kept in [`Configuration::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Shell used to run the stage programs.
    #[serde(default = "default_bash")]
    pub bash: PathBuf,

    #[serde(default = "default_bcftools")]
    pub bcftools: PathBuf,

    #[serde(default = "default_snpeff")]
    pub snpeff: PathBuf,

    #[serde(default = "default_snpsift")]
    pub snpsift: PathBuf,

    #[serde(default = "default_mongoimport")]
    pub mongoimport: PathBuf,

    #[serde(default = "default_mongosh")]
    pub mongosh: PathBuf,

    /// Program run for the `vcf2bff` stage.
    pub vcf2bff: PathBuf,

    /// Program run for the `bff2html` stage.
    pub bff2html: PathBuf,

    /// Program run for the `bff2mongodb` stage.
    pub bff2mongodb: PathBuf,

    /// MongoDB connection string handed to `bff2mongodb`.
    #[serde(default = "default_mongodburi")]
    pub mongodburi: String,

    /// dbNSFP field set: `all` or `ega`.
    #[serde(default = "default_dbnsfpset")]
    pub dbnsfpset: String,

    /// Scratch directory for the stages.
    #[serde(default = "default_tmpdir")]
    pub tmpdir: PathBuf,

    /// Memory budget for Java-based annotators (e.g. `8G`).
    #[serde(default = "default_mem")]
    pub mem: String,

    /// Site default for the number of CPUs.
    #[serde(default)]
    pub ncpu: Option<u32>,

    /// Site default genome selector.
    #[serde(default)]
    pub genome: Option<String>,

    /// Genome asset paths and unrecognized keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_bash() -> PathBuf {
    "bash".into()
}
fn default_bcftools() -> PathBuf {
    "bcftools".into()
}
fn default_snpeff() -> PathBuf {
    "snpEff".into()
}
fn default_snpsift() -> PathBuf {
    "SnpSift".into()
}
fn default_mongoimport() -> PathBuf {
    "mongoimport".into()
}
fn default_mongosh() -> PathBuf {
    "mongosh".into()
}
fn default_mongodburi() -> String {
    "mongodb://127.0.0.1:27017/beacon".into()
}
fn default_dbnsfpset() -> String {
    DEFAULT_DBNSFP_SET.into()
}
fn default_tmpdir() -> PathBuf {
    std::env::temp_dir()
}
fn default_mem() -> String {
    "8G".into()
}

/// Configuration key holding `artifact` for `genome`.
pub fn asset_key(genome: Genome, artifact: Artifact) -> &'static str {
    use Artifact::*;
    use Genome::*;

    match (genome, artifact) {
        (Hg19, Clinvar) => "hg19clinvar",
        (Hg19, Cosmic) => "hg19cosmic",
        (Hg19, Dbnsfp) => "hg19dbnsfp",
        (Hg19, Fasta) => "hg19fasta",
        (Hg38, Clinvar) => "hg38clinvar",
        (Hg38, Cosmic) => "hg38cosmic",
        (Hg38, Dbnsfp) => "hg38dbnsfp",
        (Hg38, Fasta) => "hg38fasta",
        (Hs37, Clinvar) => "hs37clinvar",
        (Hs37, Cosmic) => "hs37cosmic",
        (Hs37, Dbnsfp) => "hs37dbnsfp",
        (Hs37, Fasta) => "hs37fasta",
    }
}

impl Configuration {
    /// Path configured for `artifact` under `genome`, if present.
    pub fn genome_asset(&self, genome: Genome, artifact: Artifact) -> Option<&str> {
        self.extra
            .get(asset_key(genome, artifact))
            .and_then(serde_json::Value::as_str)
    }

    /// Program configured for `stage`.
    pub fn stage_program(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Vcf2Bff => &self.vcf2bff,
            Stage::Bff2Html => &self.bff2html,
            Stage::Bff2Mongodb => &self.bff2mongodb,
        }
    }

    /// Keys in [`Configuration::extra`] that are not genome assets.
    pub fn unrecognized_keys(&self) -> Vec<&str> {
        let assets: Vec<&str> = Genome::ALL
            .iter()
            .flat_map(|g| Artifact::ALL.iter().map(move |a| asset_key(*g, *a)))
            .collect();
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|k| !assets.contains(k))
            .collect()
    }

    /// Check every asset entry and scalar setting that can be checked without
    /// knowing which genome the job will select.
    pub fn validate(&self) -> Result<()> {
        for genome in Genome::ALL {
            for artifact in Artifact::ALL {
                let key = asset_key(genome, artifact);
                match self.extra.get(key) {
                    None => {}
                    Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {}
                    Some(other) => {
                        return Err(BeaconError::config(format!(
                            "'{key}' must be a non-empty path string, got {other}"
                        )));
                    }
                }
            }
        }

        for stage in Stage::ORDER {
            if self.stage_program(stage).as_os_str().is_empty() {
                return Err(BeaconError::config(format!(
                    "'{stage}' program path is empty"
                )));
            }
        }

        if !DBNSFP_SETS.contains(&self.dbnsfpset.as_str()) {
            return Err(BeaconError::config(format!(
                "dbnsfpset '{}' is not one of: {}",
                self.dbnsfpset,
                DBNSFP_SETS.join(", ")
            )));
        }

        if self.ncpu == Some(0) {
            return Err(BeaconError::config("ncpu must be at least 1"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.beacon/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| BeaconError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the default config file (`~/.beacon/config.toml`).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Configuration> {
    match path {
        Some(p) => load_config_from(p),
        None => load_config_from(&default_config_path()?),
    }
}

/// Load and validate the configuration from a specific file path.
pub fn load_config_from(path: &Path) -> Result<Configuration> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            BeaconError::config(format!("configuration file not found: {}", path.display()))
        }
        std::io::ErrorKind::InvalidData => {
            BeaconError::config(format!("configuration file {} is not valid UTF-8", path.display()))
        }
        _ => BeaconError::io(path, e),
    })?;

    let config: Configuration = toml::from_str(&content).map_err(|e| {
        BeaconError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;

    let unknown = config.unrecognized_keys();
    if !unknown.is_empty() {
        tracing::debug!(?path, keys = ?unknown, "configuration has unrecognized keys");
    }
    tracing::debug!(?path, "configuration loaded");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
vcf2bff = "/opt/beacon/bin/run_vcf2bff.sh"
bff2html = "/opt/beacon/bin/run_bff2html.sh"
bff2mongodb = "/opt/beacon/bin/run_bff2mongodb.sh"
"#;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beacon-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Configuration = toml::from_str(MINIMAL).expect("parse");
        assert_eq!(config.bash, PathBuf::from("bash"));
        assert_eq!(config.dbnsfpset, "all");
        assert_eq!(config.mem, "8G");
        assert!(config.ncpu.is_none());
        assert!(config.extra.is_empty());
        config.validate().expect("valid");
    }

    #[test]
    fn missing_stage_program_is_rejected() {
        let err = toml::from_str::<Configuration>("bff2html = \"x\"\nbff2mongodb = \"y\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("vcf2bff"));
    }

    #[test]
    fn every_asset_key_is_composed_from_genome_and_artifact() {
        for genome in Genome::ALL {
            for artifact in Artifact::ALL {
                assert_eq!(
                    asset_key(genome, artifact),
                    format!("{}{}", genome.as_str(), artifact.as_str())
                );
            }
        }
    }

    #[test]
    fn genome_asset_reads_from_extra() {
        let toml_str = format!("{MINIMAL}hg38fasta = \"/ref/hg38.fa\"\nsite = \"CNAG\"\n");
        let config: Configuration = toml::from_str(&toml_str).expect("parse");
        assert_eq!(config.genome_asset(Genome::Hg38, Artifact::Fasta), Some("/ref/hg38.fa"));
        assert_eq!(config.genome_asset(Genome::Hg19, Artifact::Fasta), None);
        assert_eq!(config.unrecognized_keys(), vec!["site"]);
    }

    #[test]
    fn non_string_asset_fails_validation() {
        let toml_str = format!("{MINIMAL}hg19clinvar = 42\n");
        let config: Configuration = toml::from_str(&toml_str).expect("parse");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BeaconError::Config { .. }));
        assert!(err.to_string().contains("hg19clinvar"));
    }

    #[test]
    fn bad_dbnsfpset_fails_validation() {
        let toml_str = format!("{MINIMAL}dbnsfpset = \"everything\"\n");
        let config: Configuration = toml::from_str(&toml_str).expect("parse");
        assert!(config.validate().unwrap_err().to_string().contains("dbnsfpset"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let tmp = temp_dir();
        let err = load_config_from(&tmp.join("nope.toml")).unwrap_err();
        assert!(matches!(err, BeaconError::Config { .. }));
        assert!(err.to_string().contains("not found"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_malformed_file_is_config_error() {
        let tmp = temp_dir();
        let path = tmp.join("config.toml");
        std::fs::write(&path, "vcf2bff = [unterminated").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, BeaconError::Config { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn non_utf8_file_is_config_error() {
        let tmp = temp_dir();
        let path = tmp.join("config.toml");
        std::fs::write(&path, b"vcf2bff = \"\xff\xfe\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, BeaconError::Config { .. }));
        assert!(err.is_resolution_error());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn config_fixture_loads() {
        let config = load_config_from(Path::new("../../../fixtures/toml/config.fixture.toml"))
            .expect("load fixture config");
        for genome in Genome::ALL {
            for artifact in Artifact::ALL {
                assert!(config.genome_asset(genome, artifact).is_some());
            }
        }
        assert_eq!(config.ncpu, Some(4));
        assert!(config.unrecognized_keys().contains(&"contact"));
    }

    #[test]
    fn config_json_roundtrip() {
        let toml_str = format!("{MINIMAL}hs37dbnsfp = \"/db/dbNSFP.txt.gz\"\nncpu = 2\n");
        let config: Configuration = toml::from_str(&toml_str).expect("parse");
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: Configuration = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, config);
    }
}
