//! Three-tier merge of arguments, parameters and configuration.
//!
//! Precedence, highest first: command-line argument, parameter document,
//! configuration, built-in default. Nothing here touches the filesystem;
//! the result is turned into a [`crate::descriptor::JobDescriptor`] by
//! [`crate::context::JobContextBuilder`].

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use beacon_shared::{
    Arguments, BeaconError, BffNames, Configuration, DBNSFP_SETS, Genome, Mode, Parameters, Result,
    Stage,
};

use crate::descriptor::{GenomeAssets, StagePlan, Toolchain};

/// Genome used when neither the parameters nor the configuration select one.
pub const DEFAULT_GENOME: &str = "hg19";

/// Dataset identifier used when the parameters do not set one.
pub const DEFAULT_DATASET_ID: &str = "default_beacon_1";

/// Project directory prefix used when the parameters do not set one.
pub const DEFAULT_PROJECT_DIR: &str = "beacon";

const DEFAULT_NCPU: u32 = 1;
const MAX_DEBUG_LEVEL: u8 = 5;

/// Merged, validated job values that do not yet have a project directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJob {
    pub mode: Mode,
    pub inputfile: Option<PathBuf>,
    pub genome: Genome,
    pub datasetid: String,
    /// Prefix of the project directory name.
    pub projectdir: String,
    pub zip: bool,
    pub ncpu: u32,
    pub debug: u8,
    pub verbose: bool,
    pub tmpdir: PathBuf,
    pub mem: String,
    pub dbnsfpset: String,
    pub mongodburi: String,
    pub bff: BffNames,
    pub pipeline: StagePlan,
    pub assets: GenomeAssets,
    pub tools: Toolchain,
    /// Non-fatal notes for the user, reported once the job is built.
    pub advisories: Vec<String>,
}

/// Merge the three sources into one validated set of job values.
#[instrument(skip_all, fields(mode = %args.mode))]
pub fn merge(config: &Configuration, params: &Parameters, args: &Arguments) -> Result<ResolvedJob> {
    let mut advisories = Vec::new();
    let mode = args.mode;

    // Genome and its assets are checked before anything else.
    let selector = params
        .genome
        .as_deref()
        .or(config.genome.as_deref())
        .unwrap_or(DEFAULT_GENOME);
    let genome: Genome = selector.parse()?;
    let assets = GenomeAssets::resolve(config, genome)?;

    let inputfile = args.inputfile.clone().or_else(|| params.inputfile.clone());
    match (&inputfile, mode.requires_input()) {
        (None, true) => {
            return Err(BeaconError::parameter(format!(
                "mode '{mode}' requires an input file (-i <file.vcf.gz>)"
            )));
        }
        (Some(path), true) if !is_vcf_gz(path) => {
            return Err(BeaconError::parameter(format!(
                "input file {} must be a bgzipped VCF (.vcf.gz)",
                path.display()
            )));
        }
        (Some(path), false) => advisories.push(format!(
            "input file {} is not used in mode '{mode}'",
            path.display()
        )),
        _ => {}
    }

    let ncpu = args
        .ncpu
        .or(params.ncpu)
        .or(config.ncpu)
        .unwrap_or(DEFAULT_NCPU);
    if ncpu == 0 {
        return Err(BeaconError::parameter("ncpu must be at least 1"));
    }

    // 0 in the descriptor means no level was requested.
    let debug = match args.debug {
        None => 0,
        Some(level @ 1..=MAX_DEBUG_LEVEL) => level,
        Some(level) => {
            return Err(BeaconError::parameter(format!(
                "debug level {level} is out of range 1-{MAX_DEBUG_LEVEL}"
            )));
        }
    };

    let dbnsfpset = params
        .dbnsfpset
        .clone()
        .unwrap_or_else(|| config.dbnsfpset.clone());
    if !DBNSFP_SETS.contains(&dbnsfpset.as_str()) {
        return Err(BeaconError::parameter(format!(
            "dbnsfpset '{dbnsfpset}' is not one of: {}",
            DBNSFP_SETS.join(", ")
        )));
    }

    let datasetid = non_empty(params.datasetid.as_deref(), DEFAULT_DATASET_ID, "datasetid")?;
    let projectdir = non_empty(params.projectdir.as_deref(), DEFAULT_PROJECT_DIR, "projectdir")?;

    for (collection, name) in params.bff.metadata() {
        if name.trim().is_empty() {
            return Err(BeaconError::parameter(format!(
                "bff.{collection} must name a file"
            )));
        }
    }
    if params.bff.genomic_variations_vcf.trim().is_empty() {
        return Err(BeaconError::parameter("bff.genomicVariationsVcf must name a file"));
    }

    let pipeline = plan_stages(mode, params, &mut advisories);

    if pipeline.bff2mongodb && config.mongodburi.trim().is_empty() {
        return Err(BeaconError::config(
            "mongodburi must be set when the bff2mongodb stage is enabled",
        ));
    }

    let resolved = ResolvedJob {
        mode,
        inputfile,
        genome,
        datasetid,
        projectdir,
        zip: params.zip.unwrap_or(false),
        ncpu,
        debug,
        verbose: args.verbose,
        tmpdir: params.tmpdir.clone().unwrap_or_else(|| config.tmpdir.clone()),
        mem: config.mem.clone(),
        dbnsfpset,
        mongodburi: config.mongodburi.clone(),
        bff: params.bff.clone(),
        pipeline,
        assets,
        tools: Toolchain::from(config),
        advisories,
    };

    debug!(
        genome = %resolved.genome,
        ncpu = resolved.ncpu,
        stages = ?resolved.pipeline.enabled(),
        "job values resolved"
    );

    Ok(resolved)
}

/// Decide which stages run: the mode gates, the parameter flags toggle
/// within the gate, the mode supplies defaults for unset flags.
fn plan_stages(mode: Mode, params: &Parameters, advisories: &mut Vec<String>) -> StagePlan {
    let mut plan = StagePlan::default();

    for stage in Stage::ORDER {
        let requested = params.pipeline.get(stage);
        let enabled = if mode.allows(stage) {
            requested.unwrap_or_else(|| mode.default_enabled(stage))
        } else {
            if requested == Some(true) {
                advisories.push(format!(
                    "pipeline.{stage} is ignored in mode '{mode}'"
                ));
            }
            false
        };
        plan.set(stage, enabled);
    }

    plan
}

fn non_empty(value: Option<&str>, default: &str, key: &str) -> Result<String> {
    match value {
        None => Ok(default.to_string()),
        Some(v) if v.trim().is_empty() => {
            Err(BeaconError::parameter(format!("{key} must not be empty")))
        }
        Some(v) => Ok(v.to_string()),
    }
}

fn is_vcf_gz(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".vcf.gz"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_shared::{Artifact, asset_key};

    fn config() -> Configuration {
        let mut toml_str = String::from(
            "vcf2bff = \"/opt/bin/run_vcf2bff.sh\"\n\
             bff2html = \"/opt/bin/run_bff2html.sh\"\n\
             bff2mongodb = \"/opt/bin/run_bff2mongodb.sh\"\n",
        );
        for genome in Genome::ALL {
            for artifact in Artifact::ALL {
                let key = asset_key(genome, artifact);
                toml_str.push_str(&format!("{key} = \"/ref/{key}\"\n"));
            }
        }
        toml::from_str(&toml_str).expect("parse config")
    }

    fn params(toml_str: &str) -> Parameters {
        toml::from_str(toml_str).expect("parse params")
    }

    fn vcf_args() -> Arguments {
        let mut args = Arguments::new(Mode::Vcf);
        args.inputfile = Some(PathBuf::from("sample.vcf.gz"));
        args
    }

    #[test]
    fn composed_keys_resolve_to_config_values() {
        let config = config();
        for genome in Genome::ALL {
            let p = params(&format!("genome = \"{genome}\""));
            let job = merge(&config, &p, &vcf_args()).expect("merge");
            assert_eq!(job.genome, genome);
            for artifact in Artifact::ALL {
                let expected = config.genome_asset(genome, artifact).unwrap();
                assert_eq!(job.assets.get(artifact), Path::new(expected));
            }
        }
    }

    #[test]
    fn invalid_genome_is_path_resolution_error() {
        let err = merge(&config(), &params("genome = \"mm10\""), &vcf_args()).unwrap_err();
        assert!(matches!(err, BeaconError::PathResolution { .. }));
        assert!(err.to_string().contains("mm10"));
    }

    #[test]
    fn missing_composed_key_is_path_resolution_error() {
        let mut config = config();
        config.extra.remove("hg19fasta");
        let err = merge(&config, &params("genome = \"hg19\""), &vcf_args()).unwrap_err();
        assert!(matches!(err, BeaconError::PathResolution { .. }));
        assert!(err.to_string().contains("hg19fasta"));

        // Other genomes are unaffected.
        assert!(merge(&config, &params("genome = \"hg38\""), &vcf_args()).is_ok());
    }

    #[test]
    fn genome_falls_back_to_config_then_default() {
        let mut config = config();
        let job = merge(&config, &Parameters::default(), &vcf_args()).unwrap();
        assert_eq!(job.genome, Genome::Hg19);

        config.genome = Some("hs37".into());
        let job = merge(&config, &Parameters::default(), &vcf_args()).unwrap();
        assert_eq!(job.genome, Genome::Hs37);

        let job = merge(&config, &params("genome = \"hg38\""), &vcf_args()).unwrap();
        assert_eq!(job.genome, Genome::Hg38);
    }

    #[test]
    fn ncpu_precedence_cli_over_param_over_config() {
        let mut config = config();
        config.ncpu = Some(2);
        let mut args = vcf_args();

        let job = merge(&config, &Parameters::default(), &args).unwrap();
        assert_eq!(job.ncpu, 2);

        let p = params("ncpu = 8");
        let job = merge(&config, &p, &args).unwrap();
        assert_eq!(job.ncpu, 8);

        args.ncpu = Some(16);
        let job = merge(&config, &p, &args).unwrap();
        assert_eq!(job.ncpu, 16);

        config.ncpu = None;
        let job = merge(&config, &Parameters::default(), &vcf_args()).unwrap();
        assert_eq!(job.ncpu, 1);
    }

    #[test]
    fn input_precedence_cli_over_param() {
        let p = params("inputfile = \"from_param.vcf.gz\"");
        let job = merge(&config(), &p, &vcf_args()).unwrap();
        assert_eq!(job.inputfile, Some(PathBuf::from("sample.vcf.gz")));

        let job = merge(&config(), &p, &Arguments::new(Mode::Vcf)).unwrap();
        assert_eq!(job.inputfile, Some(PathBuf::from("from_param.vcf.gz")));
    }

    #[test]
    fn tmpdir_and_dbnsfpset_param_over_config() {
        let p = params("tmpdir = \"/scratch/job\"\ndbnsfpset = \"ega\"");
        let job = merge(&config(), &p, &vcf_args()).unwrap();
        assert_eq!(job.tmpdir, PathBuf::from("/scratch/job"));
        assert_eq!(job.dbnsfpset, "ega");

        let job = merge(&config(), &Parameters::default(), &vcf_args()).unwrap();
        assert_eq!(job.tmpdir, config().tmpdir);
        assert_eq!(job.dbnsfpset, "all");
    }

    #[test]
    fn unknown_dbnsfpset_in_params_is_rejected() {
        let err = merge(&config(), &params("dbnsfpset = \"academic\""), &vcf_args()).unwrap_err();
        assert!(matches!(err, BeaconError::Parameter { .. }));
        assert!(err.to_string().contains(&DBNSFP_SETS.join(", ")));
    }

    #[test]
    fn vcf_and_full_modes_require_input() {
        for mode in [Mode::Vcf, Mode::Full] {
            let err = merge(&config(), &Parameters::default(), &Arguments::new(mode)).unwrap_err();
            assert!(matches!(err, BeaconError::Parameter { .. }));
            assert!(err.to_string().contains("requires an input file"));
        }
        assert!(merge(&config(), &Parameters::default(), &Arguments::new(Mode::Mongodb)).is_ok());
        assert!(merge(&config(), &Parameters::default(), &Arguments::new(Mode::Info)).is_ok());
    }

    #[test]
    fn input_must_be_bgzipped_vcf() {
        let mut args = vcf_args();
        args.inputfile = Some(PathBuf::from("sample.vcf"));
        let err = merge(&config(), &Parameters::default(), &args).unwrap_err();
        assert!(matches!(err, BeaconError::Parameter { .. }));
    }

    #[test]
    fn vcf_mode_plan() {
        let p = params("[pipeline]\nvcf2bff = true\nbff2html = false\nbff2mongodb = false\n");
        let job = merge(&config(), &p, &vcf_args()).unwrap();
        assert_eq!(job.pipeline.enabled(), vec![Stage::Vcf2Bff]);
        assert!(job.advisories.is_empty());
    }

    #[test]
    fn flags_outside_mode_are_ignored_with_advisory() {
        let p = params("[pipeline]\nbff2mongodb = true\n");
        let job = merge(&config(), &p, &vcf_args()).unwrap();
        assert!(!job.pipeline.bff2mongodb);
        assert_eq!(job.advisories.len(), 1);
        assert!(job.advisories[0].contains("bff2mongodb"));
    }

    #[test]
    fn mode_defaults_fill_unset_flags() {
        let mut args = vcf_args();
        args.mode = Mode::Full;
        let job = merge(&config(), &Parameters::default(), &args).unwrap();
        assert_eq!(job.pipeline.enabled(), Stage::ORDER.to_vec());

        let job = merge(&config(), &Parameters::default(), &Arguments::new(Mode::Mongodb)).unwrap();
        assert_eq!(job.pipeline.enabled(), vec![Stage::Bff2Mongodb]);

        let job = merge(&config(), &Parameters::default(), &Arguments::new(Mode::Info)).unwrap();
        assert!(job.pipeline.enabled().is_empty());
    }

    #[test]
    fn empty_mongodburi_rejected_only_when_loading() {
        let mut config = config();
        config.mongodburi = String::new();
        assert!(merge(&config, &Parameters::default(), &vcf_args()).is_ok());
        let err = merge(&config, &Parameters::default(), &Arguments::new(Mode::Mongodb)).unwrap_err();
        assert!(matches!(err, BeaconError::Config { .. }));
    }

    #[test]
    fn bad_scalars_are_parameter_errors() {
        let mut args = vcf_args();
        args.ncpu = Some(0);
        assert!(matches!(
            merge(&config(), &Parameters::default(), &args).unwrap_err(),
            BeaconError::Parameter { .. }
        ));

        for level in [0, 6, 9] {
            let mut args = vcf_args();
            args.debug = Some(level);
            assert!(matches!(
                merge(&config(), &Parameters::default(), &args).unwrap_err(),
                BeaconError::Parameter { .. }
            ));
        }

        let mut args = vcf_args();
        args.debug = Some(5);
        assert_eq!(merge(&config(), &Parameters::default(), &args).unwrap().debug, 5);
        assert_eq!(merge(&config(), &Parameters::default(), &vcf_args()).unwrap().debug, 0);

        let err = merge(&config(), &params("datasetid = \"  \""), &vcf_args()).unwrap_err();
        assert!(err.to_string().contains("datasetid"));

        let err = merge(&config(), &params("[bff]\nruns = \"\""), &vcf_args()).unwrap_err();
        assert!(err.to_string().contains("bff.runs"));
    }
}
