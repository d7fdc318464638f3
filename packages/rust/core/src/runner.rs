//! Process-backed stage runner.
//!
//! Each stage runs as `<bash> <stage program>` inside its own subdirectory of
//! the project directory, with the job exported through environment
//! variables. stdout and stderr both go to the stage's log file.

use std::fs::File;
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument};

use beacon_shared::{BeaconError, Result, Stage};

use crate::descriptor::JobDescriptor;
use crate::pipeline::{StageOutcome, StageRunner, StageStatus};

/// Runs stages as blocking child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessStageRunner;

impl StageRunner for ProcessStageRunner {
    #[instrument(skip_all, fields(%stage))]
    fn invoke(&self, stage: Stage, job: &JobDescriptor) -> Result<StageOutcome> {
        let dir = job.stage_dir(stage);
        std::fs::create_dir_all(&dir).map_err(|e| BeaconError::io(&dir, e))?;

        let log = job.stage_log(stage);
        let stdout = File::create(&log).map_err(|e| BeaconError::io(&log, e))?;
        let stderr = stdout.try_clone().map_err(|e| BeaconError::io(&log, e))?;

        let program = job.tools.stage_program(stage);
        info!(
            shell = %job.tools.bash.display(),
            program = %program.display(),
            log = %log.display(),
            "launching stage"
        );

        let status = Command::new(&job.tools.bash)
            .arg(program)
            .current_dir(&dir)
            .envs(stage_env(stage, job))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|e| BeaconError::StageExecution {
                stage: stage.to_string(),
                status: format!(
                    "could not start `{} {}`: {e}",
                    job.tools.bash.display(),
                    program.display()
                ),
                log: log.clone(),
            })?;

        debug!(?status, "stage exited");

        Ok(StageOutcome {
            status: StageStatus::from(status),
            log,
        })
    }
}

/// Environment exported to `stage`.
pub fn stage_env(stage: Stage, job: &JobDescriptor) -> Vec<(&'static str, String)> {
    let path = |p: &std::path::Path| p.display().to_string();

    let mut env = vec![
        ("DATASETID", job.datasetid.clone()),
        ("PROJECTDIR", path(&job.projectdir)),
        ("GENOME", job.genome.to_string()),
        ("NCPU", job.ncpu.to_string()),
        ("TMPDIR", path(&job.tmpdir)),
        ("ZIP", job.zip.to_string()),
        ("DEBUG", job.debug.to_string()),
        ("VERBOSE", job.verbose.to_string()),
    ];

    match stage {
        Stage::Vcf2Bff => {
            if let Some(input) = &job.inputfile {
                env.push(("INPUT", path(input)));
            }
            env.extend([
                ("REF", path(&job.assets.fasta)),
                ("CLINVAR", path(&job.assets.clinvar)),
                ("COSMIC", path(&job.assets.cosmic)),
                ("DBNSFP", path(&job.assets.dbnsfp)),
                ("DBNSFPSET", job.dbnsfpset.clone()),
                ("MEM", job.mem.clone()),
                ("BCFTOOLS", path(&job.tools.bcftools)),
                ("SNPEFF", path(&job.tools.snpeff)),
                ("SNPSIFT", path(&job.tools.snpsift)),
                ("GENOMICVARIATIONSVCF", path(&job.bff.genomic_variations_vcf)),
            ]);
        }
        Stage::Bff2Html => {
            env.push(("METADATADIR", path(&job.bff.metadatadir)));
            env.extend(metadata_env(job));
            env.push(("GENOMICVARIATIONSVCF", path(&job.bff.genomic_variations_vcf)));
        }
        Stage::Bff2Mongodb => {
            env.push(("METADATADIR", path(&job.bff.metadatadir)));
            env.extend(metadata_env(job));
            env.extend([
                ("GENOMICVARIATIONSVCF", path(&job.bff.genomic_variations_vcf)),
                ("MONGODBURI", job.mongodburi.clone()),
                ("MONGOIMPORT", path(&job.tools.mongoimport)),
                ("MONGOSH", path(&job.tools.mongosh)),
            ]);
        }
    }

    env
}

/// `ANALYSES=...`, `BIOSAMPLES=...` and so on.
fn metadata_env(job: &JobDescriptor) -> Vec<(&'static str, String)> {
    job.bff
        .metadata()
        .into_iter()
        .map(|doc| (doc.env_var, doc.path.display().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use beacon_shared::{Arguments, Artifact, Configuration, Genome, Mode, Parameters, asset_key};

    use crate::context::JobContextBuilder;
    use crate::pipeline::{PipelineOrchestrator, RunState, SilentReporter};
    use crate::resolve::merge;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beacon-runner-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Job whose stages are `sh` scripts under `tmp/bin`.
    fn job(tmp: &Path, mode: Mode) -> JobDescriptor {
        let mut toml_str = String::from(
            "bash = \"sh\"\n\
             vcf2bff = \"bin/vcf2bff.sh\"\n\
             bff2html = \"bin/bff2html.sh\"\n\
             bff2mongodb = \"bin/bff2mongodb.sh\"\n",
        );
        for artifact in Artifact::ALL {
            let key = asset_key(Genome::Hg38, artifact);
            toml_str.push_str(&format!("{key} = \"/ref/{key}\"\n"));
        }
        let config: Configuration = toml::from_str(&toml_str).unwrap();
        let params: Parameters = toml::from_str("genome = \"hg38\"\nncpu = 3\n").unwrap();

        let mut args = Arguments::new(mode);
        if mode.requires_input() {
            args.inputfile = Some(PathBuf::from("in.vcf.gz"));
        }
        let resolved = merge(&config, &params, &args).unwrap();
        JobContextBuilder::new(tmp)
            .build(resolved, &SilentReporter)
            .unwrap()
    }

    fn script(tmp: &Path, name: &str, body: &str) {
        let bin = tmp.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(name), body).unwrap();
    }

    #[test]
    fn env_carries_stage_specific_values() {
        let tmp = temp_dir();
        let job = job(&tmp, Mode::Full);

        let vcf: Vec<_> = stage_env(Stage::Vcf2Bff, &job);
        let get = |env: &[(&str, String)], key: &str| {
            env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        };
        assert_eq!(get(&vcf, "GENOME").as_deref(), Some("hg38"));
        assert_eq!(get(&vcf, "NCPU").as_deref(), Some("3"));
        assert_eq!(get(&vcf, "REF").as_deref(), Some("/ref/hg38fasta"));
        assert!(get(&vcf, "MONGODBURI").is_none());

        let mongo = stage_env(Stage::Bff2Mongodb, &job);
        assert!(get(&mongo, "MONGODBURI").is_some());
        assert!(get(&mongo, "RUNS").unwrap().ends_with("runs.json"));
        assert!(get(&mongo, "INPUT").is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn html_env_names_every_metadata_document() {
        let tmp = temp_dir();
        let job = job(&tmp, Mode::Full);
        let env = stage_env(Stage::Bff2Html, &job);

        for (var, file) in [
            ("ANALYSES", "analyses.json"),
            ("BIOSAMPLES", "biosamples.json"),
            ("COHORTS", "cohorts.json"),
            ("DATASETS", "datasets.json"),
            ("INDIVIDUALS", "individuals.json"),
            ("RUNS", "runs.json"),
        ] {
            let values: Vec<&String> = env.iter().filter(|(k, _)| *k == var).map(|(_, v)| v).collect();
            assert_eq!(values.len(), 1, "{var} exported once");
            assert_eq!(Path::new(values[0]), tmp.join(file));
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[cfg(unix)]
    #[test]
    fn successful_stage_writes_its_log() {
        let tmp = temp_dir();
        script(&tmp, "vcf2bff.sh", "echo \"genome=$GENOME ncpu=$NCPU\"\necho oops >&2\npwd\n");
        let job = job(&tmp, Mode::Vcf);

        let outcome = ProcessStageRunner.invoke(Stage::Vcf2Bff, &job).unwrap();

        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.log, job.stage_dir(Stage::Vcf2Bff).join("run_vcf2bff.log"));
        let log = std::fs::read_to_string(&outcome.log).unwrap();
        assert!(log.contains("genome=hg38 ncpu=3"));
        assert!(log.contains("oops"));
        assert!(log.trim_end().ends_with("vcf"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_failed_status() {
        let tmp = temp_dir();
        script(&tmp, "vcf2bff.sh", "exit 7\n");
        let job = job(&tmp, Mode::Vcf);

        let outcome = ProcessStageRunner.invoke(Stage::Vcf2Bff, &job).unwrap();
        assert_eq!(outcome.status, StageStatus::Failed { code: Some(7) });

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[cfg(unix)]
    #[test]
    fn failing_stage_stops_real_pipeline() {
        let tmp = temp_dir();
        script(&tmp, "vcf2bff.sh", "touch done.txt\n");
        script(&tmp, "bff2html.sh", "exit 2\n");
        script(&tmp, "bff2mongodb.sh", "touch done.txt\n");
        let job = job(&tmp, Mode::Full);

        let runner = ProcessStageRunner;
        let mut orchestrator = PipelineOrchestrator::new(&runner, &SilentReporter);
        let err = orchestrator.run(&job).unwrap_err();

        assert_eq!(orchestrator.state(), RunState::Failed(Stage::Bff2Html));
        assert!(err.to_string().contains("run_bff2html.log"));
        assert!(job.stage_dir(Stage::Vcf2Bff).join("done.txt").exists());
        assert!(!job.stage_dir(Stage::Bff2Mongodb).exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_shell_is_stage_execution_error() {
        let tmp = temp_dir();
        let mut job = job(&tmp, Mode::Vcf);
        job.tools.bash = tmp.join("no-such-shell");

        let err = ProcessStageRunner.invoke(Stage::Vcf2Bff, &job).unwrap_err();
        match err {
            BeaconError::StageExecution { stage, status, .. } => {
                assert_eq!(stage, "vcf2bff");
                assert!(status.starts_with("could not start"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
