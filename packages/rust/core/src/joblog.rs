//! Job log writer.
//!
//! Records everything a job was resolved from in `<projectdir>/log.json`:
//!
//! ```text
//! {
//!   "arg":    { ...command-line arguments... },
//!   "config": { ...configuration... },
//!   "param":  { ...job descriptor... }
//! }
//! ```
//!
//! Object keys come out sorted at every level, so logs of two runs diff
//! cleanly. The file is written once and never replaced.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use beacon_shared::{Arguments, BeaconError, Configuration, Result};

use crate::descriptor::JobDescriptor;

/// A parsed job log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLog {
    pub arg: Arguments,
    pub config: Configuration,
    pub param: JobDescriptor,
}

#[derive(Serialize)]
struct JobLogRef<'a> {
    arg: &'a Arguments,
    config: &'a Configuration,
    param: &'a JobDescriptor,
}

/// Write the job log into the job's project directory.
///
/// Fails if a log already exists there.
#[instrument(skip_all, fields(job_id = %job.job_id))]
pub fn write_job_log(args: &Arguments, config: &Configuration, job: &JobDescriptor) -> Result<PathBuf> {
    let path = job.log_file();

    // Going through `Value` puts every object in a sorted map.
    let value = serde_json::to_value(JobLogRef {
        arg: args,
        config,
        param: job,
    })
    .map_err(|e| BeaconError::Serialization(format!("job log: {e}")))?;
    let json = serde_json::to_string_pretty(&value)
        .map_err(|e| BeaconError::Serialization(format!("job log: {e}")))?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| BeaconError::io(&path, e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.sync_all())
        .map_err(|e| BeaconError::io(&path, e))?;

    info!(path = %path.display(), "job log written");
    Ok(path)
}

/// Read a job log back.
pub fn read_job_log(path: &Path) -> Result<JobLog> {
    let content = std::fs::read_to_string(path).map_err(|e| BeaconError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| BeaconError::Serialization(format!("invalid job log {}: {e}", path.display())))
}
