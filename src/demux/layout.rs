//! Filesystem layout of replica histories and sorted trajectories
//!
//! Replica `i` writes its history under `<input_root>/<i>/`, and the sorted
//! trajectory of state `s` lands under `<output_root>/<s>/`. File names come
//! from templates with `{index}`, `{prefix}` and `{job}` placeholders.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::engine::Demuxer;
use super::error::ConfigError;
use super::streams::{ReplicaInput, StateOutput};
use super::DemuxConfig;

/// Default per-replica history template
pub const DEFAULT_INPUT_TEMPLATE: &str = "{index}/{prefix}.job{job}.{index}.history";

/// Default per-state trajectory template
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{index}/{prefix}.job{job}.{index}.sort.history";

/// Where histories are read from and trajectories written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory holding the per-replica histories
    pub input_root: PathBuf,
    /// Directory receiving the per-state trajectories
    pub output_root: PathBuf,
    /// File name prefix of the simulation job
    pub prefix: String,
    /// Job (restart segment) number
    pub job: u32,
    /// Relative path template for replica histories
    pub input_template: String,
    /// Relative path template for state trajectories
    pub output_template: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("output_site"),
            output_root: PathBuf::from("output_off"),
            prefix: "fep".to_string(),
            job: 0,
            input_template: DEFAULT_INPUT_TEMPLATE.to_string(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
        }
    }
}

impl LayoutConfig {
    /// History path of `replica`
    pub fn input_path(&self, replica: usize) -> PathBuf {
        self.input_root.join(self.render(&self.input_template, replica))
    }

    /// Trajectory path of `state`
    pub fn output_path(&self, state: usize) -> PathBuf {
        self.output_root.join(self.render(&self.output_template, state))
    }

    fn render(&self, template: &str, index: usize) -> String {
        template
            .replace("{index}", &index.to_string())
            .replace("{prefix}", &self.prefix)
            .replace("{job}", &self.job.to_string())
    }

    /// Templates must distinguish replicas, or every stream would share one file
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, template) in [
            ("input_template", &self.input_template),
            ("output_template", &self.output_template),
        ] {
            if !template.contains("{index}") {
                return Err(ConfigError::Invalid(format!(
                    "{name} {template:?} has no {{index}} placeholder"
                )));
            }
        }
        Ok(())
    }

    /// Open the history of every replica
    pub fn open_inputs(
        &self,
        num_replicas: usize,
    ) -> std::result::Result<Vec<ReplicaInput>, ConfigError> {
        (0..num_replicas)
            .map(|replica| {
                let path = self.input_path(replica);
                File::open(&path)
                    .map(|file| Box::new(BufReader::new(file)) as ReplicaInput)
                    .map_err(|source| ConfigError::Unreadable { path, source })
            })
            .collect()
    }

    /// Create (truncating) the trajectory file of every state
    pub fn create_outputs(
        &self,
        num_states: usize,
    ) -> std::result::Result<Vec<StateOutput>, ConfigError> {
        (0..num_states)
            .map(|state| {
                let path = self.output_path(state);
                let created = match path.parent() {
                    Some(parent) => fs::create_dir_all(parent),
                    None => Ok(()),
                }
                .and_then(|_| File::create(&path));
                created
                    .map(|file| Box::new(BufWriter::new(file)) as StateOutput)
                    .map_err(|source| ConfigError::Unwritable { path, source })
            })
            .collect()
    }
}

/// Complete description of a run: engine settings plus file layout
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Engine settings
    pub demux: DemuxConfig,
    /// File layout
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl RunConfig {
    /// Open every history and trajectory named by the layout
    ///
    /// All inputs are opened before any output is created, so a missing
    /// history never leaves truncated trajectories behind.
    pub fn open(&self) -> super::Result<Demuxer> {
        self.demux.validate()?;
        self.layout.validate()?;

        let n = self.demux.num_replicas;
        let inputs = self.layout.open_inputs(n)?;
        let outputs = self.layout.create_outputs(n)?;

        tracing::debug!(
            input_root = %self.layout.input_root.display(),
            output_root = %self.layout.output_root.display(),
            replicas = n,
            "Opened replica streams"
        );

        Demuxer::new(self.demux.clone(), inputs, outputs)
    }
}

/// Write a run configuration as JSON
///
/// Writes a temporary file, syncs it, then renames it into place.
pub fn write_config(path: &Path, config: &RunConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(&json).context("Failed to write config")?;
    file.sync_all().context("Failed to sync config")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}

/// Load a run configuration from JSON
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: RunConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;
    Ok(config)
}
