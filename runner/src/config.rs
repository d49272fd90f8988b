use crate::inputs::{Engines, WorkflowSettings};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Configuration failed the preflight checks, see the log for details")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    // first component of every group label
    #[serde(default = "default_campaign")]
    pub campaign: String,
    // structure set, e.g. `set1`
    pub set: String,

    #[serde(alias = "db", default)]
    pub database: DatabaseConfig,

    // file holding the plugin name, relative paths resolve against the config file directory
    #[serde(default = "default_plugin_file")]
    pub plugin_file: PathBuf,

    #[serde(default)]
    pub submission: SubmissionConfig,
    pub workflow: WorkflowSettings,
    pub engines: Engines,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SubmissionConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            dry_run: false,
        }
    }
}

impl CampaignConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        debug!("Loading configuration from file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content).map_err(|source| ConfigErrors::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        Ok(config)
    }

    /// Anchor relative paths at `base`, so the campaign runs the same from any directory
    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.plugin_file, &mut self.database.path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }

        debug!(
            plugin_file = ?self.plugin_file,
            database = ?self.database.path,
            "Resolved campaign paths"
        );
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// `{campaign}/{set}/structures`, the full structure set
    pub fn structures_label(&self) -> String {
        format!("{}/{}/structures", self.campaign, self.set)
    }

    /// `{campaign}/{set}/structures/{plugin}`, the structures a plugin can run
    pub fn subgroup_label(&self, plugin: &str) -> String {
        format!("{}/{plugin}", self.structures_label())
    }

    /// `{campaign}/{set}/workflows/{plugin}`, the submitted workflows
    pub fn workflows_label(&self, plugin: &str) -> String {
        format!("{}/{}/workflows/{plugin}", self.campaign, self.set)
    }

    /// Validate the whole configuration, every problem is logged before returning
    pub fn preflight_checks(&self) -> Result<(), ConfigErrors> {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        for (name, value) in [("campaign", &self.campaign), ("set", &self.set)] {
            if value.is_empty() || value.contains('/') {
                error!("{name} '{value}' must be non-empty and must not contain '/'");
                contains_error = true;
            }
        }

        if self.submission.max_concurrent == 0 {
            warn!("submission.max_concurrent is 0, no process will ever be submitted");
        }

        if self.workflow.protocol.is_empty() {
            error!("workflow.protocol must not be empty");
            contains_error = true;
        }

        if self.engines.is_empty() {
            error!("No engine was defined, at least `relax` is required");
            contains_error = true;
        }

        for (name, engine) in self.engines.iter() {
            if engine.options.resources.num_machines == 0 {
                error!("engines.{name}.options.resources.num_machines must be at least 1");
                contains_error = true;
            }

            if engine.options.max_wallclock_seconds == 0 {
                error!("engines.{name}.options.max_wallclock_seconds cannot be 0");
                contains_error = true;
            }

            if let (Some(per_machine), Some(total)) = (
                engine.options.resources.num_mpiprocs_per_machine,
                engine.options.resources.tot_num_mpiprocs,
            ) {
                let num_machines = engine.options.resources.num_machines;
                if per_machine.checked_mul(num_machines) != Some(total) {
                    error!(
                        "engines.{name}.options.resources: tot_num_mpiprocs ({total}) differs from num_machines x num_mpiprocs_per_machine"
                    );
                    contains_error = true;
                }
            }

            if engine.options.withmpi && engine.options.resources.tot_num_mpiprocs == Some(1) {
                warn!("engines.{name} runs with MPI on a single process");
            }
        }

        if contains_error {
            Err(ConfigErrors::Preflight)
        } else {
            Ok(())
        }
    }
}

fn default_campaign() -> String {
    "commonwf-oxides".to_owned()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("aiida.db")
}

fn default_plugin_file() -> PathBuf {
    Path::new("..").join("plugin_name.txt")
}

fn default_max_concurrent() -> usize {
    30
}

#[cfg(test)]
pub(crate) const KKR_CAMPAIGN: &str = r##"
set: set1
workflow:
  protocol: precise
  relax_type: none
  electronic_type: metal
  spin_type: none
engines:
  relax:
    code: KKRhost@claix18_sshtunnel
    options:
      withmpi: true
      resources:
        num_machines: 2
        tot_num_mpiprocs: 96
      max_wallclock_seconds: 36000
      custom_scheduler_commands: "#SBATCH --account=jara0191\n\nulimit -s unlimited; export OMP_STACKSIZE=2g; export OMP_NUM_THREADS=1;"
  voronoi:
    code: voronoi@localhost
    options:
      withmpi: false
      resources:
        num_machines: 1
      max_wallclock_seconds: 600
"##;
