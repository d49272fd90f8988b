use std::fmt::Display;
use thiserror::Error;
use tracing::debug;

/// Entry point of the common equation-of-state workflow
pub const EOS_ENTRY_POINT: &str = "common_workflows.eos";

const PROTOCOLS: &[&str] = &["fast", "moderate", "precise"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Unknown workflow category '{0}', only 'relax' is available")]
    UnknownCategory(String),
    #[error("No '{category}' workflow registered for plugin '{plugin}'")]
    UnknownPlugin { category: String, plugin: String },
}

/// A resolved common-workflow implementation and what its input generator accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntryPoint {
    pub category: &'static str,
    pub plugin: &'static str,
    pub engine_types: &'static [&'static str],
    pub protocols: &'static [&'static str],
}

impl WorkflowEntryPoint {
    /// canonical registered name, e.g. `common_workflows.relax.kkr`
    pub fn name(&self) -> String {
        format!("common_workflows.{}.{}", self.category, self.plugin)
    }

    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols.contains(&protocol)
    }
}

/// Reference to the top-level process the controller submits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessClass {
    pub entry_point: &'static str,
}

impl ProcessClass {
    pub fn eos() -> Self {
        Self {
            entry_point: EOS_ENTRY_POINT,
        }
    }
}

impl Display for ProcessClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entry_point)
    }
}

// plugin -> engine types of its relax input generator
const RELAX_WORKFLOWS: &[(&str, &[&str])] = &[
    ("abinit", &["relax"]),
    ("bigdft", &["relax"]),
    ("castep", &["relax"]),
    ("cp2k", &["relax"]),
    ("fleur", &["inpgen", "relax"]),
    ("gaussian", &["relax"]),
    ("gpaw", &["relax"]),
    ("kkr", &["relax", "voronoi"]),
    ("nwchem", &["relax"]),
    ("orca", &["relax"]),
    ("quantum_espresso", &["relax"]),
    ("siesta", &["relax"]),
    ("vasp", &["relax"]),
    ("wien2k", &["relax"]),
];

/// Resolve the `category` workflow implementation of `plugin`
pub fn load_workflow_entry_point(
    category: &str,
    plugin: &str,
) -> Result<WorkflowEntryPoint, WorkflowError> {
    if category != "relax" {
        return Err(WorkflowError::UnknownCategory(category.to_owned()));
    }

    RELAX_WORKFLOWS
        .iter()
        .find(|(name, _)| *name == plugin)
        .map(|&(name, engine_types)| {
            debug!(plugin = name, "Resolved relax workflow");

            WorkflowEntryPoint {
                category: "relax",
                plugin: name,
                engine_types,
                protocols: PROTOCOLS,
            }
        })
        .ok_or_else(|| WorkflowError::UnknownPlugin {
            category: category.to_owned(),
            plugin: plugin.to_owned(),
        })
}
