//! Inputs of the common-workflow equation-of-state process
//!
//! Everything here is plain data: engines with their scheduler options, the code-agnostic
//! generator inputs and the final `EosInputs` handed to the workflow engine.

use crate::{database::Node, workflows::WorkflowEntryPoint};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputsError {
    #[error("Invalid code label '{0}', expected 'label@computer'")]
    InvalidCodeLabel(String),
    #[error("Engines [{given}] do not match the engine types [{expected}] of {entry_point}")]
    EngineMismatch {
        entry_point: String,
        given: String,
        expected: String,
    },
    #[error("Protocol '{protocol}' is not supported by {entry_point}")]
    UnsupportedProtocol {
        entry_point: String,
        protocol: String,
    },
}

/// `label@computer` reference to an installed code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeLabel {
    pub label: String,
    pub computer: String,
}

impl FromStr for CodeLabel {
    type Err = InputsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.rsplit_once('@') {
            Some((label, computer)) if !label.is_empty() && !computer.is_empty() => Ok(Self {
                label: label.to_owned(),
                computer: computer.to_owned(),
            }),
            _ => Err(InputsError::InvalidCodeLabel(value.to_owned())),
        }
    }
}

impl TryFrom<String> for CodeLabel {
    type Error = InputsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CodeLabel> for String {
    fn from(code: CodeLabel) -> Self {
        code.to_string()
    }
}

impl Display for CodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.label, self.computer)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    pub num_machines: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_mpiprocs_per_machine: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tot_num_mpiprocs: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    #[serde(default)]
    pub withmpi: bool,
    pub resources: Resources,
    // forwarded to the scheduler, never enforced here
    pub max_wallclock_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_scheduler_commands: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSpec {
    pub code: CodeLabel,
    pub options: EngineOptions,
}

/// engine name (e.g. `relax`, `voronoi`) -> code and options
pub type Engines = BTreeMap<String, EngineSpec>;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelaxType {
    None,
    Positions,
    Volume,
    Shape,
    Cell,
    PositionsCell,
    PositionsVolume,
    PositionsShape,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElectronicType {
    Automatic,
    Metal,
    Insulator,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpinType {
    None,
    Collinear,
    NonCollinear,
    SpinOrbit,
}

/// Physics parameters shared by every submission of a campaign
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSettings {
    pub protocol: String,
    pub relax_type: RelaxType,
    pub electronic_type: ElectronicType,
    pub spin_type: SpinType,
}

/// Code-agnostic inputs of the relaxation sub-process
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorInputs {
    pub engines: Engines,
    pub protocol: String,
    pub relax_type: RelaxType,
    pub electronic_type: ElectronicType,
    pub spin_type: SpinType,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EosInputs {
    pub structure: Uuid,
    pub generator_inputs: GeneratorInputs,
    pub sub_process_class: String,
    /// code-dependent overrides, none for this campaign
    pub sub_process: BTreeMap<String, String>,
}

/// Check that `engines` can drive the generator of `entry_point`
pub fn validate_engines(
    entry_point: &WorkflowEntryPoint,
    engines: &Engines,
) -> Result<(), InputsError> {
    let given = engines.keys().map(String::as_str).collect_vec();
    let expected = entry_point.engine_types.iter().copied().sorted().collect_vec();

    if given != expected {
        return Err(InputsError::EngineMismatch {
            entry_point: entry_point.name(),
            given: given.join(", "),
            expected: expected.join(", "),
        });
    }

    Ok(())
}

/// Build the submission inputs for one structure
pub fn build_inputs(
    structure: &Node,
    entry_point: &WorkflowEntryPoint,
    settings: &WorkflowSettings,
    engines: &Engines,
) -> Result<EosInputs, InputsError> {
    validate_engines(entry_point, engines)?;

    if !entry_point.supports_protocol(&settings.protocol) {
        return Err(InputsError::UnsupportedProtocol {
            entry_point: entry_point.name(),
            protocol: settings.protocol.clone(),
        });
    }

    debug!(structure = %structure.uuid, sub_process = %entry_point.name(), "Building inputs");

    Ok(EosInputs {
        structure: structure.uuid,
        generator_inputs: GeneratorInputs {
            engines: engines.clone(),
            protocol: settings.protocol.clone(),
            relax_type: settings.relax_type,
            electronic_type: settings.electronic_type,
            spin_type: settings.spin_type,
        },
        sub_process_class: entry_point.name(),
        sub_process: BTreeMap::new(),
    })
}
