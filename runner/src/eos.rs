use crate::{
    controller::{ControllerError, ExtrasKey, ExtrasSubmission, ParentGroup},
    database::{Node, SharedConnection},
    inputs::{
        build_inputs, validate_engines, CodeLabel, EngineSpec, Engines, EosInputs,
        WorkflowSettings,
    },
    workflows::{load_workflow_entry_point, ProcessClass},
};
use std::collections::BTreeMap;
use tracing::debug;

/// Submits the common-workflow equation of state for every `(element, configuration)` structure
#[derive(Debug)]
pub struct EosSubmission {
    plugin: String,
    codes: BTreeMap<String, Node>,
    process_class: ProcessClass,
    settings: WorkflowSettings,
    engines: Engines,
}

impl EosSubmission {
    /// Load the codes of all engines and resolve the process class, once per invocation
    pub fn new(
        connection: &SharedConnection,
        plugin: &str,
        settings: WorkflowSettings,
        engines: Engines,
    ) -> Result<Self, ControllerError> {
        // catch engine/generator mismatches before the first structure is looked at
        validate_engines(&load_workflow_entry_point("relax", plugin)?, &engines)?;

        let codes = engines
            .iter()
            .map(|(name, EngineSpec { code, .. })| {
                let CodeLabel { label, computer } = code;
                let node = connection.load_code(label, computer)?;
                debug!(engine = %name, code = %code, pk = node.id, "Loaded code");

                Ok((name.clone(), node))
            })
            .collect::<Result<BTreeMap<_, _>, ControllerError>>()?;

        Ok(Self {
            plugin: plugin.to_owned(),
            codes,
            process_class: ProcessClass::eos(),
            settings,
            engines,
        })
    }

    pub fn codes(&self) -> &BTreeMap<String, Node> {
        &self.codes
    }
}

impl ExtrasSubmission for EosSubmission {
    type Inputs = EosInputs;

    /// the chemical symbol and the oxide configuration (XO, XO2, X2O3, ...)
    fn extra_unique_keys(&self) -> &[&'static str] {
        &["element", "configuration"]
    }

    fn inputs_and_process_class(
        &self,
        parent: &ParentGroup,
        extras: &ExtrasKey,
    ) -> Result<(EosInputs, ProcessClass), ControllerError> {
        let structure = parent.parent_node_from_extras(extras)?;
        let sub_process = load_workflow_entry_point("relax", &self.plugin)?;
        let inputs = build_inputs(&structure, &sub_process, &self.settings, &self.engines)?;

        Ok((inputs, self.process_class.clone()))
    }
}
