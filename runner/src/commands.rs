use crate::{
    cli::{ExportArgs, SubmitArgs, SubmitOneArgs},
    config::CampaignConfig,
    controller::{ControllerConfig, ExtrasKey, FromGroupController},
    database::{ProcessHandle, SharedConnection},
    eos::EosSubmission,
    error::Result,
    export::export_uuids,
    plugins::{read_plugin_name, PLUGINS},
    selector::{create_subgroup, SubgroupReport},
};
use std::collections::BTreeMap;
use tracing::{info, instrument};

fn open_store(config: &CampaignConfig) -> Result<SharedConnection> {
    let connection = SharedConnection::load(&config.database.path)?;
    connection.init()?;

    Ok(connection)
}

/// Create or extend the per-plugin structure subgroup
#[instrument(skip_all)]
pub fn select(config: &CampaignConfig) -> Result<SubgroupReport> {
    // the plugin name is needed for the destination label, nothing is touched without it
    let plugin = read_plugin_name(&config.plugin_file)?;
    let connection = open_store(config)?;

    let elements = PLUGINS.valid_elements(&plugin, &connection)?;
    let report = create_subgroup(
        &connection,
        &elements,
        &config.structures_label(),
        &config.subgroup_label(&plugin),
    )?;
    connection.close()?;

    println!("Number of valid elements: {}", report.valid_elements);
    println!("Structures from full group added to group '{}'", report.label);
    println!("Current group size: {}", report.size);

    Ok(report)
}

#[instrument(skip_all)]
pub fn export(config: &CampaignConfig, args: &ExportArgs) -> Result<()> {
    let connection = open_store(config)?;
    let path = export_uuids(
        &connection,
        &config.structures_label(),
        &config.set,
        &args.output_dir,
    )?;
    connection.close()?;

    println!("File '{}' written.", path.display());

    Ok(())
}

/// Counters of a controller, in the order they are reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub already_run: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
    pub active_slots: usize,
    pub to_run: usize,
}

impl Status {
    fn collect(controller: &FromGroupController<EosSubmission>) -> Result<Self> {
        Ok(Self {
            already_run: controller.num_already_run()?,
            max_concurrent: controller.max_concurrent(),
            available_slots: controller.num_available_slots()?,
            active_slots: controller.num_active_slots()?,
            to_run: controller.num_to_run()?,
        })
    }

    fn print(&self) {
        println!("Already run    : {}", self.already_run);
        println!("Max concurrent : {}", self.max_concurrent);
        println!("Available slots: {}", self.available_slots);
        println!("Active slots   : {}", self.active_slots);
        println!("Still to run   : {}", self.to_run);
        println!();
    }
}

/// Run `action` against the EOS controller of the configured plugin
fn with_controller<T>(
    config: &CampaignConfig,
    max_concurrent: usize,
    action: impl FnOnce(&FromGroupController<EosSubmission>) -> Result<T>,
) -> Result<T> {
    let plugin = read_plugin_name(&config.plugin_file)?;
    let connection = open_store(config)?;

    let result = {
        let submission = EosSubmission::new(
            &connection,
            &plugin,
            config.workflow.clone(),
            config.engines.clone(),
        )?;
        for (engine, code) in submission.codes() {
            info!(engine = %engine, pk = code.id, "Using code {}", code.label);
        }

        let controller = FromGroupController::new(
            submission,
            connection.clone(),
            &ControllerConfig {
                parent_group_label: config.subgroup_label(&plugin),
                group_label: config.workflows_label(&plugin),
                max_concurrent,
            },
        )?;

        action(&controller)?
    };
    connection.close()?;

    Ok(result)
}

pub fn status(config: &CampaignConfig) -> Result<Status> {
    with_controller(config, config.submission.max_concurrent, |controller| {
        let status = Status::collect(controller)?;
        status.print();

        Ok(status)
    })
}

pub fn submit(
    config: &CampaignConfig,
    args: &SubmitArgs,
) -> Result<BTreeMap<ExtrasKey, Option<ProcessHandle>>> {
    let dry_run = args.dry_run || config.submission.dry_run;
    let max_concurrent = args
        .max_concurrent
        .unwrap_or(config.submission.max_concurrent);

    with_controller(config, max_concurrent, |controller| {
        Status::collect(controller)?.print();

        let run_processes = controller.submit_new_batch(dry_run)?;
        for (extras, process) in run_processes.iter() {
            match process {
                None => println!("{extras} --> To be run"),
                Some(handle) => println!("{extras} --> {handle}"),
            }
        }
        println!();

        Ok(run_processes)
    })
}

pub fn submit_one(config: &CampaignConfig, args: &SubmitOneArgs) -> Result<Option<ProcessHandle>> {
    let dry_run = args.dry_run || config.submission.dry_run;
    let extras = ExtrasKey::from([args.element.as_str(), args.configuration.as_str()]);

    with_controller(config, config.submission.max_concurrent, |controller| {
        let structure = controller.parent().parent_node_from_extras(&extras)?;
        println!("Structure PK: {}", structure.id);

        let process = controller.submit_one(&extras, dry_run)?;
        match &process {
            None => println!("{extras} --> To be run"),
            Some(handle) => println!("{extras} --> {handle}"),
        }

        Ok(process)
    })
}
