use crate::{
    cli::{ExportArgs, SubmitArgs, SubmitOneArgs},
    commands::{self, Status},
    config::{CampaignConfig, KKR_CAMPAIGN},
    controller::ExtrasKey,
    database::{
        fixtures::{code, structures_group},
        ConnectionError, SharedConnection,
    },
    error::RunnerError,
    plugins::PluginError,
};
use std::{fs, path::Path};
use tempfile::TempDir;

/// campaign directory with a store holding the full set1 structures and both kkr codes
fn campaign(plugin: Option<&str>) -> (TempDir, CampaignConfig) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CampaignConfig::parse(KKR_CAMPAIGN).unwrap();
    config.database.path = dir.path().join("aiida.db");
    config.plugin_file = dir.path().join("plugin_name.txt");

    if let Some(plugin) = plugin {
        fs::write(&config.plugin_file, format!("{plugin}\n")).unwrap();
    }

    fs::File::create(&config.database.path).unwrap();
    let connection = SharedConnection::load(&config.database.path).unwrap();
    connection.init().unwrap();
    structures_group(
        &connection,
        &config.structures_label(),
        &[("Si", "XO"), ("Fe", "X2O3"), ("Ba", "XO"), ("O", "XO2"), ("Al", "X2O")],
    );
    code(&connection, "KKRhost", "claix18_sshtunnel");
    code(&connection, "voronoi", "localhost");
    connection.close().unwrap();

    (dir, config)
}

fn group_size(config: &CampaignConfig, label: &str) -> Option<usize> {
    let connection = SharedConnection::load(&config.database.path).unwrap();
    let size = connection
        .group(label)
        .unwrap()
        .map(|group| connection.group_size(&group).unwrap());
    connection.close().unwrap();

    size
}

#[test]
pub fn missing_plugin_file_aborts_before_touching_the_store() {
    let (_dir, config) = campaign(None);

    assert!(matches!(
        commands::select(&config),
        Err(RunnerError::Plugin(PluginError::MissingFile(_)))
    ));
    assert_eq!(group_size(&config, &config.subgroup_label("kkr")), None);
}

#[test]
pub fn missing_plugin_file_is_checked_before_the_store() {
    let (_dir, mut config) = campaign(None);
    config.database.path = Path::new("/nonexistent/aiida.db").to_path_buf();

    assert!(matches!(
        commands::status(&config),
        Err(RunnerError::Plugin(PluginError::MissingFile(_)))
    ));
}

#[test]
pub fn unknown_plugin_creates_no_subgroup() {
    let (_dir, config) = campaign(Some("xxx"));

    assert!(matches!(
        commands::select(&config),
        Err(RunnerError::Plugin(PluginError::Unknown(_)))
    ));
    assert_eq!(group_size(&config, &config.subgroup_label("xxx")), None);
}

#[test]
pub fn missing_store_is_reported() {
    let (_dir, mut config) = campaign(Some("kkr"));
    config.database.path = config.database.path.with_file_name("other.db");

    assert!(matches!(
        commands::select(&config),
        Err(RunnerError::Connection(ConnectionError::DatabaseNotFound(_)))
    ));
}

#[test]
pub fn select_then_submit_campaign() {
    let (dir, config) = campaign(Some("kkr"));

    let report = commands::select(&config).unwrap();
    // Ba is not in the kkr allow-list
    assert_eq!(report.valid_elements, 5);
    assert_eq!(report.size, 4);
    assert_eq!(commands::select(&config).unwrap().added, 0);

    assert_eq!(
        commands::status(&config).unwrap(),
        Status {
            already_run: 0,
            max_concurrent: 30,
            available_slots: 30,
            active_slots: 0,
            to_run: 4,
        }
    );

    let dry = commands::submit(
        &config,
        &SubmitArgs {
            dry_run: true,
            max_concurrent: Some(3),
        },
    )
    .unwrap();
    assert_eq!(dry.len(), 3);
    assert!(dry.values().all(Option::is_none));

    let submitted = commands::submit(
        &config,
        &SubmitArgs {
            dry_run: false,
            max_concurrent: Some(3),
        },
    )
    .unwrap();
    assert_eq!(
        submitted.keys().cloned().collect::<Vec<_>>(),
        vec![
            ExtrasKey::from(["Al", "X2O"]),
            ExtrasKey::from(["Fe", "X2O3"]),
            ExtrasKey::from(["O", "XO2"]),
        ]
    );
    assert!(submitted.values().all(Option::is_some));

    let status = commands::status(&config).unwrap();
    assert_eq!(status.already_run, 3);
    assert_eq!(status.active_slots, 3);
    assert_eq!(status.to_run, 1);

    let one = commands::submit_one(
        &config,
        &SubmitOneArgs {
            element: "Si".to_owned(),
            configuration: "XO".to_owned(),
            dry_run: false,
        },
    )
    .unwrap();
    assert!(one.is_some());
    assert_eq!(
        group_size(&config, &config.workflows_label("kkr")),
        Some(4)
    );

    commands::export(
        &config,
        &ExportArgs {
            output_dir: dir.path().to_path_buf(),
        },
    )
    .unwrap();
    let csv = fs::read_to_string(dir.path().join("set1_structures_uuids.csv")).unwrap();
    assert_eq!(csv.lines().count(), 6);
}
