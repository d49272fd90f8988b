use crate::database::{
    fixtures::{code, store, structures_group},
    ConnectionError, NewNode, NodeType, ProcessState, SharedConnection,
};

#[test]
pub fn load_requires_existing_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aiida.db");

    assert!(matches!(
        SharedConnection::load(&path),
        Err(ConnectionError::DatabaseNotFound(missing)) if missing == path
    ));
    assert!(!path.exists());

    std::fs::File::create(&path).unwrap();
    let connection = SharedConnection::load(&path).unwrap();
    connection.init().unwrap();
    connection.close().unwrap();
}

#[test]
pub fn init_is_idempotent() {
    let connection = store();
    connection.init().unwrap();
    connection.init().unwrap();
}

#[test]
pub fn get_or_create_group_reuses_existing() {
    let connection = store();
    let (created, was_created) = connection.get_or_create_group("a/b/c").unwrap();
    let (fetched, created_again) = connection.get_or_create_group("a/b/c").unwrap();

    assert!(was_created);
    assert!(!created_again);
    assert_eq!(created, fetched);
}

#[test]
pub fn missing_group_is_reported() {
    let connection = store();

    assert!(matches!(
        connection.get_group("does/not/exist"),
        Err(ConnectionError::GroupNotFound(label)) if label == "does/not/exist"
    ));
}

#[test]
pub fn add_nodes_ignores_duplicates() {
    let connection = store();
    let (group, nodes) = structures_group(&connection, "g", &[("Si", "XO"), ("O", "XO2")]);
    let ids = nodes.iter().map(|node| node.id).collect::<Vec<_>>();

    assert_eq!(connection.add_nodes(&group, &ids).unwrap(), 0);
    assert_eq!(connection.group_size(&group).unwrap(), 2);
}

#[test]
pub fn filters_group_by_extra_values() {
    let connection = store();
    let (group, _) = structures_group(
        &connection,
        "g",
        &[("Si", "XO"), ("Fe", "XO"), ("O", "X2O")],
    );

    let elements = connection
        .group_nodes_with_extra_in(&group, "element", &["Si".to_owned(), "O".to_owned()])
        .unwrap()
        .into_iter()
        .map(|node| node.extras["element"].clone())
        .collect::<Vec<_>>();

    assert_eq!(elements, vec!["Si", "O"]);
    assert!(connection
        .group_nodes_with_extra_in(&group, "element", &[])
        .unwrap()
        .is_empty());
}

#[test]
pub fn filters_group_by_all_extras() {
    let connection = store();
    let (group, nodes) = structures_group(&connection, "g", &[("Al", "XO"), ("Al", "X2O3")]);

    let found = connection
        .group_nodes_with_extras(&group, &[("element", "Al"), ("configuration", "X2O3")])
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uuid, nodes[1].uuid);
}

#[test]
pub fn codes_are_loaded_by_label_and_computer() {
    let connection = store();
    let stored = code(&connection, "voronoi", "localhost");

    assert_eq!(
        connection.load_code("voronoi", "localhost").unwrap().uuid,
        stored.uuid
    );
    assert!(matches!(
        connection.load_code("voronoi", "cluster"),
        Err(ConnectionError::CodeNotFound(_))
    ));
}

#[test]
pub fn submitted_process_joins_group() {
    let connection = store();
    let (group, _) = connection.get_or_create_group("workflows").unwrap();
    let process = NewNode::new(NodeType::Process, "common_workflows.eos")
        .state(ProcessState::Created)
        .attribute("inputs", "{}")
        .extra("element", "Si");

    let handle = connection.submit_process(&group, &process).unwrap();
    let members = connection.group_nodes(&group).unwrap();

    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, handle.pk);
    assert_eq!(members[0].process_state, Some(ProcessState::Created));
    assert_eq!(members[0].extra("element"), Some("Si"));
    assert_eq!(
        connection.attributes(handle.pk).unwrap()["inputs"],
        "{}".to_owned()
    );
}

#[test]
pub fn close_refuses_shared_connection() {
    let connection = store();
    let other = connection.clone();

    assert!(matches!(
        connection.close(),
        Err(ConnectionError::StillShared)
    ));
    other.close().unwrap();
}
