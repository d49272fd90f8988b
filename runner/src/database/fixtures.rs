use super::{Group, NewNode, Node, NodeType, ProcessState, SharedConnection, ID};
use rusqlite::params;

pub fn store() -> SharedConnection {
    SharedConnection::in_memory().expect("failed to open in-memory store")
}

pub fn structure(element: &str, configuration: &str) -> NewNode {
    NewNode::new(NodeType::Structure, format!("{element}-{configuration}"))
        .extra("element", element)
        .extra("configuration", configuration)
}

/// group `label` holding one structure per `(element, configuration)`
pub fn structures_group(
    connection: &SharedConnection,
    label: &str,
    structures: &[(&str, &str)],
) -> (Group, Vec<Node>) {
    let (group, _) = connection.get_or_create_group(label).unwrap();
    let nodes = structures
        .iter()
        .map(|(element, configuration)| {
            connection
                .create_node(&structure(element, configuration))
                .unwrap()
        })
        .collect::<Vec<_>>();
    let ids = nodes.iter().map(|node| node.id).collect::<Vec<_>>();
    connection.add_nodes(&group, &ids).unwrap();

    (group, nodes)
}

pub fn code(connection: &SharedConnection, label: &str, computer: &str) -> Node {
    connection
        .create_node(&NewNode::new(NodeType::Code, label).attribute("computer", computer))
        .unwrap()
}

/// stands in for the workflow engine moving a process forward
pub fn set_process_state(connection: &SharedConnection, node: ID, state: ProcessState) {
    connection
        .raw()
        .connection()
        .execute(
            "update nodes set process_state = ? where id = ?",
            params![state.as_str(), node],
        )
        .unwrap();
}
