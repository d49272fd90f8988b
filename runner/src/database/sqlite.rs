use super::{
    util::{placeholders, retrieve_key_values},
    ConnectionError, Group, NewNode, Node, NodeType, ProcessHandle, ProcessState, ID,
};
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use std::{fmt::Debug, path::Path, sync::Arc};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
/// Transparent, thread safe wrapper over `InnerConnection`
pub struct SharedConnection(Arc<FairMutex<InnerConnection>>);

#[derive(Debug)]
pub struct InnerConnection {
    connection: Connection,
}

const NODE_COLUMNS: &str = "n.id, n.uuid, n.node_type, n.label, n.process_state";

impl SharedConnection {
    pub fn new(inner_connection: InnerConnection) -> Self {
        Self(Arc::new(FairMutex::new(inner_connection)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    pub fn load(path: &Path) -> Result<Self, ConnectionError> {
        Ok(Self::new(InnerConnection::load(path)?))
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, ConnectionError> {
        let connection = Self::new(InnerConnection {
            connection: Connection::open_in_memory()?,
        });
        connection.init()?;

        Ok(connection)
    }

    pub fn init(&self) -> Result<(), ConnectionError> {
        self.lock().init()
    }

    /// Close the connection, fails if another handle is still alive
    pub fn close(self) -> Result<(), ConnectionError> {
        match Arc::try_unwrap(self.0) {
            Ok(inner) => inner.into_inner().close(),
            Err(_) => {
                error!("Connection is still shared, refusing to close it");

                Err(ConnectionError::StillShared)
            }
        }
    }

    #[cfg(test)]
    pub fn group(&self, label: &str) -> Result<Option<Group>, ConnectionError> {
        self.lock().group(label)
    }

    pub fn get_group(&self, label: &str) -> Result<Group, ConnectionError> {
        self.lock()
            .group(label)?
            .ok_or_else(|| ConnectionError::GroupNotFound(label.to_owned()))
    }

    pub fn get_or_create_group(&self, label: &str) -> Result<(Group, bool), ConnectionError> {
        self.lock().get_or_create_group(label)
    }

    pub fn group_nodes(&self, group: &Group) -> Result<Vec<Node>, ConnectionError> {
        self.lock().group_nodes(group)
    }

    pub fn group_size(&self, group: &Group) -> Result<usize, ConnectionError> {
        self.lock().group_size(group)
    }

    pub fn group_nodes_with_extra_in(
        &self,
        group: &Group,
        key: &str,
        values: &[String],
    ) -> Result<Vec<Node>, ConnectionError> {
        self.lock().group_nodes_with_extra_in(group, key, values)
    }

    pub fn group_nodes_with_extras(
        &self,
        group: &Group,
        extras: &[(&str, &str)],
    ) -> Result<Vec<Node>, ConnectionError> {
        self.lock().group_nodes_with_extras(group, extras)
    }

    pub fn group_attribute_values(
        &self,
        group: &Group,
        key: &str,
    ) -> Result<Vec<String>, ConnectionError> {
        self.lock().group_attribute_values(group, key)
    }

    pub fn add_nodes(&self, group: &Group, nodes: &[ID]) -> Result<usize, ConnectionError> {
        self.lock().add_nodes(group, nodes)
    }

    #[cfg(test)]
    pub fn create_node(&self, node: &NewNode) -> Result<Node, ConnectionError> {
        self.lock().create_node(node)
    }

    pub fn submit_process(
        &self,
        group: &Group,
        process: &NewNode,
    ) -> Result<ProcessHandle, ConnectionError> {
        self.lock().submit_process(group, process)
    }

    pub fn load_code(&self, label: &str, computer: &str) -> Result<Node, ConnectionError> {
        self.lock().load_code(label, computer)
    }

    #[cfg(test)]
    pub fn attributes(&self, node: ID) -> Result<super::Extras, ConnectionError> {
        self.lock().attributes(node)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.lock()
    }
}

impl InnerConnection {
    /// Open an existing store, the workflow engine owns its creation
    pub fn load(path: &Path) -> Result<Self, ConnectionError> {
        if !path.is_file() {
            return Err(ConnectionError::DatabaseNotFound(path.to_path_buf()));
        }

        debug!(path = ?path, "Opening SQLite provenance store");
        let connection = Connection::open(path)?;

        Ok(Self { connection })
    }

    pub fn init(&self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    pub fn close(mut self) -> Result<(), ConnectionError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                error!("Failed to close connection");

                return Err(ConnectionError::SQLite(error));
            }
        }

        debug!("Closed SQLite connection");

        Ok(())
    }

    pub fn group(&self, label: &str) -> Result<Option<Group>, ConnectionError> {
        Ok(self
            .connection
            .prepare_cached("select id, label from groups where label = ?")?
            .query_row(params![label], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    label: row.get(1)?,
                })
            })
            .optional()?)
    }

    pub fn get_or_create_group(&self, label: &str) -> Result<(Group, bool), ConnectionError> {
        if let Some(group) = self.group(label)? {
            return Ok((group, false));
        }

        let id: ID = self
            .connection
            .prepare_cached("insert into groups (label) values (?) returning id")?
            .query_row(params![label], |row| row.get(0))?;

        info!(label = label, id = id, "Created group");

        Ok((
            Group {
                id,
                label: label.to_owned(),
            },
            true,
        ))
    }

    pub fn group_nodes(&self, group: &Group) -> Result<Vec<Node>, ConnectionError> {
        self.query_nodes(
            &format!(
                "select {NODE_COLUMNS} from nodes n
                 join group_nodes g on g.node = n.id
                 where g.grp = ?
                 order by n.id"
            ),
            vec![Value::Integer(group.id)],
        )
    }

    pub fn group_size(&self, group: &Group) -> Result<usize, ConnectionError> {
        let size: i64 = self
            .connection
            .prepare_cached("select count(*) from group_nodes where grp = ?")?
            .query_row(params![group.id], |row| row.get(0))?;

        Ok(size as usize)
    }

    pub fn group_nodes_with_extra_in(
        &self,
        group: &Group,
        key: &str,
        values: &[String],
    ) -> Result<Vec<Node>, ConnectionError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut bindings = vec![Value::Integer(group.id), Value::Text(key.to_owned())];
        bindings.extend(values.iter().cloned().map(Value::Text));

        self.query_nodes(
            &format!(
                "select {NODE_COLUMNS} from nodes n
                 join group_nodes g on g.node = n.id
                 join node_extras e on e.node = n.id
                 where g.grp = ? and e.key = ? and e.value in ({})
                 order by n.id",
                placeholders(values.len())
            ),
            bindings,
        )
    }

    pub fn group_nodes_with_extras(
        &self,
        group: &Group,
        extras: &[(&str, &str)],
    ) -> Result<Vec<Node>, ConnectionError> {
        let mut query = format!(
            "select {NODE_COLUMNS} from nodes n
             join group_nodes g on g.node = n.id
             where g.grp = ?"
        );
        let mut bindings = vec![Value::Integer(group.id)];

        for (key, value) in extras {
            query.push_str(
                " and exists (select 1 from node_extras e
                   where e.node = n.id and e.key = ? and e.value = ?)",
            );
            bindings.push(Value::Text((*key).to_owned()));
            bindings.push(Value::Text((*value).to_owned()));
        }
        query.push_str(" order by n.id");

        self.query_nodes(&query, bindings)
    }

    pub fn group_attribute_values(
        &self,
        group: &Group,
        key: &str,
    ) -> Result<Vec<String>, ConnectionError> {
        self.connection
            .prepare_cached(
                "select a.value from node_attributes a
                 join group_nodes g on g.node = a.node
                 where g.grp = ? and a.key = ?
                 order by a.node",
            )?
            .query_map(params![group.id, key], |row| row.get(0))?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(result?);

                Ok::<Vec<String>, ConnectionError>(init)
            })
    }

    pub fn add_nodes(&self, group: &Group, nodes: &[ID]) -> Result<usize, ConnectionError> {
        let mut added = 0;

        // NOTE: We can guarantee that no nested transactions are present due to only having one
        // connection at a time.
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);
        for node in nodes {
            added += tx
                .prepare_cached("insert or ignore into group_nodes (grp, node) values (?, ?)")?
                .execute(params![group.id, node])?;
        }
        tx.commit()?;

        debug!(group = %group.label, added = added, "Added nodes to group");

        Ok(added)
    }

    #[cfg(test)]
    pub fn create_node(&self, node: &NewNode) -> Result<Node, ConnectionError> {
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);
        let created = Self::insert_node(&tx, node)?;
        tx.commit()?;

        Ok(created)
    }

    /// Record a process node and add it to `group` in a single transaction
    pub fn submit_process(
        &self,
        group: &Group,
        process: &NewNode,
    ) -> Result<ProcessHandle, ConnectionError> {
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);
        let node = Self::insert_node(&tx, process)?;
        tx.prepare_cached("insert into group_nodes (grp, node) values (?, ?)")?
            .execute(params![group.id, node.id])?;
        tx.commit()?;

        info!(pk = node.id, uuid = %node.uuid, group = %group.label, "Recorded process");

        Ok(ProcessHandle {
            pk: node.id,
            uuid: node.uuid,
        })
    }

    pub fn load_code(&self, label: &str, computer: &str) -> Result<Node, ConnectionError> {
        let full_label = format!("{label}@{computer}");
        let mut codes = self.query_nodes(
            &format!(
                "select {NODE_COLUMNS} from nodes n
                 join node_attributes a on a.node = n.id
                 where n.node_type = 'code' and n.label = ?
                   and a.key = 'computer' and a.value = ?"
            ),
            vec![Value::Text(label.to_owned()), Value::Text(computer.to_owned())],
        )?;

        match codes.len() {
            0 => Err(ConnectionError::CodeNotFound(full_label)),
            1 => Ok(codes.remove(0)),
            _ => Err(ConnectionError::AmbiguousCode(full_label)),
        }
    }

    #[cfg(test)]
    pub fn attributes(&self, node: ID) -> Result<super::Extras, ConnectionError> {
        retrieve_key_values(
            &self.connection,
            "select key, value from node_attributes where node = ?",
            node,
        )
    }

    fn insert_node(connection: &Connection, node: &NewNode) -> Result<Node, ConnectionError> {
        let uuid = Uuid::new_v4();
        let id: ID = connection
            .prepare_cached(
                "insert into nodes
                 (uuid, node_type, label, process_state)
                 values (?, ?, ?, ?) returning id",
            )?
            .query_row(
                params![
                    uuid.to_string(),
                    node.node_type.as_str(),
                    node.label.as_str(),
                    node.process_state.map(|state| state.as_str())
                ],
                |row| row.get(0),
            )?;

        for (key, value) in node.attributes.iter() {
            connection
                .prepare_cached("insert into node_attributes (node, key, value) values (?, ?, ?)")?
                .execute(params![id, key, value])?;
        }
        for (key, value) in node.extras.iter() {
            connection
                .prepare_cached("insert into node_extras (node, key, value) values (?, ?, ?)")?
                .execute(params![id, key, value])?;
        }

        debug!(id = id, node_type = node.node_type.as_str(), "Inserted node");

        Ok(Node {
            id,
            uuid,
            node_type: node.node_type,
            label: node.label.clone(),
            process_state: node.process_state,
            extras: node.extras.clone(),
        })
    }

    fn query_nodes(&self, query: &str, bindings: Vec<Value>) -> Result<Vec<Node>, ConnectionError> {
        let rows = self
            .connection
            .prepare_cached(query)?
            .query_map(params_from_iter(bindings.iter()), |row| {
                Ok((
                    row.get::<_, ID>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(result?);

                Ok::<Vec<(ID, String, String, String, Option<String>)>, ConnectionError>(init)
            })?;

        rows.into_iter()
            .map(|(id, uuid, node_type, label, process_state)| {
                Ok(Node {
                    id,
                    uuid: Uuid::parse_str(&uuid).map_err(|_| ConnectionError::InvalidColumn {
                        column: "nodes.uuid",
                        value: uuid.clone(),
                    })?,
                    node_type: node_type.parse::<NodeType>()?,
                    label,
                    process_state: process_state
                        .as_deref()
                        .map(str::parse::<ProcessState>)
                        .transpose()?,
                    extras: retrieve_key_values(
                        &self.connection,
                        "select key, value from node_extras where node = ?",
                        id,
                    )?,
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }
}

// Minimal node/group model of the provenance store, extras and attributes are flat string maps
pub const SQL_SCHEMA: [&str; 5] = [
    "create table if not exists nodes (
    id integer primary key,
    uuid text not null unique,
    node_type text not null,
    label text not null default '',
    process_state text
);",
    "create table if not exists node_attributes (
    node integer not null references nodes (id),
    key text not null,
    value text not null,
    primary key (node, key)
);",
    "create table if not exists node_extras (
    node integer not null references nodes (id),
    key text not null,
    value text not null,
    primary key (node, key)
);",
    "create table if not exists groups (
    id integer primary key,
    label text not null unique
);",
    "create table if not exists group_nodes (
    grp integer not null references groups (id),
    node integer not null references nodes (id),
    primary key (grp, node)
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
