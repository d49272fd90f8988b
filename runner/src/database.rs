pub mod sqlite;
mod util;

#[cfg(test)]
pub mod fixtures;
#[cfg(test)]
mod sqlite_test;

use std::{collections::BTreeMap, fmt::Display, path::PathBuf, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

pub use sqlite::SharedConnection;

pub type ID = i64;
pub type Extras = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("SQLite error: {0}")]
    SQLite(#[from] rusqlite::Error),
    #[error("Provenance store {} does not exist", .0.display())]
    DatabaseNotFound(PathBuf),
    #[error("Group '{0}' does not exist")]
    GroupNotFound(String),
    #[error("No code with label '{0}' found")]
    CodeNotFound(String),
    #[error("Multiple codes with label '{0}' found")]
    AmbiguousCode(String),
    #[error("Connection is still shared and cannot be closed")]
    StillShared,
    #[error("Invalid value '{value}' stored for {column}")]
    InvalidColumn { column: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeType {
    Structure,
    Code,
    Process,
    Data,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Code => "code",
            Self::Process => "process",
            Self::Data => "data",
        }
    }
}

impl FromStr for NodeType {
    type Err = ConnectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "structure" => Ok(Self::Structure),
            "code" => Ok(Self::Code),
            "process" => Ok(Self::Process),
            "data" => Ok(Self::Data),
            other => Err(ConnectionError::InvalidColumn {
                column: "nodes.node_type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Lifecycle of a process node as reported by the workflow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Waiting,
    Running,
    Finished,
    Excepted,
    Killed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Excepted => "excepted",
            Self::Killed => "killed",
        }
    }

    /// terminated processes no longer occupy a submission slot
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Finished | Self::Excepted | Self::Killed)
    }
}

impl FromStr for ProcessState {
    type Err = ConnectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(Self::Created),
            "waiting" => Ok(Self::Waiting),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "excepted" => Ok(Self::Excepted),
            "killed" => Ok(Self::Killed),
            other => Err(ConnectionError::InvalidColumn {
                column: "nodes.process_state",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: ID,
    pub uuid: Uuid,
    pub node_type: NodeType,
    pub label: String,
    pub process_state: Option<ProcessState>,
    pub extras: Extras,
}

impl Node {
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }
}

/// Everything needed to insert a node, the store assigns id and uuid
#[derive(Debug, Clone)]
pub struct NewNode {
    pub node_type: NodeType,
    pub label: String,
    pub process_state: Option<ProcessState>,
    pub attributes: BTreeMap<String, String>,
    pub extras: Extras,
}

impl NewNode {
    pub fn new(node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            node_type,
            label: label.into(),
            process_state: None,
            attributes: BTreeMap::new(),
            extras: Extras::new(),
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn state(mut self, state: ProcessState) -> Self {
        self.process_state = Some(state);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: ID,
    pub label: String,
}

/// Reference to a process node recorded by a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pk: ID,
    pub uuid: Uuid,
}

impl Display for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PK = {}", self.pk)
    }
}
