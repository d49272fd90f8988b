//! Batch submission over a parent group, throttled by a concurrency cap
//!
//! Every node of the parent group is one unit of work, identified by the values of a fixed
//! set of extras. A unit counts as already run once a process carrying the same extras is a
//! member of the workflow group. Each call to `submit_new_batch` fills the free slots, i.e.
//! `max_concurrent` minus the processes of the workflow group that did not terminate yet.

use crate::{
    database::{
        ConnectionError, Group, NewNode, Node, NodeType, ProcessHandle, ProcessState,
        SharedConnection,
    },
    inputs::InputsError,
    workflows::{ProcessClass, WorkflowError},
};
use itertools::Itertools;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Inputs(#[from] InputsError),
    #[error("Failed to serialize process inputs: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Expected {expected} unique extras values, got {given}")]
    KeyLength { expected: usize, given: usize },
    #[error("Extras {key} appear on {count} nodes of group '{group}', they must be unique")]
    DuplicateExtras {
        group: String,
        key: ExtrasKey,
        count: usize,
    },
    #[error("No node with extras {key} in group '{group}'")]
    NoParentNode { group: String, key: ExtrasKey },
    #[error("{count} nodes with extras {key} in group '{group}', expected exactly one")]
    AmbiguousParentNode {
        group: String,
        key: ExtrasKey,
        count: usize,
    },
    #[error("Extras {0} were already submitted")]
    AlreadyRun(ExtrasKey),
}

/// Ordered values of the unique extras of one unit of work
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtrasKey(pub Vec<String>);

impl ExtrasKey {
    /// values of `keys` on `node`, `None` if any of them is missing
    pub fn from_node(node: &Node, keys: &[&str]) -> Option<Self> {
        keys.iter()
            .map(|key| node.extra(key).map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for ExtrasKey {
    fn from(values: [S; N]) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl Display for ExtrasKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.0.iter().map(|value| format!("'{value}'")).join(", ")
        )
    }
}

/// Campaign-specific half of the controller
pub trait ExtrasSubmission {
    type Inputs: Serialize;

    /// names of the extras that identify a unit of work, in order
    fn extra_unique_keys(&self) -> &[&'static str];

    /// inputs and process class for the unit of work identified by `extras`
    fn inputs_and_process_class(
        &self,
        parent: &ParentGroup,
        extras: &ExtrasKey,
    ) -> Result<(Self::Inputs, ProcessClass), ControllerError>;
}

/// The group holding one node per unit of work
#[derive(Debug, Clone)]
pub struct ParentGroup {
    connection: SharedConnection,
    group: Group,
    keys: Vec<&'static str>,
}

impl ParentGroup {
    /// The single parent node carrying `extras`
    pub fn parent_node_from_extras(&self, extras: &ExtrasKey) -> Result<Node, ControllerError> {
        if extras.0.len() != self.keys.len() {
            return Err(ControllerError::KeyLength {
                expected: self.keys.len(),
                given: extras.0.len(),
            });
        }

        let filters = self
            .keys
            .iter()
            .zip(extras.0.iter())
            .map(|(key, value)| (*key, value.as_str()))
            .collect_vec();
        let mut nodes = self
            .connection
            .group_nodes_with_extras(&self.group, &filters)?;

        match nodes.len() {
            0 => Err(ControllerError::NoParentNode {
                group: self.group.label.clone(),
                key: extras.clone(),
            }),
            1 => Ok(nodes.remove(0)),
            count => Err(ControllerError::AmbiguousParentNode {
                group: self.group.label.clone(),
                key: extras.clone(),
                count,
            }),
        }
    }

    fn all_extras(&self) -> Result<Vec<ExtrasKey>, ControllerError> {
        let mut skipped = 0;
        let keys = self
            .connection
            .group_nodes(&self.group)?
            .iter()
            .filter_map(|node| {
                let key = ExtrasKey::from_node(node, &self.keys);
                if key.is_none() {
                    skipped += 1;
                }
                key
            })
            .collect_vec();

        if skipped > 0 {
            warn!(
                group = %self.group.label,
                "Skipped {skipped} nodes without all of the extras [{}]",
                self.keys.join(", ")
            );
        }

        Ok(keys)
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub parent_group_label: String,
    pub group_label: String,
    pub max_concurrent: usize,
}

#[derive(Debug)]
pub struct FromGroupController<S: ExtrasSubmission> {
    submission: S,
    connection: SharedConnection,
    parent: ParentGroup,
    group: Group,
    max_concurrent: usize,
}

impl<S: ExtrasSubmission> FromGroupController<S> {
    /// Set up the controller, fails if the parent group is missing or its extras are not unique
    pub fn new(
        submission: S,
        connection: SharedConnection,
        config: &ControllerConfig,
    ) -> Result<Self, ControllerError> {
        let parent = ParentGroup {
            group: connection.get_group(&config.parent_group_label)?,
            keys: submission.extra_unique_keys().to_vec(),
            connection: connection.clone(),
        };
        let (group, _) = connection.get_or_create_group(&config.group_label)?;

        let duplicates = parent
            .all_extras()?
            .into_iter()
            .counts()
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .sorted()
            .collect_vec();

        if let Some((key, count)) = duplicates.into_iter().next() {
            return Err(ControllerError::DuplicateExtras {
                group: parent.group.label.clone(),
                key,
                count,
            });
        }

        debug!(
            parent = %parent.group.label,
            group = %group.label,
            max_concurrent = config.max_concurrent,
            "Created submission controller"
        );

        Ok(Self {
            submission,
            connection,
            parent,
            group,
            max_concurrent: config.max_concurrent,
        })
    }

    pub fn parent(&self) -> &ParentGroup {
        &self.parent
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// unique extras of every unit of work in the parent group
    pub fn all_extras_to_run(&self) -> Result<BTreeSet<ExtrasKey>, ControllerError> {
        Ok(self.parent.all_extras()?.into_iter().collect())
    }

    /// unique extras of every process in the workflow group, whatever its state
    pub fn extras_already_run(&self) -> Result<BTreeSet<ExtrasKey>, ControllerError> {
        Ok(self
            .processes()?
            .iter()
            .filter_map(|node| ExtrasKey::from_node(node, &self.parent.keys))
            .collect())
    }

    pub fn num_already_run(&self) -> Result<usize, ControllerError> {
        Ok(self.extras_already_run()?.len())
    }

    pub fn extras_to_run(&self) -> Result<BTreeSet<ExtrasKey>, ControllerError> {
        let already_run = self.extras_already_run()?;

        Ok(self
            .all_extras_to_run()?
            .into_iter()
            .filter(|key| !already_run.contains(key))
            .collect())
    }

    pub fn num_to_run(&self) -> Result<usize, ControllerError> {
        Ok(self.extras_to_run()?.len())
    }

    /// processes of the workflow group that did not terminate yet
    pub fn num_active_slots(&self) -> Result<usize, ControllerError> {
        Ok(self
            .processes()?
            .iter()
            .filter(|node| {
                node.process_state
                    .map_or(false, |state| !state.is_terminated())
            })
            .count())
    }

    pub fn num_available_slots(&self) -> Result<usize, ControllerError> {
        Ok(self.max_concurrent.saturating_sub(self.num_active_slots()?))
    }

    /// Submit as many pending units of work as there are free slots
    ///
    /// Units are picked in ascending order of their extras. On a dry run nothing is submitted
    /// and every picked unit maps to `None`.
    #[instrument(skip(self), level = "info")]
    pub fn submit_new_batch(
        &self,
        dry_run: bool,
    ) -> Result<BTreeMap<ExtrasKey, Option<ProcessHandle>>, ControllerError> {
        let available = self.num_available_slots()?;
        let to_run = self.extras_to_run()?;

        info!(
            available = available,
            to_run = to_run.len(),
            "Selecting new batch"
        );

        let mut submitted = BTreeMap::new();
        for key in to_run.into_iter().take(available) {
            let handle = if dry_run {
                None
            } else {
                Some(self.submit(&key)?)
            };

            submitted.insert(key, handle);
        }

        Ok(submitted)
    }

    /// Submit the single unit of work identified by `extras`
    #[instrument(skip(self), level = "info")]
    pub fn submit_one(
        &self,
        extras: &ExtrasKey,
        dry_run: bool,
    ) -> Result<Option<ProcessHandle>, ControllerError> {
        // fails on unknown extras before anything is recorded
        self.parent.parent_node_from_extras(extras)?;

        if self.extras_already_run()?.contains(extras) {
            return Err(ControllerError::AlreadyRun(extras.clone()));
        }

        if dry_run {
            Ok(None)
        } else {
            self.submit(extras).map(Some)
        }
    }

    fn submit(&self, extras: &ExtrasKey) -> Result<ProcessHandle, ControllerError> {
        let (inputs, process_class) = self
            .submission
            .inputs_and_process_class(&self.parent, extras)?;

        let mut process = NewNode::new(NodeType::Process, process_class.entry_point)
            .state(ProcessState::Created)
            .attribute("process_class", process_class.entry_point)
            .attribute("inputs", serde_yaml::to_string(&inputs)?);
        for (key, value) in self.parent.keys.iter().zip(extras.0.iter()) {
            process = process.extra(*key, value.as_str());
        }

        let handle = self.connection.submit_process(&self.group, &process)?;

        info!(extras = %extras, pk = handle.pk, uuid = %handle.uuid, "Submitted {process_class}");

        Ok(handle)
    }

    fn processes(&self) -> Result<Vec<Node>, ControllerError> {
        Ok(self
            .connection
            .group_nodes(&self.group)?
            .into_iter()
            .filter(|node| node.node_type == NodeType::Process)
            .collect())
    }
}
