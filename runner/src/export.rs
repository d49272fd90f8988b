use crate::database::{ConnectionError, Node, SharedConnection};
use itertools::Itertools;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

pub const HEADER: [&str; 3] = ["#element", "configuration", "UUID"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// `element,configuration,UUID` rows sorted lexicographically by line
pub fn uuid_rows(nodes: &[Node]) -> Vec<[String; 3]> {
    let mut rows = nodes
        .iter()
        .filter_map(|node| match (node.extra("element"), node.extra("configuration")) {
            (Some(element), Some(configuration)) => Some([
                element.to_owned(),
                configuration.to_owned(),
                node.uuid.to_string(),
            ]),
            _ => {
                warn!(uuid = %node.uuid, "Node without element/configuration extras, skipping");
                None
            }
        })
        .collect_vec();
    rows.sort_by_cached_key(|row| row.join(","));

    rows
}

pub fn write_uuids<W: io::Write>(writer: W, nodes: &[Node]) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    writer.write_record(HEADER)?;
    for row in uuid_rows(nodes) {
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write `{set}_structures_uuids.csv` for the structures of `group` into `directory`
pub fn export_uuids(
    connection: &SharedConnection,
    group: &str,
    set: &str,
    directory: &Path,
) -> Result<PathBuf, ExportError> {
    let group = connection.get_group(group)?;
    let nodes = connection.group_nodes(&group)?;
    let path = directory.join(format!("{set}_structures_uuids.csv"));

    write_uuids(std::fs::File::create(&path)?, &nodes)?;

    info!(path = ?path, rows = nodes.len(), "File written");

    Ok(path)
}
