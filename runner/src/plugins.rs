use crate::database::{ConnectionError, SharedConnection};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(
        "You need to define a file `{}`, containing the name of your plugin (siesta, quantum_espresso, ...) in the format expected by the common workflows project",
        .0.display()
    )]
    MissingFile(PathBuf),
    #[error("Failed to read plugin name from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Plugin name '{name}' in {} is not a valid identifier", .path.display())]
    InvalidName { name: String, path: PathBuf },
    #[error("Unknown plugin name `{0}`!")]
    Unknown(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Read the plugin name, a single identifier, from `path`
pub fn read_plugin_name(path: &Path) -> Result<String, PluginError> {
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PluginError::MissingFile(path.to_path_buf()),
        _ => PluginError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let name = content.trim();

    // catches stray characters and newlines, not typos
    if !is_identifier(name) {
        return Err(PluginError::InvalidName {
            name: name.to_owned(),
            path: path.to_path_buf(),
        });
    }

    debug!(plugin = name, path = ?path, "Read plugin name");

    Ok(name.to_owned())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Where the valid elements of a plugin come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSource {
    /// fixed allow-list
    Static(&'static [&'static str]),
    /// `element` attribute of every pseudopotential in the family group
    PseudoFamily(&'static str),
}

impl ElementSource {
    pub fn resolve(&self, connection: &SharedConnection) -> Result<Vec<String>, PluginError> {
        match self {
            Self::Static(elements) => Ok(elements.iter().map(|e| (*e).to_owned()).collect()),
            Self::PseudoFamily(label) => {
                let family = connection.get_group(label)?;

                Ok(connection
                    .group_attribute_values(&family, "element")?
                    .into_iter()
                    .sorted()
                    .dedup()
                    .collect())
            }
        }
    }
}

/// plugin name -> element allow-list source
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    sources: BTreeMap<&'static str, ElementSource>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self {
            sources: BTreeMap::new(),
        };

        registry.register(
            "quantum_espresso",
            ElementSource::PseudoFamily("SSSP/1.1/PBE/precision"),
        );
        // minimal starting set, extended once the first calculations are through
        registry.register("kkr", ElementSource::Static(&["Si", "Al", "Fe", "Eu", "O"]));

        registry
    }
}

impl PluginRegistry {
    pub fn register(&mut self, plugin: &'static str, source: ElementSource) {
        self.sources.insert(plugin, source);
    }

    pub fn get(&self, plugin: &str) -> Result<&ElementSource, PluginError> {
        self.sources
            .get(plugin)
            .ok_or_else(|| PluginError::Unknown(plugin.to_owned()))
    }

    pub fn valid_elements(
        &self,
        plugin: &str,
        connection: &SharedConnection,
    ) -> Result<Vec<String>, PluginError> {
        let elements = self.get(plugin)?.resolve(connection)?;

        info!(plugin = plugin, "Number of valid elements: {}", elements.len());

        Ok(elements)
    }
}

pub static PLUGINS: Lazy<PluginRegistry> = Lazy::new(PluginRegistry::default);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{fixtures::store, NewNode, NodeType};
    use std::fs;

    fn plugin_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin_name.txt");
        fs::write(&path, content).unwrap();

        (dir, path)
    }

    #[test]
    fn plugin_name_is_trimmed() {
        let (_dir, path) = plugin_file("  kkr\n");

        assert_eq!(read_plugin_name(&path).unwrap(), "kkr");
    }

    #[test]
    fn plugin_name_must_be_an_identifier() {
        for content in ["", "quantum espresso", "1kkr", "kkr\nsiesta", "a-b"] {
            let (_dir, path) = plugin_file(content);

            assert!(
                matches!(read_plugin_name(&path), Err(PluginError::InvalidName { .. })),
                "{content:?} was accepted"
            );
        }
    }

    #[test]
    fn missing_plugin_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin_name.txt");

        assert!(matches!(
            read_plugin_name(&path),
            Err(PluginError::MissingFile(missing)) if missing == path
        ));
    }

    #[test]
    fn static_and_unknown_plugins() {
        let connection = store();

        assert_eq!(
            PLUGINS.valid_elements("kkr", &connection).unwrap(),
            vec!["Si", "Al", "Fe", "Eu", "O"]
        );
        assert!(matches!(
            PLUGINS.valid_elements("xxx", &connection),
            Err(PluginError::Unknown(name)) if name == "xxx"
        ));
    }

    #[test]
    fn pseudo_family_elements_are_read_from_the_store() {
        let connection = store();
        let (family, _) = connection
            .get_or_create_group("SSSP/1.1/PBE/precision")
            .unwrap();
        let ids = ["O", "Si", "O"]
            .iter()
            .map(|element| {
                connection
                    .create_node(
                        &NewNode::new(NodeType::Data, format!("{element}.upf"))
                            .attribute("element", *element),
                    )
                    .unwrap()
                    .id
            })
            .collect::<Vec<_>>();
        connection.add_nodes(&family, &ids).unwrap();

        assert_eq!(
            PLUGINS
                .valid_elements("quantum_espresso", &connection)
                .unwrap(),
            vec!["O", "Si"]
        );
    }

    #[test]
    fn missing_pseudo_family_fails() {
        let connection = store();

        assert!(matches!(
            PLUGINS.valid_elements("quantum_espresso", &connection),
            Err(PluginError::Connection(ConnectionError::GroupNotFound(_)))
        ));
    }
}
