use crate::{
    config::ConfigErrors, controller::ControllerError, database::ConnectionError,
    export::ExportError, plugins::PluginError,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Failed to set up logging: {0}")]
    Logging(String),
}
