use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Select, export and submit the equation-of-state runs of the common-workflow oxides campaign"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the campaign configuration in YAML format
    #[arg(short, long, global = true, default_value = "campaign.yaml", value_name = "PATH")]
    pub config: PathBuf,

    /// Override the file holding the plugin name
    #[arg(long, global = true, value_name = "PATH")]
    pub plugin_file: Option<PathBuf>,

    /// Override the structure set, e.g. set1
    #[arg(long, global = true, value_name = "NAME")]
    pub set: Option<String>,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add the structures whose element the plugin supports to the per-plugin subgroup
    Select,
    /// Write the element, configuration and UUID of every structure of the set as CSV
    Export(ExportArgs),
    /// Show how many runs are done, active and still to run
    Status,
    /// Submit as many new runs as there are free slots
    Submit(SubmitArgs),
    /// Submit the run of a single structure
    SubmitOne(SubmitOneArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Directory the CSV file is written to
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Only show what would be submitted
    #[arg(long)]
    pub dry_run: bool,

    /// Override the maximum number of concurrently active runs
    #[arg(long, value_name = "NUM")]
    pub max_concurrent: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SubmitOneArgs {
    /// Chemical symbol of the structure, e.g. Al
    #[arg(long, required = true)]
    pub element: String,

    /// Oxide configuration of the structure, e.g. X2O
    #[arg(long, required = true)]
    pub configuration: String,

    /// Only check that the structure can be submitted
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_flags_parse() {
        let cli = Cli::try_parse_from([
            "oxides-runner",
            "-vv",
            "--config",
            "c.yaml",
            "submit",
            "--dry-run",
            "--max-concurrent",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("c.yaml"));
        match cli.command {
            Commands::Submit(args) => {
                assert!(args.dry_run);
                assert_eq!(args.max_concurrent, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn submit_one_requires_both_extras() {
        assert!(Cli::try_parse_from(["oxides-runner", "submit-one", "--element", "Al"]).is_err());
    }
}
