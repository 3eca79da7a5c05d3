//! Command line interface built on clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Track asynchronous metadata transformations.
#[derive(Debug, Parser)]
#[command(name = "transform-status", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a transformation through simulated workers and print its record.
    Demo {
        /// Metadata types to produce (defaults to the configured list).
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,

        /// Metadata type whose worker should fail.
        #[arg(long)]
        fail: Option<String>,
    },

    /// Load a stored transformation record and summarize its status.
    Inspect {
        /// JSON file holding the record.
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_demo_subcommand() {
        let cli = Cli::parse_from([
            "transform-status",
            "demo",
            "--types",
            "irm,metacard,thumbnail",
            "--fail",
            "thumbnail",
        ]);
        match cli.command {
            Command::Demo { types, fail } => {
                assert_eq!(types, vec!["irm", "metacard", "thumbnail"]);
                assert_eq!(fail.as_deref(), Some("thumbnail"));
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_demo_defaults_to_configured_types() {
        let cli = Cli::parse_from(["transform-status", "demo"]);
        match cli.command {
            Command::Demo { types, fail } => {
                assert!(types.is_empty());
                assert!(fail.is_none());
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "transform-status",
            "--config",
            "custom.toml",
            "--verbose",
            "inspect",
            "record.json",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Command::Inspect { file } => assert_eq!(file, PathBuf::from("record.json")),
            _ => panic!("expected Inspect command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
