//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::EntityKind;

/// Hierarchical entity store for a factory planning canvas
#[derive(Parser, Debug)]
#[command(name = "factory-canvas")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (repeat for more: -d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global config
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a canvas script and show the resulting tree
    Run {
        /// Canvas script
        #[arg(value_hint = ValueHint::FilePath)]
        script: String,
        /// Fail if any operation was rejected
        #[arg(long)]
        strict: bool,
        /// Hide entity ids in the tree
        #[arg(long)]
        no_ids: bool,
    },

    /// Replay a canvas script and list entities of one kind
    List {
        /// Canvas script
        #[arg(value_hint = ValueHint::FilePath)]
        script: String,
        /// Entity kind (factory, recipe, line, resource, root)
        kind: EntityKind,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,
}

impl Cli {
    /// The `--config` path with `~` and variables expanded.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.as_deref().map(crate::config::expand_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_list_args_when_parsing_then_kind_is_typed() {
        let cli = Cli::try_parse_from(["factory-canvas", "-dd", "list", "plan.canvas", "recipe"])
            .unwrap();
        assert_eq!(cli.debug, 2);
        match cli.command {
            Some(Commands::List { script, kind }) => {
                assert_eq!(script, "plan.canvas");
                assert_eq!(kind, EntityKind::Recipe);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
