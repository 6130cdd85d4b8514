//! Command dispatch

use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{expand_path, global_config_path, Settings};
use crate::domain::EntityKind;
use crate::infrastructure::ServiceContainer;

pub fn execute_command(cli: &Cli, settings: Settings) -> CliResult<()> {
    if !settings.display.color {
        output::disable_colors();
    }
    let container = ServiceContainer::new(settings);

    match &cli.command {
        Some(Commands::Run {
            script,
            strict,
            no_ids,
        }) => cmd_run(&container, script, *strict, *no_ids),
        Some(Commands::List { script, kind }) => cmd_list(&container, script, *kind),
        Some(Commands::Config { command }) => cmd_config(&container, cli, command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        None => Err(CliError::Usage(
            "no command given, see --help".to_string(),
        )),
    }
}

#[instrument(skip(container))]
fn cmd_run(container: &ServiceContainer, script: &str, strict: bool, no_ids: bool) -> CliResult<()> {
    let path = expand_path(script);
    let mut canvas = container.canvas_service();
    let report = canvas.run_file(&path)?;

    let rejected: Vec<_> = report.rejected().collect();
    for (line, err) in &rejected {
        output::warning(&format!("line {}: {}", line, err));
    }

    let show_ids = container.settings.display.show_ids && !no_ids;
    output::info(&canvas.tree_view(show_ids));

    let store = canvas.store();
    debug!("store holds {} entities, depth {}", store.len(), store.depth());
    if rejected.is_empty() {
        output::success(&format!(
            "{} statements applied, {} entities placed",
            report.steps.len(),
            store.len() - 1
        ));
    }

    if strict && !rejected.is_empty() {
        return Err(CliError::Rejected {
            count: rejected.len(),
        });
    }
    Ok(())
}

#[instrument(skip(container))]
fn cmd_list(container: &ServiceContainer, script: &str, kind: EntityKind) -> CliResult<()> {
    let path = expand_path(script);
    let mut canvas = container.canvas_service();
    canvas.run_file(&path)?;

    let store = canvas.store();
    let entities = store.list_by_kind(kind);
    output::header(&format!("{} {} entities", entities.len(), kind));
    for entity in entities {
        let parent = entity
            .parent_id
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        output::detail(&format!("{} (in {})", entity, parent));
        if !entity.child_ids.is_empty() {
            output::detail(&format!("  children: {}", entity.child_ids.iter().join(", ")));
        }
    }
    Ok(())
}

fn cmd_config(container: &ServiceContainer, cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&container.settings.to_toml()?);
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::action("global", &path.display()),
                None => output::detail(&"global: <no config directory>"),
            }
            if let Some(local) = cli.config_path() {
                output::action("local", &local.display());
            }
        }
    }
    Ok(())
}
