//! Canvas scripts: line-oriented commands that drive the entity tree store
//! the way the editor's interaction layer does.
//!
//! ```text
//! # comment
//! factory name="Main Base" x=0 y=0 w=640 h=480
//! recipe name="Iron Plate" overclock=150 count=4 in=1
//! line from=2 to=3 in=1
//! resource name="Iron Ore" purity=pure recipe=2 x=10 y=20
//! move 2 0
//! set-recipe 2 count=6
//! remove 1
//! reset
//! ```
//!
//! Parsing is strict (unknown verbs or fields are errors with a line number).
//! Execution is not: a rejected store operation is recorded in the report and
//! the remaining commands still run.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::DefaultsConfig;
use crate::domain::{
    EntityId, EntityTreeStore, FactoryModel, LogisticsLineModel, Payload, Point, Purity,
    RecipeModel, ResourceModel, Size, StoreError,
};

/// Optional factory fields; unset fields keep the base value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FactoryPatch {
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl FactoryPatch {
    pub fn apply(&self, base: &FactoryModel) -> FactoryModel {
        FactoryModel {
            factory_name: self
                .name
                .clone()
                .unwrap_or_else(|| base.factory_name.clone()),
            position: Point::new(
                self.x.unwrap_or(base.position.x),
                self.y.unwrap_or(base.position.y),
            ),
            frame_size: Size::new(
                self.width.unwrap_or(base.frame_size.width),
                self.height.unwrap_or(base.frame_size.height),
            ),
        }
    }
}

/// Optional recipe fields; unset fields keep the base value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecipePatch {
    pub name: Option<String>,
    pub overclock: Option<u32>,
    pub count: Option<u32>,
}

impl RecipePatch {
    pub fn apply(&self, base: &RecipeModel) -> RecipeModel {
        RecipeModel {
            recipe_name: self.name.clone().unwrap_or_else(|| base.recipe_name.clone()),
            overclock: self.overclock.unwrap_or(base.overclock),
            machine_count: self.count.unwrap_or(base.machine_count),
        }
    }
}

/// What a create command places.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Factory(FactoryPatch),
    Recipe(RecipePatch),
    Line {
        from: Option<EntityId>,
        to: Option<EntityId>,
    },
    Resource {
        name: Option<String>,
        purity: Option<Purity>,
        recipe: Option<EntityId>,
        x: Option<f64>,
        y: Option<f64>,
    },
}

impl Placement {
    /// Builds the payload, filling gaps from the configured defaults.
    pub fn to_payload(&self, defaults: &DefaultsConfig) -> Payload {
        match self {
            Placement::Factory(patch) => {
                let base = FactoryModel {
                    frame_size: Size::new(defaults.frame_width, defaults.frame_height),
                    ..FactoryModel::default()
                };
                Payload::Factory(patch.apply(&base))
            }
            Placement::Recipe(patch) => {
                let base = RecipeModel {
                    overclock: defaults.overclock,
                    machine_count: defaults.machine_count,
                    ..RecipeModel::default()
                };
                Payload::Recipe(patch.apply(&base))
            }
            Placement::Line { from, to } => Payload::LogisticsLine(LogisticsLineModel {
                export_id: *from,
                import_id: *to,
            }),
            Placement::Resource {
                name,
                purity,
                recipe,
                x,
                y,
            } => Payload::ResourceNode(ResourceModel {
                resource_name: name.clone().unwrap_or_default(),
                purity: purity.unwrap_or(defaults.purity),
                recipe_id: *recipe,
                position: Point::new(x.unwrap_or(0.0), y.unwrap_or(0.0)),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create { placement: Placement, parent: EntityId },
    Move { target: EntityId, destination: EntityId },
    Remove { id: EntityId },
    SetFactory { id: EntityId, patch: FactoryPatch },
    SetRecipe { id: EntityId, patch: RecipePatch },
    Reset,
}

/// A parsed command with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Created(EntityId),
    Applied,
    Removed(Vec<EntityId>),
    Rejected(StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub line: usize,
    pub outcome: StepOutcome,
}

/// Outcome of every executed statement, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptReport {
    pub steps: Vec<Step>,
}

impl ScriptReport {
    pub fn rejected(&self) -> impl Iterator<Item = (usize, &StoreError)> + '_ {
        self.steps.iter().filter_map(|s| match &s.outcome {
            StepOutcome::Rejected(e) => Some((s.line, e)),
            _ => None,
        })
    }

    pub fn created(&self) -> Vec<EntityId> {
        self.steps
            .iter()
            .filter_map(|s| match s.outcome {
                StepOutcome::Created(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Pair(String, String),
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z][A-Za-z_-]*)=(?:"([^"]*)"|(\S+))|"([^"]*)"|(\S+)"#)
            .expect("token regex is valid")
    })
}

fn tokenize(line_no: usize, line: &str) -> ApplicationResult<Vec<Token>> {
    let mut tokens = Vec::new();
    for caps in token_regex().captures_iter(line) {
        if let Some(key) = caps.get(1) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if value.starts_with('"') {
                return Err(ApplicationError::parse(line_no, "unterminated quote"));
            }
            tokens.push(Token::Pair(key.as_str().to_ascii_lowercase(), value.to_string()));
        } else if let Some(word) = caps.get(4).or_else(|| caps.get(5)) {
            if word.as_str().starts_with('"') {
                return Err(ApplicationError::parse(line_no, "unterminated quote"));
            }
            tokens.push(Token::Word(word.as_str().to_string()));
        }
    }
    Ok(tokens)
}

/// Arguments of one command line, consumed field by field.
struct Args {
    line: usize,
    verb: String,
    positional: Vec<String>,
    pairs: Vec<(String, String)>,
}

impl Args {
    fn take(&mut self, key: &str) -> Option<String> {
        let pos = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(pos).1)
    }

    fn take_parsed<T>(&mut self, key: &str) -> ApplicationResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.take(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                ApplicationError::parse(self.line, format!("{}: bad {}='{}': {}", self.verb, key, raw, e))
            }),
        }
    }

    fn positional_id(&self, index: usize, what: &str) -> ApplicationResult<EntityId> {
        let raw = self.positional.get(index).ok_or_else(|| {
            ApplicationError::parse(self.line, format!("{}: missing {}", self.verb, what))
        })?;
        raw.parse::<EntityId>()
            .map_err(|e| ApplicationError::parse(self.line, format!("{}: {}", self.verb, e)))
    }

    /// Fails on any argument the command did not consume.
    fn finish(self, positional: usize) -> ApplicationResult<()> {
        if let Some(extra) = self.positional.get(positional) {
            return Err(ApplicationError::parse(
                self.line,
                format!("{}: unexpected argument '{}'", self.verb, extra),
            ));
        }
        if let Some((key, _)) = self.pairs.first() {
            return Err(ApplicationError::parse(
                self.line,
                format!("{}: unknown field '{}'", self.verb, key),
            ));
        }
        Ok(())
    }
}

fn parse_parent(args: &mut Args) -> ApplicationResult<EntityId> {
    Ok(args.take_parsed::<EntityId>("in")?.unwrap_or(EntityId::ROOT))
}

fn parse_factory_patch(args: &mut Args) -> ApplicationResult<FactoryPatch> {
    Ok(FactoryPatch {
        name: args.take("name"),
        x: args.take_parsed("x")?,
        y: args.take_parsed("y")?,
        width: args.take_parsed("w")?,
        height: args.take_parsed("h")?,
    })
}

fn parse_recipe_patch(args: &mut Args) -> ApplicationResult<RecipePatch> {
    Ok(RecipePatch {
        name: args.take("name"),
        overclock: args.take_parsed("overclock")?,
        count: args.take_parsed("count")?,
    })
}

fn parse_line(line_no: usize, line: &str) -> ApplicationResult<Option<Command>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = tokenize(line_no, trimmed)?.into_iter();
    let verb = match tokens.next() {
        Some(Token::Word(verb)) => verb.to_ascii_lowercase(),
        _ => return Err(ApplicationError::parse(line_no, "expected a command")),
    };

    let mut args = Args {
        line: line_no,
        verb: verb.clone(),
        positional: Vec::new(),
        pairs: Vec::new(),
    };
    for token in tokens {
        match token {
            Token::Word(w) => args.positional.push(w),
            Token::Pair(k, v) => args.pairs.push((k, v)),
        }
    }

    let command = match verb.as_str() {
        "factory" => {
            let placement = Placement::Factory(parse_factory_patch(&mut args)?);
            let parent = parse_parent(&mut args)?;
            args.finish(0)?;
            Command::Create { placement, parent }
        }
        "recipe" => {
            let placement = Placement::Recipe(parse_recipe_patch(&mut args)?);
            let parent = parse_parent(&mut args)?;
            args.finish(0)?;
            Command::Create { placement, parent }
        }
        "line" => {
            let placement = Placement::Line {
                from: args.take_parsed("from")?,
                to: args.take_parsed("to")?,
            };
            let parent = parse_parent(&mut args)?;
            args.finish(0)?;
            Command::Create { placement, parent }
        }
        "resource" => {
            let placement = Placement::Resource {
                name: args.take("name"),
                purity: args.take_parsed("purity")?,
                recipe: args.take_parsed("recipe")?,
                x: args.take_parsed("x")?,
                y: args.take_parsed("y")?,
            };
            let parent = parse_parent(&mut args)?;
            args.finish(0)?;
            Command::Create { placement, parent }
        }
        "move" => {
            let target = args.positional_id(0, "target id")?;
            let destination = args.positional_id(1, "destination id")?;
            args.finish(2)?;
            Command::Move {
                target,
                destination,
            }
        }
        "remove" => {
            let id = args.positional_id(0, "entity id")?;
            args.finish(1)?;
            Command::Remove { id }
        }
        "set-factory" => {
            let id = args.positional_id(0, "entity id")?;
            let patch = parse_factory_patch(&mut args)?;
            args.finish(1)?;
            Command::SetFactory { id, patch }
        }
        "set-recipe" => {
            let id = args.positional_id(0, "entity id")?;
            let patch = parse_recipe_patch(&mut args)?;
            args.finish(1)?;
            Command::SetRecipe { id, patch }
        }
        "reset" => {
            args.finish(0)?;
            Command::Reset
        }
        other => {
            return Err(ApplicationError::parse(
                line_no,
                format!("unknown command '{}'", other),
            ))
        }
    };
    Ok(Some(command))
}

/// Parses a whole script; the first malformed line aborts parsing.
#[instrument(level = "debug", skip(source))]
pub fn parse_script(source: &str) -> ApplicationResult<Vec<Statement>> {
    let mut statements = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        if let Some(command) = parse_line(idx + 1, line)? {
            statements.push(Statement {
                line: idx + 1,
                command,
            });
        }
    }
    debug!("parsed {} statements", statements.len());
    Ok(statements)
}

fn current_factory(store: &EntityTreeStore, id: EntityId) -> FactoryModel {
    store
        .get(id)
        .and_then(|e| e.payload.as_ref())
        .and_then(Payload::as_factory)
        .cloned()
        .unwrap_or_default()
}

fn current_recipe(store: &EntityTreeStore, id: EntityId) -> RecipeModel {
    store
        .get(id)
        .and_then(|e| e.payload.as_ref())
        .and_then(Payload::as_recipe)
        .cloned()
        .unwrap_or_default()
}

fn execute_command(
    store: &mut EntityTreeStore,
    command: &Command,
    defaults: &DefaultsConfig,
) -> StepOutcome {
    let applied = |r: Result<(), StoreError>| match r {
        Ok(()) => StepOutcome::Applied,
        Err(e) => StepOutcome::Rejected(e),
    };

    match command {
        Command::Create { placement, parent } => {
            StepOutcome::Created(store.create_entity(placement.to_payload(defaults), *parent))
        }
        Command::Move {
            target,
            destination,
        } => applied(store.move_entity(*target, *destination)),
        Command::Remove { id } => match store.remove_entity(*id) {
            Ok(removed) => StepOutcome::Removed(removed),
            Err(e) => StepOutcome::Rejected(e),
        },
        Command::SetFactory { id, patch } => {
            let model = patch.apply(&current_factory(store, *id));
            applied(store.set_factory_model(*id, model))
        }
        Command::SetRecipe { id, patch } => {
            let model = patch.apply(&current_recipe(store, *id));
            applied(store.set_recipe_model(*id, model))
        }
        Command::Reset => {
            store.reset();
            StepOutcome::Applied
        }
    }
}

/// Runs every statement against `store`, recording each outcome.
#[instrument(level = "debug", skip_all, fields(statements = statements.len()))]
pub fn execute(
    store: &mut EntityTreeStore,
    statements: &[Statement],
    defaults: &DefaultsConfig,
) -> ScriptReport {
    let mut report = ScriptReport::default();
    for statement in statements {
        let outcome = execute_command(store, &statement.command, defaults);
        if let StepOutcome::Rejected(e) = &outcome {
            warn!("line {}: {}", statement.line, e);
        }
        report.steps.push(Step {
            line: statement.line,
            outcome,
        });
    }
    report
}
