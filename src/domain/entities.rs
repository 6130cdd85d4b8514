//! Domain entities: identities, kinds and kind-specific payloads

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a placed entity.
///
/// The textual form is the decimal counter value (`"1"`, `"2"`, ...).
/// The root entity always has id `0`; allocated ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// The fixed id of the root entity.
    pub const ROOT: EntityId = EntityId(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Error parsing an entity id or a kind name from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {what}: '{input}'")]
pub struct ParseError {
    pub what: &'static str,
    pub input: String,
}

impl ParseError {
    fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_string(),
        }
    }
}

impl FromStr for EntityId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(EntityId)
            .map_err(|_| ParseError::new("entity id", s))
    }
}

/// Closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Root,
    Recipe,
    Factory,
    LogisticsLine,
    ResourceNode,
}

impl EntityKind {
    /// Recipes and logistics lines are leaves; nothing may be moved into them.
    pub const fn can_have_children(self) -> bool {
        !matches!(self, EntityKind::Recipe | EntityKind::LogisticsLine)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Root => "root",
            EntityKind::Recipe => "recipe",
            EntityKind::Factory => "factory",
            EntityKind::LogisticsLine => "logistics-line",
            EntityKind::ResourceNode => "resource-node",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "root" => Ok(EntityKind::Root),
            "recipe" | "recipes" => Ok(EntityKind::Recipe),
            "factory" | "factories" => Ok(EntityKind::Factory),
            "line" | "lines" | "logistics-line" | "logisticsline" => Ok(EntityKind::LogisticsLine),
            "resource" | "resources" | "resource-node" | "resourcenode" => {
                Ok(EntityKind::ResourceNode)
            }
            _ => Err(ParseError::new("entity kind", s)),
        }
    }
}

/// Canvas position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Relative move.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Absolute move.
    pub fn set(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Frame size of a factory area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Purity of a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purity {
    Impure,
    #[default]
    Normal,
    Pure,
}

impl fmt::Display for Purity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Purity::Impure => "impure",
            Purity::Normal => "normal",
            Purity::Pure => "pure",
        };
        f.write_str(s)
    }
}

impl FromStr for Purity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "impure" => Ok(Purity::Impure),
            "normal" => Ok(Purity::Normal),
            "pure" => Ok(Purity::Pure),
            _ => Err(ParseError::new("purity", s)),
        }
    }
}

/// Recipe placed on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeModel {
    /// Recipe name, resolved against the external recipe table
    pub recipe_name: String,
    /// Overclock percentage (50, 100, 150, 200, 250 in the game)
    pub overclock: u32,
    /// Number of machines running this recipe
    pub machine_count: u32,
}

impl Default for RecipeModel {
    fn default() -> Self {
        Self {
            recipe_name: "Recipe".into(),
            overclock: 100,
            machine_count: 1,
        }
    }
}

/// Factory area: a framed region grouping other entities.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryModel {
    pub factory_name: String,
    pub position: Point,
    pub frame_size: Size,
}

impl Default for FactoryModel {
    fn default() -> Self {
        Self {
            factory_name: "Factory".into(),
            position: Point::default(),
            frame_size: Size::default(),
        }
    }
}

/// Logistics line between two entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogisticsLineModel {
    /// Sending side
    pub export_id: Option<EntityId>,
    /// Receiving side
    pub import_id: Option<EntityId>,
}

/// Resource node feeding a recipe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceModel {
    pub resource_name: String,
    pub purity: Purity,
    /// Recipe entity extracting from this node
    pub recipe_id: Option<EntityId>,
    pub position: Point,
}

/// Kind-specific entity data. The variant is the entity's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Recipe(RecipeModel),
    Factory(FactoryModel),
    LogisticsLine(LogisticsLineModel),
    ResourceNode(ResourceModel),
}

impl Payload {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Payload::Recipe(_) => EntityKind::Recipe,
            Payload::Factory(_) => EntityKind::Factory,
            Payload::LogisticsLine(_) => EntityKind::LogisticsLine,
            Payload::ResourceNode(_) => EntityKind::ResourceNode,
        }
    }

    pub fn as_recipe(&self) -> Option<&RecipeModel> {
        match self {
            Payload::Recipe(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_factory(&self) -> Option<&FactoryModel> {
        match self {
            Payload::Factory(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_logistics_line(&self) -> Option<&LogisticsLineModel> {
        match self {
            Payload::LogisticsLine(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceModel> {
        match self {
            Payload::ResourceNode(model) => Some(model),
            _ => None,
        }
    }
}

impl From<RecipeModel> for Payload {
    fn from(model: RecipeModel) -> Self {
        Payload::Recipe(model)
    }
}

impl From<FactoryModel> for Payload {
    fn from(model: FactoryModel) -> Self {
        Payload::Factory(model)
    }
}

impl From<LogisticsLineModel> for Payload {
    fn from(model: LogisticsLineModel) -> Self {
        Payload::LogisticsLine(model)
    }
}

impl From<ResourceModel> for Payload {
    fn from(model: ResourceModel) -> Self {
        Payload::ResourceNode(model)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Recipe(r) => write!(
                f,
                "{} x{} @{}%",
                r.recipe_name, r.machine_count, r.overclock
            ),
            Payload::Factory(fm) => {
                write!(f, "{} {} {}", fm.factory_name, fm.position, fm.frame_size)
            }
            Payload::LogisticsLine(l) => {
                let end = |id: Option<EntityId>| id.map_or_else(|| "-".to_string(), |i| i.to_string());
                write!(f, "{} -> {}", end(l.export_id), end(l.import_id))
            }
            Payload::ResourceNode(rn) => {
                write!(f, "{} ({}) {}", rn.resource_name, rn.purity, rn.position)
            }
        }
    }
}

/// A placed node in the entity tree.
///
/// Structural fields are maintained by the store; collaborators only ever see
/// shared references.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Kind-specific data, `None` for the root
    pub payload: Option<Payload>,
    /// Containing entity, `None` for the root
    pub parent_id: Option<EntityId>,
    /// Children in insertion (display) order
    pub child_ids: Vec<EntityId>,
}

impl Entity {
    pub(crate) fn root() -> Self {
        Self {
            id: EntityId::ROOT,
            kind: EntityKind::Root,
            payload: None,
            parent_id: None,
            child_ids: Vec::new(),
        }
    }

    pub(crate) fn new(id: EntityId, payload: Payload, parent_id: EntityId) -> Self {
        Self {
            id,
            kind: payload.kind(),
            payload: Some(payload),
            parent_id: Some(parent_id),
            child_ids: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == EntityKind::Root
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "[{}] {}: {}", self.id, self.kind, payload),
            None => write!(f, "[{}] {}", self.id, self.kind),
        }
    }
}
