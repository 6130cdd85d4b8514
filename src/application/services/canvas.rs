//! Canvas service
//!
//! Owns one entity tree store and drives it from canvas scripts.

use std::path::Path;
use std::sync::Arc;

use termtree::Tree;
use tracing::{debug, instrument};

use crate::application::script::{self, ScriptReport};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::DefaultsConfig;
use crate::domain::{Entity, EntityId, EntityTreeStore};
use crate::infrastructure::traits::FileSystem;

/// Service replaying canvas scripts against an in-memory store.
pub struct CanvasService {
    fs: Arc<dyn FileSystem>,
    defaults: DefaultsConfig,
    store: EntityTreeStore,
}

impl CanvasService {
    /// Create a service over a fresh store.
    pub fn new(fs: Arc<dyn FileSystem>, defaults: DefaultsConfig) -> Self {
        Self {
            fs,
            defaults,
            store: EntityTreeStore::new(),
        }
    }

    pub fn store(&self) -> &EntityTreeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityTreeStore {
        &mut self.store
    }

    /// Parse the whole script, then execute it.
    ///
    /// A parse error leaves the store untouched; rejected operations are
    /// reported, not returned as errors.
    #[instrument(level = "debug", skip(self, source))]
    pub fn run_source(&mut self, source: &str) -> ApplicationResult<ScriptReport> {
        let statements = script::parse_script(source)?;
        let report = script::execute(&mut self.store, &statements, &self.defaults);
        debug!(
            "executed {} statements, {} rejected",
            report.steps.len(),
            report.rejected().count()
        );
        Ok(report)
    }

    /// Read a script file and run it.
    #[instrument(level = "debug", skip(self))]
    pub fn run_file(&mut self, path: &Path) -> ApplicationResult<ScriptReport> {
        if !self.fs.exists(path) {
            return Err(ApplicationError::OperationFailed {
                context: format!("script not found: {}", path.display()),
                source: "no such file".into(),
            });
        }
        let source = self
            .fs
            .read_to_string(path)
            .with_path_context("read script", path)?;
        self.run_source(&source)
    }

    /// Render the current tree, root first, children in display order.
    pub fn tree_view(&self, show_ids: bool) -> Tree<String> {
        self.subtree_view(EntityId::ROOT, show_ids)
    }

    fn subtree_view(&self, id: EntityId, show_ids: bool) -> Tree<String> {
        let label = self
            .store
            .get(id)
            .map(|e| node_label(e, show_ids))
            .unwrap_or_else(|| format!("<missing {}>", id));
        let leaves: Vec<Tree<String>> = self
            .store
            .children_of(id)
            .iter()
            .map(|&child| self.subtree_view(child, show_ids))
            .collect();
        Tree::new(label).with_leaves(leaves)
    }
}

fn node_label(entity: &Entity, show_ids: bool) -> String {
    if entity.is_root() {
        return "canvas".to_string();
    }
    let body = entity
        .payload
        .as_ref()
        .map(|p| format!("{}: {}", entity.kind, p))
        .unwrap_or_else(|| entity.kind.to_string());
    if show_ids {
        format!("[{}] {}", entity.id, body)
    } else {
        body
    }
}
