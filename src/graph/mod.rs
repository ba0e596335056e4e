//! Module graph and entrypoint resolution
//!
//! The runner keeps every evaluated module in a cache keyed by module id.
//! Each node records which modules import it. A node without importers is an
//! entrypoint: re-running it re-runs everything it (transitively) imports.
//!
//! A full reload re-imports entrypoints only. When the reload was triggered
//! by one file, only the entrypoints that depend on that file are re-run:
//!
//! ```text
//! root.js  <-  mid.js  <-  leaf.js        triggeredBy = leaf.js
//!                                         entrypoints = [root.js]
//! ```
//!
//! Importing a module can have side effects, so the order of re-imports
//! matters. Both the cache and every importer set keep insertion order.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Metadata attached to an evaluated module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// File the module was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// An evaluated module as seen by the HMR coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ModuleMeta>,
    /// Ids of modules importing this one, in registration order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importers: Option<IndexSet<String>>,
}

impl ModuleNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            meta: None,
            importers: None,
        }
    }

    /// Set the originating file
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.meta = Some(ModuleMeta {
            file: Some(file.into()),
        });
        self
    }

    /// Add importers of this module
    pub fn with_importers<I, S>(mut self, importers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.importers
            .get_or_insert_with(IndexSet::new)
            .extend(importers.into_iter().map(Into::into));
        self
    }

    /// The file this module was loaded from, if known
    pub fn file(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.file.as_deref())
    }

    /// A module nothing imports (absent or empty importer set)
    pub fn is_root(&self) -> bool {
        self.importers.as_ref().map_or(true, |importers| importers.is_empty())
    }
}

/// Storage of evaluated modules owned by the runner
///
/// Implementations hand out snapshots, so callers never hold a lock across
/// an await point.
pub trait ModuleCache: Send + Sync {
    /// All cached modules as (id, node) pairs
    fn entries(&self) -> Vec<(String, ModuleNode)>;

    /// Look up a module by id
    fn get_by_module_id(&self, id: &str) -> Option<ModuleNode>;

    /// Drop every cached module
    fn clear(&self);
}

/// In-memory [`ModuleCache`], enumerated in load order
#[derive(Debug, Default)]
pub struct EvaluatedModules {
    modules: RwLock<IndexMap<String, ModuleNode>>,
}

impl EvaluatedModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a list of nodes
    pub fn from_nodes<I: IntoIterator<Item = ModuleNode>>(nodes: I) -> Self {
        let cache = Self::new();
        for node in nodes {
            cache.insert(node);
        }
        cache
    }

    /// Insert or replace a module
    ///
    /// Replacing keeps the module's original position.
    pub fn insert(&self, node: ModuleNode) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.id.clone(), node);
    }

    /// Remove a module, returning it if it was cached
    pub fn remove(&self, id: &str) -> Option<ModuleNode> {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(id)
    }

    /// Record that `importer` imports `id`
    pub fn add_importer(&self, id: &str, importer: &str) -> bool {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        match modules.get_mut(id) {
            Some(node) => node
                .importers
                .get_or_insert_with(IndexSet::new)
                .insert(importer.to_string()),
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModuleCache for EvaluatedModules {
    fn entries(&self) -> Vec<(String, ModuleNode)> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect()
    }

    fn get_by_module_id(&self, id: &str) -> Option<ModuleNode> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn clear(&self) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Ids of every cached module loaded from `file`
pub fn modules_by_file<C: ModuleCache + ?Sized>(cache: &C, file: &str) -> Vec<String> {
    cache
        .entries()
        .into_iter()
        .filter(|(_, node)| node.file() == Some(file))
        .map(|(id, _)| id)
        .collect()
}

/// Entrypoints that transitively import any module loaded from `file`
pub fn entrypoints_of_file<C: ModuleCache + ?Sized>(cache: &C, file: &str) -> Vec<String> {
    let ids = modules_by_file(cache, file);
    entrypoints_of(cache, &ids)
}

/// Entrypoints reachable by walking importers backward from `module_ids`
///
/// Each id is visited at most once, so import cycles terminate. Ids missing
/// from the cache contribute nothing. Results are in depth-first discovery
/// order and contain no duplicates.
pub fn entrypoints_of<C, S>(cache: &C, module_ids: &[S]) -> Vec<String>
where
    C: ModuleCache + ?Sized,
    S: AsRef<str>,
{
    let mut entrypoints = Vec::new();
    let mut visited: HashSet<String> = HashSet::default();
    // Reversed so ids pop in the order given.
    let mut stack: Vec<String> = module_ids
        .iter()
        .rev()
        .map(|id| id.as_ref().to_string())
        .collect();

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(node) = cache.get_by_module_id(&id) else {
            continue;
        };
        match node.importers {
            Some(importers) if !importers.is_empty() => {
                stack.extend(importers.into_iter().rev().filter(|i| !visited.contains(i)));
            }
            _ => entrypoints.push(id),
        }
    }

    entrypoints
}

/// Every module in the cache without importers, in cache enumeration order
pub fn all_entrypoints<C: ModuleCache + ?Sized>(cache: &C) -> Vec<String> {
    cache
        .entries()
        .into_iter()
        .filter(|(_, node)| node.is_root())
        .map(|(id, _)| id)
        .collect()
}
