//! The tree of watchables owned by one server instance

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{WatchError, WatchResult};
use super::value::{Kind, Value};
use super::watchable::{Agent, Watchable};
use crate::hub::{HubConfig, SubscriptionHub};
use crate::tree::{path, NodeId, SliceSpec, Tree, TreeError};

/// JSON view of a node: a bare value for a watchable, an object for a group
///
/// The same shape is accepted by [`WatchRegistry::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSnapshot {
    Value(Value),
    Group(IndexMap<String, NodeSnapshot>),
}

/// Registry of watchables addressed by path
///
/// Nodes without a watchable are groups. Lock order is tree, then a single
/// watchable's state, then the hub; no path takes them the other way round.
pub struct WatchRegistry {
    tree: RwLock<Tree<Arc<Watchable>>>,
    hub: SubscriptionHub,
}

impl WatchRegistry {
    /// Create a registry whose watchables publish to `hub`
    pub fn new(hub: SubscriptionHub) -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            hub,
        }
    }

    /// Create a registry with a private hub, for in-process use
    pub fn standalone() -> Self {
        Self::new(SubscriptionHub::new(HubConfig::default()))
    }

    /// The hub changes are published to
    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Create a watchable at `path`, creating missing groups on the way
    ///
    /// Fails if the path already exists or the initial value is invalid.
    pub fn register(
        &self,
        path: &str,
        kind: Kind,
        initial: Option<Value>,
    ) -> WatchResult<Arc<Watchable>> {
        let canonical = path::normalize(path);
        let (parent_path, name) = path::split_last(&canonical)
            .ok_or_else(|| TreeError::InvalidName(path.to_string()))?;
        path::validate_name(name)?;

        let mut tree = self.tree.write();
        let parent = Self::ensure_groups(&mut tree, &parent_path)?;
        if let Some(node) = tree.node(parent) {
            if node.child(name).is_some() {
                return Err(TreeError::DuplicateName {
                    parent: parent_path,
                    name: name.to_string(),
                }
                .into());
            }
        }

        let watchable = Arc::new(Watchable::with_hub(
            canonical.clone(),
            kind,
            initial,
            self.hub.clone(),
        )?);
        tree.insert_child(parent, name, Some(Arc::clone(&watchable)))?;

        tracing::info!(path = %canonical, kind = watchable.kind().name(), "Watchable registered");
        Ok(watchable)
    }

    /// Create an empty group (and any missing parents)
    pub fn create_group(&self, path: &str) -> WatchResult<()> {
        let mut tree = self.tree.write();
        let id = Self::ensure_groups(&mut tree, &path::normalize(path))?;
        if tree.node(id).and_then(|n| n.payload()).is_some() {
            return Err(WatchError::InvalidDefinition {
                path: path.to_string(),
                reason: "a watchable already lives here".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_groups(tree: &mut Tree<Arc<Watchable>>, group_path: &str) -> WatchResult<NodeId> {
        let mut current = tree.root();
        for segment in path::segments(group_path) {
            current = match segment {
                path::Segment::Root => tree.root(),
                path::Segment::Current => current,
                path::Segment::Parent => tree
                    .node(current)
                    .and_then(|n| n.parent())
                    .unwrap_or(current),
                path::Segment::Name(name) => {
                    let existing = tree.node(current).and_then(|n| n.child(name));
                    match existing {
                        Some(id) => {
                            if tree.node(id).and_then(|n| n.payload()).is_some() {
                                return Err(WatchError::InvalidDefinition {
                                    path: group_path.to_string(),
                                    reason: format!("'{}' is a watchable, not a group", name),
                                });
                            }
                            id
                        }
                        None => tree.insert_child(current, name, None)?,
                    }
                }
            };
        }
        Ok(current)
    }

    /// Look up the watchable at `path`
    pub fn watchable(&self, path: &str) -> WatchResult<Arc<Watchable>> {
        let tree = self.tree.read();
        let id = tree.resolve(path)?;
        tree.node(id)
            .and_then(|n| n.payload())
            .cloned()
            .ok_or_else(|| WatchError::NotWatchable(path.to_string()))
    }

    /// True if `path` names an existing node (group or watchable)
    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().resolve(path).is_ok()
    }

    /// Current value at `path`
    pub fn get(&self, path: &str) -> WatchResult<Value> {
        Ok(self.watchable(path)?.get())
    }

    /// Set the value at `path`; see [`Watchable::set`]
    pub fn set(&self, path: &str, value: Value, agent: Agent) -> WatchResult<bool> {
        self.watchable(path)?.set(value, agent)
    }

    /// Parse and set the value at `path`, returning the stored value
    pub fn set_text(&self, path: &str, text: &str, agent: Agent) -> WatchResult<Value> {
        let watchable = self.watchable(path)?;
        watchable.set_text(text, agent)?;
        Ok(watchable.get())
    }

    /// Set the watchable at `path`, or values below the group at `path`
    ///
    /// A group takes a map keyed by child name, nested for subgroups;
    /// children left out keep their values. Every value is validated before
    /// any is stored, so one rejected value leaves the group untouched.
    /// Returns the paths whose value changed.
    pub fn apply(
        &self,
        path: &str,
        update: NodeSnapshot,
        agent: Agent,
    ) -> WatchResult<Vec<String>> {
        let staged = {
            let tree = self.tree.read();
            let id = tree.resolve(path)?;
            let mut staged = Vec::new();
            Self::stage(&tree, id, update, &mut staged)?;
            staged
        };

        let mut changed = Vec::new();
        for (watchable, value) in staged {
            if watchable.set(value, agent)? {
                changed.push(watchable.path().to_string());
            }
        }
        tracing::debug!(path = %path, changed = changed.len(), "Update applied");
        Ok(changed)
    }

    fn stage(
        tree: &Tree<Arc<Watchable>>,
        id: NodeId,
        update: NodeSnapshot,
        staged: &mut Vec<(Arc<Watchable>, Value)>,
    ) -> WatchResult<()> {
        let node_path = tree.path_of(id)?;
        let node = tree
            .node(id)
            .ok_or_else(|| TreeError::NotFound(node_path.clone()))?;

        match (node.payload(), update) {
            (Some(w), NodeSnapshot::Value(value)) => {
                let value = w
                    .kind()
                    .validate(value)
                    .map_err(|reason| WatchError::Validation {
                        path: node_path,
                        reason,
                    })?;
                staged.push((Arc::clone(w), value));
            }
            (Some(_), NodeSnapshot::Group(_)) => {
                return Err(WatchError::Validation {
                    path: node_path,
                    reason: "expected a single value, got an object".to_string(),
                })
            }
            (None, NodeSnapshot::Value(_)) => return Err(WatchError::NotWatchable(node_path)),
            (None, NodeSnapshot::Group(children)) => {
                for (name, child_update) in children {
                    let child = node.child(&name).ok_or_else(|| {
                        TreeError::NotFound(path::join(&node_path, &name))
                    })?;
                    Self::stage(tree, child, child_update, staged)?;
                }
            }
        }
        Ok(())
    }

    /// Remove the node at `path` and everything below it
    ///
    /// Live subscriptions to removed watchables are closed. Returns the
    /// removed watchable paths.
    pub fn remove(&self, path: &str) -> WatchResult<Vec<String>> {
        let removed = {
            let mut tree = self.tree.write();
            let id = tree.resolve(path)?;
            let node = tree.node(id).ok_or_else(|| TreeError::NotFound(path.to_string()))?;
            let parent = node
                .parent()
                .ok_or_else(|| TreeError::InvalidName("cannot remove the root".to_string()))?;
            let name = node.name().to_string();
            tree.remove_child(parent, &name)?
        };

        let mut paths = Vec::with_capacity(removed.len());
        for (removed_path, watchable) in removed {
            watchable.detach();
            self.hub.forget_path(&removed_path);
            paths.push(removed_path);
        }
        tracing::info!(path = %path, watchables = paths.len(), "Subtree removed");
        Ok(paths)
    }

    /// Names of the children of the group at `path`, selected by `spec`
    pub fn children(&self, path: &str, spec: &SliceSpec) -> WatchResult<Vec<String>> {
        let tree = self.tree.read();
        let id = tree.resolve(path)?;
        let ids = tree.children(id, spec)?;
        Ok(ids
            .into_iter()
            .filter_map(|child| tree.node(child).map(|n| n.name().to_string()))
            .collect())
    }

    /// JSON view of the node at `path`
    pub fn snapshot(&self, path: &str) -> WatchResult<NodeSnapshot> {
        let tree = self.tree.read();
        let id = tree.resolve(path)?;
        Ok(Self::snapshot_node(&tree, id))
    }

    fn snapshot_node(tree: &Tree<Arc<Watchable>>, id: NodeId) -> NodeSnapshot {
        let Some(node) = tree.node(id) else {
            return NodeSnapshot::Group(IndexMap::new());
        };
        if let Some(w) = node.payload() {
            return NodeSnapshot::Value(w.get());
        }
        let children = node
            .child_names()
            .filter_map(|name| {
                node.child(name)
                    .map(|child| (name.to_string(), Self::snapshot_node(tree, child)))
            })
            .collect();
        NodeSnapshot::Group(children)
    }

    /// Number of registered watchables
    pub fn len(&self) -> usize {
        self.paths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of all watchables, depth first in child order
    pub fn paths(&self) -> Vec<String> {
        let tree = self.tree.read();
        let ids = tree.descendants(tree.root()).unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| {
                tree.node(id)
                    .and_then(|n| n.payload())
                    .map(|w| w.path().to_string())
            })
            .collect()
    }
}
