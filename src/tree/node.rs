//! Tree arena and nodes

use indexmap::IndexMap;

use super::error::{TreeError, TreeResult};
use super::path::{self, Segment};
use super::slice::SliceSpec;

/// Stable identity of a node inside one [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A single node: name, parent link, ordered children and optional payload
#[derive(Debug)]
pub struct TreeNode<T> {
    name: String,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    payload: Option<T>,
}

impl<T> TreeNode<T> {
    fn new(name: String, parent: Option<NodeId>, payload: Option<T>) -> Self {
        Self {
            name,
            parent,
            children: IndexMap::new(),
            payload,
        }
    }

    /// Name of this node (empty for the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent of this node, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child names in insertion order
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(|k| k.as_str())
    }

    /// Number of direct children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Look up a direct child by name
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    /// The value attached to this node, if any
    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// True if the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An ordered hierarchy of named nodes
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Ids of removed
/// nodes are never handed out again, so their slots stay allocated: the
/// arena grows with every node ever inserted, not with the live count.
/// Trees that churn through many insert/remove cycles should be rebuilt.
#[derive(Debug)]
pub struct Tree<T> {
    nodes: Vec<Option<TreeNode<T>>>,
    live: usize,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    /// Create a tree holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(TreeNode::new(String::new(), None, None))],
            live: 1,
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes currently in the tree, root included
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.live == 1
    }

    /// Borrow a node, `None` if it was removed
    pub fn node(&self, id: NodeId) -> Option<&TreeNode<T>> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode<T>> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    fn require(&self, id: NodeId) -> TreeResult<&TreeNode<T>> {
        self.node(id)
            .ok_or_else(|| TreeError::NotFound(format!("node #{}", id.0)))
    }

    /// Resolve a path starting at the root
    pub fn resolve(&self, path: &str) -> TreeResult<NodeId> {
        self.resolve_from(self.root(), path)
    }

    /// Resolve a path relative to `base`
    ///
    /// A leading `/` restarts at the root. `..` at the root stays at the root.
    /// Nothing is created: any missing segment is `NotFound`.
    pub fn resolve_from(&self, base: NodeId, path: &str) -> TreeResult<NodeId> {
        let mut current = base;
        self.require(current)?;

        for segment in path::segments(path) {
            current = match segment {
                Segment::Root => self.root(),
                Segment::Current => current,
                Segment::Parent => self.require(current)?.parent.unwrap_or(current),
                Segment::Name(name) => self
                    .require(current)?
                    .child(name)
                    .ok_or_else(|| TreeError::NotFound(path.to_string()))?,
            };
        }
        Ok(current)
    }

    /// Absolute path of a node; the root is `/`
    pub fn path_of(&self, id: NodeId) -> TreeResult<String> {
        let mut names = Vec::new();
        let mut current = self.require(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.require(parent)?;
        }
        if names.is_empty() {
            return Ok(path::SEPARATOR.to_string());
        }
        names.reverse();
        Ok(names
            .iter()
            .map(|n| format!("{}{}", path::SEPARATOR, n))
            .collect())
    }

    /// Add a named child under `parent`
    ///
    /// Fails if the name is invalid or already used by a sibling.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        name: &str,
        payload: Option<T>,
    ) -> TreeResult<NodeId> {
        path::validate_name(name)?;

        let parent_node = self.require(parent)?;
        if parent_node.children.contains_key(name) {
            return Err(TreeError::DuplicateName {
                parent: self.path_of(parent)?,
                name: name.to_string(),
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes
            .push(Some(TreeNode::new(name.to_string(), Some(parent), payload)));
        self.live += 1;

        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Remove a child and its whole subtree
    ///
    /// Returns `(path, payload)` for every removed node that carried a payload,
    /// parents before children.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> TreeResult<Vec<(String, T)>> {
        let child = self
            .require(parent)?
            .child(name)
            .ok_or_else(|| TreeError::NotFound(name.to_string()))?;

        let mut order = Vec::new();
        let mut stack = vec![child];
        while let Some(id) = stack.pop() {
            let node = self.require(id)?;
            order.push((id, self.path_of(id)?));
            stack.extend(node.children.values().rev().copied());
        }

        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.shift_remove(name);
        }

        let mut removed = Vec::new();
        for (id, node_path) in order {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) {
                self.live -= 1;
                if let Some(payload) = node.payload {
                    removed.push((node_path, payload));
                }
            }
        }
        Ok(removed)
    }

    /// Attach (or replace) the payload of a node, returning the previous one
    pub fn set_payload(&mut self, id: NodeId, payload: T) -> TreeResult<Option<T>> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| TreeError::NotFound(format!("node #{}", id.0)))?;
        Ok(node.payload.replace(payload))
    }

    /// Children of `parent` selected by a slice, in slice order
    pub fn children(&self, parent: NodeId, spec: &SliceSpec) -> TreeResult<Vec<NodeId>> {
        let node = self.require(parent)?;
        let positions = spec.indices(node.children.len(), |name| {
            node.children.get_index_of(name)
        })?;
        Ok(positions
            .into_iter()
            .filter_map(|ix| node.children.get_index(ix).map(|(_, id)| *id))
            .collect())
    }

    /// Ids of a node and all its descendants, depth first in child order
    pub fn descendants(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.require(current)?;
            out.push(current);
            stack.extend(node.children.values().rev().copied());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree<u32>, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let app = tree.insert_child(root, "app", None).unwrap();
        for (ix, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            tree.insert_child(app, name, Some(ix as u32)).unwrap();
        }
        (tree, app)
    }

    fn names(tree: &Tree<u32>, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| tree.node(*id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_resolve_absolute_and_relative() {
        let (tree, app) = sample();
        let c = tree.resolve("/app/c").unwrap();
        assert_eq!(tree.node(c).unwrap().payload(), Some(&2));

        assert_eq!(tree.resolve_from(c, "../d").unwrap(), tree.resolve("/app/d").unwrap());
        assert_eq!(tree.resolve_from(c, ".").unwrap(), c);
        assert_eq!(tree.resolve_from(c, "..").unwrap(), app);
        assert_eq!(tree.resolve_from(c, "/app").unwrap(), app);
        assert_eq!(tree.resolve("/").unwrap(), tree.root());
        assert_eq!(tree.resolve("/..").unwrap(), tree.root());
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let (tree, _) = sample();
        assert!(matches!(tree.resolve("/app/zz"), Err(TreeError::NotFound(_))));
        assert!(matches!(tree.resolve("/App/a"), Err(TreeError::NotFound(_))));
        assert!(matches!(tree.resolve("/app/a/deeper"), Err(TreeError::NotFound(_))));
    }

    #[test]
    fn test_identity_stable_until_removed() {
        let (mut tree, app) = sample();
        let b = tree.resolve("/app/b").unwrap();
        tree.insert_child(app, "f", None).unwrap();
        assert_eq!(tree.resolve("/app/b").unwrap(), b);

        tree.remove_child(app, "b").unwrap();
        assert!(tree.node(b).is_none());
        assert!(tree.resolve("/app/b").is_err());

        // re-inserting a node with the same name yields a new identity
        let b2 = tree.insert_child(app, "b", None).unwrap();
        assert_ne!(b, b2);
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let (mut tree, app) = sample();
        let err = tree.insert_child(app, "a", Some(9)).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateName { .. }));
        // first node untouched
        let a = tree.resolve("/app/a").unwrap();
        assert_eq!(tree.node(a).unwrap().payload(), Some(&0));
    }

    #[test]
    fn test_insert_invalid_name() {
        let (mut tree, app) = sample();
        assert!(matches!(
            tree.insert_child(app, "x/y", None),
            Err(TreeError::InvalidName(_))
        ));
        assert!(matches!(
            tree.insert_child(app, "..", None),
            Err(TreeError::InvalidName(_))
        ));
    }

    #[test]
    fn test_remove_subtree_returns_payloads() {
        let mut tree: Tree<&str> = Tree::new();
        let root = tree.root();
        let g = tree.insert_child(root, "g", Some("group")).unwrap();
        let h = tree.insert_child(g, "h", None).unwrap();
        tree.insert_child(h, "i", Some("leaf")).unwrap();
        assert_eq!(tree.len(), 4);

        let removed = tree.remove_child(root, "g").unwrap();
        assert_eq!(
            removed,
            vec![("/g".to_string(), "group"), ("/g/h/i".to_string(), "leaf")]
        );
        assert!(tree.is_empty());
        assert!(tree.remove_child(root, "g").is_err());
    }

    #[test]
    fn test_children_slicing() {
        let (tree, app) = sample();
        let pick = |s: &str| names(&tree, &tree.children(app, &s.parse().unwrap()).unwrap());

        assert_eq!(pick("1:3"), vec!["b", "c"]);
        assert_eq!(pick("-2:"), vec!["d", "e"]);
        assert_eq!(pick("3:99"), vec!["d", "e"]);
        assert_eq!(pick("-99:1"), vec!["a"]);
        assert_eq!(pick("::-2"), vec!["e", "c", "a"]);
        assert_eq!(pick("b:d"), vec!["b", "c"]);
    }

    #[test]
    fn test_order_preserved_after_removal() {
        let (mut tree, app) = sample();
        tree.remove_child(app, "c").unwrap();
        let all = tree.children(app, &SliceSpec::all()).unwrap();
        assert_eq!(names(&tree, &all), vec!["a", "b", "d", "e"]);
    }

    #[test]
    fn test_path_of() {
        let (tree, app) = sample();
        assert_eq!(tree.path_of(tree.root()).unwrap(), "/");
        assert_eq!(tree.path_of(app).unwrap(), "/app");
        let e = tree.resolve("/app/e").unwrap();
        assert_eq!(tree.path_of(e).unwrap(), "/app/e");
    }

    #[test]
    fn test_descendants_order() {
        let (tree, app) = sample();
        let ids = tree.descendants(app).unwrap();
        assert_eq!(names(&tree, &ids), vec!["app", "a", "b", "c", "d", "e"]);
    }
}
