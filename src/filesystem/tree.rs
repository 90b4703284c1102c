use futures_channel::mpsc;
use hashlink::LinkedHashMap;
use snafu::{OptionExt, Snafu, ensure};

use crate::changes::{ChangeEvent, ChangeKind};
use crate::filesystem::subscription::{ChangeSubscription, Listener, SubscriptionId};
use crate::path;

type Children<T> = LinkedHashMap<String, PathNode<T>>;

/// A node of the tree, either a directory-like branch or a value.
#[derive(Debug)]
enum PathNode<T> {
    Branch { children: Children<T> },
    Leaf { value: T },
}

impl<T> PathNode<T> {
    fn branch() -> Self {
        PathNode::Branch {
            children: LinkedHashMap::new(),
        }
    }

    fn removal_kind(&self) -> ChangeKind {
        match self {
            PathNode::Branch { .. } => ChangeKind::UnlinkDir,
            PathNode::Leaf { .. } => ChangeKind::Unlink,
        }
    }
}

/// Values of type `T` addressed by slash-delimited paths.
///
/// Every mutation emits exactly one [`ChangeEvent`] to the subscribers
/// registered with [`PathTree::on_change`]. Intermediate directories created
/// implicitly by [`PathTree::set`] or [`PathTree::mkdir`] do not emit events
/// of their own.
///
/// Iterators borrow the tree, so the tree can not be mutated while a
/// listing is in progress.
#[derive(Debug)]
pub struct PathTree<T> {
    root: Option<PathNode<T>>,
    allow_root_as_file: bool,
    listeners: Vec<Listener>,
    next_subscription: u64,
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathTree<T> {
    /// Creates a tree whose root is always a directory.
    pub fn new() -> Self {
        Self {
            root: Some(PathNode::branch()),
            allow_root_as_file: false,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Creates an empty tree whose root may itself hold a value, for domains
    /// that can be a single file or entirely absent.
    pub fn with_root_as_file() -> Self {
        Self {
            root: None,
            allow_root_as_file: true,
            ..Self::new()
        }
    }

    /// Creates or updates the value at `path`, creating missing parent directories.
    pub fn set(&mut self, path: &str, value: T) -> Result<(), PathTreeError> {
        let segments = path::segments(path).collect::<Vec<_>>();
        let normalized = segments.join("/");
        let Some((name, parents)) = segments.split_last() else {
            return self.set_root(value);
        };

        let parent = self.branch_for_insert(parents, &normalized)?;
        let kind = match parent.get_mut(*name) {
            None => {
                parent.insert(name.to_string(), PathNode::Leaf { value });
                ChangeKind::Add
            }
            Some(PathNode::Leaf { value: existing }) => {
                *existing = value;
                ChangeKind::Change
            }
            Some(PathNode::Branch { .. }) => {
                return IsDirectorySnafu { path: normalized }.fail();
            }
        };

        self.emit(ChangeEvent::new(kind, &normalized));
        Ok(())
    }

    /// Creates a directory at `path`, creating missing parent directories.
    pub fn mkdir(&mut self, path: &str) -> Result<(), PathTreeError> {
        let segments = path::segments(path).collect::<Vec<_>>();
        let normalized = segments.join("/");
        let Some((name, parents)) = segments.split_last() else {
            ensure!(self.root.is_none(), AlreadyExistsSnafu { path: "" });
            self.root = Some(PathNode::branch());
            self.emit(ChangeEvent::add_dir(""));
            return Ok(());
        };

        let parent = self.branch_for_insert(parents, &normalized)?;
        ensure!(
            !parent.contains_key(*name),
            AlreadyExistsSnafu { path: &normalized }
        );
        parent.insert(name.to_string(), PathNode::branch());

        self.emit(ChangeEvent::add_dir(&normalized));
        Ok(())
    }

    /// Removes the value or the whole directory at `path`.
    ///
    /// Removing the root of a tree that can not hold a root file empties it
    /// instead.
    pub fn remove(&mut self, path: &str) -> Result<(), PathTreeError> {
        let segments = path::segments(path).collect::<Vec<_>>();
        let normalized = segments.join("/");
        let Some((name, parents)) = segments.split_last() else {
            return self.remove_root();
        };

        let removed = match self.node_mut(parents) {
            Some(PathNode::Branch { children }) => children.remove(*name),
            _ => None,
        };
        let removed = removed.context(NotFoundSnafu { path: &normalized })?;

        self.emit(ChangeEvent::new(removed.removal_kind(), &normalized));
        Ok(())
    }

    pub fn get(&self, path: &str) -> Result<&T, PathTreeError> {
        match self.node(path) {
            Some(PathNode::Leaf { value }) => Ok(value),
            Some(PathNode::Branch { .. }) => IsDirectorySnafu {
                path: path::normalize(path),
            }
            .fail(),
            None => NotFoundSnafu {
                path: path::normalize(path),
            }
            .fail(),
        }
    }

    /// Mutable access to a value. Changes made through it are not announced
    /// to subscribers; use [`PathTree::set`] for that.
    pub fn get_mut(&mut self, path: &str) -> Result<&mut T, PathTreeError> {
        let segments = path::segments(path).collect::<Vec<_>>();
        match self.node_mut(&segments) {
            Some(PathNode::Leaf { value }) => Ok(value),
            Some(PathNode::Branch { .. }) => IsDirectorySnafu {
                path: segments.join("/"),
            }
            .fail(),
            None => NotFoundSnafu {
                path: segments.join("/"),
            }
            .fail(),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    pub fn is_dir(&self, path: &str) -> Result<bool, PathTreeError> {
        let node = self.node(path).context(NotFoundSnafu {
            path: path::normalize(path),
        })?;
        Ok(matches!(node, PathNode::Branch { .. }))
    }

    /// Names of the immediate children of the directory at `path`.
    pub fn list(&self, path: &str) -> Result<impl Iterator<Item = &str> + '_, PathTreeError> {
        match self.node(path) {
            Some(PathNode::Branch { children }) => Ok(children.keys().map(String::as_str)),
            Some(PathNode::Leaf { .. }) => IsFileSnafu {
                path: path::normalize(path),
            }
            .fail(),
            None => NotFoundSnafu {
                path: path::normalize(path),
            }
            .fail(),
        }
    }

    /// Every path in the tree, depth first. The root is only listed (as `""`)
    /// when it holds a value itself.
    pub fn list_all(&self) -> impl Iterator<Item = String> + '_ {
        Walk::new(self.root.as_ref()).map(|(path, _)| path)
    }

    /// Every value in the tree with its path, depth first.
    pub fn leaves(&self) -> impl Iterator<Item = (String, &T)> + '_ {
        Walk::new(self.root.as_ref()).filter_map(|(path, node)| match node {
            PathNode::Leaf { value } => Some((path, value)),
            PathNode::Branch { .. } => None,
        })
    }

    /// Subscribes to every change made from now on.
    pub fn on_change(&mut self) -> ChangeSubscription {
        let (sender, receiver) = mpsc::unbounded();
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push(Listener { id, sender });
        ChangeSubscription::new(id, receiver)
    }

    /// Stops delivery to a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ChangeEvent) {
        // Subscriptions whose stream was dropped are forgotten here
        self.listeners
            .retain(|listener| listener.sender.unbounded_send(event.clone()).is_ok());
    }

    fn set_root(&mut self, value: T) -> Result<(), PathTreeError> {
        ensure!(self.allow_root_as_file, RootNotAllowedSnafu);

        let kind = match self.root.as_mut() {
            Some(PathNode::Leaf { value: existing }) => {
                *existing = value;
                ChangeKind::Change
            }
            Some(PathNode::Branch { .. }) => return IsDirectorySnafu { path: "" }.fail(),
            None => {
                self.root = Some(PathNode::Leaf { value });
                ChangeKind::Add
            }
        };

        self.emit(ChangeEvent::new(kind, ""));
        Ok(())
    }

    fn remove_root(&mut self) -> Result<(), PathTreeError> {
        let removed = if self.allow_root_as_file {
            self.root.take()
        } else {
            self.root.replace(PathNode::branch())
        };
        let removed = removed.context(NotFoundSnafu { path: "" })?;

        self.emit(ChangeEvent::new(removed.removal_kind(), ""));
        Ok(())
    }

    /// Walks to the directory that will hold a new entry, creating missing
    /// directories on the way. Nothing is created when a leaf blocks the way.
    fn branch_for_insert(
        &mut self,
        parents: &[&str],
        path: &str,
    ) -> Result<&mut Children<T>, PathTreeError> {
        if let Some(blocking) = self.blocking_leaf(parents) {
            return LeafInTheWaySnafu { path, blocking }.fail();
        }

        let mut node = self.root.get_or_insert_with(PathNode::branch);
        for segment in parents {
            node = match node {
                PathNode::Branch { children } => {
                    // `entry` would move an existing directory to the back
                    if !children.contains_key(*segment) {
                        children.insert(segment.to_string(), PathNode::branch());
                    }
                    children
                        .get_mut(*segment)
                        .context(NotFoundSnafu { path })?
                }
                PathNode::Leaf { .. } => {
                    return LeafInTheWaySnafu {
                        path,
                        blocking: *segment,
                    }
                    .fail();
                }
            };
        }

        match node {
            PathNode::Branch { children } => Ok(children),
            PathNode::Leaf { .. } => LeafInTheWaySnafu {
                path,
                blocking: parents.join("/"),
            }
            .fail(),
        }
    }

    /// Path of the first leaf found among `parents` and their ancestors.
    fn blocking_leaf(&self, parents: &[&str]) -> Option<String> {
        let mut node = self.root.as_ref()?;
        for (depth, segment) in parents.iter().enumerate() {
            match node {
                PathNode::Leaf { .. } => return Some(parents[..depth].join("/")),
                PathNode::Branch { children } => node = children.get(*segment)?,
            }
        }
        matches!(node, PathNode::Leaf { .. }).then(|| parents.join("/"))
    }

    fn node(&self, path: &str) -> Option<&PathNode<T>> {
        let mut node = self.root.as_ref()?;
        for segment in path::segments(path) {
            match node {
                PathNode::Branch { children } => node = children.get(segment)?,
                PathNode::Leaf { .. } => return None,
            }
        }
        Some(node)
    }

    fn node_mut(&mut self, segments: &[&str]) -> Option<&mut PathNode<T>> {
        let mut node = self.root.as_mut()?;
        for segment in segments {
            node = match node {
                PathNode::Branch { children } => children.get_mut(*segment)?,
                PathNode::Leaf { .. } => return None,
            };
        }
        Some(node)
    }
}

/// Depth-first, pre-order traversal yielding each node with its path.
struct Walk<'a, T> {
    stack: Vec<(String, &'a PathNode<T>)>,
}

impl<'a, T> Walk<'a, T> {
    fn new(root: Option<&'a PathNode<T>>) -> Self {
        let mut walk = Walk { stack: Vec::new() };
        match root {
            Some(PathNode::Branch { children }) => walk.push_children("", children),
            Some(leaf) => walk.stack.push((String::new(), leaf)),
            None => {}
        }
        walk
    }

    fn push_children(&mut self, parent: &str, children: &'a Children<T>) {
        let start = self.stack.len();
        self.stack.extend(
            children
                .iter()
                .map(|(name, child)| (path::join(parent, name), child)),
        );
        // keep insertion order when popping
        self.stack[start..].reverse();
    }
}

impl<'a, T> Iterator for Walk<'a, T> {
    type Item = (String, &'a PathNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        if let PathNode::Branch { children } = node {
            self.push_children(&path, children);
        }
        Some((path, node))
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PathTreeError {
    #[snafu(display("Path '{}' does not exist", path))]
    NotFound { path: String },
    #[snafu(display("Cannot create '{}', '{}' is a file", path, blocking))]
    LeafInTheWay { path: String, blocking: String },
    #[snafu(display("Path '{}' already exists", path))]
    AlreadyExists { path: String },
    #[snafu(display("Path '{}' is a directory", path))]
    IsDirectory { path: String },
    #[snafu(display("Path '{}' is a file", path))]
    IsFile { path: String },
    #[snafu(display("The root of this tree can only be a directory"))]
    RootNotAllowed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::executor::block_on;

    fn drain(tree: &mut PathTree<u32>, subscription: ChangeSubscription) -> Vec<ChangeEvent> {
        assert!(tree.unsubscribe(subscription.id()));
        block_on(subscription.collect::<Vec<_>>())
    }

    #[test]
    fn set_then_get_returns_the_value() {
        let mut tree = PathTree::new();
        tree.set("a/b/c.txt", 7).unwrap();

        assert_eq!(tree.get("a/b/c.txt"), Ok(&7));
        assert_eq!(tree.get("./a//b/c.txt"), Ok(&7));
        assert!(tree.is_dir("a/b").unwrap());
        assert!(!tree.is_dir("a/b/c.txt").unwrap());
    }

    #[test]
    fn set_announces_add_then_change() {
        let mut tree = PathTree::new();
        let subscription = tree.on_change();

        tree.set("x", 1).unwrap();
        tree.set("x", 2).unwrap();

        assert_eq!(
            drain(&mut tree, subscription),
            vec![ChangeEvent::add("x"), ChangeEvent::change("x")]
        );
        assert_eq!(tree.get("x"), Ok(&2));
    }

    #[test]
    fn implicit_parents_emit_no_events() {
        let mut tree = PathTree::new();
        let subscription = tree.on_change();

        tree.set("deep/er/file", 1).unwrap();
        tree.mkdir("other/dir").unwrap();

        assert_eq!(
            drain(&mut tree, subscription),
            vec![ChangeEvent::add("deep/er/file"), ChangeEvent::add_dir("other/dir")]
        );
    }

    #[test]
    fn mkdir_then_remove_leaves_nothing_behind() {
        let mut tree = PathTree::<u32>::new();
        tree.mkdir("d").unwrap();
        assert!(tree.exists("d"));

        let subscription = tree.on_change();
        tree.remove("d").unwrap();

        assert!(!tree.exists("d"));
        assert_eq!(drain(&mut tree, subscription), vec![ChangeEvent::unlink_dir("d")]);
    }

    #[test]
    fn removing_a_directory_removes_its_subtree() {
        let mut tree = PathTree::new();
        tree.set("d/a", 1).unwrap();
        tree.set("d/sub/b", 2).unwrap();
        let subscription = tree.on_change();

        tree.remove("d").unwrap();

        assert!(!tree.exists("d/sub/b"));
        assert_eq!(tree.list_all().count(), 0);
        assert_eq!(drain(&mut tree, subscription), vec![ChangeEvent::unlink_dir("d")]);
    }

    #[test]
    fn leaf_in_the_way_blocks_without_side_effects() {
        let mut tree = PathTree::new();
        tree.set("a", 1).unwrap();

        assert_eq!(
            tree.set("a/b/c", 2),
            Err(PathTreeError::LeafInTheWay {
                path: "a/b/c".into(),
                blocking: "a".into()
            })
        );
        assert!(matches!(
            tree.mkdir("a/b"),
            Err(PathTreeError::LeafInTheWay { .. })
        ));
        assert_eq!(tree.list_all().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn occupied_paths_are_rejected() {
        let mut tree = PathTree::new();
        tree.mkdir("d").unwrap();
        tree.set("f", 1).unwrap();

        assert!(matches!(tree.mkdir("d"), Err(PathTreeError::AlreadyExists { .. })));
        assert!(matches!(tree.mkdir("f"), Err(PathTreeError::AlreadyExists { .. })));
        assert!(matches!(tree.set("d", 2), Err(PathTreeError::IsDirectory { .. })));
    }

    #[test]
    fn lookups_report_missing_and_mismatched_paths() {
        let mut tree = PathTree::new();
        tree.set("dir/file", 1).unwrap();

        assert!(matches!(tree.get("nope"), Err(PathTreeError::NotFound { .. })));
        assert!(matches!(tree.get("dir"), Err(PathTreeError::IsDirectory { .. })));
        assert!(matches!(tree.is_dir("nope"), Err(PathTreeError::NotFound { .. })));
        assert!(matches!(tree.list("dir/file"), Err(PathTreeError::IsFile { .. })));
        assert!(matches!(tree.list("nope"), Err(PathTreeError::NotFound { .. })));
        assert!(matches!(tree.remove("nope"), Err(PathTreeError::NotFound { .. })));
        assert!(!tree.exists("dir/file/below"));
    }

    #[test]
    fn list_yields_immediate_children() {
        let mut tree = PathTree::new();
        tree.set("a.txt", 1).unwrap();
        tree.set("sub/b.txt", 2).unwrap();
        tree.mkdir("empty").unwrap();

        assert_eq!(tree.list("").unwrap().collect::<Vec<_>>(), vec!["a.txt", "sub", "empty"]);
        assert_eq!(tree.list("sub").unwrap().collect::<Vec<_>>(), vec!["b.txt"]);
        assert_eq!(tree.list("empty").unwrap().count(), 0);
    }

    #[test]
    fn list_all_yields_every_path_once() {
        let mut tree = PathTree::new();
        tree.set("a/b/c.txt", 1).unwrap();
        tree.mkdir("a/d").unwrap();
        tree.set("e", 2).unwrap();
        tree.set("a/b/f.txt", 3).unwrap();

        assert_eq!(
            tree.list_all().collect::<Vec<_>>(),
            vec!["a", "a/b", "a/b/c.txt", "a/b/f.txt", "a/d", "e"]
        );
        assert_eq!(
            tree.leaves().map(|(path, value)| (path, *value)).collect::<Vec<_>>(),
            vec![
                ("a/b/c.txt".to_string(), 1),
                ("a/b/f.txt".to_string(), 3),
                ("e".to_string(), 2)
            ]
        );
    }

    #[test]
    fn writing_into_an_existing_directory_keeps_sibling_order() {
        let mut tree = PathTree::new();
        tree.mkdir("sub").unwrap();
        tree.set("a.txt", 1).unwrap();
        tree.set("sub/b.txt", 2).unwrap();
        tree.mkdir("sub/deeper").unwrap();

        assert_eq!(tree.list("").unwrap().collect::<Vec<_>>(), vec!["sub", "a.txt"]);
        assert_eq!(
            tree.list_all().collect::<Vec<_>>(),
            vec!["sub", "sub/b.txt", "sub/deeper", "a.txt"]
        );
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut tree = PathTree::new();
        tree.set("counter", 1).unwrap();
        *tree.get_mut("counter").unwrap() += 1;
        assert_eq!(tree.get("counter"), Ok(&2));
    }

    #[test]
    fn root_can_hold_a_file_when_allowed() {
        let mut tree = PathTree::with_root_as_file();
        assert!(!tree.exists(""));
        let subscription = tree.on_change();

        tree.set("", 5).unwrap();
        assert_eq!(tree.get(""), Ok(&5));
        assert_eq!(tree.list_all().collect::<Vec<_>>(), vec![""]);
        assert!(matches!(tree.set("a", 1), Err(PathTreeError::LeafInTheWay { .. })));

        tree.remove("").unwrap();
        assert!(!tree.exists(""));
        tree.mkdir("").unwrap();
        assert!(tree.is_dir("").unwrap());

        assert_eq!(
            drain(&mut tree, subscription),
            vec![
                ChangeEvent::add(""),
                ChangeEvent::unlink(""),
                ChangeEvent::add_dir("")
            ]
        );
    }

    #[test]
    fn directory_root_rejects_files_and_empties_on_remove() {
        let mut tree = PathTree::new();
        assert_eq!(tree.set("", 1), Err(PathTreeError::RootNotAllowed));
        assert!(matches!(tree.mkdir(""), Err(PathTreeError::AlreadyExists { .. })));

        tree.set("a", 1).unwrap();
        tree.remove("").unwrap();
        assert!(tree.exists(""));
        assert_eq!(tree.list_all().count(), 0);
    }

    #[test]
    fn unsubscribed_listeners_receive_nothing_more() {
        let mut tree = PathTree::new();
        let first = tree.on_change();
        let second = tree.on_change();

        tree.set("a", 1).unwrap();
        assert!(tree.unsubscribe(first.id()));
        assert!(!tree.unsubscribe(first.id()));
        tree.set("b", 2).unwrap();

        assert_eq!(block_on(first.collect::<Vec<_>>()), vec![ChangeEvent::add("a")]);
        assert_eq!(
            drain(&mut tree, second),
            vec![ChangeEvent::add("a"), ChangeEvent::add("b")]
        );
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let mut tree = PathTree::new();
        let subscription = tree.on_change();
        let id = subscription.id();
        drop(subscription);

        tree.set("a", 1).unwrap();
        assert!(!tree.unsubscribe(id));
    }
}
