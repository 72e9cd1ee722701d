//! Ordered map implementation based on a 2-3 tree.
//!
//! This module provides [`TwoThreeMap`], a mutable ordered map backed by a
//! multiway search tree whose nodes hold one or two entries.
//!
//! # Overview
//!
//! A 2-3 tree is a search tree that is always balanced by construction:
//! instead of rotating, it grows by splitting overfull nodes on the way up
//! from an insertion and shrinks by merging underfull nodes on the way up
//! from a removal, so every leaf sits at exactly the same depth.
//!
//! - O(log n) get / insert / remove / min / max
//! - O(1) len and `is_empty`
//! - Iteration in strictly ascending key order
//!
//! # Internal Structure
//!
//! The tree maintains the following invariants:
//!
//! 1. Every node holds one or two entries; with two entries the first key
//!    is strictly smaller than the second.
//! 2. A node with one entry has no children or exactly two (left, middle);
//!    a node with two entries has no children or exactly three (left,
//!    middle, right).
//! 3. Keys in the left subtree are smaller than the first key; keys in the
//!    middle subtree lie between the first and second keys (or above the
//!    first, when there is no second); keys in the right subtree are
//!    greater than the second key.
//! 4. Every leaf is at the same depth from the root.
//!
//! # Examples
//!
//! ```rust
//! use arbors::map::TwoThreeMap;
//!
//! let mut map = TwoThreeMap::new();
//! for key in [60, 51, 7, 39, 46, 72, 83, 91, 100, 73] {
//!     map.insert(key, key * 2);
//! }
//!
//! assert_eq!(map.len(), 10);
//! assert_eq!(map.get(&83), Ok(&166));
//!
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&7, &39, &46, &51, &60, &72, &73, &83, &91, &100]);
//! ```

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::mem;

use super::{MapError, OrderedMap};

// =============================================================================
// Node Definition
// =============================================================================

/// Owning link to a subtree; `None` marks an empty subtree.
type Link<K, V> = Option<Box<Node<K, V>>>;

/// An owned key-value pair.
#[derive(Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
}

impl<K, V> Entry<K, V> {
    const fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// Internal node structure for the 2-3 tree.
///
/// Holds one entry (`second` is `None`, children are `left` and `middle`)
/// or two entries (children are `left`, `middle`, and `right`). Leaves
/// carry no children at all.
#[derive(Clone)]
struct Node<K, V> {
    first: Entry<K, V>,
    second: Option<Entry<K, V>>,
    left: Link<K, V>,
    middle: Link<K, V>,
    right: Link<K, V>,
}

/// The child slot a search descends into.
#[derive(Clone, Copy)]
enum Branch {
    Left,
    Middle,
    Right,
}

/// Where a key lives relative to one node.
#[derive(Clone, Copy)]
enum Location {
    /// The key occupies the node's first entry slot.
    First,
    /// The key occupies the node's second entry slot.
    Second,
    /// The key can only be in the given child subtree.
    Child(Branch),
}

/// Outcome of a node split: the middle entry promoted to the parent and the
/// new sibling that goes immediately to the promoted entry's right.
struct Split<K, V> {
    promoted: Entry<K, V>,
    sibling: Box<Node<K, V>>,
}

impl<K, V> Node<K, V> {
    /// Creates a single-entry node with the given left and middle children.
    const fn new(first: Entry<K, V>, left: Link<K, V>, middle: Link<K, V>) -> Self {
        Self {
            first,
            second: None,
            left,
            middle,
            right: None,
        }
    }

    /// Determines whether this is a leaf node.
    const fn is_leaf(&self) -> bool {
        self.left.is_none()
    }

    /// Determines whether the node holds two entries.
    const fn is_full(&self) -> bool {
        self.second.is_some()
    }

    /// Locates `key` relative to this node's entries.
    fn locate<Q>(&self, key: &Q) -> Location
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match key.cmp(self.first.key.borrow()) {
            Ordering::Equal => Location::First,
            Ordering::Less => Location::Child(Branch::Left),
            Ordering::Greater => self.second.as_ref().map_or(
                Location::Child(Branch::Middle),
                |second| match key.cmp(second.key.borrow()) {
                    Ordering::Equal => Location::Second,
                    Ordering::Less => Location::Child(Branch::Middle),
                    Ordering::Greater => Location::Child(Branch::Right),
                },
            ),
        }
    }

    /// Borrows the child in the given slot.
    fn child(&self, branch: Branch) -> Option<&Self> {
        match branch {
            Branch::Left => self.left.as_deref(),
            Branch::Middle => self.middle.as_deref(),
            Branch::Right => self.right.as_deref(),
        }
    }

    /// Mutably borrows the child in the given slot.
    fn child_mut(&mut self, branch: Branch) -> Option<&mut Self> {
        match branch {
            Branch::Left => self.left.as_deref_mut(),
            Branch::Middle => self.middle.as_deref_mut(),
            Branch::Right => self.right.as_deref_mut(),
        }
    }

    /// Takes the child out of the given slot.
    fn take_child(&mut self, branch: Branch) -> Link<K, V> {
        match branch {
            Branch::Left => self.left.take(),
            Branch::Middle => self.middle.take(),
            Branch::Right => self.right.take(),
        }
    }

    /// Puts a child back into the given slot.
    fn put_child(&mut self, branch: Branch, child: Box<Self>) {
        match branch {
            Branch::Left => self.left = Some(child),
            Branch::Middle => self.middle = Some(child),
            Branch::Right => self.right = Some(child),
        }
    }
}

// =============================================================================
// TwoThreeMap Definition
// =============================================================================

/// A mutable ordered map based on a 2-3 tree.
///
/// Keys must implement `Ord`. Nodes hold one or two entries each; insertion
/// splits overfull nodes upward and removal merges underfull nodes upward,
/// so every leaf stays at the same depth and all operations run in
/// O(log n).
///
/// # Time Complexity
///
/// | Operation  | Complexity |
/// |------------|------------|
/// | `new`      | O(1)       |
/// | `get`      | O(log n)   |
/// | `insert`   | O(log n)   |
/// | `remove`   | O(log n)   |
/// | `contains` | O(log n)   |
/// | `min`/`max`| O(log n)   |
/// | `len`      | O(1)       |
/// | `is_empty` | O(1)       |
///
/// # Examples
///
/// ```rust
/// use arbors::map::TwoThreeMap;
///
/// let mut map = TwoThreeMap::new();
/// assert!(map.insert(1, "one"));
/// assert!(!map.insert(1, "ONE")); // replace, shape unchanged
/// assert_eq!(map.get(&1), Ok(&"ONE"));
/// assert_eq!(map.remove(&1), Ok("ONE"));
/// assert!(map.is_empty());
/// ```
#[derive(Clone)]
pub struct TwoThreeMap<K, V> {
    /// Root node of the tree
    root: Link<K, V>,
    /// Number of entries
    length: usize,
}

impl<K, V> TwoThreeMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let map: TwoThreeMap<i32, String> = TwoThreeMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            length: 0,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Removes all entries from the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(1, "one");
    /// map.clear();
    /// assert!(map.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.root = None;
        self.length = 0;
    }
}

impl<K: Ord, V> TwoThreeMap<K, V> {
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert("key".to_string(), 42);
    /// assert!(map.contains("key"));
    /// assert!(!map.contains("other"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::search_node(self.root.as_deref(), key).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but the
    /// ordering on the borrowed form must match the ordering on the key
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::{MapError, TwoThreeMap};
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Ok(&42));
    /// assert_eq!(map.get("world"), Err(MapError::KeyNotFound));
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Result<&V, MapError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::search_node(self.root.as_deref(), key)
            .map(|entry| &entry.value)
            .ok_or(MapError::KeyNotFound)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(1, 10);
    /// if let Ok(value) = map.get_mut(&1) {
    ///     *value += 1;
    /// }
    /// assert_eq!(map.get(&1), Ok(&11));
    /// ```
    pub fn get_mut<Q>(&mut self, key: &Q) -> Result<&mut V, MapError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::search_node_mut(self.root.as_deref_mut(), key)
            .map(|entry| &mut entry.value)
            .ok_or(MapError::KeyNotFound)
    }

    /// Recursive helper for lookups.
    fn search_node<'a, Q>(node: Option<&'a Node<K, V>>, key: &Q) -> Option<&'a Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node_ref = node?;
        match node_ref.locate(key) {
            Location::First => Some(&node_ref.first),
            Location::Second => node_ref.second.as_ref(),
            Location::Child(branch) => Self::search_node(node_ref.child(branch), key),
        }
    }

    /// Recursive helper for mutable lookups.
    fn search_node_mut<'a, Q>(
        node: Option<&'a mut Node<K, V>>,
        key: &Q,
    ) -> Option<&'a mut Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node_ref = node?;
        match node_ref.locate(key) {
            Location::First => Some(&mut node_ref.first),
            Location::Second => node_ref.second.as_mut(),
            Location::Child(branch) => Self::search_node_mut(node_ref.child_mut(branch), key),
        }
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns `true` when a new entry was added, or `false` when the value
    /// of an existing key was replaced. Replacing a value leaves the tree
    /// shape untouched, so no node splits take place on that path.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// assert!(map.insert(1, "one"));
    /// assert!(!map.insert(1, "ONE"));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.root.take() {
            None => {
                self.root = Some(Box::new(Node::new(Entry::new(key, value), None, None)));
                self.length += 1;
                true
            }
            Some(root) => {
                let (root, split, added) = Self::insert_into_node(root, key, value);
                // A split that reaches this point means the root itself
                // overflowed: the promoted entry becomes the new root.
                self.root = Some(match split {
                    Some(split) => Box::new(Node::new(
                        split.promoted,
                        Some(root),
                        Some(split.sibling),
                    )),
                    None => root,
                });
                if added {
                    self.length += 1;
                }
                added
            }
        }
    }

    /// Recursive helper for insert.
    ///
    /// Returns the subtree root, the split promoted out of it when the node
    /// overflowed, and whether a new entry was added (`false` when an
    /// existing value was replaced).
    fn insert_into_node(
        mut node: Box<Node<K, V>>,
        key: K,
        value: V,
    ) -> (Box<Node<K, V>>, Option<Split<K, V>>, bool) {
        match node.locate(&key) {
            Location::First => {
                node.first.value = value;
                (node, None, false)
            }
            Location::Second => {
                if let Some(second) = node.second.as_mut() {
                    second.value = value;
                }
                (node, None, false)
            }
            Location::Child(branch) => {
                let Some(child) = node.take_child(branch) else {
                    // Reached the leaf the key sorts into.
                    let (node, split) = Self::add_to_node(node, Entry::new(key, value), None);
                    return (node, split, true);
                };
                let (child, child_split, added) = Self::insert_into_node(child, key, value);
                node.put_child(branch, child);
                match child_split {
                    Some(split) => {
                        let (node, split) =
                            Self::add_to_node(node, split.promoted, Some(split.sibling));
                        (node, split, added)
                    }
                    None => (node, None, added),
                }
            }
        }
    }

    /// Adds an entry to a node, together with the subtree that goes
    /// immediately to the entry's right (present when the entry was
    /// promoted out of a child split, absent on leaf additions). Splits the
    /// node when it is already full.
    fn add_to_node(
        mut node: Box<Node<K, V>>,
        entry: Entry<K, V>,
        child: Link<K, V>,
    ) -> (Box<Node<K, V>>, Option<Split<K, V>>) {
        let Some(second) = node.second.take() else {
            // One entry in residence: slot the new one on the correct side.
            if entry.key < node.first.key {
                let first = mem::replace(&mut node.first, entry);
                node.second = Some(first);
                node.right = node.middle.take();
                node.middle = child;
            } else {
                node.second = Some(entry);
                node.right = child;
            }
            return (node, None);
        };
        // Already full: spread the three entries and four subtrees over two
        // single-entry nodes and promote the middle entry.
        if entry.key < node.first.key {
            let promoted = mem::replace(&mut node.first, entry);
            let sibling = Box::new(Node::new(second, node.middle.take(), node.right.take()));
            node.middle = child;
            (node, Some(Split { promoted, sibling }))
        } else if entry.key < second.key {
            let sibling = Box::new(Node::new(second, child, node.right.take()));
            (
                node,
                Some(Split {
                    promoted: entry,
                    sibling,
                }),
            )
        } else {
            let sibling = Box::new(Node::new(entry, node.right.take(), child));
            (
                node,
                Some(Split {
                    promoted: second,
                    sibling,
                }),
            )
        }
    }

    /// Removes a key from the map, returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent, in which case
    /// the map is left untouched.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::{MapError, TwoThreeMap};
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(1, "one");
    /// assert_eq!(map.remove(&1), Ok("one"));
    /// assert_eq!(map.remove(&1), Err(MapError::KeyNotFound));
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Result<V, MapError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(root) = self.root.take() else {
            return Err(MapError::KeyNotFound);
        };
        // A root that lost a level is simply replaced by its remainder.
        let (new_root, _, removed) = Self::remove_from_node(root, key);
        self.root = new_root;
        match removed {
            Some(value) => {
                self.length -= 1;
                Ok(value)
            }
            None => Err(MapError::KeyNotFound),
        }
    }

    /// Recursive helper for remove.
    ///
    /// Returns the remaining subtree, whether it lost a level of height,
    /// and the removed value. When the subtree lost a level, the returned
    /// link holds what is left of it (`None` only for an emptied leaf).
    fn remove_from_node<Q>(mut node: Box<Node<K, V>>, key: &Q) -> (Link<K, V>, bool, Option<V>)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match node.locate(key) {
            Location::First => {
                if node.is_leaf() {
                    match node.second.take() {
                        Some(second) => {
                            let old = mem::replace(&mut node.first, second);
                            (Some(node), false, Some(old.value))
                        }
                        None => {
                            let Node { first, .. } = *node;
                            (None, true, Some(first.value))
                        }
                    }
                } else {
                    // Swap with the in-order successor, the smallest entry
                    // of the middle subtree, then repair that subtree.
                    let Some(middle) = node.middle.take() else {
                        return (Some(node), false, None);
                    };
                    let (remainder, short, successor) = Self::detach_min(middle);
                    let old = mem::replace(&mut node.first, successor);
                    if short {
                        let (link, short) = Self::fix_middle(node, remainder);
                        (link, short, Some(old.value))
                    } else {
                        node.middle = remainder;
                        (Some(node), false, Some(old.value))
                    }
                }
            }
            Location::Second => {
                if node.is_leaf() {
                    let removed = node.second.take();
                    (Some(node), false, removed.map(|entry| entry.value))
                } else {
                    // Swap with the in-order successor, the smallest entry
                    // of the right subtree, then repair that subtree.
                    let Some(right) = node.right.take() else {
                        return (Some(node), false, None);
                    };
                    let (remainder, short, successor) = Self::detach_min(right);
                    let old = node.second.replace(successor);
                    if short {
                        let (link, short) = Self::fix_right(node, remainder);
                        (link, short, old.map(|entry| entry.value))
                    } else {
                        node.right = remainder;
                        (Some(node), false, old.map(|entry| entry.value))
                    }
                }
            }
            Location::Child(branch) => {
                let Some(child) = node.take_child(branch) else {
                    // Reached a leaf without finding the key.
                    return (Some(node), false, None);
                };
                let (remainder, short, removed) = Self::remove_from_node(child, key);
                if short {
                    let (link, short) = match branch {
                        Branch::Left => Self::fix_left(node, remainder),
                        Branch::Middle => Self::fix_middle(node, remainder),
                        Branch::Right => Self::fix_right(node, remainder),
                    };
                    (link, short, removed)
                } else {
                    if let Some(child) = remainder {
                        node.put_child(branch, child);
                    }
                    (Some(node), false, removed)
                }
            }
        }
    }

    /// Removes the entry with the smallest key from the subtree.
    ///
    /// Returns the remaining subtree, whether it lost a level, and the
    /// detached entry.
    fn detach_min(mut node: Box<Node<K, V>>) -> (Link<K, V>, bool, Entry<K, V>) {
        match node.left.take() {
            None => {
                // A leaf: the smallest entry occupies the first slot.
                match node.second.take() {
                    Some(second) => {
                        let first = mem::replace(&mut node.first, second);
                        (Some(node), false, first)
                    }
                    None => {
                        let Node { first, .. } = *node;
                        (None, true, first)
                    }
                }
            }
            Some(left) => {
                let (remainder, short, min) = Self::detach_min(left);
                if short {
                    let (link, short) = Self::fix_left(node, remainder);
                    (link, short, min)
                } else {
                    node.left = remainder;
                    (Some(node), false, min)
                }
            }
        }
    }

    // =========================================================================
    // Underflow Repair
    // =========================================================================

    /// Repairs the tree after the left child lost a level; `remainder`
    /// holds what is left of it.
    ///
    /// Borrows through the parent separator when the middle sibling has an
    /// entry to spare, otherwise merges the remainder, the separator, and
    /// the sibling into one node. Returns the subtree and whether it lost a
    /// level itself.
    fn fix_left(mut node: Box<Node<K, V>>, remainder: Link<K, V>) -> (Link<K, V>, bool) {
        let Some(mut sibling) = node.middle.take() else {
            return (Some(node), false);
        };
        match sibling.second.take() {
            Some(second) => {
                // Redistribute: the separator moves down into a fresh left
                // child and the sibling's first entry replaces it.
                let promoted = mem::replace(&mut sibling.first, second);
                let separator = mem::replace(&mut node.first, promoted);
                let left = Box::new(Node::new(separator, remainder, sibling.left.take()));
                sibling.left = sibling.middle.take();
                sibling.middle = sibling.right.take();
                node.left = Some(left);
                node.middle = Some(sibling);
                (Some(node), false)
            }
            None => {
                // Merge the remainder, the separator, and the sibling.
                let Node {
                    first: separator,
                    second: parent_second,
                    right: parent_right,
                    ..
                } = *node;
                let merged = Box::new(Node {
                    first: separator,
                    second: Some(sibling.first),
                    left: remainder,
                    middle: sibling.left,
                    right: sibling.middle,
                });
                match parent_second {
                    Some(entry) => (
                        Some(Box::new(Node::new(entry, Some(merged), parent_right))),
                        false,
                    ),
                    None => (Some(merged), true),
                }
            }
        }
    }

    /// Repairs the tree after the middle child lost a level; `remainder`
    /// holds what is left of it.
    ///
    /// Borrows from the left sibling first, then from the right sibling,
    /// and merges into the left sibling when neither has an entry to spare.
    /// Returns the subtree and whether it lost a level itself.
    fn fix_middle(mut node: Box<Node<K, V>>, remainder: Link<K, V>) -> (Link<K, V>, bool) {
        let Some(mut left_sibling) = node.left.take() else {
            return (Some(node), false);
        };
        // Redistribute from the left sibling when it has an entry to spare.
        if let Some(second) = left_sibling.second.take() {
            let separator = mem::replace(&mut node.first, second);
            let middle = Box::new(Node::new(separator, left_sibling.right.take(), remainder));
            node.left = Some(left_sibling);
            node.middle = Some(middle);
            return (Some(node), false);
        }
        // Otherwise from the right sibling, which exists only in a full
        // parent.
        if node.right.as_deref().is_some_and(Node::is_full)
            && let Some(mut right_sibling) = node.right.take()
            && let Some(second) = right_sibling.second.take()
            && let Some(separator) = node.second.take()
        {
            let promoted = mem::replace(&mut right_sibling.first, second);
            node.second = Some(promoted);
            let middle = Box::new(Node::new(separator, remainder, right_sibling.left.take()));
            right_sibling.left = right_sibling.middle.take();
            right_sibling.middle = right_sibling.right.take();
            node.left = Some(left_sibling);
            node.middle = Some(middle);
            node.right = Some(right_sibling);
            return (Some(node), false);
        }
        // Merge leftward: pull the separator down between the left sibling
        // and the remainder.
        let Node {
            first: separator,
            second: parent_second,
            right: parent_right,
            ..
        } = *node;
        let Node {
            first: sibling_first,
            left: sibling_left,
            middle: sibling_middle,
            ..
        } = *left_sibling;
        let merged = Box::new(Node {
            first: sibling_first,
            second: Some(separator),
            left: sibling_left,
            middle: sibling_middle,
            right: remainder,
        });
        match parent_second {
            Some(entry) => (
                Some(Box::new(Node::new(entry, Some(merged), parent_right))),
                false,
            ),
            None => (Some(merged), true),
        }
    }

    /// Repairs the tree after the right child lost a level; `remainder`
    /// holds what is left of it.
    ///
    /// The parent of a right child is always full, so the repair either
    /// borrows from the middle sibling or merges into it; the parent keeps
    /// at least one entry and never loses a level.
    fn fix_right(mut node: Box<Node<K, V>>, remainder: Link<K, V>) -> (Link<K, V>, bool) {
        let Some(mut sibling) = node.middle.take() else {
            return (Some(node), false);
        };
        let Some(separator) = node.second.take() else {
            node.middle = Some(sibling);
            return (Some(node), false);
        };
        match sibling.second.take() {
            Some(second) => {
                // Redistribute: the separator moves down into a fresh right
                // child and the sibling's second entry replaces it.
                let right = Box::new(Node::new(separator, sibling.right.take(), remainder));
                node.second = Some(second);
                node.middle = Some(sibling);
                node.right = Some(right);
                (Some(node), false)
            }
            None => {
                // Merge the sibling, the separator, and the remainder.
                let Node {
                    first: sibling_first,
                    left: sibling_left,
                    middle: sibling_middle,
                    ..
                } = *sibling;
                let merged = Box::new(Node {
                    first: sibling_first,
                    second: Some(separator),
                    left: sibling_left,
                    middle: sibling_middle,
                    right: remainder,
                });
                node.middle = Some(merged);
                (Some(node), false)
            }
        }
    }

    // =========================================================================
    // Ordered Access
    // =========================================================================

    /// Returns the entry with the minimum key.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::EmptyMap`] if the map has no entries.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::{MapError, TwoThreeMap};
    ///
    /// let mut map = TwoThreeMap::new();
    /// assert_eq!(map.min(), Err(MapError::EmptyMap));
    /// map.insert(3, "three");
    /// map.insert(1, "one");
    /// assert_eq!(map.min(), Ok((&1, &"one")));
    /// ```
    pub fn min(&self) -> Result<(&K, &V), MapError> {
        Self::min_from_node(self.root.as_deref()).ok_or(MapError::EmptyMap)
    }

    /// Returns the entry with the maximum key.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::EmptyMap`] if the map has no entries.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(3, "three");
    /// map.insert(1, "one");
    /// assert_eq!(map.max(), Ok((&3, &"three")));
    /// ```
    pub fn max(&self) -> Result<(&K, &V), MapError> {
        Self::max_from_node(self.root.as_deref()).ok_or(MapError::EmptyMap)
    }

    /// Recursive helper for min.
    fn min_from_node(node: Option<&Node<K, V>>) -> Option<(&K, &V)> {
        node.and_then(|node_ref| {
            node_ref.left.as_deref().map_or_else(
                || Some((&node_ref.first.key, &node_ref.first.value)),
                |left| Self::min_from_node(Some(left)),
            )
        })
    }

    /// Recursive helper for max.
    fn max_from_node(node: Option<&Node<K, V>>) -> Option<(&K, &V)> {
        node.and_then(|node_ref| {
            let rightmost = if node_ref.is_full() {
                node_ref.right.as_deref()
            } else {
                node_ref.middle.as_deref()
            };
            match rightmost {
                Some(child) => Self::max_from_node(Some(child)),
                None => {
                    let entry = node_ref.second.as_ref().map_or(&node_ref.first, |second| second);
                    Some((&entry.key, &entry.value))
                }
            }
        })
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Returns an iterator over entries in strictly ascending key order.
    ///
    /// The entry sequence is snapshotted when the iterator is created.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(3, "three");
    /// map.insert(1, "one");
    /// map.insert(2, "two");
    ///
    /// let entries: Vec<(&i32, &&str)> = map.iter().collect();
    /// assert_eq!(entries, vec![(&1, &"one"), (&2, &"two"), (&3, &"three")]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> TwoThreeMapIterator<'_, K, V> {
        let mut entries = Vec::with_capacity(self.length);
        Self::collect_entries_in_order(self.root.as_deref(), &mut entries);
        TwoThreeMapIterator {
            entries,
            current_index: 0,
        }
    }

    /// Collects all entries in sorted order (in-order traversal: left
    /// subtree, first entry, middle subtree, then second entry and right
    /// subtree when present).
    fn collect_entries_in_order<'a>(
        node: Option<&'a Node<K, V>>,
        entries: &mut Vec<(&'a K, &'a V)>,
    ) {
        if let Some(node_ref) = node {
            Self::collect_entries_in_order(node_ref.left.as_deref(), entries);
            entries.push((&node_ref.first.key, &node_ref.first.value));
            Self::collect_entries_in_order(node_ref.middle.as_deref(), entries);
            if let Some(second) = node_ref.second.as_ref() {
                entries.push((&second.key, &second.value));
                Self::collect_entries_in_order(node_ref.right.as_deref(), entries);
            }
        }
    }

    /// Returns an iterator over keys in ascending order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(2, "two");
    /// map.insert(1, "one");
    ///
    /// let keys: Vec<&i32> = map.keys().collect();
    /// assert_eq!(keys, vec![&1, &2]);
    /// ```
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arbors::map::TwoThreeMap;
    ///
    /// let mut map = TwoThreeMap::new();
    /// map.insert(1, 10);
    /// map.insert(2, 20);
    ///
    /// let sum: i32 = map.values().sum();
    /// assert_eq!(sum, 30);
    /// ```
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    // =========================================================================
    // Debugging Support
    // =========================================================================

    /// Returns the height of the tree.
    ///
    /// An empty map has height 0; a single-node map has height 1. Computed
    /// by walking the tree, so this is O(n) — intended for diagnostics, not
    /// hot paths.
    #[must_use]
    pub fn height(&self) -> usize {
        Self::node_height(self.root.as_deref())
    }

    fn node_height(node: Option<&Node<K, V>>) -> usize {
        node.map_or(0, |node_ref| {
            let left = Self::node_height(node_ref.left.as_deref());
            let middle = Self::node_height(node_ref.middle.as_deref());
            let right = Self::node_height(node_ref.right.as_deref());
            1 + left.max(middle).max(right)
        })
    }

    /// Asserts that the structural invariants of the tree hold.
    ///
    /// Checks that keys are in strictly ascending order, that every node's
    /// child count matches its entry count, and that every leaf sits at the
    /// same depth from the root.
    ///
    /// Intended for tests and debugging.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    pub fn assert_invariants(&self) {
        let depth = Self::verify_node(self.root.as_deref(), None, None);
        assert!(
            (self.length == 0) == (depth == 0),
            "length and tree emptiness disagree"
        );
        assert_eq!(
            self.iter().count(),
            self.length,
            "length does not match the number of entries"
        );
    }

    /// Recursive invariant check. Returns the uniform depth of the subtree.
    fn verify_node(node: Option<&Node<K, V>>, lower: Option<&K>, upper: Option<&K>) -> usize {
        let Some(node_ref) = node else {
            return 0;
        };
        if let Some(bound) = lower {
            assert!(*bound < node_ref.first.key, "keys out of order");
        }
        if let Some(second) = node_ref.second.as_ref() {
            assert!(node_ref.first.key < second.key, "node entries out of order");
        }
        let last_key = node_ref
            .second
            .as_ref()
            .map_or(&node_ref.first.key, |second| &second.key);
        if let Some(bound) = upper {
            assert!(last_key < bound, "keys out of order");
        }
        match (
            node_ref.left.as_deref(),
            node_ref.middle.as_deref(),
            node_ref.right.as_deref(),
        ) {
            (None, None, None) => 1,
            (Some(left), Some(middle), right) => {
                assert_eq!(
                    right.is_some(),
                    node_ref.is_full(),
                    "child count does not match entry count"
                );
                let left_depth = Self::verify_node(Some(left), lower, Some(&node_ref.first.key));
                let middle_upper = node_ref
                    .second
                    .as_ref()
                    .map_or(upper, |second| Some(&second.key));
                let middle_depth =
                    Self::verify_node(Some(middle), Some(&node_ref.first.key), middle_upper);
                assert_eq!(left_depth, middle_depth, "leaves at unequal depths");
                if let Some(second) = node_ref.second.as_ref() {
                    let right_depth = Self::verify_node(right, Some(&second.key), upper);
                    assert_eq!(left_depth, right_depth, "leaves at unequal depths");
                }
                1 + left_depth
            }
            _ => panic!("child count does not match entry count"),
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over key-value pairs of a [`TwoThreeMap`].
pub struct TwoThreeMapIterator<'a, K, V> {
    entries: Vec<(&'a K, &'a V)>,
    current_index: usize,
}

impl<'a, K, V> Iterator for TwoThreeMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.entries.len() {
            None
        } else {
            let entry = self.entries[self.current_index];
            self.current_index += 1;
            Some(entry)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<K, V> ExactSizeIterator for TwoThreeMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.current_index)
    }
}

/// An owning iterator over key-value pairs of a [`TwoThreeMap`].
pub struct TwoThreeMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for TwoThreeMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for TwoThreeMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for TwoThreeMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for TwoThreeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K: Ord, V> Extend<(K, V)> for TwoThreeMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> IntoIterator for TwoThreeMap<K, V> {
    type Item = (K, V);
    type IntoIter = TwoThreeMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let mut entries = Vec::with_capacity(self.length);
        Self::into_entries(self.root, &mut entries);
        TwoThreeMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<K, V> TwoThreeMap<K, V> {
    /// Moves all entries out of the tree in sorted order.
    fn into_entries(node: Link<K, V>, entries: &mut Vec<(K, V)>) {
        if let Some(node_ref) = node {
            let Node {
                first,
                second,
                left,
                middle,
                right,
            } = *node_ref;
            Self::into_entries(left, entries);
            entries.push((first.key, first.value));
            Self::into_entries(middle, entries);
            if let Some(second) = second {
                entries.push((second.key, second.value));
                Self::into_entries(right, entries);
            }
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a TwoThreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = TwoThreeMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord, V: PartialEq> PartialEq for TwoThreeMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<K: Ord, V: Eq> Eq for TwoThreeMap<K, V> {}

/// Computes a hash value for this map.
///
/// The hash covers the length and then each entry in key order, so equal
/// maps hash equally regardless of insertion order.
impl<K: Ord + Hash, V: Hash> Hash for TwoThreeMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for TwoThreeMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + fmt::Display, V: fmt::Display> fmt::Display for TwoThreeMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// OrderedMap Implementation
// =============================================================================

impl<K: Ord, V> OrderedMap<K, V> for TwoThreeMap<K, V> {
    type Iter<'a>
        = TwoThreeMapIterator<'a, K, V>
    where
        Self: 'a,
        K: 'a,
        V: 'a;

    fn len(&self) -> usize {
        self.length
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::contains(self, key)
    }

    fn get<Q>(&self, key: &Q) -> Result<&V, MapError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) -> bool {
        Self::insert(self, key, value)
    }

    fn remove<Q>(&mut self, key: &Q) -> Result<V, MapError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::remove(self, key)
    }

    fn min(&self) -> Result<(&K, &V), MapError> {
        Self::min(self)
    }

    fn max(&self) -> Result<(&K, &V), MapError> {
        Self::max(self)
    }

    fn iter(&self) -> Self::Iter<'_> {
        Self::iter(self)
    }
}

static_assertions::assert_impl_all!(TwoThreeMap<i32, String>: Send, Sync);

// =============================================================================
// Tests
// =============================================================================
