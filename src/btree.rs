//! In-memory secondary index: a classical B-tree keyed on [`crate::value::Value`].
//!
//! This is the index structure the append-only row engine builds over a
//! container's chosen key field. It is rebuilt in memory from the META
//! block's offset list on open — the tree itself is never persisted,
//! only the `(key, offset)` pairs it is built from.
//!
//! Keys that do not compare against the tree's existing keys (mixed
//! `Value` variants, e.g. a `Str` key arriving in a tree of `Int` keys)
//! are dropped silently rather than rejected, matching the lenient
//! indexing behavior described for the row tier.

use crate::value::Value;

/// Minimum degree. Each non-root node holds between `t - 1` and
/// `2t - 1` keys.
const DEFAULT_T: usize = 2;

struct Node {
    keys: Vec<(Value, u64)>,
    children: Vec<Node>,
    leaf: bool,
}

impl Node {
    fn new_leaf() -> Self {
        Node {
            keys: Vec::new(),
            children: Vec::new(),
            leaf: true,
        }
    }
}

/// A B-tree mapping index keys to file offsets.
pub struct BTreeIndex {
    t: usize,
    root: Node,
    len: usize,
}

impl BTreeIndex {
    pub fn new() -> Self {
        BTreeIndex::with_order(DEFAULT_T)
    }

    /// Build a tree with an explicit minimum degree, mainly so tests can
    /// exercise splitting with a small `t`.
    pub fn with_order(t: usize) -> Self {
        assert!(t >= 2, "minimum degree must be at least 2");
        BTreeIndex {
            t,
            root: Node::new_leaf(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `key -> offset`. Keys that cannot be compared against an
    /// existing key in the tree are dropped silently.
    pub fn insert(&mut self, key: Value, offset: u64) {
        if self.root.keys.len() == 2 * self.t - 1 {
            let mut new_root = Node::new_leaf();
            new_root.leaf = false;
            let old_root = std::mem::replace(&mut self.root, Node::new_leaf());
            new_root.children.push(old_root);
            self.split_child(&mut new_root, 0);
            self.root = new_root;
        }
        if self.insert_non_full(key, offset) {
            self.len += 1;
        }
    }

    fn split_child(&self, parent: &mut Node, index: usize) {
        let t = self.t;
        let mut child = parent.children.remove(index);
        let mut sibling = Node::new_leaf();
        sibling.leaf = child.leaf;

        sibling.keys = child.keys.split_off(t);
        let mid = child.keys.pop().unwrap();

        if !child.leaf {
            sibling.children = child.children.split_off(t);
        }

        parent.children.insert(index, child);
        parent.children.insert(index + 1, sibling);
        parent.keys.insert(index, mid);
    }

    /// Returns `true` if the key was comparable and inserted.
    fn insert_non_full(&mut self, key: Value, offset: u64) -> bool {
        Self::insert_into(&mut self.root, self.t, key, offset)
    }

    fn insert_into(node: &mut Node, t: usize, key: Value, offset: u64) -> bool {
        let mut idx = 0;
        while idx < node.keys.len() {
            match key.partial_compare(&node.keys[idx].0) {
                Some(std::cmp::Ordering::Greater) => idx += 1,
                Some(std::cmp::Ordering::Equal) => {
                    node.keys[idx] = (key, offset);
                    return true;
                }
                Some(std::cmp::Ordering::Less) => break,
                None => return false,
            }
        }

        if node.leaf {
            node.keys.insert(idx, (key, offset));
            return true;
        }

        if node.children[idx].keys.len() == 2 * t - 1 {
            Self::split_child_static(node, t, idx);
            match key.partial_compare(&node.keys[idx].0) {
                Some(std::cmp::Ordering::Greater) => idx += 1,
                Some(std::cmp::Ordering::Equal) => {
                    node.keys[idx] = (key, offset);
                    return true;
                }
                None => return false,
                _ => {}
            }
        }
        Self::insert_into(&mut node.children[idx], t, key, offset)
    }

    fn split_child_static(parent: &mut Node, t: usize, index: usize) {
        let mut child = parent.children.remove(index);
        let mut sibling = Node::new_leaf();
        sibling.leaf = child.leaf;

        sibling.keys = child.keys.split_off(t);
        let mid = child.keys.pop().unwrap();

        if !child.leaf {
            sibling.children = child.children.split_off(t);
        }

        parent.children.insert(index, child);
        parent.children.insert(index + 1, sibling);
        parent.keys.insert(index, mid);
    }

    /// Exact-match lookup.
    pub fn search(&self, key: &Value) -> Option<u64> {
        Self::search_node(&self.root, key)
    }

    fn search_node(node: &Node, key: &Value) -> Option<u64> {
        let mut idx = 0;
        while idx < node.keys.len() {
            match key.partial_compare(&node.keys[idx].0) {
                Some(std::cmp::Ordering::Equal) => return Some(node.keys[idx].1),
                Some(std::cmp::Ordering::Greater) => idx += 1,
                Some(std::cmp::Ordering::Less) => break,
                None => return None,
            }
        }
        if node.leaf {
            None
        } else {
            Self::search_node(&node.children[idx], key)
        }
    }

    /// Inclusive range search, visiting keys in ascending order.
    pub fn range_search(&self, lo: Option<&Value>, hi: Option<&Value>) -> Vec<(Value, u64)> {
        let mut out = Vec::new();
        Self::range_node(&self.root, lo, hi, &mut out);
        out
    }

    fn range_node(node: &Node, lo: Option<&Value>, hi: Option<&Value>, out: &mut Vec<(Value, u64)>) {
        for i in 0..node.keys.len() {
            if !node.leaf {
                Self::range_node(&node.children[i], lo, hi, out);
            }
            let (k, offset) = &node.keys[i];
            let above_lo = lo
                .map(|lo| matches!(k.partial_compare(lo), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)))
                .unwrap_or(true);
            let below_hi = hi
                .map(|hi| matches!(k.partial_compare(hi), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)))
                .unwrap_or(true);
            if above_lo && below_hi {
                out.push((k.clone(), *offset));
            }
        }
        if !node.leaf {
            Self::range_node(node.children.last().unwrap(), lo, hi, out);
        }
    }

    /// Simplified delete: removes a key if found in a leaf, or if found
    /// in an internal node replaces it with its in-order predecessor.
    /// Deliberately does not rebalance underflowed nodes — acceptable
    /// for an in-memory index rebuilt from scratch on every open.
    pub fn delete(&mut self, key: &Value) -> bool {
        let removed = Self::delete_node(&mut self.root, key);
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn delete_node(node: &mut Node, key: &Value) -> bool {
        let mut idx = 0;
        while idx < node.keys.len() {
            match key.partial_compare(&node.keys[idx].0) {
                Some(std::cmp::Ordering::Equal) => {
                    if node.leaf {
                        node.keys.remove(idx);
                    } else {
                        let predecessor = Self::max_key(&node.children[idx]);
                        node.keys[idx] = predecessor.clone();
                        Self::delete_node(&mut node.children[idx], &predecessor.0);
                    }
                    return true;
                }
                Some(std::cmp::Ordering::Greater) => idx += 1,
                Some(std::cmp::Ordering::Less) => break,
                None => return false,
            }
        }
        if node.leaf {
            false
        } else {
            Self::delete_node(&mut node.children[idx], key)
        }
    }

    fn max_key(node: &Node) -> (Value, u64) {
        if node.leaf {
            node.keys.last().unwrap().clone()
        } else {
            Self::max_key(node.children.last().unwrap())
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        BTreeIndex::new()
    }
}
