use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::INVALID_PAGE_ID;
use crate::storage::page::WritePageGuard;
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{read_root_page_id, write_root_page_id};
use super::base::BPlusTree;

impl<K, V> BPlusTree<K, V>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Insert a key/value pair. Keys are unique: inserting an existing key
    /// leaves the tree unchanged and returns `Ok(false)`.
    pub fn insert(&self, key: K, value: V) -> Result<bool, BTreeError> {
        let mut header_guard = self.buffer_pool.fetch_page_write(self.header_page_id)?;

        // An empty tree grows a single-leaf root first.
        let mut root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            let (leaf_id, mut leaf_guard) = self.buffer_pool.new_page_write()?;
            self.store_node(&mut leaf_guard, &BTreeNode::<K, V>::new_leaf())?;
            write_root_page_id(header_guard.data_mut(), leaf_id);
            root_id = leaf_id;
        }
        let mut header = Some(header_guard);

        // Descend with exclusive latches, remembering (guard, node, slot)
        // for every ancestor that might still be touched by a split.
        let mut stack: Vec<(WritePageGuard, BTreeNode<K, V>, usize)> = Vec::new();
        let mut guard = self.buffer_pool.fetch_page_write(root_id)?;
        let mut node = self.node_of_write(&guard)?;

        while !node.is_leaf {
            let i = match node.first_at_least(&key) {
                Some(i) => i,
                None => {
                    // The new key exceeds this subtree's maximum: lift the
                    // rightmost slot key so the upper-bound invariant holds.
                    let last = node.keys.len() - 1;
                    node.keys[last] = key.clone();
                    self.store_node(&mut guard, &node)?;
                    last
                }
            };

            let child_guard = self.buffer_pool.fetch_page_write(node.children[i])?;
            let child_node = self.node_of_write(&child_guard)?;

            // A child with spare room absorbs any split below it, so every
            // latch above this node can be released.
            if child_node.size() < self.max_size_of(&child_node) {
                stack.clear();
                header = None;
            }

            stack.push((guard, node, i));
            guard = child_guard;
            node = child_node;
        }

        let pos = node.keys.partition_point(|k| k < &key);
        if pos < node.keys.len() && node.keys[pos] == key {
            return Ok(false);
        }
        node.keys.insert(pos, key);
        node.values.insert(pos, value);

        if node.size() <= self.leaf_max_size {
            self.store_node(&mut guard, &node)?;
            return Ok(true);
        }

        // Leaf overflow: give the upper half to a fresh right sibling and
        // push the two-key update up the retained ancestor stack.
        let split_at = node.size().div_ceil(2);
        let (new_leaf_id, mut new_leaf_guard) = self.buffer_pool.new_page_write()?;
        let mut right = BTreeNode::<K, V>::new_leaf();
        right.keys = node.keys.split_off(split_at);
        right.values = node.values.split_off(split_at);
        right.next_leaf = node.next_leaf;
        node.next_leaf = new_leaf_id;

        self.store_node(&mut guard, &node)?;
        self.store_node(&mut new_leaf_guard, &right)?;

        let mut left_id = guard.page_id();
        let mut left_max = last_key(&node)?;
        let mut right_id = new_leaf_id;
        let mut right_max = last_key(&right)?;
        drop(new_leaf_guard);
        drop(guard);

        while let Some((mut parent_guard, mut parent, i)) = stack.pop() {
            // Slot i carried the pre-split maximum, which now belongs to
            // the right half; repoint it and add a slot for the left half.
            parent.children[i] = right_id;
            parent.keys.insert(i, left_max.clone());
            parent.children.insert(i, left_id);

            if parent.size() <= self.internal_max_size {
                self.store_node(&mut parent_guard, &parent)?;
                return Ok(true);
            }

            let split_at = parent.size().div_ceil(2);
            let (new_id, mut new_guard) = self.buffer_pool.new_page_write()?;
            let mut right_node = BTreeNode::<K, V>::new_internal();
            right_node.keys = parent.keys.split_off(split_at);
            right_node.children = parent.children.split_off(split_at);

            self.store_node(&mut parent_guard, &parent)?;
            self.store_node(&mut new_guard, &right_node)?;

            left_id = parent_guard.page_id();
            left_max = last_key(&parent)?;
            right_id = new_id;
            right_max = last_key(&right_node)?;
            drop(new_guard);
            drop(parent_guard);
        }

        // The split reached the top: grow a new root with two children.
        let (new_root_id, mut root_guard) = self.buffer_pool.new_page_write()?;
        let mut new_root = BTreeNode::<K, V>::new_internal();
        new_root.keys = vec![left_max, right_max];
        new_root.children = vec![left_id, right_id];
        self.store_node(&mut root_guard, &new_root)?;

        let mut h = header.expect("header latch retained while a root split was possible");
        write_root_page_id(h.data_mut(), new_root_id);
        Ok(true)
    }
}

fn last_key<K: Clone + Ord, V>(node: &BTreeNode<K, V>) -> Result<K, BTreeError> {
    node.max_key()
        .cloned()
        .ok_or_else(|| BTreeError::SerializationError("split produced an empty node".into()))
}
