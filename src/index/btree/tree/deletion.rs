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
    /// Delete `key` and its value. A missing key is a silent no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let header_guard = self.buffer_pool.fetch_page_write(self.header_page_id)?;
        let root_id = read_root_page_id(header_guard.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }
        let mut header = Some(header_guard);

        let mut stack: Vec<(WritePageGuard, BTreeNode<K, V>, usize)> = Vec::new();
        let mut guard = self.buffer_pool.fetch_page_write(root_id)?;
        let mut node = self.node_of_write(&guard)?;

        while !node.is_leaf {
            let i = match node.first_at_least(key) {
                Some(i) => i,
                // Larger than the tree maximum: nothing to delete.
                None => return Ok(()),
            };
            let child_guard = self.buffer_pool.fetch_page_write(node.children[i])?;
            let child_node = self.node_of_write(&child_guard)?;

            // The deletion stays inside the child when the child cannot
            // underflow and this slot's separator is not the key itself;
            // everything latched above this node can be released.
            if child_node.size() > self.min_size_of(&child_node) && node.keys[i] != *key {
                stack.clear();
                header = None;
            }

            stack.push((guard, node, i));
            guard = child_guard;
            node = child_node;
        }

        let pos = match node.leaf_lookup(key) {
            Some(pos) => pos,
            None => return Ok(()),
        };
        node.keys.remove(pos);
        node.values.remove(pos);
        self.store_node(&mut guard, &node)?;

        // Unwind: refresh separators, fix underflows, collapse the root.
        let mut child_guard = guard;
        let mut child_node = node;

        loop {
            let (mut parent_guard, mut parent, i) = match stack.pop() {
                Some(frame) => frame,
                None => {
                    if header.is_some() {
                        self.collapse_root(header, child_guard, child_node)?;
                    }
                    return Ok(());
                }
            };

            // The child's maximum keys this slot; the delete may have
            // lowered it.
            if let Some(max) = child_node.max_key() {
                if parent.keys[i] != *max {
                    parent.keys[i] = max.clone();
                }
            }

            if child_node.size() >= self.min_size_of(&child_node) {
                self.store_node(&mut parent_guard, &parent)?;
                drop(child_guard);
            } else {
                let rebalanced = self.borrow_from_left(&mut parent, i, &mut child_node)?
                    || self.borrow_from_right(&mut parent, i, &mut child_node)?;
                if rebalanced {
                    self.store_node(&mut child_guard, &child_node)?;
                    drop(child_guard);
                } else {
                    self.merge_with_sibling(&mut parent, i, child_guard, child_node)?;
                }
                self.store_node(&mut parent_guard, &parent)?;
            }

            child_guard = parent_guard;
            child_node = parent;
        }
    }

    /// Steal the left sibling's largest entry, if it has one to spare
    fn borrow_from_left(
        &self,
        parent: &mut BTreeNode<K, V>,
        i: usize,
        child: &mut BTreeNode<K, V>,
    ) -> Result<bool, BTreeError> {
        if i == 0 {
            return Ok(false);
        }
        let mut sibling_guard = self.buffer_pool.fetch_page_write(parent.children[i - 1])?;
        let mut sibling = self.node_of_write(&sibling_guard)?;
        if sibling.size() <= self.min_size_of(&sibling) {
            return Ok(false);
        }

        let donated_key = match sibling.keys.pop() {
            Some(k) => k,
            None => return Ok(false),
        };
        if child.is_leaf {
            if let Some(v) = sibling.values.pop() {
                child.keys.insert(0, donated_key);
                child.values.insert(0, v);
            }
        } else if let Some(c) = sibling.children.pop() {
            child.keys.insert(0, donated_key);
            child.children.insert(0, c);
        }

        // The donor's maximum shrank; its separator follows.
        if let Some(max) = sibling.max_key() {
            parent.keys[i - 1] = max.clone();
        }
        self.store_node(&mut sibling_guard, &sibling)?;
        Ok(true)
    }

    /// Steal the right sibling's smallest entry, if it has one to spare
    fn borrow_from_right(
        &self,
        parent: &mut BTreeNode<K, V>,
        i: usize,
        child: &mut BTreeNode<K, V>,
    ) -> Result<bool, BTreeError> {
        if i + 1 >= parent.children.len() {
            return Ok(false);
        }
        let mut sibling_guard = self.buffer_pool.fetch_page_write(parent.children[i + 1])?;
        let mut sibling = self.node_of_write(&sibling_guard)?;
        if sibling.size() <= self.min_size_of(&sibling) {
            return Ok(false);
        }

        let donated_key = sibling.keys.remove(0);
        if child.is_leaf {
            let v = sibling.values.remove(0);
            child.keys.push(donated_key);
            child.values.push(v);
        } else {
            let c = sibling.children.remove(0);
            child.keys.push(donated_key);
            child.children.push(c);
        }

        // The donated key is the child's new maximum; the right sibling's
        // own separator is unchanged.
        if let Some(max) = child.max_key() {
            parent.keys[i] = max.clone();
        }
        self.store_node(&mut sibling_guard, &sibling)?;
        Ok(true)
    }

    /// Coalesce the child with a sibling: into the left one when it exists,
    /// else absorb the right one. The emptied page is deleted.
    fn merge_with_sibling(
        &self,
        parent: &mut BTreeNode<K, V>,
        i: usize,
        child_guard: WritePageGuard,
        mut child_node: BTreeNode<K, V>,
    ) -> Result<(), BTreeError> {
        if i > 0 {
            let mut left_guard = self.buffer_pool.fetch_page_write(parent.children[i - 1])?;
            let mut left = self.node_of_write(&left_guard)?;

            left.keys.append(&mut child_node.keys);
            if child_node.is_leaf {
                left.values.append(&mut child_node.values);
                left.next_leaf = child_node.next_leaf;
            } else {
                left.children.append(&mut child_node.children);
            }
            self.store_node(&mut left_guard, &left)?;

            parent.keys.remove(i - 1);
            parent.children.remove(i);

            let freed = child_guard.page_id();
            drop(child_guard);
            drop(left_guard);
            self.buffer_pool.delete_page(freed)?;
        } else if parent.children.len() > 1 {
            let mut right_guard = self.buffer_pool.fetch_page_write(parent.children[i + 1])?;
            let mut right = self.node_of_write(&right_guard)?;

            child_node.keys.append(&mut right.keys);
            if child_node.is_leaf {
                child_node.values.append(&mut right.values);
                child_node.next_leaf = right.next_leaf;
            } else {
                child_node.children.append(&mut right.children);
            }
            let mut child_guard = child_guard;
            self.store_node(&mut child_guard, &child_node)?;

            parent.keys.remove(i);
            parent.children.remove(i + 1);

            let freed = right_guard.page_id();
            drop(right_guard);
            drop(child_guard);
            self.buffer_pool.delete_page(freed)?;
        }
        Ok(())
    }

    /// Applied when the unwind reaches the true root: an empty leaf root
    /// clears the tree, a single-child internal root promotes its child.
    fn collapse_root(
        &self,
        mut header: Option<WritePageGuard>,
        root_guard: WritePageGuard,
        root_node: BTreeNode<K, V>,
    ) -> Result<(), BTreeError> {
        if root_node.is_leaf {
            if root_node.size() == 0 {
                let freed = root_guard.page_id();
                drop(root_guard);
                self.buffer_pool.delete_page(freed)?;
                if let Some(h) = header.as_mut() {
                    write_root_page_id(h.data_mut(), INVALID_PAGE_ID);
                }
            }
        } else if root_node.size() == 1 {
            let promoted = root_node.children[0];
            let freed = root_guard.page_id();
            drop(root_guard);
            self.buffer_pool.delete_page(freed)?;
            if let Some(h) = header.as_mut() {
                write_root_page_id(h.data_mut(), promoted);
            }
        }
        Ok(())
    }
}
