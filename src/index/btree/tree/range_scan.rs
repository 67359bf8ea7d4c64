use std::marker::PhantomData;
use std::sync::Arc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, read_root_page_id};
use super::base::BPlusTree;

/// Cursor over the leaf chain. Holds only a `(page_id, index)` position and
/// re-latches the leaf for each probe, so it never pins pages across calls
/// and outlives no tree borrow.
pub struct TreeIterator<K, V> {
    buffer_pool: Arc<BufferPoolManager>,
    page_id: PageId,
    index: usize,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BPlusTree<K, V>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn make_iterator(&self, page_id: PageId, index: usize) -> TreeIterator<K, V> {
        TreeIterator {
            buffer_pool: self.buffer_pool.clone(),
            page_id,
            index,
            _phantom: PhantomData,
        }
    }

    /// Iterator positioned at the smallest key
    pub fn begin(&self) -> Result<TreeIterator<K, V>, BTreeError> {
        let leaf = self.descend_to_edge(true)?;
        Ok(self.make_iterator(leaf, 0))
    }

    /// Iterator positioned at the first entry whose key is >= `key`
    pub fn begin_at(&self, key: &K) -> Result<TreeIterator<K, V>, BTreeError> {
        let header = self.buffer_pool.fetch_page_read(self.header_page_id)?;
        let root_id = read_root_page_id(header.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(self.make_iterator(INVALID_PAGE_ID, 0));
        }

        let mut guard = self.buffer_pool.fetch_page_read(root_id)?;
        drop(header);

        loop {
            let node = self.node_of_read(&guard)?;
            if node.is_leaf {
                let index = node.keys.partition_point(|k| k < key);
                return Ok(self.make_iterator(guard.page_id(), index));
            }
            let i = match node.first_at_least(key) {
                Some(i) => i,
                // Past the tree maximum: an exhausted iterator.
                None => return Ok(self.make_iterator(INVALID_PAGE_ID, 0)),
            };
            let child = self.buffer_pool.fetch_page_read(node.children[i])?;
            guard = child;
        }
    }

    /// Iterator positioned one past the largest key
    pub fn end(&self) -> Result<TreeIterator<K, V>, BTreeError> {
        let leaf = self.descend_to_edge(false)?;
        if leaf == INVALID_PAGE_ID {
            return Ok(self.make_iterator(INVALID_PAGE_ID, 0));
        }
        let guard = self.buffer_pool.fetch_page_read(leaf)?;
        let node = self.node_of_read(&guard)?;
        Ok(self.make_iterator(leaf, node.size()))
    }

    /// Hand-over-hand descent to the leftmost or rightmost leaf
    fn descend_to_edge(&self, leftmost: bool) -> Result<PageId, BTreeError> {
        let header = self.buffer_pool.fetch_page_read(self.header_page_id)?;
        let root_id = read_root_page_id(header.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(INVALID_PAGE_ID);
        }

        let mut guard = self.buffer_pool.fetch_page_read(root_id)?;
        drop(header);

        loop {
            let node = self.node_of_read(&guard)?;
            if node.is_leaf {
                return Ok(guard.page_id());
            }
            let child_id = if leftmost {
                node.children[0]
            } else {
                node.children[node.children.len() - 1]
            };
            let child = self.buffer_pool.fetch_page_read(child_id)?;
            guard = child;
        }
    }
}

impl<K, V> TreeIterator<K, V>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn leaf(&self) -> Result<BTreeNode<K, V>, BTreeError> {
        let guard = self.buffer_pool.fetch_page_read(self.page_id)?;
        deserialize_node(guard.data()).map_err(|_| BTreeError::InvalidPageFormat(self.page_id))
    }

    /// True once the cursor has no entry and no successor leaf
    pub fn is_end(&self) -> Result<bool, BTreeError> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(true);
        }
        let node = self.leaf()?;
        Ok(self.index >= node.size() && node.next_leaf == INVALID_PAGE_ID)
    }

    /// The entry under the cursor, if any
    pub fn current(&self) -> Result<Option<(K, V)>, BTreeError> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let node = self.leaf()?;
        if self.index < node.size() {
            Ok(Some((node.keys[self.index].clone(), node.values[self.index].clone())))
        } else {
            Ok(None)
        }
    }

    /// Step to the next entry, following the leaf chain at page boundaries
    pub fn advance(&mut self) -> Result<(), BTreeError> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(());
        }
        let node = self.leaf()?;
        self.index += 1;
        if self.index >= node.size() && node.next_leaf != INVALID_PAGE_ID {
            self.page_id = node.next_leaf;
            self.index = 0;
        }
        Ok(())
    }
}
