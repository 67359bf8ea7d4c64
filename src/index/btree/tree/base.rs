use std::sync::Arc;
use std::marker::PhantomData;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{ReadPageGuard, WritePageGuard};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{
    deserialize_node, read_root_page_id, serialize_node, write_root_page_id,
};

/// Concurrent B+tree persisted through the buffer pool.
///
/// One header page carries the root page id; every other page of the tree is
/// a serialized leaf or internal node. Readers descend with hand-over-hand
/// shared latches; writers keep a stack of exclusive latches that is cut
/// down as soon as a node proves it cannot split or merge.
pub struct BPlusTree<K, V> {
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) header_page_id: PageId,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BPlusTree<K, V>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a fresh tree, allocating its header page. The tree starts
    /// empty: the header records `INVALID_PAGE_ID` until the first insert.
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);
        let (header_page_id, mut header) = buffer_pool.new_page_write()?;
        write_root_page_id(header.data_mut(), INVALID_PAGE_ID);
        drop(header);

        Ok(Self {
            buffer_pool,
            header_page_id,
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    /// Attach to a tree whose header page already exists on disk
    pub fn open(
        buffer_pool: Arc<BufferPoolManager>,
        header_page_id: PageId,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        Self {
            buffer_pool,
            header_page_id,
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn root_page_id(&self) -> Result<PageId, BTreeError> {
        let header = self.buffer_pool.fetch_page_read(self.header_page_id)?;
        Ok(read_root_page_id(header.data()))
    }

    pub fn is_empty(&self) -> Result<bool, BTreeError> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    pub(crate) fn leaf_min_size(&self) -> usize {
        self.leaf_max_size.div_ceil(2)
    }

    pub(crate) fn internal_min_size(&self) -> usize {
        self.internal_max_size.div_ceil(2)
    }

    pub(crate) fn min_size_of(&self, node: &BTreeNode<K, V>) -> usize {
        if node.is_leaf {
            self.leaf_min_size()
        } else {
            self.internal_min_size()
        }
    }

    pub(crate) fn max_size_of(&self, node: &BTreeNode<K, V>) -> usize {
        if node.is_leaf {
            self.leaf_max_size
        } else {
            self.internal_max_size
        }
    }

    pub(crate) fn node_of_read(&self, guard: &ReadPageGuard) -> Result<BTreeNode<K, V>, BTreeError> {
        deserialize_node(guard.data())
            .map_err(|_| BTreeError::InvalidPageFormat(guard.page_id()))
    }

    pub(crate) fn node_of_write(&self, guard: &WritePageGuard) -> Result<BTreeNode<K, V>, BTreeError> {
        deserialize_node(guard.data())
            .map_err(|_| BTreeError::InvalidPageFormat(guard.page_id()))
    }

    pub(crate) fn store_node(
        &self,
        guard: &mut WritePageGuard,
        node: &BTreeNode<K, V>,
    ) -> Result<(), BTreeError> {
        serialize_node(node, guard.data_mut())
    }

    /// Point lookup. Returns the values bound to `key` (at most one, since
    /// keys are unique).
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, BTreeError> {
        let header = self.buffer_pool.fetch_page_read(self.header_page_id)?;
        let root_id = read_root_page_id(header.data());
        if root_id == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }

        // Latch the root, then release the header: hand-over-hand descent.
        let mut guard = self.buffer_pool.fetch_page_read(root_id)?;
        drop(header);

        loop {
            let node = self.node_of_read(&guard)?;
            if node.is_leaf {
                return Ok(match node.leaf_lookup(key) {
                    Some(i) => vec![node.values[i].clone()],
                    None => Vec::new(),
                });
            }
            let i = match node.first_at_least(key) {
                Some(i) => i,
                // Larger than every key in the tree.
                None => return Ok(Vec::new()),
            };
            let child = self.buffer_pool.fetch_page_read(node.children[i])?;
            guard = child;
        }
    }
}
