use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use anyhow::Result;
use parking_lot::RwLock;
use thiserror::Error;
use log::info;

use crate::common::types::{Rid, TableOid};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::{TableHeap, TableHeapError};
use crate::index::btree::{BPlusTree, BTreeError};
use crate::catalog::schema::Schema;
use crate::catalog::column::DataType;
use crate::catalog::value::DataValue;

/// Fan-outs for catalog-managed indexes; sized so i64 keys and rids fit a
/// 4KB page comfortably.
const INDEX_LEAF_MAX: usize = 64;
const INDEX_INTERNAL_MAX: usize = 64;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Column {0} cannot back an index (integer columns only)")]
    UnsupportedKeyColumn(String),

    #[error("Heap error: {0}")]
    HeapError(#[from] TableHeapError),

    #[error("Index error: {0}")]
    IndexError(#[from] BTreeError),
}

/// A registered table: identity, schema and its heap
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

/// A registered index: a B+tree over one integer column of a table
pub struct IndexInfo {
    pub oid: u32,
    pub name: String,
    pub table_name: String,
    pub key_column: usize,
    pub index: Arc<BPlusTree<i64, Rid>>,
}

impl IndexInfo {
    /// Extract this index's key from a row, if the column holds an integer
    pub fn key_of(&self, values: &[DataValue]) -> Option<i64> {
        match values.get(self.key_column) {
            Some(DataValue::Integer(k)) => Some(*k),
            _ => None,
        }
    }
}

/// In-memory registry of tables and indexes. Nothing here is persisted;
/// the catalog is rebuilt by the host on startup.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<u32, Arc<IndexInfo>>>,
    index_names: RwLock<HashMap<String, u32>>,
    table_indexes: RwLock<HashMap<String, Vec<u32>>>,
    next_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            index_names: RwLock::new(HashMap::new()),
            table_indexes: RwLock::new(HashMap::new()),
            next_oid: AtomicU32::new(0),
        }
    }

    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        if self.table_names.read().contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let heap = Arc::new(TableHeap::new(self.buffer_pool.clone())?);
        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap,
        });

        self.tables.write().insert(oid, info.clone());
        self.table_names.write().insert(name.clone(), oid);
        self.table_indexes.write().entry(name.clone()).or_default();
        info!("created table {:?} (oid {})", name, oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.read().get(name)?;
        self.get_table(oid)
    }

    /// Create an index over one integer column, back-filling it from the
    /// table's live tuples.
    pub fn create_index(
        &self,
        index_name: impl Into<String>,
        table_name: &str,
        key_column: usize,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        if self.index_names.read().contains_key(&index_name) {
            return Err(CatalogError::IndexExists(index_name));
        }
        let table = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;
        let column = table
            .schema
            .column(key_column)
            .ok_or_else(|| CatalogError::UnsupportedKeyColumn(format!("#{key_column}")))?;
        if column.data_type != DataType::Integer {
            return Err(CatalogError::UnsupportedKeyColumn(column.name.clone()));
        }

        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let tree = Arc::new(BPlusTree::new(
            self.buffer_pool.clone(),
            INDEX_LEAF_MAX,
            INDEX_INTERNAL_MAX,
        )?);
        let info = Arc::new(IndexInfo {
            oid,
            name: index_name.clone(),
            table_name: table_name.to_string(),
            key_column,
            index: tree,
        });

        // Back-fill from whatever the heap already holds.
        let mut it = table.heap.iter();
        while let Some((rid, meta, tuple)) = it.next()? {
            if meta.is_deleted {
                continue;
            }
            if let Some(key) = info.key_of(&tuple.values) {
                info.index.insert(key, rid)?;
            }
        }

        self.indexes.write().insert(oid, info.clone());
        self.index_names.write().insert(index_name.clone(), oid);
        self.table_indexes
            .write()
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        info!("created index {:?} (oid {}) on {}.{}", index_name, oid, table_name, column.name);
        Ok(info)
    }

    pub fn get_index(&self, oid: u32) -> Option<Arc<IndexInfo>> {
        self.indexes.read().get(&oid).cloned()
    }

    pub fn get_index_by_name(&self, name: &str) -> Option<Arc<IndexInfo>> {
        let oid = *self.index_names.read().get(name)?;
        self.get_index(oid)
    }

    /// Every index registered for a table
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let oids = match self.table_indexes.read().get(table_name) {
            Some(oids) => oids.clone(),
            None => return Vec::new(),
        };
        let indexes = self.indexes.read();
        oids.iter().filter_map(|oid| indexes.get(oid).cloned()).collect()
    }
}
