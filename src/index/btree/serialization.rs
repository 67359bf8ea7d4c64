use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;

// Node page layout:
// - is_leaf: u8 (1 byte)
// - key_count: u16 (2 bytes)
// - next_leaf: u32 (4 bytes)
// then `key_count` length-prefixed bincode keys, then the payloads:
// length-prefixed bincode values for a leaf, raw u32 child ids otherwise.
const NODE_HEADER_SIZE: usize = 7;

/// Serialize a node into a page buffer
pub fn serialize_node<K, V>(node: &BTreeNode<K, V>, data: &mut [u8]) -> Result<(), BTreeError>
where
    K: Serialize + Clone + Ord,
    V: Serialize,
{
    data.fill(0);
    data[0] = if node.is_leaf { 1 } else { 0 };
    LittleEndian::write_u16(&mut data[1..3], node.keys.len() as u16);
    LittleEndian::write_u32(&mut data[3..7], node.next_leaf);

    let mut offset = NODE_HEADER_SIZE;
    for key in &node.keys {
        offset = write_blob(data, offset, key)?;
    }

    if node.is_leaf {
        for value in &node.values {
            offset = write_blob(data, offset, value)?;
        }
    } else {
        for &child in &node.children {
            if offset + 4 > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_u32(&mut data[offset..offset + 4], child);
            offset += 4;
        }
    }

    Ok(())
}

/// Deserialize a node from a page buffer
pub fn deserialize_node<K, V>(data: &[u8]) -> Result<BTreeNode<K, V>, BTreeError>
where
    K: DeserializeOwned + Clone + Ord,
    V: DeserializeOwned,
{
    let is_leaf = match data[0] {
        0 => false,
        1 => true,
        other => {
            return Err(BTreeError::DeserializationError(format!(
                "bad node tag {other}"
            )))
        }
    };
    let key_count = LittleEndian::read_u16(&data[1..3]) as usize;
    let next_leaf = LittleEndian::read_u32(&data[3..7]);

    let mut offset = NODE_HEADER_SIZE;
    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        let (key, next) = read_blob::<K>(data, offset)?;
        keys.push(key);
        offset = next;
    }

    let mut values = Vec::new();
    let mut children = Vec::new();
    if is_leaf {
        values.reserve(key_count);
        for _ in 0..key_count {
            let (value, next) = read_blob::<V>(data, offset)?;
            values.push(value);
            offset = next;
        }
    } else {
        children.reserve(key_count);
        for _ in 0..key_count {
            children.push(LittleEndian::read_u32(&data[offset..offset + 4]));
            offset += 4;
        }
    }

    Ok(BTreeNode {
        is_leaf,
        keys,
        children,
        values,
        next_leaf,
    })
}

/// The header page holds the root page id in its first four bytes
pub fn read_root_page_id(data: &[u8]) -> PageId {
    LittleEndian::read_u32(&data[0..4])
}

pub fn write_root_page_id(data: &mut [u8], root: PageId) {
    LittleEndian::write_u32(&mut data[0..4], root);
}

fn write_blob<T: Serialize>(data: &mut [u8], offset: usize, item: &T) -> Result<usize, BTreeError> {
    let bytes = bincode::serialize(item)
        .map_err(|e| BTreeError::SerializationError(e.to_string()))?;
    if offset + 2 + bytes.len() > PAGE_SIZE {
        return Err(BTreeError::NodeTooLarge);
    }
    LittleEndian::write_u16(&mut data[offset..offset + 2], bytes.len() as u16);
    data[offset + 2..offset + 2 + bytes.len()].copy_from_slice(&bytes);
    Ok(offset + 2 + bytes.len())
}

fn read_blob<T: DeserializeOwned>(data: &[u8], offset: usize) -> Result<(T, usize), BTreeError> {
    if offset + 2 > PAGE_SIZE {
        return Err(BTreeError::DeserializationError("blob past page end".into()));
    }
    let len = LittleEndian::read_u16(&data[offset..offset + 2]) as usize;
    let start = offset + 2;
    if start + len > PAGE_SIZE {
        return Err(BTreeError::DeserializationError("blob past page end".into()));
    }
    let item = bincode::deserialize(&data[start..start + len])
        .map_err(|e| BTreeError::DeserializationError(e.to_string()))?;
    Ok((item, start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Rid, INVALID_PAGE_ID};

    #[test]
    fn test_leaf_node_roundtrip() {
        let mut node: BTreeNode<i64, Rid> = BTreeNode::new_leaf();
        node.keys = vec![1, 5, 9];
        node.values = vec![Rid::new(2, 0), Rid::new(2, 1), Rid::new(3, 0)];
        node.next_leaf = 7;

        let mut page = [0u8; PAGE_SIZE];
        serialize_node(&node, &mut page).unwrap();
        let out: BTreeNode<i64, Rid> = deserialize_node(&page).unwrap();

        assert!(out.is_leaf);
        assert_eq!(out.keys, vec![1, 5, 9]);
        assert_eq!(out.values, node.values);
        assert_eq!(out.next_leaf, 7);
    }

    #[test]
    fn test_internal_node_roundtrip() {
        let mut node: BTreeNode<i64, Rid> = BTreeNode::new_internal();
        node.keys = vec![10, 20];
        node.children = vec![4, 5];

        let mut page = [0u8; PAGE_SIZE];
        serialize_node(&node, &mut page).unwrap();
        let out: BTreeNode<i64, Rid> = deserialize_node(&page).unwrap();

        assert!(!out.is_leaf);
        assert_eq!(out.keys, vec![10, 20]);
        assert_eq!(out.children, vec![4, 5]);
        assert_eq!(out.next_leaf, INVALID_PAGE_ID);
    }

    #[test]
    fn test_string_keys_roundtrip() {
        let mut node: BTreeNode<String, Rid> = BTreeNode::new_leaf();
        node.keys = vec!["alpha".into(), "omega".into()];
        node.values = vec![Rid::new(1, 1), Rid::new(1, 2)];

        let mut page = [0u8; PAGE_SIZE];
        serialize_node(&node, &mut page).unwrap();
        let out: BTreeNode<String, Rid> = deserialize_node(&page).unwrap();
        assert_eq!(out.keys, vec!["alpha".to_string(), "omega".to_string()]);
    }

    #[test]
    fn test_root_pointer_slot() {
        let mut page = [0u8; PAGE_SIZE];
        write_root_page_id(&mut page, 12);
        assert_eq!(read_root_page_id(&page), 12);
        write_root_page_id(&mut page, INVALID_PAGE_ID);
        assert_eq!(read_root_page_id(&page), INVALID_PAGE_ID);
    }
}
