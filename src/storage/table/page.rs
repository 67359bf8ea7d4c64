use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use super::tuple::TupleMeta;

// Table page layout: a 12-byte header, record payloads growing forward from
// the header, and a slot array growing backward from the page end.
//
// Header: next_page_id u32 | record_count u32 | free_space_offset u32
// Slot:   offset u32 | length u32 | flags u32 (bit 0 = deleted)
pub const TABLE_PAGE_HEADER_SIZE: usize = 12;
pub const SLOT_SIZE: usize = 12;

const FLAG_DELETED: u32 = 1;

pub fn init_page(data: &mut [u8]) {
    data.fill(0);
    LittleEndian::write_u32(&mut data[0..4], INVALID_PAGE_ID);
    LittleEndian::write_u32(&mut data[4..8], 0);
    LittleEndian::write_u32(&mut data[8..12], TABLE_PAGE_HEADER_SIZE as u32);
}

pub fn next_page_id(data: &[u8]) -> PageId {
    LittleEndian::read_u32(&data[0..4])
}

pub fn set_next_page_id(data: &mut [u8], page_id: PageId) {
    LittleEndian::write_u32(&mut data[0..4], page_id);
}

pub fn record_count(data: &[u8]) -> u32 {
    LittleEndian::read_u32(&data[4..8])
}

fn free_space_offset(data: &[u8]) -> u32 {
    LittleEndian::read_u32(&data[8..12])
}

fn slot_position(slot: u32) -> usize {
    PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
}

/// Append a record. Returns its slot index, or `None` when the payload and
/// its slot entry no longer fit.
pub fn insert_record(data: &mut [u8], payload: &[u8], meta: TupleMeta) -> Option<u32> {
    let count = record_count(data);
    let offset = free_space_offset(data) as usize;

    // The payload must end before the slot array once it has grown by one.
    if offset + payload.len() > slot_position(count) {
        return None;
    }

    data[offset..offset + payload.len()].copy_from_slice(payload);

    let slot = count;
    let pos = slot_position(slot);
    LittleEndian::write_u32(&mut data[pos..pos + 4], offset as u32);
    LittleEndian::write_u32(&mut data[pos + 4..pos + 8], payload.len() as u32);
    LittleEndian::write_u32(
        &mut data[pos + 8..pos + 12],
        if meta.is_deleted { FLAG_DELETED } else { 0 },
    );

    LittleEndian::write_u32(&mut data[4..8], count + 1);
    LittleEndian::write_u32(&mut data[8..12], (offset + payload.len()) as u32);
    Some(slot)
}

/// Read a record's metadata and payload
pub fn record(data: &[u8], slot: u32) -> Option<(TupleMeta, &[u8])> {
    if slot >= record_count(data) {
        return None;
    }
    let pos = slot_position(slot);
    let offset = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
    let length = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
    let flags = LittleEndian::read_u32(&data[pos + 8..pos + 12]);
    let meta = TupleMeta {
        is_deleted: flags & FLAG_DELETED != 0,
    };
    Some((meta, &data[offset..offset + length]))
}

/// Overwrite a record's metadata (the tombstone flag)
pub fn set_meta(data: &mut [u8], slot: u32, meta: TupleMeta) -> bool {
    if slot >= record_count(data) {
        return false;
    }
    let pos = slot_position(slot);
    LittleEndian::write_u32(
        &mut data[pos + 8..pos + 12],
        if meta.is_deleted { FLAG_DELETED } else { 0 },
    );
    true
}
