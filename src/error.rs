//! Crate-wide error type.
//!
//! One flat `thiserror`-derived enum, a variant per failure kind named in
//! spec §7, rather than the teacher's per-subsystem nesting
//! (`StorageError::{Page{cause}, Pager{cause}, Engine{cause,action}}` in
//! `storage/mod.rs`) — this crate has a single storage subsystem, not the
//! teacher's page/pager/engine split, so there is no second layer left to
//! nest by.

use std::io;

use thiserror::Error;

/// Errors that can surface from any public VeloxDB operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),

    #[error("read of {expected} bytes at page {page_num} returned only {got}")]
    IncompleteRead {
        page_num: u32,
        expected: usize,
        got: usize,
    },

    #[error("write of {expected} bytes at page {page_num} wrote only {got}")]
    IncompleteWrite {
        page_num: u32,
        expected: usize,
        got: usize,
    },

    #[error("invalid page size {0}; must be a positive multiple of the header size")]
    InvalidPageSize(usize),

    #[error("metadata page is corrupt: {0}")]
    CorruptMetadata(&'static str),

    #[error("page {0} is out of bounds")]
    OutOfBounds(u32),

    #[error("page {page_num} has type tag {found:?}, expected {expected:?}")]
    WrongPageType {
        page_num: u32,
        expected: crate::storage::page::PageType,
        found: crate::storage::page::PageType,
    },

    #[error("slot index {index} is out of bounds for {slots} slots")]
    IndexOutOfBounds { index: u32, slots: u32 },

    #[error("slot {0} is already occupied")]
    SlotOccupied(u32),

    #[error("slot {0} is empty")]
    EmptySlot(u32),

    #[error("chain exhausted without finding an empty slot")]
    NoEmptySlots,

    #[error("position has {got} bytes, expected {expected}")]
    BadPositionFormat { expected: usize, got: usize },

    #[error("quantization mismatch: page uses {page:?}, item uses {item:?}")]
    QuantizationMismatch {
        page: crate::storage::page::Quantization,
        item: crate::storage::page::Quantization,
    },

    #[error("collection {0} already exists")]
    CollectionAlreadyExists(u32),

    #[error("collection {0} does not exist")]
    CollectionNotFound(u32),

    #[error("vector has {got} dimensions, collection expects {expected}")]
    InvalidDimensions { expected: u32, got: u32 },

    #[error("failed to allocate a page buffer")]
    AllocationFailure,

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}
