//! The collection directory: a chained-page store of [`CollectionRecord`]s
//! anchored at [`page::FIRST_COLLECTION_PAGE`], keyed by collection id.
//!
//! Lookups are a linear scan of the chain — collections are created rarely
//! compared to vector inserts, so there is no secondary index here (one is
//! explicitly out of scope).

use crate::error::Error;
use crate::storage::cursor::Cursor;
use crate::storage::manager::ItemManager;
use crate::storage::page::{self, CollectionKind, CollectionRecord, COLLECTION_ITEM_SIZE};
use crate::storage::pager::Pager;

pub struct CollectionDirectory;

impl CollectionDirectory {
    /// Appends a new collection record. Fails with `CollectionAlreadyExists`
    /// if `record.id` is already present.
    pub fn add(pager: &mut Pager, record: &CollectionRecord) -> Result<(), Error> {
        if Self::get(pager, record.id)?.is_some() {
            return Err(Error::CollectionAlreadyExists(record.id));
        }
        let mut manager = ItemManager::<CollectionKind>::open(pager, page::FIRST_COLLECTION_PAGE)?;
        manager.append(pager, COLLECTION_ITEM_SIZE as u32, record)?;
        manager.release(pager);
        Ok(())
    }

    pub fn get(pager: &mut Pager, id: u32) -> Result<Option<CollectionRecord>, Error> {
        let mut cursor = Cursor::<CollectionKind>::open(pager, page::FIRST_COLLECTION_PAGE)?;
        let found = loop {
            if let Some(record) = cursor.get_current()? {
                if record.id == id {
                    break Some(record);
                }
            }
            if !cursor.next(pager)? {
                break None;
            }
        };
        cursor.release(pager);
        Ok(found)
    }

    /// Overwrites the record for `record.id` in place. Fails with
    /// `CollectionNotFound` if no such record exists.
    pub fn update(pager: &mut Pager, record: &CollectionRecord) -> Result<(), Error> {
        let mut cursor = Cursor::<CollectionKind>::open(pager, page::FIRST_COLLECTION_PAGE)?;
        let mut updated = false;
        loop {
            if let Some(existing) = cursor.get_current()? {
                if existing.id == record.id {
                    cursor.update_current(record)?;
                    cursor.mark_dirty(pager);
                    updated = true;
                    break;
                }
            }
            if !cursor.next(pager)? {
                break;
            }
        }
        cursor.release(pager);
        if updated {
            Ok(())
        } else {
            Err(Error::CollectionNotFound(record.id))
        }
    }

    /// Lists every collection record across the chain, in storage order.
    pub fn list(pager: &mut Pager) -> Result<Vec<CollectionRecord>, Error> {
        let mut cursor = Cursor::<CollectionKind>::open(pager, page::FIRST_COLLECTION_PAGE)?;
        let mut records = Vec::new();
        loop {
            if let Some(record) = cursor.get_current()? {
                records.push(record);
            }
            if !cursor.next(pager)? {
                break;
            }
        }
        cursor.release(pager);
        Ok(records)
    }
}
