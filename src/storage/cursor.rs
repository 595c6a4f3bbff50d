//! Pinned traversal of a chained page list.
//!
//! A `Cursor` holds at most one pinned page at a time — moving to another
//! page always pins the new one before releasing the old one, never the
//! reverse, so a chain is never observed with zero pins on its current
//! position.

use std::marker::PhantomData;

use crate::error::Error;
use crate::storage::page::ItemKind;
use crate::storage::pager::{PageHandle, Pager};

pub struct Cursor<K: ItemKind> {
    handle: PageHandle<K>,
    index: u32,
    _marker: PhantomData<K>,
}

impl<K: ItemKind> Cursor<K> {
    /// Opens a cursor positioned at slot 0 of `start_page`.
    pub fn open(pager: &mut Pager, start_page: u32) -> Result<Self, Error> {
        let handle = pager.get_page::<K>(start_page)?;
        Ok(Self {
            handle,
            index: 0,
            _marker: PhantomData,
        })
    }

    pub fn page_num(&self) -> u32 {
        self.handle.page_num()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_full_here(&self) -> bool {
        self.handle.is_full()
    }

    pub fn item_count(&self) -> u32 {
        self.handle.item_count()
    }

    pub fn slots(&self) -> u32 {
        self.handle.slots()
    }

    /// Relinks the current page's `next_page` pointer. Used when the
    /// manager allocates a new tail page onto this one.
    pub fn set_next_page(&self, value: u32) {
        self.handle.set_next_page(value);
    }

    pub fn get_current(&self) -> Result<Option<K::Record>, Error> {
        self.handle.get(self.index)
    }

    pub fn insert_current(&self, record: &K::Record) -> Result<(), Error> {
        self.handle.insert(self.index, record)
    }

    pub fn update_current(&self, record: &K::Record) -> Result<(), Error> {
        self.handle.update(self.index, record)
    }

    pub fn mark_dirty(&self, pager: &mut Pager) {
        pager.mark_dirty(&self.handle);
    }

    /// Advances to the next occupied-or-empty slot index within the
    /// current page, crossing into the next chained page (if any) when the
    /// current page is exhausted. Returns `false` once the chain is
    /// exhausted.
    pub fn next(&mut self, pager: &mut Pager) -> Result<bool, Error> {
        if self.index + 1 < self.handle.slots() {
            self.index += 1;
            return Ok(true);
        }
        let next_page = self.handle.next_page();
        if next_page == 0 {
            return Ok(false);
        }
        self.move_to(pager, next_page, 0)
    }

    pub fn prev(&mut self, pager: &mut Pager) -> Result<bool, Error> {
        if self.index > 0 {
            self.index -= 1;
            return Ok(true);
        }
        let prev_page = self.handle.prev_page();
        if prev_page == 0 {
            return Ok(false);
        }
        let last_index = {
            let handle = pager.get_page::<K>(prev_page)?;
            let last = handle.slots().saturating_sub(1);
            pager.release_page(handle);
            last
        };
        self.move_to(pager, prev_page, last_index)
    }

    fn move_to(&mut self, pager: &mut Pager, page_num: u32, index: u32) -> Result<bool, Error> {
        let new_handle = pager.get_page::<K>(page_num)?;
        let old_handle = std::mem::replace(&mut self.handle, new_handle);
        pager.release_page(old_handle);
        self.index = index;
        Ok(true)
    }

    pub fn seek_to_start(&mut self, pager: &mut Pager, start_page: u32) -> Result<(), Error> {
        self.move_to(pager, start_page, 0)?;
        Ok(())
    }

    /// Walks to the chain's tail page, positioned at slot 0.
    pub fn seek_to_end(&mut self, pager: &mut Pager) -> Result<(), Error> {
        loop {
            let next_page = self.handle.next_page();
            if next_page == 0 {
                self.index = 0;
                return Ok(());
            }
            self.move_to(pager, next_page, 0)?;
        }
    }

    /// Scans forward from the current position for the first empty slot,
    /// crossing page boundaries. Returns `false` if the chain is exhausted
    /// without finding one (cursor is left positioned at the chain's tail).
    pub fn next_empty_slot(&mut self, pager: &mut Pager) -> Result<bool, Error> {
        loop {
            if !self.handle.is_occupied(self.index) {
                return Ok(true);
            }
            if !self.next(pager)? {
                return Ok(false);
            }
        }
    }

    /// Visits every occupied item from the current position through the
    /// end of the chain, stepping page by page. Mirrors the spec's
    /// lazy-sequence `iterator()` capability as an eager callback walk: a
    /// true `Iterator` impl would need a fresh `&mut Pager` on every
    /// `next()` call, which the trait has no room to thread through.
    pub fn for_each_remaining<F: FnMut(K::Record)>(
        &mut self,
        pager: &mut Pager,
        mut f: F,
    ) -> Result<(), Error> {
        loop {
            if let Some(record) = self.get_current()? {
                f(record);
            }
            if !self.next(pager)? {
                break;
            }
        }
        Ok(())
    }

    pub fn release(self, pager: &mut Pager) {
        pager.release_page(self.handle);
    }
}
