//! Append-only writer atop a [`Cursor`]: finds (or allocates) room for the
//! next item in a chained page list.

use crate::error::Error;
use crate::storage::cursor::Cursor;
use crate::storage::page::ItemKind;
use crate::storage::pager::Pager;

pub struct ItemManager<K: ItemKind> {
    cursor: Cursor<K>,
}

impl<K: ItemKind> ItemManager<K> {
    pub fn open(pager: &mut Pager, start_page: u32) -> Result<Self, Error> {
        let mut cursor = Cursor::open(pager, start_page)?;
        cursor.seek_to_end(pager)?;
        Ok(Self { cursor })
    }

    /// Appends `record`, allocating a new overflow page linked onto the
    /// chain's tail if the current tail page is full. Returns the
    /// `(page_num, index)` the item was written at.
    pub fn append(
        &mut self,
        pager: &mut Pager,
        item_size: u32,
        record: &K::Record,
    ) -> Result<(u32, u32), Error> {
        if self.cursor.is_full_here() {
            self.allocate_overflow(pager, item_size)?;
        }

        if !self.cursor.next_empty_slot(pager)? {
            self.allocate_overflow(pager, item_size)?;
            if !self.cursor.next_empty_slot(pager)? {
                return Err(Error::NoEmptySlots);
            }
        }

        self.cursor.insert_current(record)?;
        self.cursor.mark_dirty(pager);
        Ok((self.cursor.page_num(), self.cursor.index()))
    }

    fn allocate_overflow(&mut self, pager: &mut Pager, item_size: u32) -> Result<(), Error> {
        let tail_page = self.cursor.page_num();
        let new_page = pager.new_page::<K>(tail_page, item_size)?;
        let new_page_num = new_page.page_num();
        pager.release_page(new_page);

        // Link the previous tail to the new page and mark it dirty before
        // moving off of it.
        self.cursor.set_next_page(new_page_num);
        self.cursor.mark_dirty(pager);

        self.cursor.seek_to_start(pager, new_page_num)?;
        Ok(())
    }

    pub fn release(self, pager: &mut Pager) {
        self.cursor.release(pager);
    }
}
