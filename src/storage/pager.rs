//! Glues [`Storage`], [`PagePool`] and [`PageCache`] together and brokers
//! pinned, typed access to pages.
//!
//! The metadata page is read (or bootstrapped) at [`Pager::open`] and kept
//! pinned for the pager's entire lifetime — every other page flows through
//! the ordinary pin/unpin/evict cycle.

use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;

use log::{error, trace};

use crate::error::Error;
use crate::storage::cache::{EvictedPage, PageCache, PageState, RawPage};
use crate::storage::file::Storage;
use crate::storage::page::{
    self, CollectionKind, ItemKind, MetadataPage, PageHeader, COLLECTION_ITEM_SIZE,
    METADATA_PAGE_SIZE,
};
use crate::storage::pool::PagePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Soft,
    Hard,
}

/// A pinned, typed reference to a page's bytes. One handle == one pin;
/// dropping it does not unpin — callers must call
/// [`Pager::release_page`] explicitly, matching the spec's explicit
/// pin/unpin contract rather than RAII (a pin can legitimately outlive many
/// scopes, e.g. a cursor's current page).
pub struct PageHandle<K> {
    page_num: u32,
    buf: RawPage,
    _marker: PhantomData<K>,
}

impl<K> PageHandle<K> {
    pub fn page_num(&self) -> u32 {
        self.page_num
    }

    pub fn header(&self) -> Result<PageHeader, Error> {
        PageHeader::read(&self.buf.borrow())
    }

    pub fn next_page(&self) -> u32 {
        page::next_page(&self.buf.borrow())
    }

    pub fn prev_page(&self) -> u32 {
        page::prev_page(&self.buf.borrow())
    }

    pub fn set_next_page(&self, value: u32) {
        page::set_next_page(&mut self.buf.borrow_mut(), value);
    }

    pub fn set_prev_page(&self, value: u32) {
        page::set_prev_page(&mut self.buf.borrow_mut(), value);
    }
}

impl<K: ItemKind> PageHandle<K> {
    pub fn slots(&self) -> u32 {
        page::slots(&self.buf.borrow())
    }

    pub fn item_size(&self) -> u32 {
        page::item_size(&self.buf.borrow())
    }

    pub fn item_count(&self) -> u32 {
        page::item_count(&self.buf.borrow())
    }

    pub fn is_full(&self) -> bool {
        page::is_full(&self.buf.borrow())
    }

    pub fn is_occupied(&self, index: u32) -> bool {
        page::is_occupied(&self.buf.borrow(), index)
    }

    pub fn get(&self, index: u32) -> Result<Option<K::Record>, Error> {
        page::get::<K>(&self.buf.borrow(), index)
    }

    pub fn insert(&self, index: u32, record: &K::Record) -> Result<(), Error> {
        page::insert::<K>(&mut self.buf.borrow_mut(), index, record)
    }

    pub fn update(&self, index: u32, record: &K::Record) -> Result<(), Error> {
        page::update::<K>(&mut self.buf.borrow_mut(), index, record)
    }
}

/// Reads just enough of an existing file to recover its persisted
/// [`MetadataPage`], without committing to any particular page size ahead
/// of time. Returns `None` when the path doesn't exist or is empty — the
/// signal to bootstrap a fresh file instead of a corruption.
fn probe_metadata(path: &Path) -> Result<Option<MetadataPage>, Error> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }
    if (len as usize) < METADATA_PAGE_SIZE {
        return Err(Error::CorruptMetadata(
            "file is shorter than a metadata page",
        ));
    }
    let mut buf = vec![0u8; METADATA_PAGE_SIZE];
    file.read_exact(&mut buf)?;
    Ok(Some(MetadataPage::read(&buf)?))
}

pub struct Pager {
    storage: Rc<RefCell<Storage>>,
    pool: Rc<RefCell<PagePool>>,
    cache: PageCache,
    metadata: MetadataPage,
    metadata_buf: RawPage,
}

impl Pager {
    /// Opens `path`, creating and bootstrapping it if it doesn't already
    /// exist. `page_size`/`cache_size` are only used for a freshly created
    /// file; an existing file's persisted metadata always wins.
    pub fn open(path: impl AsRef<Path>, page_size: u32, cache_size: u32) -> Result<Self, Error> {
        let path = path.as_ref();
        let probed = probe_metadata(path)?;
        let is_fresh = probed.is_none();
        let (page_size, cache_size) = match &probed {
            Some(meta) => (meta.page_size, meta.cache_size),
            None => (page_size, cache_size),
        };

        let (storage, _created) = Storage::open(path, page_size as usize)?;
        let storage = Rc::new(RefCell::new(storage));
        let pool = Rc::new(RefCell::new(PagePool::new(page_size as usize)));

        let storage_for_evict = storage.clone();
        let pool_for_evict = pool.clone();
        let on_evict: Box<dyn FnMut(EvictedPage)> = Box::new(move |evicted: EvictedPage| {
            if evicted.state == PageState::Dirty {
                let result = storage_for_evict
                    .borrow_mut()
                    .write_page(evicted.page_num, &evicted.buf.borrow());
                if let Err(e) = result {
                    error!("failed to write back page {}: {e}", evicted.page_num);
                }
            }
            match Rc::try_unwrap(evicted.buf) {
                Ok(cell) => pool_for_evict.borrow_mut().release(cell.into_inner()),
                Err(_) => trace!(
                    "page {} still referenced at eviction; buffer not returned to pool",
                    evicted.page_num
                ),
            }
        });

        let mut cache = PageCache::new(cache_size as usize, on_evict);

        let metadata = match probed {
            Some(meta) => meta,
            None => MetadataPage::fresh(page_size, cache_size),
        };

        let metadata_buf: RawPage = Rc::new(RefCell::new(pool.borrow_mut().acquire()));
        if is_fresh {
            metadata_buf.borrow_mut().fill(0);
            metadata.write(&mut metadata_buf.borrow_mut());
        } else {
            storage.borrow_mut().read_page(0, &mut metadata_buf.borrow_mut())?;
        }
        // Pinned for the pager's entire lifetime (I6). Dirty regardless of
        // whether this run just wrote it or just read it back unchanged.
        cache.put(0, metadata_buf.clone(), 1, PageState::Dirty);

        let mut pager = Self {
            storage,
            pool,
            cache,
            metadata,
            metadata_buf,
        };

        if is_fresh {
            let handle = pager.new_page::<CollectionKind>(0, COLLECTION_ITEM_SIZE as u32)?;
            debug_assert_eq!(handle.page_num(), page::FIRST_COLLECTION_PAGE);
            pager.release_page(handle);
            pager.flush(FlushMode::Hard)?;
        }

        Ok(pager)
    }

    pub fn page_size(&self) -> usize {
        self.storage.borrow().page_size()
    }

    pub fn page_count(&self) -> u32 {
        self.metadata.page_count
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn sync_metadata(&mut self) {
        self.metadata.write(&mut self.metadata_buf.borrow_mut());
        self.cache.mark_dirty(0);
    }

    /// Allocates a new page of kind `K`, assigns it the next page number,
    /// and returns it pinned with `refs=1, state=dirty`.
    pub fn new_page<K: ItemKind>(
        &mut self,
        prev_page: u32,
        item_size: u32,
    ) -> Result<PageHandle<K>, Error> {
        let mut raw = self.pool.borrow_mut().acquire();
        raw.fill(0);
        let page_num = self.metadata.page_count;

        page::init_item_page::<K>(&mut raw, self.page_size(), page_num, prev_page, item_size);

        self.metadata.page_count += 1;
        self.sync_metadata();

        let buf = Rc::new(RefCell::new(raw));
        self.cache.put(page_num, buf.clone(), 1, PageState::Dirty);

        Ok(PageHandle {
            page_num,
            buf,
            _marker: PhantomData,
        })
    }

    /// Pins and returns page `page_num`, asserting its on-disk type tag
    /// matches `K`.
    pub fn get_page<K: ItemKind>(&mut self, page_num: u32) -> Result<PageHandle<K>, Error> {
        if page_num >= self.metadata.page_count {
            return Err(Error::OutOfBounds(page_num));
        }

        if let Some(buf) = self.cache.get(page_num) {
            match page::page_type(&buf.borrow()) {
                Ok(found) if found == K::PAGE_TYPE => {}
                Ok(found) => {
                    self.cache.release(page_num);
                    return Err(Error::WrongPageType {
                        page_num,
                        expected: K::PAGE_TYPE,
                        found,
                    });
                }
                Err(e) => {
                    self.cache.release(page_num);
                    return Err(e);
                }
            }
            return Ok(PageHandle {
                page_num,
                buf,
                _marker: PhantomData,
            });
        }

        let mut raw = self.pool.borrow_mut().acquire();
        self.storage.borrow_mut().read_page(page_num, &mut raw)?;
        let found = page::page_type(&raw)?;
        if found != K::PAGE_TYPE {
            self.pool.borrow_mut().release(raw);
            return Err(Error::WrongPageType {
                page_num,
                expected: K::PAGE_TYPE,
                found,
            });
        }

        let buf = Rc::new(RefCell::new(raw));
        self.cache.put(page_num, buf.clone(), 1, PageState::Clean);
        Ok(PageHandle {
            page_num,
            buf,
            _marker: PhantomData,
        })
    }

    /// Unpins a handle. The underlying buffer may be evicted (and, if
    /// dirty, written back) once its refcount reaches zero.
    pub fn release_page<K>(&mut self, handle: PageHandle<K>) {
        self.cache.release(handle.page_num);
    }

    /// Marks the page backing `handle` dirty. Required after any mutation
    /// through a pinned handle's `insert`/`update`/`set_next_page`/etc.
    pub fn mark_dirty<K>(&mut self, handle: &PageHandle<K>) {
        self.cache.mark_dirty(handle.page_num);
    }

    /// Soft flush evicts the unpinned LRU list; hard flush additionally
    /// writes back and drops every remaining (pinned) entry, including the
    /// metadata page, then immediately re-pins a fresh metadata entry so
    /// the pager stays usable afterward (hard flush is not required to be
    /// the final operation before `close`, only the spec's original
    /// "shutdown" draft assumed that).
    pub fn flush(&mut self, mode: FlushMode) -> Result<(), Error> {
        match mode {
            FlushMode::Soft => self.cache.flush(),
            FlushMode::Hard => {
                self.sync_metadata();
                self.cache.flush_hard();
                self.cache
                    .put(0, self.metadata_buf.clone(), 1, PageState::Dirty);
            }
        }
        Ok(())
    }

    /// Consumes the pager, performing a final hard flush.
    pub fn close(mut self) -> Result<(), Error> {
        self.flush(FlushMode::Hard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::{VectorKind, VectorRecord};
    use tempdir::TempDir;

    #[test]
    fn fresh_open_bootstraps_metadata_and_directory_page() {
        let dir = TempDir::new("pager").unwrap();
        let pager = Pager::open(dir.path().join("db"), 4096, 1024).unwrap();
        assert_eq!(pager.page_count(), 2);
    }

    #[test]
    fn reopen_recovers_page_count() {
        let dir = TempDir::new("pager").unwrap();
        let path = dir.path().join("db");
        {
            let mut pager = Pager::open(&path, 256, 8).unwrap();
            let handle = pager.new_page::<VectorKind>(0, 16).unwrap();
            pager.release_page(handle);
            pager.close().unwrap();
        }
        let reopened = Pager::open(&path, 256, 8).unwrap();
        assert_eq!(reopened.page_count(), 3);
    }

    #[test]
    fn get_page_out_of_bounds() {
        let dir = TempDir::new("pager").unwrap();
        let mut pager = Pager::open(dir.path().join("db"), 4096, 1024).unwrap();
        let result = pager.get_page::<CollectionKind>(pager.page_count());
        assert!(matches!(result, Err(Error::OutOfBounds(_))));
    }

    #[test]
    fn get_page_wrong_type() {
        let dir = TempDir::new("pager").unwrap();
        let mut pager = Pager::open(dir.path().join("db"), 4096, 1024).unwrap();
        let result = pager.get_page::<VectorKind>(page::FIRST_COLLECTION_PAGE);
        assert!(matches!(result, Err(Error::WrongPageType { .. })));
    }

    #[test]
    fn dirty_page_survives_eviction_and_reopen() {
        let dir = TempDir::new("pager").unwrap();
        let path = dir.path().join("db");
        {
            let mut pager = Pager::open(&path, 256, 2).unwrap();
            let handle = pager.new_page::<VectorKind>(0, 16).unwrap();
            let page_num = handle.page_num();
            handle
                .insert(
                    0,
                    &VectorRecord {
                        id: 1,
                        position: vec![1.0, 2.0, 3.0],
                    },
                )
                .unwrap();
            pager.mark_dirty(&handle);
            pager.release_page(handle);

            // Force eviction by cycling other pages through a tiny cache.
            for _ in 0..4 {
                let other = pager.new_page::<VectorKind>(0, 16).unwrap();
                pager.mark_dirty(&other);
                pager.release_page(other);
            }

            let reget = pager.get_page::<VectorKind>(page_num).unwrap();
            let got = reget.get(0).unwrap().unwrap();
            assert_eq!(got.position, vec![1.0, 2.0, 3.0]);
            pager.release_page(reget);
        }
    }

    #[test]
    fn hard_flush_mid_lifetime_keeps_pager_usable() {
        let dir = TempDir::new("pager").unwrap();
        let mut pager = Pager::open(dir.path().join("db"), 4096, 1024).unwrap();
        pager.flush(FlushMode::Hard).unwrap();
        // Metadata should still be readable/writable after a mid-lifetime hard flush.
        let handle = pager.new_page::<VectorKind>(0, 16).unwrap();
        pager.release_page(handle);
        assert_eq!(pager.page_count(), 3);
    }
}
