//! Public facade: [`Db`] and [`Collection`].
//!
//! This is the only module most callers need — it wires the collection
//! directory and per-collection vector indexes on top of the pager,
//! lazily materializing a collection's first vector page on its first
//! insert (§4.9).

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::storage::cursor::Cursor;
use crate::storage::directory::CollectionDirectory;
use crate::storage::page::{
    vector_item_size, CollectionRecord, IndexKind, ItemKind, Quantization, VectorKind,
    VectorRecord, DEFAULT_CACHE_SIZE, DEFAULT_PAGE_SIZE,
};
use crate::storage::pager::{FlushMode, Pager};
use crate::storage::vector_index::{FlatVectorIndex, VectorIndex};

/// Creation-time defaults for a brand new database file. Ignored when
/// reopening an existing one — the persisted `MetadataPage` wins.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub page_size: u32,
    pub cache_size: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

pub struct Db {
    pager: Pager,
    indexes: HashMap<u32, FlatVectorIndex>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self, Error> {
        let pager = Pager::open(path, options.page_size, options.cache_size)?;
        Ok(Self {
            pager,
            indexes: HashMap::new(),
        })
    }

    pub fn create_collection(&mut self, id: u32, dimensions: u32) -> Result<Collection<'_>, Error> {
        let record = CollectionRecord {
            id,
            dimensions,
            quantization: Quantization::None,
            index_kind: IndexKind::Flat,
            first_child_page: 0,
        };
        CollectionDirectory::add(&mut self.pager, &record)?;
        Ok(Collection {
            id,
            dimensions,
            db: self,
        })
    }

    pub fn collection(&mut self, id: u32) -> Result<Collection<'_>, Error> {
        let record =
            CollectionDirectory::get(&mut self.pager, id)?.ok_or(Error::CollectionNotFound(id))?;
        Ok(Collection {
            id,
            dimensions: record.dimensions,
            db: self,
        })
    }

    pub fn collection_count(&mut self) -> Result<usize, Error> {
        Ok(CollectionDirectory::list(&mut self.pager)?.len())
    }

    /// Total pages currently allocated in the file. Mostly useful for
    /// tests asserting overflow-page allocation.
    pub fn page_count(&self) -> u32 {
        self.pager.page_count()
    }

    /// Hard flush: writes every dirty page back, including pinned ones.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.pager.flush(FlushMode::Hard)
    }

    /// Closes every open index and performs a final hard flush.
    pub fn close(mut self) -> Result<(), Error> {
        for (_, index) in self.indexes.drain() {
            index.close(&mut self.pager);
        }
        self.pager.close()
    }

    fn ensure_index(&mut self, id: u32, dimensions: u32) -> Result<(), Error> {
        if self.indexes.contains_key(&id) {
            return Ok(());
        }
        let record =
            CollectionDirectory::get(&mut self.pager, id)?.ok_or(Error::CollectionNotFound(id))?;
        let quantization = record.quantization;

        let first_page = if record.first_child_page == 0 {
            let item_size = vector_item_size(dimensions);
            let handle = self.pager.new_page::<VectorKind>(0, item_size)?;
            let page_num = handle.page_num();
            self.pager.release_page(handle);

            let mut updated = record;
            updated.first_child_page = page_num;
            CollectionDirectory::update(&mut self.pager, &updated)?;
            page_num
        } else {
            record.first_child_page
        };

        let index = FlatVectorIndex::open(&mut self.pager, first_page, dimensions, quantization)?;
        self.indexes.insert(id, index);
        Ok(())
    }

    fn add_vector(
        &mut self,
        collection_id: u32,
        dimensions: u32,
        record: &VectorRecord,
    ) -> Result<(), Error> {
        if record.position.len() as u32 != dimensions {
            return Err(Error::InvalidDimensions {
                expected: dimensions,
                got: record.position.len() as u32,
            });
        }
        self.ensure_index(collection_id, dimensions)?;

        let pager = &mut self.pager;
        let index = self
            .indexes
            .get_mut(&collection_id)
            .expect("ensure_index just inserted this entry");
        index.add(pager, record)
    }
}

/// A handle to one collection, borrowed from its owning [`Db`].
pub struct Collection<'a> {
    id: u32,
    dimensions: u32,
    db: &'a mut Db,
}

impl<'a> Collection<'a> {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn add(&mut self, record: VectorRecord) -> Result<(), Error> {
        self.db.add_vector(self.id, self.dimensions, &record)
    }

    /// Number of vectors stored, via a single pass over the chain's
    /// per-page `item_count` fields (not a full slot scan).
    pub fn len(&mut self) -> Result<usize, Error> {
        let record = CollectionDirectory::get(&mut self.db.pager, self.id)?
            .ok_or(Error::CollectionNotFound(self.id))?;
        count_items::<VectorKind>(&mut self.db.pager, record.first_child_page)
    }

    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// All stored vectors, in chain order.
    pub fn iter_all(&mut self) -> Result<Vec<VectorRecord>, Error> {
        let record = CollectionDirectory::get(&mut self.db.pager, self.id)?
            .ok_or(Error::CollectionNotFound(self.id))?;
        collect_items::<VectorKind>(&mut self.db.pager, record.first_child_page)
    }
}

fn count_items<K: ItemKind>(pager: &mut Pager, first_page: u32) -> Result<usize, Error> {
    if first_page == 0 {
        return Ok(0);
    }
    let mut total = 0usize;
    let mut page_num = first_page;
    loop {
        let handle = pager.get_page::<K>(page_num)?;
        total += handle.item_count() as usize;
        let next = handle.next_page();
        pager.release_page(handle);
        if next == 0 {
            break;
        }
        page_num = next;
    }
    Ok(total)
}

/// Walks the chain's occupied items front to back via a [`Cursor`] (the
/// spec's "lazy sequence" read, collected eagerly here since the facade
/// returns an owned `Vec` rather than exposing pager borrows to callers).
fn collect_items<K: ItemKind>(pager: &mut Pager, first_page: u32) -> Result<Vec<K::Record>, Error> {
    if first_page == 0 {
        return Ok(Vec::new());
    }
    let mut cursor = Cursor::<K>::open(pager, first_page)?;
    let mut items = Vec::new();
    cursor.for_each_remaining(pager, |record| items.push(record))?;
    cursor.release(pager);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn create_insert_reopen_read() {
        let dir = TempDir::new("db").unwrap();
        let path = dir.path().join("db1");
        {
            let mut db = Db::open(&path).unwrap();
            let mut collection = db.create_collection(1, 3).unwrap();
            collection
                .add(VectorRecord {
                    id: 1,
                    position: vec![1.0, 2.0, 3.0],
                })
                .unwrap();
            collection
                .add(VectorRecord {
                    id: 2,
                    position: vec![4.0, 5.0, 6.0],
                })
                .unwrap();
            collection
                .add(VectorRecord {
                    id: 3,
                    position: vec![7.0, 8.0, 9.0],
                })
                .unwrap();
            db.flush().unwrap();
        }

        let mut db = Db::open(&path).unwrap();
        let mut collection = db.collection(1).unwrap();
        let all = collection.iter_all().unwrap();
        assert_eq!(
            all,
            vec![
                VectorRecord {
                    id: 1,
                    position: vec![1.0, 2.0, 3.0]
                },
                VectorRecord {
                    id: 2,
                    position: vec![4.0, 5.0, 6.0]
                },
                VectorRecord {
                    id: 3,
                    position: vec![7.0, 8.0, 9.0]
                },
            ]
        );
    }

    #[test]
    fn overflow_spans_two_pages() {
        let dir = TempDir::new("db").unwrap();
        let path = dir.path().join("db1");
        let mut db = Db::open_with(
            &path,
            OpenOptions {
                page_size: 256,
                cache_size: 16,
            },
        )
        .unwrap();
        let mut collection = db.create_collection(1, 3).unwrap();
        for i in 0..20u32 {
            collection
                .add(VectorRecord {
                    id: i,
                    position: vec![i as f32; 3],
                })
                .unwrap();
        }
        assert_eq!(collection.len().unwrap(), 20);
        drop(collection);
        // metadata(0) + directory(1) + first vector page(2) + one overflow.
        assert_eq!(db.page_count(), 4);
        db.flush().unwrap();
    }

    #[test]
    fn duplicate_collection_fails_but_original_survives() {
        let dir = TempDir::new("db").unwrap();
        let mut db = Db::open(dir.path().join("db1")).unwrap();
        db.create_collection(1, 3).unwrap();
        let result = db.create_collection(1, 4);
        assert!(matches!(result, Err(Error::CollectionAlreadyExists(1))));

        let collection = db.collection(1).unwrap();
        assert_eq!(collection.dimensions(), 3);
    }

    #[test]
    fn dimension_mismatch_then_success() {
        let dir = TempDir::new("db").unwrap();
        let mut db = Db::open(dir.path().join("db1")).unwrap();
        let mut collection = db.create_collection(1, 4).unwrap();

        let result = collection.add(VectorRecord {
            id: 1,
            position: vec![1.0, 2.0, 3.0],
        });
        assert!(matches!(result, Err(Error::InvalidDimensions { .. })));
        assert_eq!(collection.len().unwrap(), 0);

        collection
            .add(VectorRecord {
                id: 1,
                position: vec![1.0, 2.0, 3.0, 4.0],
            })
            .unwrap();
        assert_eq!(collection.len().unwrap(), 1);
    }
}
