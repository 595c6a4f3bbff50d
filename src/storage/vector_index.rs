//! Per-collection vector indexes.
//!
//! `FlatVectorIndex` is a chained-page store of vector records, appended to
//! with a brute-force `ItemManager<vector>` — there is no acceleration
//! structure, matching the flat index's name. Opening one gates the
//! collection's `Quantization` against what the flat index can serve.
//! `IvfVectorIndex` is declared for the `index_kind = ivf` tag but is not
//! exercised anywhere in scope; its constructor returns `Unimplemented`.

use crate::error::Error;
use crate::storage::manager::ItemManager;
use crate::storage::page::{self, vector_item_size, Quantization, VectorKind, VectorRecord};
use crate::storage::pager::Pager;

/// Capability set shared by every index kind: `add` one vector, and a
/// terminal `close` that releases any pinned state.
pub trait VectorIndex {
    fn add(&mut self, pager: &mut Pager, record: &VectorRecord) -> Result<(), Error>;
    fn close(self, pager: &mut Pager);
}

pub struct FlatVectorIndex {
    manager: ItemManager<VectorKind>,
    item_size: u32,
}

impl FlatVectorIndex {
    /// Opens an index anchored at `first_page`, an already-allocated
    /// vector-page chain for `dimensions`-dimensional vectors. Gates the
    /// collection's `quantization` at open time, per §4.5, rather than
    /// per-record — `VectorRecord` itself carries no quantization tag.
    pub fn open(
        pager: &mut Pager,
        first_page: u32,
        dimensions: u32,
        quantization: Quantization,
    ) -> Result<Self, Error> {
        page::require_supported_quantization(quantization)?;
        let manager = ItemManager::<VectorKind>::open(pager, first_page)?;
        Ok(Self {
            manager,
            item_size: vector_item_size(dimensions),
        })
    }
}

impl VectorIndex for FlatVectorIndex {
    fn add(&mut self, pager: &mut Pager, record: &VectorRecord) -> Result<(), Error> {
        self.manager.append(pager, self.item_size, record)?;
        Ok(())
    }

    fn close(self, pager: &mut Pager) {
        self.manager.release(pager);
    }
}

pub struct IvfVectorIndex;

impl IvfVectorIndex {
    pub fn open(_pager: &mut Pager, _first_page: u32, _dimensions: u32) -> Result<Self, Error> {
        Err(Error::Unimplemented("inverted-file vector index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::vector_item_size;
    use crate::storage::pager::Pager;
    use tempdir::TempDir;

    #[test]
    fn flat_index_appends_vectors() {
        let dir = TempDir::new("vector_index").unwrap();
        let mut pager = Pager::open(dir.path().join("db"), 256, 16).unwrap();
        let item_size = vector_item_size(3);
        let handle = pager.new_page::<VectorKind>(0, item_size).unwrap();
        let first_page = handle.page_num();
        pager.release_page(handle);

        let mut index =
            FlatVectorIndex::open(&mut pager, first_page, 3, Quantization::None).unwrap();
        for i in 0..3 {
            index
                .add(
                    &mut pager,
                    &VectorRecord {
                        id: i,
                        position: vec![i as f32, i as f32 + 1.0, i as f32 + 2.0],
                    },
                )
                .unwrap();
        }
        index.close(&mut pager);
    }

    #[test]
    fn ivf_index_is_unimplemented() {
        let dir = TempDir::new("vector_index").unwrap();
        let mut pager = Pager::open(dir.path().join("db"), 256, 16).unwrap();
        let result = IvfVectorIndex::open(&mut pager, 0, 3);
        assert!(matches!(result, Err(Error::Unimplemented(_))));
    }
}
