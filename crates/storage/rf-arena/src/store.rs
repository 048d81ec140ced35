//! Chunk store: a block arena bound to chunk identity.

use crate::arena::BlockArena;
use crate::config::ArenaConfig;
use crate::pool::ArenaPools;
use rf_error::{Result, StoreError};
use rf_traits::CellSink;
use rf_types::ChunkDescriptor;

/// The materialized cells of one result chunk.
///
/// A store is created empty, populated by exactly `row_count * col_count`
/// row-major [`ChunkStore::set_cell`] calls, and sealed when the last cell
/// lands. Reads are only allowed once sealed.
///
/// Call [`ChunkStore::release`] when done reading; dropping the store
/// releases its buffers as well.
#[derive(Debug)]
pub struct ChunkStore {
    descriptor: ChunkDescriptor,
    arena: BlockArena,
    sealed: bool,
}

impl ChunkStore {
    /// Create an empty store sized from the descriptor.
    pub fn new(
        descriptor: ChunkDescriptor,
        pools: ArenaPools,
        config: &ArenaConfig,
    ) -> Result<Self> {
        let arena = BlockArena::new(
            descriptor.row_count,
            descriptor.col_count,
            descriptor.estimated_uncompressed_bytes,
            pools,
            config,
        )?;
        let sealed = arena.cell_count() == 0;

        Ok(Self {
            descriptor,
            arena,
            sealed,
        })
    }

    /// Writes the next cell. Cells must arrive in row-major order.
    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<&[u8]>) -> Result<()> {
        if self.sealed {
            return Err(StoreError::AlreadySealed.into());
        }
        let cell = self.cell_index(row, col)?;
        let expected = self.arena.cells_written();
        if cell != expected {
            return Err(StoreError::OutOfOrder {
                expected,
                got: cell,
            }
            .into());
        }

        self.arena.append(value)?;
        if self.arena.cells_written() == self.arena.cell_count() {
            self.sealed = true;
        }
        Ok(())
    }

    /// Confirms every cell has been written.
    pub fn seal(&mut self) -> Result<()> {
        if self.arena.cells_written() != self.arena.cell_count() {
            return Err(self.not_sealed());
        }
        self.sealed = true;
        Ok(())
    }

    /// Reads a cell; `None` for null.
    pub fn get_cell(&self, row: usize, col: usize) -> Result<Option<String>> {
        self.with_cell(row, col, |text| text.map(str::to_owned))
    }

    /// Calls `f` with a cell's text without copying it out of the arena
    /// (unless the cell straddles blocks).
    pub fn with_cell<R>(
        &self,
        row: usize,
        col: usize,
        f: impl FnOnce(Option<&str>) -> R,
    ) -> Result<R> {
        if !self.sealed {
            return Err(self.not_sealed());
        }
        let cell = self.cell_index(row, col)?;
        self.arena.read_with(cell, f)
    }

    /// Reads a whole row.
    pub fn row(&self, row: usize) -> Result<Vec<Option<String>>> {
        (0..self.descriptor.col_count)
            .map(|col| self.get_cell(row, col))
            .collect()
    }

    /// Returns the arena's buffers to the pool. Safe to call more than once;
    /// only the first call returns `true`.
    pub fn release(&self) -> bool {
        self.arena.release()
    }

    pub fn descriptor(&self) -> &ChunkDescriptor {
        &self.descriptor
    }

    pub fn chunk_index(&self) -> usize {
        self.descriptor.index
    }

    pub fn row_count(&self) -> usize {
        self.descriptor.row_count
    }

    pub fn col_count(&self) -> usize {
        self.descriptor.col_count
    }

    pub fn locator(&self) -> &str {
        &self.descriptor.locator
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_released(&self) -> bool {
        self.arena.is_released()
    }

    pub fn cells_written(&self) -> usize {
        self.arena.cells_written()
    }

    pub fn bytes_written(&self) -> u64 {
        self.arena.bytes_written()
    }

    /// The underlying arena.
    pub fn arena(&self) -> &BlockArena {
        &self.arena
    }

    fn cell_index(&self, row: usize, col: usize) -> Result<usize> {
        let rows = self.descriptor.row_count;
        let cols = self.descriptor.col_count;
        if row >= rows || col >= cols {
            return Err(StoreError::CellOutOfBounds {
                row,
                col,
                rows,
                cols,
            }
            .into());
        }
        Ok(row * cols + col)
    }

    fn not_sealed(&self) -> rf_error::RfError {
        StoreError::NotSealed {
            written: self.arena.cells_written(),
            expected: self.arena.cell_count(),
        }
        .into()
    }
}

impl CellSink for ChunkStore {
    fn set_cell(&mut self, row: usize, col: usize, value: Option<&[u8]>) -> Result<()> {
        ChunkStore::set_cell(self, row, col, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tracking_pools;
    use rf_error::RfError;

    fn config() -> ArenaConfig {
        ArenaConfig::new()
            .with_block_layout(32, 8)
            .with_pooling_threshold(0)
    }

    fn store(rows: usize, cols: usize, estimate: u64) -> ChunkStore {
        let descriptor =
            ChunkDescriptor::new(7, rows, cols, "https://stage/results/chunk_7", estimate);
        ChunkStore::new(descriptor, ArenaPools::shared(&config()), &config()).unwrap()
    }

    #[test]
    fn test_set_and_get_cells() {
        let rows = [
            [Some("1"), Some("alice"), None],
            [Some("2"), Some(""), Some("a much longer value that straddles blocks")],
        ];
        let mut store = store(2, 3, 200);
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                store.set_cell(r, c, value.map(str::as_bytes)).unwrap();
            }
        }

        assert!(store.is_sealed());
        assert_eq!(store.chunk_index(), 7);
        assert_eq!(store.locator(), "https://stage/results/chunk_7");
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                assert_eq!(store.get_cell(r, c).unwrap().as_deref(), *value);
            }
        }
        assert_eq!(
            store.row(0).unwrap(),
            vec![Some("1".to_string()), Some("alice".to_string()), None]
        );
    }

    #[test]
    fn test_read_before_sealed() {
        let mut store = store(2, 2, 64);
        store.set_cell(0, 0, Some(b"a")).unwrap();

        let err = store.get_cell(0, 0).unwrap_err();
        assert!(matches!(
            err,
            RfError::Store(StoreError::NotSealed {
                written: 1,
                expected: 4
            })
        ));
        assert!(store.seal().is_err());
    }

    #[test]
    fn test_out_of_order_write_rejected() {
        let mut store = store(2, 2, 64);
        store.set_cell(0, 0, Some(b"a")).unwrap();

        let err = store.set_cell(1, 0, Some(b"b")).unwrap_err();
        assert!(matches!(
            err,
            RfError::Store(StoreError::OutOfOrder {
                expected: 1,
                got: 2
            })
        ));
        // Rejected write did not advance the cursor
        store.set_cell(0, 1, Some(b"b")).unwrap();
    }

    #[test]
    fn test_bounds_and_sealed_writes() {
        let mut store = store(1, 2, 64);
        assert!(matches!(
            store.set_cell(0, 2, None).unwrap_err(),
            RfError::Store(StoreError::CellOutOfBounds { col: 2, .. })
        ));

        store.set_cell(0, 0, None).unwrap();
        store.set_cell(0, 1, None).unwrap();
        assert!(matches!(
            store.set_cell(0, 1, None).unwrap_err(),
            RfError::Store(StoreError::AlreadySealed)
        ));
        assert!(matches!(
            store.get_cell(1, 0).unwrap_err(),
            RfError::Store(StoreError::CellOutOfBounds { row: 1, .. })
        ));
        assert_eq!(store.bytes_written(), 0);
    }

    #[test]
    fn test_empty_chunk_is_sealed() {
        let mut store = store(0, 5, 0);
        assert!(store.is_sealed());
        assert!(store.seal().is_ok());
    }

    #[test]
    fn test_with_cell_borrows() {
        let mut store = store(1, 1, 16);
        store.set_cell(0, 0, Some("naïve".as_bytes())).unwrap();

        let chars = store.with_cell(0, 0, |text| text.map(|t| t.chars().count())).unwrap();
        assert_eq!(chars, Some(5));
    }

    #[test]
    fn test_sink_trait_writes_through() {
        let mut store = store(1, 2, 16);
        {
            let sink: &mut dyn CellSink = &mut store;
            sink.set_cell(0, 0, Some(b"x")).unwrap();
            sink.set_cell(0, 1, None).unwrap();
        }
        assert_eq!(store.get_cell(0, 0).unwrap().as_deref(), Some("x"));
        assert_eq!(store.get_cell(0, 1).unwrap(), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (bytes, index, pools) = tracking_pools();
        let descriptor = ChunkDescriptor::new(0, 3, 3, "mem://0", 120);
        let mut store = ChunkStore::new(descriptor, pools, &config()).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                store.set_cell(r, c, Some(b"cell-value")).unwrap();
            }
        }

        assert!(store.release());
        assert!(!store.release());
        assert!(store.is_released());
        assert!(store.get_cell(0, 0).is_err());
        drop(store);

        bytes.assert_balanced();
        index.assert_balanced();
    }
}
