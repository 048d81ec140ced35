//! Append-only cell storage over pooled blocks.

use crate::config::{ArenaConfig, NULL_SENTINEL, OverflowPolicy};
use crate::pool::ArenaPools;
use parking_lot::RwLock;
use rf_error::{ArenaError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Highest byte offset an index entry can address.
const MAX_ADDRESSABLE_BYTES: u64 = u32::MAX as u64;

/// Location of one cell's bytes inside the arena.
///
/// A `length` of [`NULL_SENTINEL`] marks a null cell; any other length,
/// zero included, is a present string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellEntry {
    /// Byte offset from the start of the first block
    pub offset: u32,

    /// Payload length in bytes, or [`NULL_SENTINEL`]
    pub length: i32,
}

impl CellEntry {
    /// Entry recorded for a null cell.
    pub const NULL: CellEntry = CellEntry {
        offset: 0,
        length: NULL_SENTINEL,
    };

    /// Whether this entry marks a null cell.
    pub fn is_null(&self) -> bool {
        self.length == NULL_SENTINEL
    }
}

/// The pooled buffers. `None` once they have gone back to the pool.
struct ArenaStorage {
    blocks: Vec<Vec<u8>>,
    index: Vec<Vec<CellEntry>>,
}

/// Cell payload storage for one chunk.
///
/// Payloads are copied back to back into fixed-size blocks; a cell may
/// straddle any number of block boundaries. Each append records an
/// `(offset, length)` entry in pooled index blocks, so the n-th append is
/// cell `n`.
///
/// Writes take `&mut self` and never lock. Reads and [`BlockArena::release`]
/// take `&self`, so a populated arena can be shared between threads; the
/// storage lock is only contended when a release races a read.
pub struct BlockArena {
    cell_count: usize,
    block_size: usize,
    block_shift: u32,
    index_block_len: usize,
    index_shift: u32,
    index_capacity: usize,
    overflow_policy: OverflowPolicy,
    block_count: usize,
    cells_written: usize,
    bytes_written: u64,
    storage: RwLock<Option<ArenaStorage>>,
    released: AtomicBool,
    pools: ArenaPools,
}

impl BlockArena {
    /// Create an arena for `row_count * col_count` cells.
    ///
    /// The data block count comes from the uncompressed size estimate minus
    /// the wire format's punctuation (two brackets per row plus one separator
    /// per cell), rounded up to whole blocks. At least one data block and one
    /// index block are always allocated, so empty chunks are fine.
    pub fn new(
        row_count: usize,
        col_count: usize,
        estimated_uncompressed_bytes: u64,
        pools: ArenaPools,
        config: &ArenaConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(ArenaError::CapacityComputation)?;
        let (cell_count, block_count, index_block_count) =
            plan_capacity(row_count, col_count, estimated_uncompressed_bytes, config)?;

        let blocks = (0..block_count)
            .map(|_| pools.bytes.rent(config.block_size))
            .collect();
        let index = (0..index_block_count)
            .map(|_| pools.index.rent(config.index_block_len))
            .collect();

        debug!(
            rows = row_count,
            cols = col_count,
            block_count,
            index_block_count,
            "Arena allocated"
        );

        Ok(Self {
            cell_count,
            block_size: config.block_size,
            block_shift: config.block_size.trailing_zeros(),
            index_block_len: config.index_block_len,
            index_shift: config.index_block_len.trailing_zeros(),
            index_capacity: index_block_count * config.index_block_len,
            overflow_policy: config.overflow_policy,
            block_count,
            cells_written: 0,
            bytes_written: 0,
            storage: RwLock::new(Some(ArenaStorage { blocks, index })),
            released: AtomicBool::new(false),
            pools,
        })
    }

    /// Appends the next cell. `None` stores a null without touching the blocks.
    pub fn append(&mut self, value: Option<&[u8]>) -> Result<()> {
        let storage = self
            .storage
            .get_mut()
            .as_mut()
            .ok_or(ArenaError::UseAfterRelease)?;

        let cell = self.cells_written;
        if cell >= self.index_capacity {
            return Err(ArenaError::IndexOverflow {
                cell,
                capacity: self.index_capacity,
            }
            .into());
        }

        let entry = match value {
            None => CellEntry::NULL,
            Some(bytes) => {
                let offset = self.bytes_written;
                let needed = offset + bytes.len() as u64;
                let capacity = storage.blocks.len() as u64 * self.block_size as u64;
                let length = i32::try_from(bytes.len())
                    .map_err(|_| ArenaError::Overflow { needed, capacity })?;

                if needed > capacity {
                    match self.overflow_policy {
                        OverflowPolicy::Fail => {
                            return Err(ArenaError::Overflow { needed, capacity }.into());
                        }
                        OverflowPolicy::Grow => {
                            if needed > MAX_ADDRESSABLE_BYTES {
                                return Err(ArenaError::Overflow {
                                    needed,
                                    capacity: MAX_ADDRESSABLE_BYTES,
                                }
                                .into());
                            }
                            let target = needed.div_ceil(self.block_size as u64) as usize;
                            let added = target - storage.blocks.len();
                            storage
                                .blocks
                                .extend((0..added).map(|_| self.pools.bytes.rent(self.block_size)));
                            self.block_count = storage.blocks.len();
                            warn!(
                                cell,
                                added_blocks = added,
                                needed,
                                "Chunk payload exceeded its size estimate, growing arena"
                            );
                        }
                    }
                }

                copy_into_blocks(
                    &mut storage.blocks,
                    self.block_shift,
                    offset as usize,
                    bytes,
                );
                self.bytes_written = needed;
                CellEntry {
                    offset: offset as u32,
                    length,
                }
            }
        };

        storage.index[cell >> self.index_shift][cell & (self.index_block_len - 1)] = entry;
        self.cells_written += 1;
        Ok(())
    }

    /// Looks up the index entry of a written cell.
    pub fn entry(&self, cell: usize) -> Result<CellEntry> {
        let guard = self.storage.read();
        let storage = guard.as_ref().ok_or(ArenaError::UseAfterRelease)?;
        self.entry_in(storage, cell)
    }

    /// Calls `f` with the cell's text, or `None` for a null cell.
    ///
    /// A cell that sits inside one block is decoded in place. A cell that
    /// straddles blocks is gathered into a scratch buffer rented from the
    /// byte pool, which goes back as soon as `f` returns.
    pub fn read_with<R>(&self, cell: usize, f: impl FnOnce(Option<&str>) -> R) -> Result<R> {
        let guard = self.storage.read();
        let storage = guard.as_ref().ok_or(ArenaError::UseAfterRelease)?;
        let entry = self.entry_in(storage, cell)?;

        if entry.is_null() {
            return Ok(f(None));
        }
        let len = entry.length as usize;
        if len == 0 {
            return Ok(f(Some("")));
        }

        let offset = entry.offset as usize;
        let block = offset >> self.block_shift;
        let within = offset & (self.block_size - 1);

        if self.block_size - within >= len {
            let bytes = &storage.blocks[block][within..within + len];
            let text = std::str::from_utf8(bytes)
                .map_err(|source| ArenaError::InvalidEncoding { cell, source })?;
            return Ok(f(Some(text)));
        }

        // Scratch is rented in power-of-two sizes so the pool sees a few
        // lengths instead of one per cell.
        trace!(cell, offset, len, "Reading cell across block boundary");
        let mut scratch = self.pools.bytes.rent(len.next_power_of_two());
        if scratch.len() < len {
            scratch.resize(len, 0);
        }
        copy_from_blocks(&storage.blocks, self.block_shift, offset, &mut scratch[..len]);
        let result = match std::str::from_utf8(&scratch[..len]) {
            Ok(text) => Ok(f(Some(text))),
            Err(source) => Err(ArenaError::InvalidEncoding { cell, source }.into()),
        };
        self.pools.bytes.give_back(scratch);
        result
    }

    /// Reads a cell into an owned string.
    pub fn read(&self, cell: usize) -> Result<Option<String>> {
        self.read_with(cell, |text| text.map(str::to_owned))
    }

    /// Returns every buffer to the pool.
    ///
    /// Only the first call does anything and returns `true`; later or
    /// concurrent calls return `false`. Reads and appends fail with
    /// [`ArenaError::UseAfterRelease`] afterwards.
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let Some(storage) = self.storage.write().take() else {
            return false;
        };
        let block_count = storage.blocks.len();
        let index_block_count = storage.index.len();
        for block in storage.blocks {
            self.pools.bytes.give_back(block);
        }
        for index in storage.index {
            self.pools.index.give_back(index);
        }

        debug!(block_count, index_block_count, "Arena released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Number of cells the arena was sized for.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn cells_written(&self) -> usize {
        self.cells_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Total payload capacity of the current blocks.
    pub fn capacity_bytes(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64
    }

    fn entry_in(&self, storage: &ArenaStorage, cell: usize) -> Result<CellEntry> {
        if cell >= self.cells_written {
            return Err(ArenaError::CellOutOfRange {
                cell,
                written: self.cells_written,
            }
            .into());
        }
        Ok(storage.index[cell >> self.index_shift][cell & (self.index_block_len - 1)])
    }
}

impl Drop for BlockArena {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BlockArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockArena")
            .field("cell_count", &self.cell_count)
            .field("cells_written", &self.cells_written)
            .field("bytes_written", &self.bytes_written)
            .field("block_count", &self.block_count)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Returns `(cell_count, block_count, index_block_count)`.
fn plan_capacity(
    row_count: usize,
    col_count: usize,
    estimated_uncompressed_bytes: u64,
    config: &ArenaConfig,
) -> Result<(usize, usize, usize)> {
    let cell_count = row_count.checked_mul(col_count).ok_or_else(|| {
        ArenaError::CapacityComputation(format!(
            "{} rows x {} columns overflows the cell count",
            row_count, col_count
        ))
    })?;

    let punctuation = (row_count as u64)
        .saturating_mul(2)
        .saturating_add(cell_count as u64);
    let payload = estimated_uncompressed_bytes.saturating_sub(punctuation);
    let block_size = config.block_size as u64;
    let block_count = payload.div_ceil(block_size).max(1);
    if block_count.saturating_mul(block_size) > MAX_ADDRESSABLE_BYTES {
        return Err(ArenaError::CapacityComputation(format!(
            "estimated payload of {} bytes exceeds 32-bit cell offsets",
            payload
        ))
        .into());
    }

    let index_block_count = cell_count.div_ceil(config.index_block_len).max(1);
    Ok((cell_count, block_count as usize, index_block_count))
}

fn copy_into_blocks(blocks: &mut [Vec<u8>], block_shift: u32, offset: usize, bytes: &[u8]) {
    let block_size = 1usize << block_shift;
    let mut position = offset;
    let mut copied = 0;
    while copied < bytes.len() {
        let block = position >> block_shift;
        let within = position & (block_size - 1);
        let n = (block_size - within).min(bytes.len() - copied);
        blocks[block][within..within + n].copy_from_slice(&bytes[copied..copied + n]);
        copied += n;
        position += n;
    }
}

fn copy_from_blocks(blocks: &[Vec<u8>], block_shift: u32, offset: usize, out: &mut [u8]) {
    let block_size = 1usize << block_shift;
    let mut position = offset;
    let mut copied = 0;
    while copied < out.len() {
        let block = position >> block_shift;
        let within = position & (block_size - 1);
        let n = (block_size - within).min(out.len() - copied);
        out[copied..copied + n].copy_from_slice(&blocks[block][within..within + n]);
        copied += n;
        position += n;
    }
}
