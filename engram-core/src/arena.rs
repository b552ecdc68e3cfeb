//! Memory-mapped arena allocator over a growable file.
//!
//! # Design Principles
//!
//! - **Offsets, never pointers**: every allocation is identified by its byte
//!   offset in the file. Offsets stay valid across growth; raw pointers into
//!   the mapping do not, so nothing outside this module holds one.
//! - **Bump + free list**: allocation is a first-fit scan of a singly linked
//!   free list, falling back to bump allocation at the watermark. Freeing is
//!   constant time; adjacent free blocks are merged only on [`Arena::coalesce`].
//! - **Cross-process exclusion**: advisory whole-file locks via `fs2`,
//!   combined with an explicit [`Arena::refresh`] to pick up growth performed
//!   by a peer process.
//!
//! # File layout (little-endian)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     magic: u32 (0x4D454D46, "MEMF")
//! 4       4     version: u32 (opaque to the arena)
//! 8       8     file_size: u64
//! 16      8     allocated: u64 (bump watermark)
//! 24      8     free_list_head: u64 (0 = empty)
//! 32      ...   allocator region
//! ```
//!
//! Each allocated block is prefixed by `{size: u64}` where `size` includes
//! the prefix; the offset handed to callers points one u64 past it. A free
//! block reuses its first 16 bytes as `{size: u64, next: u64}`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{Result, StoreError};

/// Magic bytes identifying an arena file ("MEMF" as a little-endian u32).
pub const MAGIC: u32 = 0x4D45_4D46;

/// Size of the fixed arena header in bytes.
pub const HEADER_SIZE: u64 = 32;

/// Allocation granularity; every block size is a multiple of this.
const ALIGN: u64 = 8;

/// Size of the `{size}` prefix in front of every allocation.
const PREFIX: u64 = 8;

/// A free block is split only when the remainder can hold a free header
/// plus one aligned allocation.
const MIN_SPLIT: u64 = 24;

/// Slack added on top of the requested growth so a burst of small
/// allocations does not trigger a remap each.
const GROW_SLACK: u64 = 4096;

/// Minimum allocator region on a fresh file.
const MIN_REGION: u64 = 64;

// Header field offsets.
const OFF_MAGIC: u64 = 0;
const OFF_VERSION: u64 = 4;
const OFF_FILE_SIZE: u64 = 8;
const OFF_ALLOCATED: u64 = 16;
const OFF_FREE_HEAD: u64 = 24;

const fn align_up(v: u64) -> u64 {
    (v + ALIGN - 1) & !(ALIGN - 1)
}

/// Observable allocator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Size of the whole mapping in bytes.
    pub file_size: u64,
    /// Bump watermark; everything below it has been handed out at least once.
    pub allocated: u64,
    /// Offset of the first free block, 0 when the list is empty.
    pub free_list_head: u64,
}

/// Persistent, resizable, byte-addressable storage with allocator semantics.
///
/// The arena neither orders nor serializes its own operations; callers hold
/// an appropriate advisory lock around mutating sequences and call
/// [`Arena::refresh`] after acquiring one to observe growth by peers.
#[derive(Debug)]
pub struct Arena {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl Arena {
    /// Opens an arena file, creating and initializing it when absent.
    ///
    /// On create, `initial_size` is rounded up to at least the header plus a
    /// minimal allocator region.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when an existing file carries the
    /// wrong magic or an impossible header.
    pub fn open<P: AsRef<Path>>(path: P, initial_size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();

        if len < HEADER_SIZE {
            let size = initial_size.max(HEADER_SIZE + MIN_REGION);
            file.set_len(size)?;

            // SAFETY: the mapping is private to this process until open
            // returns; no aliasing view exists yet.
            let mmap = unsafe { MmapMut::map_mut(&file)? };
            let mut arena = Self { path, file, mmap };
            arena.write_u32(OFF_MAGIC, MAGIC)?;
            arena.write_u32(OFF_VERSION, 0)?;
            arena.write_u64(OFF_FILE_SIZE, size)?;
            arena.write_u64(OFF_ALLOCATED, HEADER_SIZE)?;
            arena.write_u64(OFF_FREE_HEAD, 0)?;
            arena.mmap.flush()?;
            return Ok(arena);
        }

        // SAFETY: same as above; concurrent mutators are excluded by the
        // advisory-lock discipline documented on the type.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let arena = Self { path, file, mmap };

        if arena.read_u32(OFF_MAGIC)? != MAGIC {
            return Err(StoreError::Corrupt(format!(
                "bad magic in {}",
                arena.path.display()
            )));
        }

        let allocated = arena.read_u64(OFF_ALLOCATED)?;
        let file_size = arena.read_u64(OFF_FILE_SIZE)?;
        if allocated < HEADER_SIZE || allocated > file_size || file_size > len {
            return Err(StoreError::Corrupt(format!(
                "impossible header in {}: allocated={}, file_size={}, backing={}",
                arena.path.display(),
                allocated,
                file_size,
                len
            )));
        }

        Ok(arena)
    }

    /// Allocates a region with at least `size` usable bytes and returns its
    /// offset.
    ///
    /// First-fit over the free list; blocks are split when the remainder is
    /// large enough to be useful, otherwise consumed whole. When no free
    /// block fits, the watermark is bumped, growing the file as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Oom`] when the OS refuses to grow the file.
    pub fn alloc(&mut self, size: u64) -> Result<u64> {
        // A block must be able to hold a {size, next} free header later.
        let total = align_up(size + PREFIX).max(16);

        // First-fit free-list scan.
        let mut prev = 0u64;
        let mut cur = self.read_u64(OFF_FREE_HEAD)?;
        while cur != 0 {
            let block_size = self.read_u64(cur)?;
            let next = self.read_u64(cur + 8)?;

            if block_size >= total {
                let remainder = block_size - total;
                let taken = if remainder >= MIN_SPLIT {
                    // Split: the tail becomes a free block in cur's place.
                    let tail = cur + total;
                    self.write_u64(tail, remainder)?;
                    self.write_u64(tail + 8, next)?;
                    self.relink(prev, tail)?;
                    total
                } else {
                    self.relink(prev, next)?;
                    block_size
                };
                self.write_u64(cur, taken)?;
                return Ok(cur + PREFIX);
            }

            prev = cur;
            cur = next;
        }

        // Bump allocation at the watermark.
        let allocated = self.read_u64(OFF_ALLOCATED)?;
        let file_size = self.read_u64(OFF_FILE_SIZE)?;
        if allocated + total > file_size {
            let new_size = (file_size * 2).max(allocated + total + GROW_SLACK);
            self.grow(new_size)?;
        }

        self.write_u64(allocated, total)?;
        self.write_u64(OFF_ALLOCATED, allocated + total)?;
        Ok(allocated + PREFIX)
    }

    /// Returns a block to the free list. Constant time, no coalescing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when `offset` does not point inside the
    /// mapping.
    pub fn free(&mut self, offset: u64) -> Result<()> {
        if offset < HEADER_SIZE + PREFIX {
            return Err(StoreError::Range {
                offset,
                len: 0,
                file_size: self.mmap.len() as u64,
            });
        }
        let block = offset - PREFIX;
        let head = self.read_u64(OFF_FREE_HEAD)?;
        // The size prefix is already in place; link the block in front.
        self.write_u64(block + 8, head)?;
        self.write_u64(OFF_FREE_HEAD, block)?;
        Ok(())
    }

    /// Sorts the free list by offset and merges adjacent blocks.
    ///
    /// Idempotent; the list is left in ascending offset order.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError::Range`] on a corrupted list.
    pub fn coalesce(&mut self) -> Result<()> {
        let mut blocks: Vec<(u64, u64)> = Vec::new();
        let mut cur = self.read_u64(OFF_FREE_HEAD)?;
        while cur != 0 {
            let size = self.read_u64(cur)?;
            let next = self.read_u64(cur + 8)?;
            blocks.push((cur, size));
            cur = next;
        }

        if blocks.is_empty() {
            return Ok(());
        }

        blocks.sort_unstable();

        let before = blocks.len();
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(before);
        for (off, size) in blocks {
            match merged.last_mut() {
                Some((last_off, last_size)) if *last_off + *last_size == off => {
                    *last_size += size;
                }
                _ => merged.push((off, size)),
            }
        }

        // Rebuild the list in offset order.
        self.write_u64(OFF_FREE_HEAD, merged[0].0)?;
        for i in 0..merged.len() {
            let (off, size) = merged[i];
            let next = merged.get(i + 1).map_or(0, |&(o, _)| o);
            self.write_u64(off, size)?;
            self.write_u64(off + 8, next)?;
        }

        log::trace!("coalesce: {} free blocks -> {}", before, merged.len());
        Ok(())
    }

    /// Copies `len` bytes starting at `offset` out of the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when the span crosses the end of the
    /// mapping.
    pub fn read_bytes(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        Ok(self.bytes(offset, len)?.to_vec())
    }

    /// Writes `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when the span crosses the end of the
    /// mapping.
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.bytes_mut(offset, data.len() as u64)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Borrows `len` bytes of the mapping starting at `offset`.
    ///
    /// The slice lifetime is tied to `&self`, which keeps remapping
    /// operations from running while it is alive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when the span crosses the end of the
    /// mapping.
    pub fn bytes(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let end = self.check_span(offset, len)?;
        Ok(&self.mmap[offset as usize..end as usize])
    }

    /// Mutable variant of [`Arena::bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when the span crosses the end of the
    /// mapping.
    pub fn bytes_mut(&mut self, offset: u64, len: u64) -> Result<&mut [u8]> {
        let end = self.check_span(offset, len)?;
        Ok(&mut self.mmap[offset as usize..end as usize])
    }

    fn check_span(&self, offset: u64, len: u64) -> Result<u64> {
        let file_size = self.mmap.len() as u64;
        let end = offset.checked_add(len).ok_or(StoreError::Range {
            offset,
            len,
            file_size,
        })?;
        if end > file_size {
            return Err(StoreError::Range {
                offset,
                len,
                file_size,
            });
        }
        Ok(end)
    }

    /// Reads a little-endian u16 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian u32 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian u64 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let b = self.bytes(offset, 8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian f64 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn read_f64(&self, offset: u64) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64(offset)?))
    }

    /// Writes a little-endian u16 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn write_u16(&mut self, offset: u64, value: u16) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian u32 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn write_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian u64 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn write_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian f64 at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] past the end of the mapping.
    pub fn write_f64(&mut self, offset: u64, value: f64) -> Result<()> {
        self.write_u64(offset, value.to_bits())
    }

    /// Blocks until a shared advisory lock on the file is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the acquisition.
    pub fn lock_shared(&self) -> Result<()> {
        fs2::FileExt::lock_shared(&self.file).map_err(StoreError::Lock)
    }

    /// Blocks until an exclusive advisory lock on the file is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the acquisition.
    pub fn lock_exclusive(&self) -> Result<()> {
        fs2::FileExt::lock_exclusive(&self.file).map_err(StoreError::Lock)
    }

    /// Releases the advisory lock held by this process, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the release.
    pub fn unlock(&self) -> Result<()> {
        fs2::FileExt::unlock(&self.file).map_err(StoreError::Lock)
    }

    /// Flushes the mapping and forces the file to stable storage.
    ///
    /// # Errors
    ///
    /// Propagates flush and fsync failures.
    pub fn sync(&mut self) -> Result<()> {
        self.mmap.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Re-maps the file when a peer process has grown it.
    ///
    /// Must be called after acquiring a lock and before reading, so writes
    /// from other processes that extended the file become visible.
    ///
    /// # Errors
    ///
    /// Propagates stat and remap failures.
    pub fn refresh(&mut self) -> Result<()> {
        let len = self.file.metadata()?.len();
        if len > self.mmap.len() as u64 {
            log::debug!(
                "refresh {}: remapping {} -> {} bytes",
                self.path.display(),
                self.mmap.len(),
                len
            );
            // SAFETY: the previous mapping is replaced wholesale; no slice
            // borrowed from it can be live because refresh takes &mut self.
            self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        }
        Ok(())
    }

    /// Version field of the header. Opaque to the arena itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] on a truncated mapping.
    pub fn version(&self) -> Result<u32> {
        self.read_u32(OFF_VERSION)
    }

    /// Sets the header version field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] on a truncated mapping.
    pub fn set_version(&mut self, version: u32) -> Result<()> {
        self.write_u32(OFF_VERSION, version)
    }

    /// Observable allocator state.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            file_size: self.read_u64(OFF_FILE_SIZE).unwrap_or(0),
            allocated: self.read_u64(OFF_ALLOCATED).unwrap_or(0),
            free_list_head: self.read_u64(OFF_FREE_HEAD).unwrap_or(0),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn relink(&mut self, prev: u64, next: u64) -> Result<()> {
        if prev == 0 {
            self.write_u64(OFF_FREE_HEAD, next)
        } else {
            self.write_u64(prev + 8, next)
        }
    }

    /// Grows the backing file and remaps. The mapping address may move;
    /// offsets remain valid.
    fn grow(&mut self, new_size: u64) -> Result<()> {
        let old_size = self.mmap.len();
        self.file
            .set_len(new_size)
            .map_err(|e| StoreError::Oom(format!("cannot grow to {} bytes: {}", new_size, e)))?;
        // SAFETY: as in refresh; &mut self guarantees no outstanding slices.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file)
                .map_err(|e| StoreError::Oom(format!("remap to {} bytes failed: {}", new_size, e)))?
        };
        self.write_u64(OFF_FILE_SIZE, new_size)?;
        log::debug!(
            "grew {}: {} -> {} bytes",
            self.path.display(),
            old_size,
            new_size
        );
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // Advisory locks die with the descriptor anyway; being explicit.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_temp() -> (Arena, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let arena = Arena::open(temp.path(), 4096).unwrap();
        (arena, temp)
    }

    #[test]
    fn test_fresh_header() {
        let (arena, _temp) = open_temp();
        let stats = arena.stats();
        assert_eq!(stats.file_size, 4096);
        assert_eq!(stats.allocated, HEADER_SIZE);
        assert_eq!(stats.free_list_head, 0);
        assert_eq!(arena.version().unwrap(), 0);
    }

    #[test]
    fn test_minimum_initial_size() {
        let temp = NamedTempFile::new().unwrap();
        let arena = Arena::open(temp.path(), 0).unwrap();
        assert_eq!(arena.stats().file_size, HEADER_SIZE + 64);
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let temp = NamedTempFile::new().unwrap();
        {
            let mut arena = Arena::open(temp.path(), 4096).unwrap();
            arena.write_u32(0, 0xDEAD_BEEF).unwrap();
            arena.sync().unwrap();
        }
        let err = Arena::open(temp.path(), 4096).unwrap_err();
        assert_eq!(err.code(), "CORRUPT");
    }

    #[test]
    fn test_alloc_is_aligned_and_prefixed() {
        let (mut arena, _temp) = open_temp();
        let a = arena.alloc(10).unwrap();
        assert_eq!(a % 8, 0);
        // Prefix holds the rounded total: 10 + 8 -> 24.
        assert_eq!(arena.read_u64(a - 8).unwrap(), 24);
        let b = arena.alloc(1).unwrap();
        assert_eq!(b, a + 24);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (mut arena, _temp) = open_temp();
        let off = arena.alloc(32).unwrap();
        let payload = [7u8; 32];
        arena.write_bytes(off, &payload).unwrap();
        assert_eq!(arena.read_bytes(off, 32).unwrap(), payload);
    }

    #[test]
    fn test_free_then_alloc_reuses_block() {
        let (mut arena, _temp) = open_temp();
        let a = arena.alloc(40).unwrap();
        let _b = arena.alloc(40).unwrap();
        arena.free(a).unwrap();
        let c = arena.alloc(40).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_first_fit_splits_large_block() {
        let (mut arena, _temp) = open_temp();
        let a = arena.alloc(128).unwrap();
        let _b = arena.alloc(8).unwrap();
        arena.free(a).unwrap();

        // A small allocation carves the front of the freed 136-byte block.
        let c = arena.alloc(8).unwrap();
        assert_eq!(c, a);
        assert_eq!(arena.read_u64(c - 8).unwrap(), 16);

        // The tail is still on the free list.
        let stats = arena.stats();
        assert_eq!(stats.free_list_head, a - 8 + 16);
    }

    #[test]
    fn test_coalesce_merges_adjacent() {
        let (mut arena, _temp) = open_temp();
        let a = arena.alloc(24).unwrap(); // 32-byte block
        let b = arena.alloc(24).unwrap(); // adjacent 32-byte block
        let _guard = arena.alloc(8).unwrap();

        arena.free(a).unwrap();
        arena.free(b).unwrap();
        arena.coalesce().unwrap();

        let before = arena.stats();
        // 48 usable bytes need a 56-byte block; only the merged 64-byte
        // block can satisfy it without growing the file.
        let c = arena.alloc(48).unwrap();
        assert_eq!(c, a);
        let after = arena.stats();
        assert_eq!(before.file_size, after.file_size);
        assert_eq!(before.allocated, after.allocated);
    }

    #[test]
    fn test_coalesce_is_idempotent() {
        let (mut arena, _temp) = open_temp();
        let a = arena.alloc(24).unwrap();
        let b = arena.alloc(24).unwrap();
        arena.free(b).unwrap();
        arena.free(a).unwrap();
        arena.coalesce().unwrap();
        let first = arena.stats();
        arena.coalesce().unwrap();
        assert_eq!(arena.stats(), first);
    }

    #[test]
    fn test_growth_doubles_file() {
        let (mut arena, _temp) = open_temp();
        let big = arena.alloc(8192).unwrap();
        assert!(big > 0);
        // max(2 * 4096, 32 + 8200 + 4096)
        assert_eq!(arena.stats().file_size, 12_328);
        // Data written past the original size must stick.
        arena.write_bytes(big, &[1u8; 8192]).unwrap();
        assert_eq!(arena.read_bytes(big, 8192).unwrap(), vec![1u8; 8192]);
    }

    #[test]
    fn test_read_past_end_is_range() {
        let (arena, _temp) = open_temp();
        let err = arena.read_bytes(4090, 16).unwrap_err();
        assert_eq!(err.code(), "RANGE");
    }

    #[test]
    fn test_version_field_roundtrip() {
        let temp = NamedTempFile::new().unwrap();
        {
            let mut arena = Arena::open(temp.path(), 4096).unwrap();
            arena.set_version(2).unwrap();
            arena.sync().unwrap();
        }
        let arena = Arena::open(temp.path(), 4096).unwrap();
        assert_eq!(arena.version().unwrap(), 2);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp = NamedTempFile::new().unwrap();
        let off;
        {
            let mut arena = Arena::open(temp.path(), 4096).unwrap();
            off = arena.alloc(16).unwrap();
            arena.write_bytes(off, b"persist me  nice").unwrap();
            arena.sync().unwrap();
        }
        let arena = Arena::open(temp.path(), 4096).unwrap();
        assert_eq!(arena.read_bytes(off, 16).unwrap(), b"persist me  nice");
    }

    #[test]
    fn test_lock_roundtrip() {
        let (arena, _temp) = open_temp();
        arena.lock_shared().unwrap();
        arena.unlock().unwrap();
        arena.lock_exclusive().unwrap();
        arena.unlock().unwrap();
    }

    #[test]
    fn test_refresh_sees_external_growth() {
        let temp = NamedTempFile::new().unwrap();
        let mut reader = Arena::open(temp.path(), 4096).unwrap();

        // A second instance grows the file past the reader's mapping.
        {
            let mut writer = Arena::open(temp.path(), 4096).unwrap();
            let off = writer.alloc(16_384).unwrap();
            writer.write_bytes(off, &[9u8; 16_384]).unwrap();
            writer.sync().unwrap();
        }

        assert_eq!(reader.read_bytes(8192, 1).unwrap_err().code(), "RANGE");
        reader.refresh().unwrap();
        assert!(reader.stats().file_size > 4096);
    }
}
