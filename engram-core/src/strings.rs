//! Refcounted, interned string table backed by an arena file.
//!
//! A string's identity is the arena offset of its entry, which makes ids
//! stable across close/reopen and cheap to embed in fixed-size records.
//! Lookup goes through an open-addressed hash directory (FNV-1a 32-bit,
//! linear probing, backshift deletion) kept in the same arena.
//!
//! # On-disk structures (little-endian)
//!
//! Table header, the first allocation of a fresh arena:
//!
//! ```text
//! hash_index_offset: u64, entry_count: u32, _pad: u32
//! ```
//!
//! String entry: `{refcount: u32, hash: u32, length: u16, bytes[length]}`.
//!
//! Hash index block: `{bucket_count: u32, _pad: u32}` then `bucket_count`
//! u64 slots holding entry offsets (0 = empty).

use crate::arena::{Arena, HEADER_SIZE};
use crate::error::{Result, StoreError};
use std::path::Path;

/// Offset of the table header: first allocation after the 32-byte arena
/// header and the 8-byte allocation prefix.
const TABLE_HEADER_OFFSET: u64 = HEADER_SIZE + 8;

/// Bucket count of the index in a fresh table.
const INITIAL_BUCKETS: u32 = 64;

/// Longest representable entry; `length` is a u16.
const MAX_STRING_LEN: usize = 65_535;

/// Fixed part of an entry in front of the bytes.
const ENTRY_HEADER: u64 = 10;

// Field offsets within the table header.
const HDR_INDEX: u64 = 0;
const HDR_COUNT: u64 = 8;

/// FNV-1a 32-bit over raw bytes.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// One occupied directory slot, as yielded by [`StringTable::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry {
    /// The string's identity: its entry offset in the arena.
    pub id: u64,
    /// Stored bytes, verbatim.
    pub bytes: Vec<u8>,
    /// Live reference count.
    pub refcount: u32,
}

/// Deduplicating, refcounted mapping between byte strings and stable ids.
#[derive(Debug)]
pub struct StringTable {
    arena: Arena,
}

impl StringTable {
    /// Opens a string-table file, initializing the header and an empty hash
    /// index when the file is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when an existing file does not carry
    /// a plausible table header.
    pub fn open<P: AsRef<Path>>(path: P, initial_size: u64) -> Result<Self> {
        let mut arena = Arena::open(path, initial_size)?;

        if arena.stats().allocated == HEADER_SIZE {
            let header = arena.alloc(16)?;
            debug_assert_eq!(header, TABLE_HEADER_OFFSET);
            let index = Self::alloc_index(&mut arena, INITIAL_BUCKETS)?;
            arena.write_u64(header + HDR_INDEX, index)?;
            arena.write_u32(header + HDR_COUNT, 0)?;
            arena.write_u32(header + HDR_COUNT + 4, 0)?;
            return Ok(Self { arena });
        }

        let table = Self { arena };
        let index = table.index_offset()?;
        if index == 0 {
            return Err(StoreError::Corrupt(
                "string table header points at no hash index".into(),
            ));
        }
        let buckets = table.arena.read_u32(index).map_err(|_| {
            StoreError::Corrupt("string table hash index lies outside the file".into())
        })?;
        if buckets == 0 {
            return Err(StoreError::Corrupt(
                "string table hash index has zero buckets".into(),
            ));
        }
        Ok(table)
    }

    /// Interns `bytes`, returning the id of the (possibly pre-existing)
    /// entry. Re-interning an existing string increments its refcount.
    ///
    /// # Errors
    ///
    /// [`StoreError::StringTooLong`] above 65 535 bytes; [`StoreError::Oom`]
    /// when the entry or a rehashed index cannot be allocated.
    pub fn intern(&mut self, bytes: &[u8]) -> Result<u64> {
        if bytes.len() > MAX_STRING_LEN {
            return Err(StoreError::StringTooLong(bytes.len()));
        }

        let hash = fnv1a(bytes);
        let index = self.index_offset()?;
        let buckets = u64::from(self.arena.read_u32(index)?);

        let mut i = u64::from(hash) % buckets;
        for _ in 0..buckets {
            let slot = self.arena.read_u64(Self::slot_off(index, i))?;
            if slot == 0 {
                let id = self.insert_entry(index, i, hash, bytes)?;
                self.maybe_rehash()?;
                return Ok(id);
            }
            if self.entry_matches(slot, hash, bytes)? {
                self.add_ref(slot)?;
                return Ok(slot);
            }
            i = (i + 1) % buckets;
        }

        Err(StoreError::Corrupt("hash index has no empty slot".into()))
    }

    /// Looks `bytes` up without mutating anything.
    ///
    /// # Errors
    ///
    /// Propagates read failures from the underlying arena.
    pub fn find(&self, bytes: &[u8]) -> Result<Option<u64>> {
        if bytes.len() > MAX_STRING_LEN {
            return Ok(None);
        }

        let hash = fnv1a(bytes);
        let index = self.index_offset()?;
        let buckets = u64::from(self.arena.read_u32(index)?);

        let mut i = u64::from(hash) % buckets;
        for _ in 0..buckets {
            let slot = self.arena.read_u64(Self::slot_off(index, i))?;
            if slot == 0 {
                return Ok(None);
            }
            if self.entry_matches(slot, hash, bytes)? {
                return Ok(Some(slot));
            }
            i = (i + 1) % buckets;
        }
        Ok(None)
    }

    /// Returns the stored bytes of `id`, verbatim. The table does not
    /// validate UTF-8; callers decide.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] when `id` does not point at an entry
    /// inside the file.
    pub fn get(&self, id: u64) -> Result<Vec<u8>> {
        let len = u64::from(self.arena.read_u16(id + 8)?);
        self.arena.read_bytes(id + ENTRY_HEADER, len)
    }

    /// Increments the refcount of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] on an id outside the file.
    pub fn add_ref(&mut self, id: u64) -> Result<()> {
        let rc = self.arena.read_u32(id)?;
        self.arena.write_u32(id, rc + 1)
    }

    /// Drops one reference to `id`. The last release removes the entry from
    /// the index (backshifting the probe chain) and frees its storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when `id` is not present in the hash
    /// index.
    pub fn release(&mut self, id: u64) -> Result<()> {
        let rc = self.arena.read_u32(id)?;
        if rc > 1 {
            return self.arena.write_u32(id, rc - 1);
        }

        let hash = self.arena.read_u32(id + 4)?;
        let index = self.index_offset()?;
        let buckets = u64::from(self.arena.read_u32(index)?);

        let mut i = u64::from(hash) % buckets;
        let mut found = None;
        for _ in 0..buckets {
            let slot = self.arena.read_u64(Self::slot_off(index, i))?;
            if slot == 0 {
                break;
            }
            if slot == id {
                found = Some(i);
                break;
            }
            i = (i + 1) % buckets;
        }
        let Some(mut hole) = found else {
            return Err(StoreError::Corrupt(format!(
                "released string id {} is not in the hash index",
                id
            )));
        };

        // Backshift: pull forward every entry whose probe chain passes
        // through the hole.
        let mut j = (hole + 1) % buckets;
        loop {
            let slot = self.arena.read_u64(Self::slot_off(index, j))?;
            if slot == 0 {
                break;
            }
            let natural = u64::from(self.arena.read_u32(slot + 4)?) % buckets;
            let reach_natural = (j + buckets - natural) % buckets;
            let reach_hole = (j + buckets - hole) % buckets;
            if reach_natural >= reach_hole {
                self.arena.write_u64(Self::slot_off(index, hole), slot)?;
                hole = j;
            }
            j = (j + 1) % buckets;
        }
        self.arena.write_u64(Self::slot_off(index, hole), 0)?;

        self.arena.free(id)?;
        let count = self.arena.read_u32(TABLE_HEADER_OFFSET + HDR_COUNT)?;
        self.arena
            .write_u32(TABLE_HEADER_OFFSET + HDR_COUNT, count - 1)
    }

    /// Current refcount of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] on an id outside the file.
    pub fn refcount(&self, id: u64) -> Result<u32> {
        self.arena.read_u32(id)
    }

    /// Yields every occupied slot. Order is not part of the contract.
    ///
    /// # Errors
    ///
    /// Propagates read failures from the underlying arena.
    pub fn entries(&self) -> Result<Vec<StringEntry>> {
        let index = self.index_offset()?;
        let buckets = u64::from(self.arena.read_u32(index)?);

        let mut out = Vec::new();
        for i in 0..buckets {
            let slot = self.arena.read_u64(Self::slot_off(index, i))?;
            if slot != 0 {
                out.push(StringEntry {
                    id: slot,
                    bytes: self.get(slot)?,
                    refcount: self.refcount(slot)?,
                });
            }
        }
        Ok(out)
    }

    /// Number of live entries.
    ///
    /// # Errors
    ///
    /// Propagates read failures from the underlying arena.
    pub fn count(&self) -> Result<u32> {
        self.arena.read_u32(TABLE_HEADER_OFFSET + HDR_COUNT)
    }

    /// Blocks until a shared lock on the backing file is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the acquisition.
    pub fn lock_shared(&self) -> Result<()> {
        self.arena.lock_shared()
    }

    /// Blocks until an exclusive lock on the backing file is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the acquisition.
    pub fn lock_exclusive(&self) -> Result<()> {
        self.arena.lock_exclusive()
    }

    /// Releases the held advisory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] when the OS rejects the release.
    pub fn unlock(&self) -> Result<()> {
        self.arena.unlock()
    }

    /// Picks up growth performed by peer processes. Call after locking.
    ///
    /// # Errors
    ///
    /// Propagates stat and remap failures.
    pub fn refresh(&mut self) -> Result<()> {
        self.arena.refresh()
    }

    /// Flushes the table to stable storage.
    ///
    /// # Errors
    ///
    /// Propagates flush and fsync failures.
    pub fn sync(&mut self) -> Result<()> {
        self.arena.sync()
    }

    fn index_offset(&self) -> Result<u64> {
        self.arena.read_u64(TABLE_HEADER_OFFSET + HDR_INDEX)
    }

    fn slot_off(index: u64, i: u64) -> u64 {
        index + 8 + i * 8
    }

    fn entry_matches(&self, id: u64, hash: u32, bytes: &[u8]) -> Result<bool> {
        if self.arena.read_u32(id + 4)? != hash {
            return Ok(false);
        }
        let len = u64::from(self.arena.read_u16(id + 8)?);
        if len != bytes.len() as u64 {
            return Ok(false);
        }
        Ok(self.arena.bytes(id + ENTRY_HEADER, len)? == bytes)
    }

    fn insert_entry(&mut self, index: u64, slot_i: u64, hash: u32, bytes: &[u8]) -> Result<u64> {
        let id = self.arena.alloc(ENTRY_HEADER + bytes.len() as u64)?;
        self.arena.write_u32(id, 1)?;
        self.arena.write_u32(id + 4, hash)?;
        self.arena.write_u16(id + 8, bytes.len() as u16)?;
        self.arena.write_bytes(id + ENTRY_HEADER, bytes)?;
        self.arena.write_u64(Self::slot_off(index, slot_i), id)?;
        let count = self.arena.read_u32(TABLE_HEADER_OFFSET + HDR_COUNT)?;
        self.arena
            .write_u32(TABLE_HEADER_OFFSET + HDR_COUNT, count + 1)?;
        Ok(id)
    }

    /// Rehashes into a double-size index once the 0.7 load factor is
    /// breached.
    fn maybe_rehash(&mut self) -> Result<()> {
        let index = self.index_offset()?;
        let buckets = self.arena.read_u32(index)?;
        let count = self.count()?;
        if u64::from(count) * 10 <= u64::from(buckets) * 7 {
            return Ok(());
        }

        let new_buckets = buckets * 2;
        log::debug!(
            "rehashing string index: {} buckets -> {} ({} entries)",
            buckets,
            new_buckets,
            count
        );

        let mut ids = Vec::with_capacity(count as usize);
        for i in 0..u64::from(buckets) {
            let slot = self.arena.read_u64(Self::slot_off(index, i))?;
            if slot != 0 {
                ids.push(slot);
            }
        }

        let new_index = Self::alloc_index(&mut self.arena, new_buckets)?;
        let nb = u64::from(new_buckets);
        for id in ids {
            let hash = self.arena.read_u32(id + 4)?;
            let mut i = u64::from(hash) % nb;
            loop {
                let slot_off = Self::slot_off(new_index, i);
                if self.arena.read_u64(slot_off)? == 0 {
                    self.arena.write_u64(slot_off, id)?;
                    break;
                }
                i = (i + 1) % nb;
            }
        }

        self.arena
            .write_u64(TABLE_HEADER_OFFSET + HDR_INDEX, new_index)?;
        self.arena.free(index)?;
        Ok(())
    }

    /// Allocates a zeroed hash index block.
    fn alloc_index(arena: &mut Arena, buckets: u32) -> Result<u64> {
        let off = arena.alloc(8 + u64::from(buckets) * 8)?;
        arena.write_u32(off, buckets)?;
        arena.write_u32(off + 4, 0)?;
        // Recycled blocks carry stale bytes; slots must read as empty.
        arena.write_bytes(off + 8, &vec![0u8; buckets as usize * 8])?;
        Ok(off)
    }
}
