//! The graph file: typed entities, mirrored directed edges, the node
//! enumeration log, and persistent rank state, all stored in one arena.
//!
//! # Layout
//!
//! The first allocation of a fresh graph arena is the 24-byte graph header
//! `{node_log_offset: u64, structural_total: u64, walker_total: u64}`.
//! Entity records are 72-byte blocks ([`EntityRecord`]); adjacency blocks
//! and the node log are `{count: u32, capacity: u32}` arrays with doubling
//! growth.
//!
//! # Ownership
//!
//! The graph file owns its arena exclusively but shares the string table
//! with the surrounding application: operations that create or drop string
//! references take `&mut StringTable`. Every stored edge copy owns exactly
//! one reference to its `rel_type_id`; callers intern once per copy on
//! insertion and release once per successful removal, while
//! [`GraphFile::delete_entity`] releases the references held by the block it
//! frees.

use std::path::Path;

use crate::arena::{Arena, ArenaStats, HEADER_SIZE};
use crate::error::{Result, StoreError};
use crate::graph::migrate;
use crate::graph::record::{
    Direction, EdgeEntry, EntityRecord, EDGE_ENTRY_SIZE, ENTITY_RECORD_SIZE,
};
use crate::strings::StringTable;

/// Current graph layout version.
pub const GRAPH_VERSION: u32 = 2;

/// Offset of the graph header: first allocation after the 32-byte arena
/// header and the 8-byte allocation prefix.
pub(crate) const GRAPH_HEADER_OFFSET: u64 = HEADER_SIZE + 8;

/// Node log capacity of a fresh graph.
const INITIAL_LOG_CAPACITY: u32 = 256;

/// Adjacency block capacity on first edge insertion.
const INITIAL_ADJ_CAPACITY: u32 = 4;

// Graph header field offsets.
pub(crate) const HDR_NODE_LOG: u64 = 0;
pub(crate) const HDR_STRUCTURAL: u64 = 8;
pub(crate) const HDR_WALKER: u64 = 16;

// Entity record field offsets touched without a full decode.
const REC_STRUCTURAL: u64 = 48;
const REC_WALKER: u64 = 56;
const REC_PSI: u64 = 64;

/// Aggregate graph state, read straight from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    /// Number of live entities in the node log.
    pub entity_count: u32,
    /// Global random-surfer visit counter.
    pub structural_total: u64,
    /// Global user-driven visit counter.
    pub walker_total: u64,
}

/// Persistent typed property graph over a single arena file.
#[derive(Debug)]
pub struct GraphFile {
    arena: Arena,
}

impl GraphFile {
    /// Opens a graph file.
    ///
    /// A fresh arena is stamped with version 2 and an empty node log. A
    /// version-1 file is migrated in place (the pre-migration file is kept
    /// as `<path>.v1`).
    ///
    /// # Errors
    ///
    /// [`StoreError::UnsupportedVersion`] for versions outside {1, 2};
    /// [`StoreError::Corrupt`] for damaged headers.
    pub fn open<P: AsRef<Path>>(path: P, initial_size: u64) -> Result<Self> {
        let mut arena = Arena::open(path, initial_size)?;

        if arena.stats().allocated == HEADER_SIZE {
            let header = arena.alloc(24)?;
            debug_assert_eq!(header, GRAPH_HEADER_OFFSET);
            let log = Self::alloc_node_log(&mut arena, INITIAL_LOG_CAPACITY)?;
            arena.write_u64(header + HDR_NODE_LOG, log)?;
            arena.write_u64(header + HDR_STRUCTURAL, 0)?;
            arena.write_u64(header + HDR_WALKER, 0)?;
            arena.set_version(GRAPH_VERSION)?;
            return Ok(Self { arena });
        }

        match arena.version()? {
            1 => migrate::migrate_v1(arena),
            2 => {
                let graph = Self { arena };
                if graph.node_log_offset()? == 0 {
                    return Err(StoreError::Corrupt(
                        "graph header points at no node log".into(),
                    ));
                }
                Ok(graph)
            }
            other => Err(StoreError::UnsupportedVersion(other)),
        }
    }

    // ---- entities ----

    /// Interns `name` and `entity_type`, allocates a fresh record, and logs
    /// it. Returns the record offset.
    ///
    /// `obs_mtime` defaults to `mtime`.
    ///
    /// # Errors
    ///
    /// Propagates interning and allocation failures.
    pub fn create_entity(
        &mut self,
        strings: &mut StringTable,
        name: &str,
        entity_type: &str,
        mtime: u64,
        obs_mtime: Option<u64>,
    ) -> Result<u64> {
        let name_id = string_id32(strings.intern(name.as_bytes())?)?;
        let type_id = string_id32(strings.intern(entity_type.as_bytes())?)?;

        let record = EntityRecord {
            name_id,
            type_id,
            adj_offset: 0,
            mtime,
            obs_mtime: obs_mtime.unwrap_or(mtime),
            obs_count: 0,
            obs0_id: 0,
            obs1_id: 0,
            structural_visits: 0,
            walker_visits: 0,
            psi: 0.0,
        };
        self.insert_record(&record)
    }

    /// Decodes the record at `offset`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Range`] outside the file, [`StoreError::Corrupt`] on an
    /// impossible record.
    pub fn read_entity(&self, offset: u64) -> Result<EntityRecord> {
        EntityRecord::decode(self.arena.bytes(offset, ENTITY_RECORD_SIZE)?)
    }

    /// Overwrites the record at `offset` in place.
    ///
    /// Refcounts are not adjusted; callers mutate only non-string fields
    /// this way.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn update_entity(&mut self, offset: u64, record: &EntityRecord) -> Result<()> {
        self.arena.write_bytes(offset, &record.encode())
    }

    /// Deletes the entity at `offset`: releases every string reference the
    /// record and its adjacency block own, frees both, and unlogs the
    /// offset.
    ///
    /// The caller removes inbound edge copies stored on other entities
    /// first; this only frees storage owned by the record itself.
    ///
    /// # Errors
    ///
    /// Propagates release and free failures.
    pub fn delete_entity(&mut self, strings: &mut StringTable, offset: u64) -> Result<()> {
        let record = self.read_entity(offset)?;

        strings.release(u64::from(record.name_id))?;
        strings.release(u64::from(record.type_id))?;
        if record.obs0_id != 0 {
            strings.release(u64::from(record.obs0_id))?;
        }
        if record.obs1_id != 0 {
            strings.release(u64::from(record.obs1_id))?;
        }

        if record.adj_offset != 0 {
            for entry in self.read_adjacency(record.adj_offset)? {
                strings.release(u64::from(entry.rel_type_id))?;
            }
            self.arena.free(record.adj_offset)?;
        }

        self.node_log_remove(offset)?;
        self.arena.free(offset)
    }

    // ---- observations ----

    /// Interns `text` into the next free observation slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObservationsFull`] when both slots are taken.
    pub fn add_observation(
        &mut self,
        strings: &mut StringTable,
        offset: u64,
        text: &str,
        mtime: u64,
    ) -> Result<()> {
        let mut record = self.read_entity(offset)?;
        if record.obs_count == 2 {
            return Err(StoreError::ObservationsFull);
        }

        let id = string_id32(strings.intern(text.as_bytes())?)?;
        if record.obs_count == 0 {
            record.obs0_id = id;
        } else {
            record.obs1_id = id;
        }
        record.obs_count += 1;
        record.obs_mtime = mtime;
        record.mtime = mtime;
        self.update_entity(offset, &record)
    }

    /// Removes the observation matching `text`, shifting the second slot
    /// down when the first is vacated. Returns whether a removal occurred.
    ///
    /// # Errors
    ///
    /// Propagates string-table failures.
    pub fn remove_observation(
        &mut self,
        strings: &mut StringTable,
        offset: u64,
        text: &str,
        mtime: u64,
    ) -> Result<bool> {
        let mut record = self.read_entity(offset)?;
        let wanted = text.as_bytes();

        if record.obs0_id != 0 && strings.get(u64::from(record.obs0_id))? == wanted {
            strings.release(u64::from(record.obs0_id))?;
            record.obs0_id = record.obs1_id;
            record.obs1_id = 0;
        } else if record.obs1_id != 0 && strings.get(u64::from(record.obs1_id))? == wanted {
            strings.release(u64::from(record.obs1_id))?;
            record.obs1_id = 0;
        } else {
            return Ok(false);
        }

        record.obs_count -= 1;
        record.obs_mtime = mtime;
        record.mtime = mtime;
        self.update_entity(offset, &record)?;
        Ok(true)
    }

    // ---- edges ----

    /// Appends `entry` to the adjacency block of the entity at `offset`,
    /// allocating or doubling the block as needed.
    ///
    /// The entry's `rel_type_id` reference was interned by the caller; one
    /// reference per stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Oom`] when a grown block cannot be allocated.
    pub fn add_edge(&mut self, offset: u64, entry: &EdgeEntry) -> Result<()> {
        let mut record = self.read_entity(offset)?;

        if record.adj_offset == 0 {
            let block = self
                .arena
                .alloc(8 + u64::from(INITIAL_ADJ_CAPACITY) * EDGE_ENTRY_SIZE)?;
            self.arena.write_u32(block, 1)?;
            self.arena.write_u32(block + 4, INITIAL_ADJ_CAPACITY)?;
            self.arena.write_bytes(block + 8, &entry.encode())?;
            record.adj_offset = block;
            return self.update_entity(offset, &record);
        }

        let block = record.adj_offset;
        let count = self.arena.read_u32(block)?;
        let capacity = self.arena.read_u32(block + 4)?;

        if count < capacity {
            let slot = block + 8 + u64::from(count) * EDGE_ENTRY_SIZE;
            self.arena.write_bytes(slot, &entry.encode())?;
            return self.arena.write_u32(block, count + 1);
        }

        // Full: double the capacity, copy, append, free the old block.
        let new_capacity = capacity * 2;
        let existing = self
            .arena
            .read_bytes(block + 8, u64::from(count) * EDGE_ENTRY_SIZE)?;
        let grown = self
            .arena
            .alloc(8 + u64::from(new_capacity) * EDGE_ENTRY_SIZE)?;
        self.arena.write_u32(grown, count + 1)?;
        self.arena.write_u32(grown + 4, new_capacity)?;
        self.arena.write_bytes(grown + 8, &existing)?;
        let slot = grown + 8 + u64::from(count) * EDGE_ENTRY_SIZE;
        self.arena.write_bytes(slot, &entry.encode())?;
        self.arena.free(block)?;

        record.adj_offset = grown;
        self.update_entity(offset, &record)
    }

    /// Removes the first entry matching `(target, rel_type_id, direction)`
    /// by swapping the last entry into its slot. The block never shrinks.
    /// Returns whether a removal occurred.
    ///
    /// # Errors
    ///
    /// Propagates arena read/write failures.
    pub fn remove_edge(
        &mut self,
        offset: u64,
        target: u64,
        rel_type_id: u32,
        direction: Direction,
    ) -> Result<bool> {
        let record = self.read_entity(offset)?;
        if record.adj_offset == 0 {
            return Ok(false);
        }

        let block = record.adj_offset;
        let count = self.arena.read_u32(block)?;
        for i in 0..u64::from(count) {
            let slot = block + 8 + i * EDGE_ENTRY_SIZE;
            let entry = EdgeEntry::decode(self.arena.bytes(slot, EDGE_ENTRY_SIZE)?)?;
            if entry.target == target
                && entry.rel_type_id == rel_type_id
                && entry.direction == direction
            {
                let last = block + 8 + u64::from(count - 1) * EDGE_ENTRY_SIZE;
                if last != slot {
                    let tail = self.arena.read_bytes(last, EDGE_ENTRY_SIZE)?;
                    self.arena.write_bytes(slot, &tail)?;
                }
                self.arena.write_u32(block, count - 1)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Copies out every adjacency entry of the entity at `offset`.
    ///
    /// # Errors
    ///
    /// Propagates arena read failures.
    pub fn get_edges(&self, offset: u64) -> Result<Vec<EdgeEntry>> {
        let record = self.read_entity(offset)?;
        if record.adj_offset == 0 {
            return Ok(Vec::new());
        }
        self.read_adjacency(record.adj_offset)
    }

    /// Capacity of the entity's adjacency block, 0 when it has none.
    ///
    /// # Errors
    ///
    /// Propagates arena read failures.
    pub fn adjacency_capacity(&self, offset: u64) -> Result<u32> {
        let record = self.read_entity(offset)?;
        if record.adj_offset == 0 {
            return Ok(0);
        }
        self.arena.read_u32(record.adj_offset + 4)
    }

    fn read_adjacency(&self, block: u64) -> Result<Vec<EdgeEntry>> {
        let count = self.arena.read_u32(block)?;
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..u64::from(count) {
            let slot = block + 8 + i * EDGE_ENTRY_SIZE;
            out.push(EdgeEntry::decode(self.arena.bytes(slot, EDGE_ENTRY_SIZE)?)?);
        }
        Ok(out)
    }

    // ---- node log ----

    /// Snapshot of every live entity offset, in log order.
    ///
    /// Swap-removal means the order is stable only between structural
    /// mutations.
    ///
    /// # Errors
    ///
    /// Propagates arena read failures.
    pub fn get_all_entity_offsets(&self) -> Result<Vec<u64>> {
        let log = self.node_log_offset()?;
        let count = self.arena.read_u32(log)?;
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..u64::from(count) {
            out.push(self.arena.read_u64(log + 8 + i * 8)?);
        }
        Ok(out)
    }

    /// Number of live entities.
    ///
    /// # Errors
    ///
    /// Propagates arena read failures.
    pub fn get_entity_count(&self) -> Result<u32> {
        let log = self.node_log_offset()?;
        self.arena.read_u32(log)
    }

    fn node_log_offset(&self) -> Result<u64> {
        self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_NODE_LOG)
    }

    fn node_log_append(&mut self, offset: u64) -> Result<()> {
        let mut log = self.node_log_offset()?;
        let count = self.arena.read_u32(log)?;
        let capacity = self.arena.read_u32(log + 4)?;

        if count == capacity {
            let entries = self.arena.read_bytes(log + 8, u64::from(count) * 8)?;
            let grown = self.arena.alloc(8 + u64::from(capacity) * 2 * 8)?;
            self.arena.write_u32(grown, count)?;
            self.arena.write_u32(grown + 4, capacity * 2)?;
            self.arena.write_bytes(grown + 8, &entries)?;
            self.arena.free(log)?;
            self.arena
                .write_u64(GRAPH_HEADER_OFFSET + HDR_NODE_LOG, grown)?;
            log = grown;
        }

        self.arena.write_u64(log + 8 + u64::from(count) * 8, offset)?;
        self.arena.write_u32(log, count + 1)
    }

    fn node_log_remove(&mut self, offset: u64) -> Result<()> {
        let log = self.node_log_offset()?;
        let count = self.arena.read_u32(log)?;
        for i in 0..u64::from(count) {
            if self.arena.read_u64(log + 8 + i * 8)? == offset {
                let last = self.arena.read_u64(log + 8 + u64::from(count - 1) * 8)?;
                self.arena.write_u64(log + 8 + i * 8, last)?;
                return self.arena.write_u32(log, count - 1);
            }
        }
        Ok(())
    }

    // ---- counters and ranks ----

    /// Credits one random-surfer visit to the entity and the global total.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn increment_structural_visit(&mut self, offset: u64) -> Result<()> {
        let visits = self.arena.read_u64(offset + REC_STRUCTURAL)?;
        self.arena.write_u64(offset + REC_STRUCTURAL, visits + 1)?;
        let total = self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL)?;
        self.arena
            .write_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL, total + 1)
    }

    /// Credits one user-driven visit to the entity and the global total.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn increment_walker_visit(&mut self, offset: u64) -> Result<()> {
        let visits = self.arena.read_u64(offset + REC_WALKER)?;
        self.arena.write_u64(offset + REC_WALKER, visits + 1)?;
        let total = self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_WALKER)?;
        self.arena.write_u64(GRAPH_HEADER_OFFSET + HDR_WALKER, total + 1)
    }

    /// Entity visits over global visits, 0 when nothing has been sampled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn get_structural_rank(&self, offset: u64) -> Result<f64> {
        let total = self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL)?;
        if total == 0 {
            return Ok(0.0);
        }
        let visits = self.arena.read_u64(offset + REC_STRUCTURAL)?;
        Ok(visits as f64 / total as f64)
    }

    /// Walker analogue of [`GraphFile::get_structural_rank`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn get_walker_rank(&self, offset: u64) -> Result<f64> {
        let total = self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_WALKER)?;
        if total == 0 {
            return Ok(0.0);
        }
        let visits = self.arena.read_u64(offset + REC_WALKER)?;
        Ok(visits as f64 / total as f64)
    }

    /// Stores the MERW eigenvector component of the entity at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn set_psi(&mut self, offset: u64, value: f64) -> Result<()> {
        self.arena.write_f64(offset + REC_PSI, value)
    }

    /// Reads the MERW eigenvector component of the entity at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Range`] outside the file.
    pub fn get_psi(&self, offset: u64) -> Result<f64> {
        self.arena.read_f64(offset + REC_PSI)
    }

    /// Aggregate counters straight from the graph header.
    ///
    /// # Errors
    ///
    /// Propagates arena read failures.
    pub fn header_stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            entity_count: self.get_entity_count()?,
            structural_total: self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL)?,
            walker_total: self.arena.read_u64(GRAPH_HEADER_OFFSET + HDR_WALKER)?,
        })
    }

    // ---- concurrency surface ----

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

    /// Flushes the graph to stable storage.
    ///
    /// # Errors
    ///
    /// Propagates flush and fsync failures.
    pub fn sync(&mut self) -> Result<()> {
        self.arena.sync()
    }

    /// Allocator state of the backing arena.
    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    // ---- crate-internal plumbing ----

    /// Writes a fully formed record and logs it. Used by create and by
    /// migration, which carries records over verbatim.
    pub(crate) fn insert_record(&mut self, record: &EntityRecord) -> Result<u64> {
        let offset = self.arena.alloc(ENTITY_RECORD_SIZE)?;
        self.arena.write_bytes(offset, &record.encode())?;
        self.node_log_append(offset)?;
        Ok(offset)
    }

    pub(crate) fn set_global_counters(&mut self, structural: u64, walker: u64) -> Result<()> {
        self.arena
            .write_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL, structural)?;
        self.arena.write_u64(GRAPH_HEADER_OFFSET + HDR_WALKER, walker)
    }

    fn alloc_node_log(arena: &mut Arena, capacity: u32) -> Result<u64> {
        let log = arena.alloc(8 + u64::from(capacity) * 8)?;
        arena.write_u32(log, 0)?;
        arena.write_u32(log + 4, capacity)?;
        Ok(log)
    }
}

/// String ids live in u32 record fields; the table itself addresses with
/// u64 offsets.
fn string_id32(id: u64) -> Result<u32> {
    u32::try_from(id).map_err(|_| {
        StoreError::Oom(format!(
            "string entry at {} lies past the 4 GiB record-field limit",
            id
        ))
    })
}
