//! Fixed-width on-disk codecs for entity records and adjacency entries.
//!
//! # Entity record layout (72 bytes, 8-byte aligned)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     name_id: u32
//! 4       4     type_id: u32
//! 8       8     adj_offset: u64 (0 = no adjacency block)
//! 16      8     mtime: u64
//! 24      8     obs_mtime: u64
//! 32      1     obs_count: u8 (0..=2)
//! 33      3     _pad
//! 36      4     obs0_id: u32
//! 40      4     obs1_id: u32
//! 44      4     _pad
//! 48      8     structural_visits: u64
//! 56      8     walker_visits: u64
//! 64      8     psi: f64
//! ```
//!
//! The v1 layout is the same record truncated to 64 bytes: everything up to
//! and including `walker_visits`, without `psi`.
//!
//! # Adjacency entry layout (24 bytes)
//!
//! ```text
//! 0       8     target_and_dir: u64 (high 62 bits target offset, low 2 bits direction)
//! 8       4     rel_type_id: u32
//! 12      4     _pad
//! 16      8     mtime: u64
//! ```

use crate::error::{Result, StoreError};

/// Size of a v2 entity record in bytes.
pub const ENTITY_RECORD_SIZE: u64 = 72;

/// Size of a v1 entity record in bytes.
pub const ENTITY_RECORD_SIZE_V1: u64 = 64;

/// Size of one adjacency entry in bytes.
pub const EDGE_ENTRY_SIZE: u64 = 24;

/// Which copy of a relation an adjacency entry represents.
///
/// A directed relation is stored twice: a `Forward` copy on the source's
/// block and a `Backward` copy on the target's. Bit value 2 is reserved for
/// a future bidirectional encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// The copy stored on the relation's source entity.
    Forward = 0,
    /// The mirrored copy stored on the relation's target entity.
    Backward = 1,
}

impl Direction {
    /// The two low bits stored in `target_and_dir`.
    pub fn bits(self) -> u64 {
        self as u64
    }

    /// Decodes the direction bits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for the reserved and invalid values.
    pub fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(Direction::Forward),
            1 => Ok(Direction::Backward),
            other => Err(StoreError::Corrupt(format!(
                "invalid direction bits {}",
                other
            ))),
        }
    }
}

/// Decoded 72-byte entity record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    /// String-table id of the entity name.
    pub name_id: u32,
    /// String-table id of the entity type.
    pub type_id: u32,
    /// Offset of the adjacency block, 0 when the entity has no edges.
    pub adj_offset: u64,
    /// Last modification timestamp of the record.
    pub mtime: u64,
    /// Last modification timestamp of the observation slots.
    pub obs_mtime: u64,
    /// Number of occupied observation slots (0..=2).
    pub obs_count: u8,
    /// String-table id of the first observation, 0 when empty.
    pub obs0_id: u32,
    /// String-table id of the second observation, 0 when empty.
    pub obs1_id: u32,
    /// Random-surfer visits credited to this entity.
    pub structural_visits: u64,
    /// User-driven visits credited to this entity.
    pub walker_visits: u64,
    /// MERW dominant-eigenvector component.
    pub psi: f64,
}

impl EntityRecord {
    /// Encodes the record into its 72-byte wire form.
    pub fn encode(&self) -> [u8; ENTITY_RECORD_SIZE as usize] {
        let mut b = [0u8; ENTITY_RECORD_SIZE as usize];
        b[0..4].copy_from_slice(&self.name_id.to_le_bytes());
        b[4..8].copy_from_slice(&self.type_id.to_le_bytes());
        b[8..16].copy_from_slice(&self.adj_offset.to_le_bytes());
        b[16..24].copy_from_slice(&self.mtime.to_le_bytes());
        b[24..32].copy_from_slice(&self.obs_mtime.to_le_bytes());
        b[32] = self.obs_count;
        b[36..40].copy_from_slice(&self.obs0_id.to_le_bytes());
        b[40..44].copy_from_slice(&self.obs1_id.to_le_bytes());
        b[48..56].copy_from_slice(&self.structural_visits.to_le_bytes());
        b[56..64].copy_from_slice(&self.walker_visits.to_le_bytes());
        b[64..72].copy_from_slice(&self.psi.to_le_bytes());
        b
    }

    /// Decodes a 72-byte record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the buffer is short or the
    /// observation count is impossible.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTITY_RECORD_SIZE as usize {
            return Err(StoreError::Corrupt(format!(
                "entity record truncated to {} bytes",
                bytes.len()
            )));
        }
        let record = Self {
            name_id: read_u32(bytes, 0),
            type_id: read_u32(bytes, 4),
            adj_offset: read_u64(bytes, 8),
            mtime: read_u64(bytes, 16),
            obs_mtime: read_u64(bytes, 24),
            obs_count: bytes[32],
            obs0_id: read_u32(bytes, 36),
            obs1_id: read_u32(bytes, 40),
            structural_visits: read_u64(bytes, 48),
            walker_visits: read_u64(bytes, 56),
            psi: f64::from_le_bytes(bytes[64..72].try_into().unwrap_or([0; 8])),
        };
        record.validate()?;
        Ok(record)
    }

    /// Decodes a 64-byte v1 record; `psi` becomes 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the buffer is short or the
    /// observation count is impossible.
    pub fn decode_v1(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTITY_RECORD_SIZE_V1 as usize {
            return Err(StoreError::Corrupt(format!(
                "v1 entity record truncated to {} bytes",
                bytes.len()
            )));
        }
        let record = Self {
            name_id: read_u32(bytes, 0),
            type_id: read_u32(bytes, 4),
            adj_offset: read_u64(bytes, 8),
            mtime: read_u64(bytes, 16),
            obs_mtime: read_u64(bytes, 24),
            obs_count: bytes[32],
            obs0_id: read_u32(bytes, 36),
            obs1_id: read_u32(bytes, 40),
            structural_visits: read_u64(bytes, 48),
            walker_visits: read_u64(bytes, 56),
            psi: 0.0,
        };
        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<()> {
        if self.obs_count > 2 {
            return Err(StoreError::Corrupt(format!(
                "entity record claims {} observations",
                self.obs_count
            )));
        }
        Ok(())
    }
}

/// Decoded 24-byte adjacency entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEntry {
    /// Record offset of the entity on the other end.
    pub target: u64,
    /// Which copy of the relation this entry is.
    pub direction: Direction,
    /// String-table id of the relation type. Each stored copy owns one
    /// reference to it.
    pub rel_type_id: u32,
    /// Timestamp the relation was recorded at.
    pub mtime: u64,
}

impl EdgeEntry {
    /// Encodes the entry into its 24-byte wire form.
    pub fn encode(&self) -> [u8; EDGE_ENTRY_SIZE as usize] {
        let mut b = [0u8; EDGE_ENTRY_SIZE as usize];
        let packed = (self.target << 2) | self.direction.bits();
        b[0..8].copy_from_slice(&packed.to_le_bytes());
        b[8..12].copy_from_slice(&self.rel_type_id.to_le_bytes());
        b[16..24].copy_from_slice(&self.mtime.to_le_bytes());
        b
    }

    /// Decodes a 24-byte entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] on a short buffer or reserved
    /// direction bits.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EDGE_ENTRY_SIZE as usize {
            return Err(StoreError::Corrupt(format!(
                "adjacency entry truncated to {} bytes",
                bytes.len()
            )));
        }
        let packed = read_u64(bytes, 0);
        Ok(Self {
            target: packed >> 2,
            direction: Direction::from_bits(packed & 0b11)?,
            rel_type_id: read_u32(bytes, 8),
            mtime: read_u64(bytes, 16),
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap_or([0; 4]))
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or([0; 8]))
}
