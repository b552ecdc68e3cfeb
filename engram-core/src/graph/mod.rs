//! Typed property graph persisted in an arena file.
//!
//! Submodules: [`record`] holds the fixed-width codecs, [`file`] the
//! operations, and `migrate` the one-way v1 → v2 layout upgrade that runs
//! inside [`GraphFile::open`].

pub mod file;
mod migrate;
pub mod record;

pub use file::{GraphFile, GraphStats, GRAPH_VERSION};
pub use record::{
    Direction, EdgeEntry, EntityRecord, EDGE_ENTRY_SIZE, ENTITY_RECORD_SIZE,
    ENTITY_RECORD_SIZE_V1,
};
