//! Engram - Embeddable on-disk knowledge-graph store
//!
//! Engram persists small-to-medium typed property graphs — entities with
//! interned names, up to two short observations, and mirrored directed
//! relations — in two memory-mapped arena files that several processes can
//! share through advisory whole-file locks.
//!
//! # Features
//!
//! - Arena allocator (bump + free list) over a growable mmap file
//! - Refcounted, deduplicated string table with a FNV-1a hash directory
//! - Fixed-width entity records with bidirectional adjacency blocks and a
//!   node enumeration log
//! - Versioned on-disk layout with forward v1 → v2 migration
//! - Embedded ranking: random-surfer visit sampling and MERW power
//!   iteration persisted inline in each record
//!
//! # Example
//!
//! ```no_run
//! use engram_core::{Direction, EdgeEntry, GraphFile, StringTable};
//!
//! # fn main() -> engram_core::Result<()> {
//! let mut strings = StringTable::open("example.strings", 4096)?;
//! let mut graph = GraphFile::open("example.graph", 4096)?;
//!
//! let alice = graph.create_entity(&mut strings, "alice", "Person", 1, None)?;
//! let bob = graph.create_entity(&mut strings, "bob", "Person", 2, None)?;
//!
//! // A relation is two mirrored copies, each owning a rel-type reference.
//! let knows = strings.intern(b"KNOWS")? as u32;
//! graph.add_edge(alice, &EdgeEntry {
//!     target: bob,
//!     direction: Direction::Forward,
//!     rel_type_id: knows,
//!     mtime: 3,
//! })?;
//! let knows_back = strings.intern(b"KNOWS")? as u32;
//! graph.add_edge(bob, &EdgeEntry {
//!     target: alice,
//!     direction: Direction::Backward,
//!     rel_type_id: knows_back,
//!     mtime: 3,
//! })?;
//!
//! graph.sync()?;
//! strings.sync()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! No type in this crate is internally thread-safe. Instances are meant to
//! be opened once per process; mutating sequences take an exclusive
//! advisory lock, call `refresh` to observe peer growth, mutate, `sync`,
//! and unlock. Read-only sequences do the same under a shared lock.
//!
//! # Design Philosophy
//!
//! Engram is a storage primitive, not a database server. Query languages,
//! traversal helpers, and RPC surfaces belong to the application layer;
//! this crate owns the bytes, the allocator, and the rank state.

pub mod arena;
pub mod error;
pub mod graph;
pub mod rank;
pub mod strings;

pub use arena::{Arena, ArenaStats, HEADER_SIZE, MAGIC};
pub use error::{Result, StoreError};
pub use graph::{
    Direction, EdgeEntry, EntityRecord, GraphFile, GraphStats, GRAPH_VERSION,
};
pub use rank::{merw_power_iteration, structural_sample, RankParams};
pub use strings::{StringEntry, StringTable};
