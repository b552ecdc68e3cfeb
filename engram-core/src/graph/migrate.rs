//! One-way v1 → v2 graph migration.
//!
//! v1 stored 64-byte entity records without the `psi` field. Migration
//! rebuilds the file: every record is reallocated in the v2 layout with
//! `psi = 0`, every edge copy is reinserted through an old→new offset map,
//! and the global counters are carried over. The pre-migration file is kept
//! next to the live one with a `.v1` suffix so operators can audit.
//!
//! The string-table file is untouched: records and edge copies carry their
//! interned ids over 1:1, so every refcount stays balanced.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::arena::Arena;
use crate::error::{Result, StoreError};
use crate::graph::file::{GraphFile, GRAPH_HEADER_OFFSET, HDR_NODE_LOG, HDR_STRUCTURAL, HDR_WALKER};
use crate::graph::record::{EdgeEntry, EntityRecord, EDGE_ENTRY_SIZE, ENTITY_RECORD_SIZE_V1};

/// Migrates a version-1 arena into a fresh version-2 graph at the same
/// path. Dangling edges are skipped, never fatal.
pub(crate) fn migrate_v1(arena: Arena) -> Result<GraphFile> {
    let node_log = arena.read_u64(GRAPH_HEADER_OFFSET + HDR_NODE_LOG)?;
    if node_log == 0 {
        return Err(StoreError::Corrupt(
            "v1 graph header points at no node log".into(),
        ));
    }
    let structural_total = arena.read_u64(GRAPH_HEADER_OFFSET + HDR_STRUCTURAL)?;
    let walker_total = arena.read_u64(GRAPH_HEADER_OFFSET + HDR_WALKER)?;

    // Capture every entity and its adjacency through the v1 layout.
    let count = arena.read_u32(node_log)?;
    let mut entities: Vec<(u64, EntityRecord, Vec<EdgeEntry>)> =
        Vec::with_capacity(count as usize);
    for i in 0..u64::from(count) {
        let offset = arena.read_u64(node_log + 8 + i * 8)?;
        let record = EntityRecord::decode_v1(arena.bytes(offset, ENTITY_RECORD_SIZE_V1)?)?;

        let mut edges = Vec::new();
        if record.adj_offset != 0 {
            let edge_count = arena.read_u32(record.adj_offset)?;
            for j in 0..u64::from(edge_count) {
                let slot = record.adj_offset + 8 + j * EDGE_ENTRY_SIZE;
                edges.push(EdgeEntry::decode(arena.bytes(slot, EDGE_ENTRY_SIZE)?)?);
            }
        }
        entities.push((offset, record, edges));
    }

    let path = arena.path().to_path_buf();
    let file_size = arena.stats().file_size;
    drop(arena);

    // Keep the old file as an audit backup.
    let mut backup_name = path.clone().into_os_string();
    backup_name.push(".v1");
    let backup = PathBuf::from(backup_name);
    fs::rename(&path, &backup)?;
    log::info!(
        "migrating {} to v2: {} entities, backup at {}",
        path.display(),
        entities.len(),
        backup.display()
    );

    let mut graph = GraphFile::open(&path, file_size)?;

    let mut remap: HashMap<u64, u64> = HashMap::with_capacity(entities.len());
    for (old_offset, record, _) in &entities {
        let carried = EntityRecord {
            adj_offset: 0,
            psi: 0.0,
            ..*record
        };
        let new_offset = graph.insert_record(&carried)?;
        remap.insert(*old_offset, new_offset);
    }

    let mut dropped = 0usize;
    for (old_offset, _, edges) in &entities {
        let Some(&source) = remap.get(old_offset) else {
            continue;
        };
        for entry in edges {
            match remap.get(&entry.target) {
                Some(&target) => {
                    graph.add_edge(source, &EdgeEntry { target, ..*entry })?;
                }
                None => {
                    log::warn!(
                        "dropping dangling edge {} -> {} (rel {})",
                        old_offset,
                        entry.target,
                        entry.rel_type_id
                    );
                    dropped += 1;
                }
            }
        }
    }

    graph.set_global_counters(structural_total, walker_total)?;
    graph.sync()?;
    log::info!(
        "migration complete: {} entities carried, {} dangling edges dropped",
        entities.len(),
        dropped
    );
    Ok(graph)
}
