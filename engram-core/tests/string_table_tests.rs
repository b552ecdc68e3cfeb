use engram_core::StringTable;
use tempfile::TempDir;

fn open_table(dir: &TempDir) -> StringTable {
    StringTable::open(dir.path().join("test.strings"), 4096).unwrap()
}

#[test]
fn test_intern_is_idempotent_in_identity() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let a = table.intern(b"hello").unwrap();
    let b = table.intern(b"hello").unwrap();
    assert_eq!(a, b);
    assert_eq!(table.count().unwrap(), 1);
}

#[test]
fn test_refcount_tracks_intern_calls() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let id = table.intern(b"shared").unwrap();
    table.intern(b"shared").unwrap();
    table.intern(b"shared").unwrap();
    assert_eq!(table.refcount(id).unwrap(), 3);

    table.release(id).unwrap();
    assert_eq!(table.refcount(id).unwrap(), 2);
    assert_eq!(table.find(b"shared").unwrap(), Some(id));
}

#[test]
fn test_final_release_removes_entry() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let id = table.intern(b"transient").unwrap();
    table.intern(b"transient").unwrap();
    table.release(id).unwrap();
    table.release(id).unwrap();

    assert_eq!(table.find(b"transient").unwrap(), None);
    assert_eq!(table.count().unwrap(), 0);
}

#[test]
fn test_distinct_strings_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let a = table.intern(b"alpha").unwrap();
    let b = table.intern(b"beta").unwrap();
    assert_ne!(a, b);
    assert_eq!(table.get(a).unwrap(), b"alpha");
    assert_eq!(table.get(b).unwrap(), b"beta");
}

#[test]
fn test_empty_string_interned_once() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let a = table.intern(b"").unwrap();
    let b = table.intern(b"").unwrap();
    assert_eq!(a, b);
    assert_eq!(table.get(a).unwrap(), Vec::<u8>::new());
    assert_eq!(table.count().unwrap(), 1);
}

#[test]
fn test_arbitrary_bytes_stored_verbatim() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    // Not valid UTF-8; the table stores code units, not characters.
    let raw = [0xff, 0x00, 0xfe, 0x42];
    let id = table.intern(&raw).unwrap();
    assert_eq!(table.get(id).unwrap(), raw);
    assert_eq!(table.find(&raw).unwrap(), Some(id));
}

#[test]
fn test_string_too_long_rejected() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    let huge = vec![b'x'; 65_536];
    let err = table.intern(&huge).unwrap_err();
    assert_eq!(err.code(), "STRING_TOO_LONG");

    let max = vec![b'x'; 65_535];
    let id = table.intern(&max).unwrap();
    assert_eq!(table.get(id).unwrap().len(), 65_535);
}

#[test]
fn test_rehash_preserves_all_entries() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    // Well past the 0.7 load factor of the initial 64-bucket index.
    let mut ids = Vec::new();
    for i in 0..200 {
        let key = format!("entry-{i:04}");
        ids.push((key.clone(), table.intern(key.as_bytes()).unwrap()));
    }

    assert_eq!(table.count().unwrap(), 200);
    for (key, id) in &ids {
        assert_eq!(table.find(key.as_bytes()).unwrap(), Some(*id));
        assert_eq!(table.get(*id).unwrap(), key.as_bytes());
    }
}

#[test]
fn test_release_in_probe_chain_keeps_neighbors_findable() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    // Enough entries that several probe chains collide.
    let mut ids = Vec::new();
    for i in 0..40 {
        let key = format!("chain-{i}");
        ids.push((key, table.intern(format!("chain-{i}").as_bytes()).unwrap()));
    }

    // Drop every other entry, then verify the survivors.
    for (i, (_, id)) in ids.iter().enumerate() {
        if i % 2 == 0 {
            table.release(*id).unwrap();
        }
    }
    for (i, (key, id)) in ids.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(table.find(key.as_bytes()).unwrap(), None);
        } else {
            assert_eq!(table.find(key.as_bytes()).unwrap(), Some(*id));
        }
    }
    assert_eq!(table.count().unwrap(), 20);
}

#[test]
fn test_entries_lists_every_live_string() {
    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir);

    table.intern(b"one").unwrap();
    let two = table.intern(b"two").unwrap();
    table.intern(b"two").unwrap();
    table.intern(b"three").unwrap();

    let mut entries = table.entries().unwrap();
    entries.sort_by(|a, b| a.bytes.cmp(&b.bytes));
    assert_eq!(entries.len(), 3);

    let two_entry = entries.iter().find(|e| e.id == two).unwrap();
    assert_eq!(two_entry.bytes, b"two");
    assert_eq!(two_entry.refcount, 2);
}

#[test]
fn test_ids_and_refcounts_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.strings");

    let (a, b);
    {
        let mut table = StringTable::open(&path, 4096).unwrap();
        a = table.intern(b"persistent").unwrap();
        b = table.intern(b"other").unwrap();
        table.intern(b"persistent").unwrap();
        table.sync().unwrap();
    }

    let mut table = StringTable::open(&path, 4096).unwrap();
    assert_eq!(table.count().unwrap(), 2);
    assert_eq!(table.find(b"persistent").unwrap(), Some(a));
    assert_eq!(table.find(b"other").unwrap(), Some(b));
    assert_eq!(table.refcount(a).unwrap(), 2);

    // The index is live after reopen: releases and interns keep working.
    table.release(b).unwrap();
    assert_eq!(table.find(b"other").unwrap(), None);
    let c = table.intern(b"fresh").unwrap();
    assert_eq!(table.get(c).unwrap(), b"fresh");
}
