use engram_core::{
    merw_power_iteration, structural_sample, Direction, EdgeEntry, GraphFile, RankParams,
    StringTable,
};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> (GraphFile, StringTable) {
    let graph = GraphFile::open(dir.path().join("kg.graph"), 4096).unwrap();
    let strings = StringTable::open(dir.path().join("kg.strings"), 4096).unwrap();
    (graph, strings)
}

fn link(graph: &mut GraphFile, strings: &mut StringTable, from: u64, to: u64) {
    let r = strings.intern(b"LINKS").unwrap() as u32;
    graph
        .add_edge(from, &EdgeEntry { target: to, direction: Direction::Forward, rel_type_id: r, mtime: 1 })
        .unwrap();
    let r_back = strings.intern(b"LINKS").unwrap() as u32;
    graph
        .add_edge(to, &EdgeEntry { target: from, direction: Direction::Backward, rel_type_id: r_back, mtime: 1 })
        .unwrap();
}

fn cycle(graph: &mut GraphFile, strings: &mut StringTable, n: usize) -> Vec<u64> {
    let offsets: Vec<u64> = (0..n)
        .map(|i| {
            graph
                .create_entity(strings, &format!("c{i}"), "Node", 1, None)
                .unwrap()
        })
        .collect();
    for i in 0..n {
        link(graph, strings, offsets[i], offsets[(i + 1) % n]);
    }
    offsets
}

#[test]
fn test_structural_ranks_sum_to_one() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);
    let offsets = cycle(&mut graph, &mut strings, 3);

    structural_sample(&mut graph, 20, 0.85).unwrap();

    let total: f64 = offsets
        .iter()
        .map(|&o| graph.get_structural_rank(o).unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9, "ranks summed to {total}");

    // Every entity starts one walk per iteration, so each holds at least
    // `iterations` visits.
    for &offset in &offsets {
        assert!(graph.read_entity(offset).unwrap().structural_visits >= 20);
    }
    assert!(graph.header_stats().unwrap().structural_total >= 60);
}

#[test]
fn test_structural_walk_ends_at_sinks() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);

    // One edge a -> b; b has no forward edges, so every walk halts there.
    let a = graph.create_entity(&mut strings, "a", "Node", 1, None).unwrap();
    let b = graph.create_entity(&mut strings, "b", "Node", 1, None).unwrap();
    link(&mut graph, &mut strings, a, b);

    structural_sample(&mut graph, 50, 0.85).unwrap();

    let visits_a = graph.read_entity(a).unwrap().structural_visits;
    let visits_b = graph.read_entity(b).unwrap().structural_visits;
    assert_eq!(visits_a, 50);
    // b is seeded 50 times and also absorbs roughly 85% of a's walks.
    assert!(visits_b > visits_a);
}

#[test]
fn test_merw_uniform_on_cycle() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);
    let offsets = cycle(&mut graph, &mut strings, 3);

    let iterations = merw_power_iteration(&mut graph, &RankParams::default()).unwrap();
    assert!(iterations >= 1);
    assert!(iterations <= 200);

    // The cycle is vertex-transitive: psi must be uniform at 1/sqrt(3).
    let expected = 1.0 / 3.0f64.sqrt();
    let mut norm_sq = 0.0;
    for &offset in &offsets {
        let psi = graph.get_psi(offset).unwrap();
        assert!((psi - expected).abs() < 1e-6, "psi was {psi}");
        assert!(psi >= 0.0);
        norm_sq += psi * psi;
    }
    assert!((norm_sq - 1.0).abs() < 1e-9);
}

#[test]
fn test_merw_favors_the_hub_of_a_star() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);

    let center = graph.create_entity(&mut strings, "center", "Node", 1, None).unwrap();
    let mut leaves = Vec::new();
    for i in 0..4 {
        let leaf = graph
            .create_entity(&mut strings, &format!("leaf{i}"), "Node", 1, None)
            .unwrap();
        link(&mut graph, &mut strings, leaf, center);
        leaves.push(leaf);
    }

    merw_power_iteration(&mut graph, &RankParams::default()).unwrap();

    let psi_center = graph.get_psi(center).unwrap();
    for &leaf in &leaves {
        assert!(psi_center > graph.get_psi(leaf).unwrap());
    }
}

#[test]
fn test_merw_empty_graph_short_circuits() {
    let dir = TempDir::new().unwrap();
    let (mut graph, _strings) = open_store(&dir);

    let iterations = merw_power_iteration(&mut graph, &RankParams::default()).unwrap();
    assert_eq!(iterations, 0);
}

#[test]
fn test_merw_respects_max_iter() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);
    cycle(&mut graph, &mut strings, 5);

    let params = RankParams { max_iter: 1, ..RankParams::default() };
    let iterations = merw_power_iteration(&mut graph, &params).unwrap();
    assert_eq!(iterations, 1);
}

#[test]
fn test_psi_persists_and_seeds_the_next_run() {
    let dir = TempDir::new().unwrap();
    let graph_path = dir.path().join("kg.graph");
    let strings_path = dir.path().join("kg.strings");

    let offsets;
    {
        let mut graph = GraphFile::open(&graph_path, 4096).unwrap();
        let mut strings = StringTable::open(&strings_path, 4096).unwrap();
        offsets = cycle(&mut graph, &mut strings, 4);
        merw_power_iteration(&mut graph, &RankParams::default()).unwrap();
        graph.sync().unwrap();
        strings.sync().unwrap();
    }

    let mut graph = GraphFile::open(&graph_path, 4096).unwrap();
    let expected = 1.0 / 4.0f64.sqrt();
    for &offset in &offsets {
        assert!((graph.get_psi(offset).unwrap() - expected).abs() < 1e-6);
    }

    // Warm-started from the stored eigenvector, the next run converges in
    // very few iterations.
    let iterations = merw_power_iteration(&mut graph, &RankParams::default()).unwrap();
    assert!(iterations <= 5, "warm restart took {iterations} iterations");
}

#[test]
fn test_dangling_nodes_keep_positive_mass() {
    let dir = TempDir::new().unwrap();
    let (mut graph, mut strings) = open_store(&dir);

    // a -> b, b dangling: the teleport term must keep both components
    // positive.
    let a = graph.create_entity(&mut strings, "a", "Node", 1, None).unwrap();
    let b = graph.create_entity(&mut strings, "b", "Node", 1, None).unwrap();
    link(&mut graph, &mut strings, a, b);

    merw_power_iteration(&mut graph, &RankParams::default()).unwrap();

    assert!(graph.get_psi(a).unwrap() > 0.0);
    assert!(graph.get_psi(b).unwrap() > graph.get_psi(a).unwrap());
}
