//! Ranking kernels over the graph file.
//!
//! Two complementary estimators of entity importance:
//!
//! - **Structural sampling**: a damped random surfer that walks forward
//!   edges and credits persistent visit counters. Incremental — one more
//!   iteration refines the estimate without a global rebuild.
//! - **MERW power iteration**: computes the dominant right eigenvector of
//!   the damped adjacency matrix (the Maximal-Entropy Random Walk
//!   stationary structure) and persists each component into its entity's
//!   `psi` field.

use std::collections::HashMap;

use rand::Rng;

use crate::error::Result;
use crate::graph::{Direction, GraphFile};

/// Parameters shared by the ranking kernels.
#[derive(Debug, Clone, Copy)]
pub struct RankParams {
    /// Damping factor α: probability of following an edge instead of
    /// teleporting/terminating.
    pub damping: f64,
    /// Upper bound on power iterations.
    pub max_iter: usize,
    /// L2 convergence tolerance between successive iterates.
    pub tol: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iter: 200,
            tol: 1e-8,
        }
    }
}

/// Runs `iterations` rounds of random-surfer sampling.
///
/// One round starts a walk at every entity in the node log. A walk credits
/// a structural visit to each entity it lands on, then with probability
/// `damping` follows a uniformly chosen outgoing forward edge; it ends on
/// the complementary coin flip or when the current entity has no forward
/// edges.
///
/// # Errors
///
/// Propagates graph read/write failures.
pub fn structural_sample(graph: &mut GraphFile, iterations: u32, damping: f64) -> Result<()> {
    let mut rng = rand::rng();

    for _ in 0..iterations {
        let offsets = graph.get_all_entity_offsets()?;
        for &start in &offsets {
            let mut current = start;
            loop {
                graph.increment_structural_visit(current)?;

                let targets: Vec<u64> = graph
                    .get_edges(current)?
                    .into_iter()
                    .filter(|e| e.direction == Direction::Forward)
                    .map(|e| e.target)
                    .collect();
                if targets.is_empty() || rng.random::<f64>() >= damping {
                    break;
                }
                current = targets[rng.random_range(0..targets.len())];
            }
        }
    }
    Ok(())
}

/// Power iteration for the MERW dominant eigenvector.
///
/// Builds a sparse forward-edge adjacency over a snapshot of the node log,
/// iterates `ψ' = α Aᵀψ + ((1−α)/n) Σψ` with L2 normalization until the
/// change drops below `tol` or `max_iter` is reached, clamps stray negative
/// components to zero, and writes each component back into its entity's
/// `psi` field. Returns the number of iterations performed.
///
/// Stored `psi` values seed the iteration: zero entries are replaced by the
/// mean of the non-zero ones, and a graph with no prior `psi` starts
/// uniform at `1/√n`. Dangling nodes are covered by the teleport term;
/// self-loops are ordinary edges.
///
/// # Errors
///
/// Propagates graph read/write failures.
pub fn merw_power_iteration(graph: &mut GraphFile, params: &RankParams) -> Result<usize> {
    let offsets = graph.get_all_entity_offsets()?;
    let n = offsets.len();
    if n == 0 {
        return Ok(0);
    }

    let index: HashMap<u64, usize> = offsets
        .iter()
        .enumerate()
        .map(|(i, &off)| (off, i))
        .collect();

    // Sparse adjacency from forward edges; targets that left the node log
    // between snapshot and scan are dropped.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, &offset) in offsets.iter().enumerate() {
        for entry in graph.get_edges(offset)? {
            if entry.direction == Direction::Forward {
                if let Some(&j) = index.get(&entry.target) {
                    adjacency[i].push(j);
                }
            }
        }
    }

    let mut psi = seed_psi(graph, &offsets)?;
    normalize(&mut psi);

    let mut next = vec![0.0f64; n];
    let mut performed = 0usize;
    for _ in 0..params.max_iter {
        performed += 1;

        let teleport = (1.0 - params.damping) / n as f64 * psi.iter().sum::<f64>();
        next.fill(teleport);
        for (i, out) in adjacency.iter().enumerate() {
            let weight = params.damping * psi[i];
            for &j in out {
                next[j] += weight;
            }
        }
        normalize(&mut next);

        let delta = psi
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        std::mem::swap(&mut psi, &mut next);
        if delta < params.tol {
            break;
        }
    }

    // Perron-Frobenius hygiene: the dominant eigenvector is non-negative,
    // any tiny negative component is numerical noise.
    for value in &mut psi {
        if *value < 0.0 {
            *value = 0.0;
        }
    }

    for (i, &offset) in offsets.iter().enumerate() {
        graph.set_psi(offset, psi[i])?;
    }

    log::debug!("merw: {} iterations over {} entities", performed, n);
    Ok(performed)
}

/// Initial ψ from stored components, mean-substituting zeros.
fn seed_psi(graph: &GraphFile, offsets: &[u64]) -> Result<Vec<f64>> {
    let mut psi = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        psi.push(graph.get_psi(offset)?);
    }

    let nonzero: Vec<f64> = psi.iter().copied().filter(|&v| v != 0.0).collect();
    if nonzero.is_empty() {
        let uniform = 1.0 / (offsets.len() as f64).sqrt();
        psi.fill(uniform);
    } else {
        let mean = nonzero.iter().sum::<f64>() / nonzero.len() as f64;
        for value in &mut psi {
            if *value == 0.0 {
                *value = mean;
            }
        }
    }
    Ok(psi)
}

fn normalize(values: &mut [f64]) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}
