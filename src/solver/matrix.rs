//! Sparse MNA system assembly and solving.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use faer::prelude::Solve;
use faer::sparse::{SparseColMat, Triplet};
use faer::Col;
use log::debug;

use crate::error::{PdnError, Result};

/// Sparse system G·V = J.
///
/// Entries are accumulated in a map keyed by `(row, col)` so stamping in any
/// order yields the same matrix.
#[derive(Debug, Clone)]
pub struct SparseSystem {
    size: usize,
    entries: BTreeMap<(usize, usize), f64>,
    rhs: Vec<f64>,
}

impl SparseSystem {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            entries: BTreeMap::new(),
            rhs: vec![0.0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored entries.
    pub fn nonzeros(&self) -> usize {
        self.entries.len()
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entries.entry((row, col)).or_insert(0.0) += value;
    }

    /// Add to source vector element.
    pub fn add_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] += value;
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   G[n1,n1] += G
    ///   G[n2,n2] += G
    ///   G[n1,n2] -= G
    ///   G[n2,n1] -= G
    pub fn stamp_conductance(&mut self, n1: usize, n2: usize, g: f64) {
        self.add(n1, n1, g);
        self.add(n2, n2, g);
        self.add(n1, n2, -g);
        self.add(n2, n1, -g);
    }

    /// Stamp a supply at row `source` driving `node` through 1 ohm.
    ///
    /// Row `source` reads `V[source] = V[node] - voltage`, so the current
    /// delivered into `node` is `-V[source]`.
    pub fn stamp_source(&mut self, source: usize, node: usize, voltage: f64) {
        self.add(source, node, 1.0);
        self.add(node, source, 1.0);
        self.add(source, source, -1.0);
        self.rhs[source] = voltage;
    }

    /// Factorize with sparse LU and solve.
    pub fn solve(&self) -> Result<Vec<f64>> {
        let n = self.size;
        if n == 0 {
            return Ok(Vec::new());
        }

        if let Some((&(row, col), value)) = self.entries.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PdnError::factorization(format!(
                "entry ({}, {}) is {}; a layer is probably missing its resistance",
                row, col, value
            )));
        }

        let triplets: Vec<Triplet<usize, usize, f64>> = self
            .entries
            .iter()
            .map(|(&(row, col), &value)| Triplet::new(row, col, value))
            .collect();
        let g = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            PdnError::MatrixAssembly {
                message: format!("{:?}", e),
            }
        })?;
        debug!("G matrix: {} x {} with {} entries", n, n, triplets.len());

        let lu = g
            .as_ref()
            .sp_lu()
            .map_err(|e| PdnError::factorization(format!("{:?}", e)))?;
        let j = Col::from_fn(n, |i| self.rhs[i]);
        let x = lu.solve(&j);

        let solution: Vec<f64> = (0..n).map(|i| x[i]).collect();
        if let Some(i) = solution.iter().position(|v| !v.is_finite()) {
            return Err(PdnError::factorization(format!(
                "solution is not finite at row {}; the matrix is singular",
                i
            )));
        }
        Ok(solution)
    }

    /// Write `G` in matrix-market coordinate form, `J` and the row labels
    /// into `dir`, each file prefixed with `prefix`.
    pub fn write_dump(&self, dir: &Path, prefix: &str, labels: &[String]) -> Result<()> {
        let g_path = dir.join(format!("{}_G.mtx", prefix));
        let j_path = dir.join(format!("{}_J.txt", prefix));
        let node_path = dir.join(format!("{}_nodes.txt", prefix));

        let write_g = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(&g_path)?);
            writeln!(out, "%%MatrixMarket matrix coordinate real general")?;
            writeln!(out, "{} {} {}", self.size, self.size, self.entries.len())?;
            for (&(row, col), value) in &self.entries {
                writeln!(out, "{} {} {:e}", row + 1, col + 1, value)?;
            }
            out.flush()
        };
        write_g().map_err(|e| PdnError::file_write(&g_path, e))?;

        let write_j = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(&j_path)?);
            for value in &self.rhs {
                writeln!(out, "{:e}", value)?;
            }
            out.flush()
        };
        write_j().map_err(|e| PdnError::file_write(&j_path, e))?;

        let write_nodes = || -> std::io::Result<()> {
            let mut out = BufWriter::new(File::create(&node_path)?);
            for (index, label) in labels.iter().enumerate() {
                writeln!(out, "{} {}", index, label)?;
            }
            out.flush()
        };
        write_nodes().map_err(|e| PdnError::file_write(&node_path, e))?;

        debug!("Dumped G, J and node table to {}", dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stamp_conductance() {
        let mut system = SparseSystem::new(2);
        system.stamp_conductance(0, 1, 2.0);
        system.stamp_conductance(0, 1, 3.0);
        assert_eq!(system.get(0, 0), 5.0);
        assert_eq!(system.get(1, 1), 5.0);
        assert_eq!(system.get(0, 1), -5.0);
        assert_eq!(system.get(1, 0), -5.0);
        assert_eq!(system.nonzeros(), 4);
    }

    #[test]
    fn test_divider_with_source() {
        // source -> n0 -(1 ohm)- n1, 0.1 A drawn at n1
        let mut system = SparseSystem::new(3);
        system.stamp_conductance(0, 1, 1.0);
        system.add_rhs(1, -0.1);
        system.stamp_source(2, 0, 1.0);

        let x = system.solve().unwrap();
        // 1 ohm source resistance plus 1 ohm wire
        assert_relative_eq!(x[0], 0.9, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.8, epsilon = 1e-12);
        // current delivered by the source
        assert_relative_eq!(-x[2], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_two_sources_on_one_node() {
        let mut system = SparseSystem::new(3);
        system.add_rhs(0, -0.2);
        system.stamp_source(1, 0, 1.0);
        system.stamp_source(2, 0, 1.0);

        let x = system.solve().unwrap();
        assert_relative_eq!(x[0], 0.9, epsilon = 1e-12);
        assert_relative_eq!(-x[1], 0.1, epsilon = 1e-12);
        assert_relative_eq!(-x[2], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_infinite_conductance_rejected() {
        let mut system = SparseSystem::new(2);
        system.stamp_conductance(0, 1, f64::INFINITY);
        system.stamp_source(1, 0, 1.0);
        assert!(matches!(system.solve(), Err(PdnError::Factorization { .. })));
    }

    #[test]
    fn test_empty_system() {
        assert!(SparseSystem::new(0).solve().unwrap().is_empty());
    }
}
