//! Compressed sparse row storage for the global stiffness, damping, and
//! system matrices.
//!
//! The sparsity pattern of the elastic Hessian is fixed for the life of a
//! mesh, so `values_mut` exposes the value array directly for the
//! compressed-index gather. Per-step combinations (A = M − hC − h²K) go
//! through `linear_combination`, which merges patterns.

use super::{DVec, Mat3, Real};
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Square sparse matrix in CSR form.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<Real>,
}

impl SparseMatrix {
    /// Build from (row, col, value) triplets; duplicate entries are summed.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, Real)]) -> Self {
        let mut sorted: Vec<(usize, usize, Real)> = triplets.to_vec();
        sorted.sort_unstable_by_key(|&(r, c, _)| (r, c));

        let mut row_counts = vec![0usize; n];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values: Vec<Real> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for &(r, c, v) in &sorted {
            debug_assert!(r < n && c < n);
            if last == Some((r, c)) {
                if let Some(tail) = values.last_mut() {
                    *tail += v;
                }
            } else {
                col_idx.push(c);
                values.push(v);
                row_counts[r] += 1;
                last = Some((r, c));
            }
        }

        let mut row_ptr = vec![0usize; n + 1];
        for r in 0..n {
            row_ptr[r + 1] = row_ptr[r] + row_counts[r];
        }

        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Real] {
        &self.values
    }

    /// Mutable access to the value array, in the fixed CSR entry order.
    pub fn values_mut(&mut self) -> &mut [Real] {
        &mut self.values
    }

    /// Index into the value array for entry (row, col), if present.
    pub fn entry_index(&self, row: usize, col: usize) -> Option<usize> {
        let begin = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_idx[begin..end]
            .binary_search(&col)
            .ok()
            .map(|offset| begin + offset)
    }

    /// Entry (row, col), or zero when outside the pattern.
    pub fn get(&self, row: usize, col: usize) -> Real {
        self.entry_index(row, col)
            .map(|i| self.values[i])
            .unwrap_or(0.0)
    }

    /// Matrix-vector product, parallel over rows.
    pub fn mul_vec(&self, x: &DVec) -> DVec {
        assert_eq!(x.len(), self.n);
        let result: Vec<Real> = (0..self.n)
            .into_par_iter()
            .map(|r| {
                let mut sum = 0.0;
                for i in self.row_ptr[r]..self.row_ptr[r + 1] {
                    sum += self.values[i] * x[self.col_idx[i]];
                }
                sum
            })
            .collect();
        DVec::from_vec(result)
    }

    /// Σ coeffᵢ · Aᵢ plus an optional diagonal term, with the union pattern.
    pub fn linear_combination(
        diagonal: Option<(Real, &DVec)>,
        terms: &[(Real, &SparseMatrix)],
    ) -> SparseMatrix {
        let n = terms
            .first()
            .map(|(_, m)| m.n)
            .or_else(|| diagonal.map(|(_, d)| d.len()))
            .unwrap_or(0);
        for (_, m) in terms {
            assert_eq!(m.n, n);
        }
        if let Some((_, d)) = diagonal {
            assert_eq!(d.len(), n);
        }

        let rows: Vec<Vec<(usize, Real)>> = (0..n)
            .into_par_iter()
            .map(|r| {
                let mut entries: Vec<(usize, Real)> = Vec::new();
                for &(coeff, m) in terms {
                    for i in m.row_ptr[r]..m.row_ptr[r + 1] {
                        entries.push((m.col_idx[i], coeff * m.values[i]));
                    }
                }
                if let Some((coeff, d)) = diagonal {
                    entries.push((r, coeff * d[r]));
                }
                entries.sort_unstable_by_key(|&(c, _)| c);

                let mut merged: Vec<(usize, Real)> = Vec::with_capacity(entries.len());
                for (c, v) in entries {
                    match merged.last_mut() {
                        Some(last) if last.0 == c => last.1 += v,
                        _ => merged.push((c, v)),
                    }
                }
                merged
            })
            .collect();

        let mut row_ptr = Vec::with_capacity(n + 1);
        row_ptr.push(0);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for row in rows {
            for (c, v) in row {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        SparseMatrix {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// The matrix diagonal as a dense vector (zero where outside the pattern).
    pub fn diagonal(&self) -> DVec {
        DVec::from_fn(self.n, |r, _| self.get(r, r))
    }

    /// The 3×3 diagonal block for vertex `v` (rows and columns 3v..3v+3).
    pub fn diagonal_block(&self, v: usize) -> Mat3 {
        let mut block = Mat3::zeros();
        for b in 0..3 {
            for a in 0..3 {
                block[(a, b)] = self.get(3 * v + a, 3 * v + b);
            }
        }
        block
    }

    /// Dense copy, for tests and small systems.
    pub fn to_dense(&self) -> DMatrix<Real> {
        let mut dense = DMatrix::zeros(self.n, self.n);
        for r in 0..self.n {
            for i in self.row_ptr[r]..self.row_ptr[r + 1] {
                dense[(r, self.col_idx[i])] += self.values[i];
            }
        }
        dense
    }
}
