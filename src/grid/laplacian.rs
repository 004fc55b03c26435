//! Sparse finite difference operators in compressed row storage.
//!
//! The 2-D Laplacian is assembled as a Kronecker sum of the 1-D periodic
//! second difference operators:
//! ..math:
//!  L = (Dxx x Iy) + (Ix x Dyy)
//!
//! Rows are ordered like a standard layout `Array2`, i.e. the flat index
//! of point `[i, j]` is `i * ny + j`.
use ndarray::{Array2, ArrayBase, Data, Ix2};
use std::borrow::Cow;

/// Sparse matrix in csr format
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl SparseMatrix {
    /// Assemble from (row, col, value) triplets. Duplicates are summed,
    /// explicit zeros are kept.
    ///
    /// # Panics
    /// Triplet outside of `nrows x ncols`.
    pub fn from_triplets(nrows: usize, ncols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut indptr = vec![0; nrows + 1];
        let mut indices = Vec::with_capacity(triplets.len());
        let mut data: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;
        for (row, col, value) in triplets {
            assert!(row < nrows && col < ncols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(v) = data.last_mut() {
                    *v += value;
                }
                continue;
            }
            indptr[row + 1] += 1;
            indices.push(col);
            data.push(value);
            last = Some((row, col));
        }
        for i in 0..nrows {
            indptr[i + 1] += indptr[i];
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    /// Identity matrix of size n
    pub fn identity(n: usize) -> Self {
        Self::from_triplets(n, n, (0..n).map(|i| (i, i, 1.)).collect())
    }

    /// Periodic second difference operator [1, -2, 1] / h^2 with wrap around
    ///
    /// Requires n >= 3, otherwise neighbours coincide.
    pub fn periodic_second_difference(n: usize, h: f64) -> Self {
        let c = 1. / (h * h);
        let mut triplets = Vec::with_capacity(3 * n);
        for i in 0..n {
            triplets.push((i, (i + n - 1) % n, c));
            triplets.push((i, i, -2. * c));
            triplets.push((i, (i + 1) % n, c));
        }
        Self::from_triplets(n, n, triplets)
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows).flat_map(move |row| {
            (self.indptr[row]..self.indptr[row + 1]).map(move |k| (row, self.indices[k], self.data[k]))
        })
    }

    /// Kronecker product self x other
    pub fn kron(&self, other: &Self) -> Self {
        let mut triplets = Vec::with_capacity(self.nnz() * other.nnz());
        for (r1, c1, a) in self.triplets() {
            for (r2, c2, b) in other.triplets() {
                triplets.push((r1 * other.nrows + r2, c1 * other.ncols + c2, a * b));
            }
        }
        Self::from_triplets(self.nrows * other.nrows, self.ncols * other.ncols, triplets)
    }

    /// Elementwise sum of two matrices of equal shape
    ///
    /// # Panics
    /// Shape mismatch.
    pub fn add(&self, other: &Self) -> Self {
        assert!(
            self.nrows == other.nrows && self.ncols == other.ncols,
            "shape mismatch in sparse add"
        );
        Self::from_triplets(
            self.nrows,
            self.ncols,
            self.triplets().chain(other.triplets()).collect(),
        )
    }

    /// Matrix vector product
    ///
    /// # Panics
    /// Length of `x` differs from number of columns.
    pub fn dot(&self, x: &[f64]) -> Vec<f64> {
        assert!(x.len() == self.ncols, "sparse dot: length mismatch");
        (0..self.nrows).map(|row| self.row_dot(row, x)).collect()
    }

    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        (self.indptr[row]..self.indptr[row + 1])
            .map(|k| self.data[k] * x[self.indices[k]])
            .sum()
    }

    /// Apply operator to a 2-D field, flattened in logical (row major) order.
    /// Fields in standard layout are read in place.
    ///
    /// # Panics
    /// Number of elements differs from number of columns.
    pub fn apply<S: Data<Elem = f64>>(&self, field: &ArrayBase<S, Ix2>) -> Array2<f64> {
        assert!(field.len() == self.ncols, "sparse apply: size mismatch");
        let x = match field.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(field.iter().copied().collect::<Vec<f64>>()),
        };
        let mut out = Array2::<f64>::zeros(field.raw_dim());
        for (row, o) in out.iter_mut().enumerate() {
            *o = self.row_dot(row, &x);
        }
        out
    }

    /// Sum over each row
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows)
            .map(|row| self.data[self.indptr[row]..self.indptr[row + 1]].iter().sum())
            .collect()
    }

    /// Dense copy
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows, self.ncols));
        for (row, col, v) in self.triplets() {
            dense[[row, col]] += v;
        }
        dense
    }
}

/// Two dimensional laplacian on a doubly periodic grid
pub fn laplacian_2d(dxx: &SparseMatrix, dyy: &SparseMatrix) -> SparseMatrix {
    let ix = SparseMatrix::identity(dxx.nrows());
    let iy = SparseMatrix::identity(dyy.nrows());
    dxx.kron(&iy).add(&ix.kron(dyy))
}
