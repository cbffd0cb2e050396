//! Common-component removal for sentence vectors.
//!
//! Estimates the top principal directions shared by every sentence column in
//! the corpus (uncentered, as a truncated SVD would) and subtracts each
//! column's projection onto them.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of directions removed unless configured otherwise.
pub const DEFAULT_COMPONENTS: usize = 10;
/// Subspace iteration sweeps unless configured otherwise.
pub const DEFAULT_ITERATIONS: usize = 7;

const RANK_EPSILON: f64 = 1e-12;

/// Orthonormal basis of the dominant sentence directions.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonComponents {
    basis: Vec<Array1<f64>>,
}

impl CommonComponents {
    /// Fits up to `n_components` directions over the columns of `matrices`.
    ///
    /// Fewer directions are kept when the columns span a smaller space.
    pub fn fit<'a, I>(matrices: I, n_components: usize, iterations: usize, seed: u64) -> Self
    where
        I: IntoIterator<Item = &'a Array2<f64>>,
    {
        let mut gram: Option<Array2<f64>> = None;
        let mut columns = 0usize;
        for matrix in matrices {
            let update = matrix.dot(&matrix.t());
            columns += matrix.ncols();
            match gram.as_mut() {
                Some(total) => *total += &update,
                None => gram = Some(update),
            }
        }
        let Some(gram) = gram else {
            return Self { basis: Vec::new() };
        };
        let dim = gram.nrows();
        let k = n_components.min(dim);
        if k == 0 {
            return Self { basis: Vec::new() };
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut basis: Vec<Array1<f64>> = (0..k)
            .map(|_| Array1::from_shape_fn(dim, |_| rng.gen_range(-1.0..1.0)))
            .collect();
        basis = orthonormalize(basis);
        for _ in 0..iterations.max(1) {
            let multiplied = basis.iter().map(|vector| gram.dot(vector)).collect();
            basis = orthonormalize(multiplied);
        }
        log::info!(
            "fitted {} common component(s) over {columns} sentence columns",
            basis.len()
        );
        Self { basis }
    }

    /// Number of directions kept.
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    /// True when nothing will be removed.
    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    /// Unit direction `i`.
    pub fn direction(&self, i: usize) -> Option<ArrayView1<'_, f64>> {
        self.basis.get(i).map(|vector| vector.view())
    }

    /// Subtracts every column's projection onto the basis in place.
    pub fn remove(&self, matrix: &mut Array2<f64>) {
        for mut column in matrix.columns_mut() {
            for direction in &self.basis {
                let projection = direction.dot(&column);
                column.scaled_add(-projection, direction);
            }
        }
    }
}

// Modified Gram-Schmidt; vectors that collapse to zero are dropped.
fn orthonormalize(vectors: Vec<Array1<f64>>) -> Vec<Array1<f64>> {
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(vectors.len());
    for mut vector in vectors {
        for done in &basis {
            let projection = done.dot(&vector);
            vector.scaled_add(-projection, done);
        }
        let norm = vector.dot(&vector).sqrt();
        if norm > RANK_EPSILON {
            basis.push(vector / norm);
        }
    }
    basis
}
