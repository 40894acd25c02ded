
// imports
use crate::error::{ActivationError, Result};

use std::fmt::Display;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use ndarray::parallel::prelude::*;
use sprs::{CsMat, TriMat};


/// How the raw association counts are turned into edge weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightingMode {
    /// response probability given the cue
    Strength,
    Ppmi,
    /// PPMI over the Katz walk of the strength graph
    RandomWalk {
        alpha: f64,
        max_terms: usize,
        tolerance: f64,
    },
}

impl WeightingMode {

    pub fn parse(name: &str, alpha: f64, max_terms: usize, tolerance: f64) -> Result<WeightingMode> {

        match name {
            "strength" => Ok(WeightingMode::Strength),
            "ppmi" => Ok(WeightingMode::Ppmi),
            "random_walk" | "rw" | "katz" => {
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(ActivationError::Config(format!("alpha should be in (0, 1), got {}", alpha)));
                }
                if max_terms == 0 {
                    return Err(ActivationError::Config("max_terms should be positive".to_string()));
                }
                if !(tolerance > 0.0) {
                    return Err(ActivationError::Config(format!("tolerance should be positive, got {}", tolerance)));
                }
                Ok(WeightingMode::RandomWalk { alpha, max_terms, tolerance })
            },
            _ => Err(ActivationError::Config(format!("unrecognized weighting '{}'", name)))
        }
    }
}

impl Display for WeightingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightingMode::Strength => write!(f, "strength"),
            WeightingMode::Ppmi => write!(f, "ppmi"),
            WeightingMode::RandomWalk { alpha, max_terms, tolerance } => {
                write!(f, "random_walk (alpha: {}, max_terms: {}, tolerance: {})", alpha, max_terms, tolerance)
            }
        }
    }
}

/// A weighted graph, sparse as long as the weighting keeps it sparse.
#[derive(Clone, Debug)]
pub enum Weights {
    Sparse(CsMat<f64>),
    Dense(Array2<f64>),
}

impl Weights {

    pub fn shape(&self) -> (usize, usize) {
        match self {
            Weights::Sparse(m) => (m.rows(), m.cols()),
            Weights::Dense(m) => m.dim(),
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Weights::Sparse(m) => m.to_dense(),
            Weights::Dense(m) => m.clone(),
        }
    }

    /// number of non zero weights
    pub fn nnz(&self) -> usize {
        match self {
            Weights::Sparse(m) => m.nnz(),
            Weights::Dense(m) => m.iter().filter(|x| **x != 0.0).count(),
        }
    }
}

/// Result of summing the discounted powers of a transition matrix.
pub struct KatzSeries {
    pub matrix: Array2<f64>,
    pub terms: usize,
    pub converged: bool,
}

pub struct Weighter {}

impl Weighter {

    fn check_square(rows: usize, cols: usize) -> Result<()> {
        if rows != cols {
            return Err(ActivationError::DimensionMismatch { expected: rows, rows, cols });
        }
        Ok(())
    }

    /// Divides every row by its sum. All-zero rows stay zero. Expects CSR storage.
    pub fn l1_normalize(m: &CsMat<f64>) -> CsMat<f64> {

        debug_assert!(m.is_csr());
        let mut tri = TriMat::new((m.rows(), m.cols()));
        for (i, row) in m.outer_iterator().enumerate() {
            let total: f64 = row.iter().map(|(_, v)| *v).sum();
            if total == 0.0 {
                continue;
            }
            for (j, v) in row.iter() {
                if *v != 0.0 {
                    tri.add_triplet(i, j, *v / total);
                }
            }
        }
        tri.to_csr()
    }

    pub fn l1_normalize_dense(m: &mut Array2<f64>) {
        m.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
            let total = row.sum();
            if total != 0.0 {
                row.mapv_inplace(|x| x / total);
            }
        });
    }

    // column mass of a row normalized matrix, D_j = sum_i P_ij / N
    fn column_mass(p: &CsMat<f64>) -> Array1<f64> {
        let mut mass: Array1<f64> = Array1::zeros(p.cols());
        for row in p.outer_iterator() {
            for (j, v) in row.iter() {
                mass[j] += *v;
            }
        }
        let n = p.rows().max(1) as f64;
        mass / n
    }

    fn positive_pmi(p: f64, mass: f64) -> f64 {
        if p <= 0.0 || mass <= 0.0 {
            return 0.0;
        }
        (p / mass).log2().max(0.0)
    }

    /// Row normalizes `x`, replaces every entry by its positive pointwise mutual
    /// information against the column mass, and drops the zeros. Not yet row normalized.
    pub fn positive_pmi_sparse(x: &CsMat<f64>) -> CsMat<f64> {

        let p = Weighter::l1_normalize(x);
        let mass = Weighter::column_mass(&p);

        let mut tri = TriMat::new((p.rows(), p.cols()));
        for (i, row) in p.outer_iterator().enumerate() {
            for (j, v) in row.iter() {
                let pmi = Weighter::positive_pmi(*v, mass[j]);
                if pmi > 0.0 {
                    tri.add_triplet(i, j, pmi);
                }
            }
        }
        tri.to_csr()
    }

    pub fn ppmi(x: &CsMat<f64>) -> CsMat<f64> {
        Weighter::l1_normalize(&Weighter::positive_pmi_sparse(x))
    }

    /// Same as [`Weighter::ppmi`] for a dense matrix, rows handled in parallel.
    pub fn ppmi_dense(mut p: Array2<f64>) -> Array2<f64> {

        Weighter::l1_normalize_dense(&mut p);
        let n = p.nrows().max(1) as f64;
        let mass = p.sum_axis(Axis(0)) / n;

        p.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
            row.iter_mut().zip(mass.iter()).for_each(|(x, d)| {
                *x = Weighter::positive_pmi(*x, *d);
            });
        });

        Weighter::l1_normalize_dense(&mut p);
        p
    }

    /// Sums `alpha^(k-1) * P^k` for k >= 1, P being the row normalized adjacency.
    ///
    /// This is the Neumann series of `(I - alpha P)^-1 P`. Every row of P sums to at most one,
    /// so the largest entry of the k-th term is bounded by `alpha^(k-1)` and the series
    /// stops once that entry falls below `tolerance`, or after `max_terms` terms.
    pub fn katz_walk(adjacency: &CsMat<f64>, alpha: f64, max_terms: usize, tolerance: f64) -> Result<KatzSeries> {

        Weighter::check_square(adjacency.rows(), adjacency.cols())?;

        let p = Weighter::l1_normalize(adjacency);
        let mut term: Array2<f64> = p.to_dense();
        let mut sum = term.clone();
        let mut terms = 1;
        let mut largest = max_abs(&term);

        while largest >= tolerance && terms < max_terms {
            // powers of P commute, so P * T_k is T_k * P
            term = &p * &term;
            term.mapv_inplace(|x| x * alpha);
            sum += &term;
            terms += 1;
            largest = max_abs(&term);
            debug!("katz term {}, largest entry {:e}", terms, largest);
        }

        Ok(KatzSeries { matrix: sum, terms, converged: largest < tolerance })
    }

    pub fn run(adjacency: &CsMat<f64>, mode: &WeightingMode) -> Result<Weights> {

        Weighter::check_square(adjacency.rows(), adjacency.cols())?;
        info!("weighting {}x{} graph ({} edges) with {}", adjacency.rows(), adjacency.cols(), adjacency.nnz(), mode);

        let weights = match mode {
            WeightingMode::Strength => Weights::Sparse(Weighter::l1_normalize(adjacency)),
            WeightingMode::Ppmi => Weights::Sparse(Weighter::ppmi(adjacency)),
            WeightingMode::RandomWalk { alpha, max_terms, tolerance } => {
                let series = Weighter::katz_walk(adjacency, *alpha, *max_terms, *tolerance)?;
                if series.converged {
                    info!("katz walk converged after {} terms", series.terms);
                } else {
                    warn!("katz walk stopped after {} terms without reaching tolerance {:e}", series.terms, tolerance);
                }
                Weights::Dense(Weighter::ppmi_dense(series.matrix))
            }
        };

        debug!("weighted graph holds {} non zero entries", weights.nnz());
        Ok(weights)
    }

}

fn max_abs(m: &Array2<f64>) -> f64 {
    m.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}


#[cfg(test)]
mod tests {

    use super::{Weighter, WeightingMode, Weights};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand_distr::Uniform;
    use sprs::{CsMat, TriMat};

    fn sparse(dense: &Array2<f64>) -> CsMat<f64> {
        let mut tri = TriMat::new(dense.dim());
        for ((i, j), v) in dense.indexed_iter() {
            if *v != 0.0 {
                tri.add_triplet(i, j, *v);
            }
        }
        tri.to_csr()
    }

    #[test]
    fn l1_rows_sum_to_one() {

        let a = sparse(&array![[0.0, 2.0, 2.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        let p = Weighter::l1_normalize(&a).to_dense();

        assert_abs_diff_eq!(p, array![[0.0, 0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]], epsilon = 1e-12);
    }

    #[test]
    fn ppmi_golden() {

        // P = [[.5, .5], [0, 1]], column mass = [.25, .75]
        // (0,0): log2(.5 / .25) = 1
        // (0,1): log2(.5 / .75) < 0 -> dropped
        // (1,1): log2(1 / .75)
        let a = sparse(&array![[1.0, 1.0], [0.0, 3.0]]);
        let pmi = Weighter::positive_pmi_sparse(&a);

        assert_eq!(pmi.nnz(), 2);
        assert_abs_diff_eq!(pmi.to_dense(), array![[1.0, 0.0], [0.0, (4.0f64 / 3.0).log2()]], epsilon = 1e-12);

        let ppmi = Weighter::ppmi(&a).to_dense();
        assert_abs_diff_eq!(ppmi, array![[1.0, 0.0], [0.0, 1.0]], epsilon = 1e-12);
    }

    #[test]
    fn dense_and_sparse_ppmi_agree() {

        let a = array![
            [0.0, 3.0, 1.0, 0.0],
            [2.0, 0.0, 5.0, 1.0],
            [0.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 4.0]
        ];
        let from_sparse = Weighter::ppmi(&sparse(&a)).to_dense();
        let from_dense = Weighter::ppmi_dense(a);

        assert_abs_diff_eq!(from_sparse, from_dense, epsilon = 1e-12);
    }

    #[test]
    fn katz_walk_on_a_swap() {

        // P swaps two nodes: odd powers are P, even powers are I
        // sum = P / (1 - a^2) + I * a / (1 - a^2), with a = 0.5 -> [[2/3, 4/3], [4/3, 2/3]]
        let a = sparse(&array![[0.0, 1.0], [1.0, 0.0]]);
        let series = Weighter::katz_walk(&a, 0.5, 200, 1e-14).unwrap();

        assert!(series.converged);
        assert_abs_diff_eq!(series.matrix, array![[2.0 / 3.0, 4.0 / 3.0], [4.0 / 3.0, 2.0 / 3.0]], epsilon = 1e-10);
    }

    #[test]
    fn katz_walk_solves_the_linear_system() {

        // K = (I - aP)^-1 P  <=>  K - a P K = P
        let alpha = 0.75;
        let a = sparse(&Array2::random((6, 6), Uniform::new(0.0, 1.0)));
        let p = Weighter::l1_normalize(&a).to_dense();
        let k = Weighter::katz_walk(&a, alpha, 1000, 1e-13).unwrap().matrix;

        let residual = &k - &(p.dot(&k) * alpha);
        assert_abs_diff_eq!(residual, p, epsilon = 1e-9);
    }

    #[test]
    fn katz_walk_reports_truncation() {

        let a = sparse(&array![[0.0, 1.0], [1.0, 0.0]]);
        let series = Weighter::katz_walk(&a, 0.9, 3, 1e-12).unwrap();

        assert_eq!(series.terms, 3);
        assert!(!series.converged);
    }

    #[test]
    fn run_keeps_the_shape() {

        let a = sparse(&array![[0.0, 2.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]]);
        let mode = WeightingMode::parse("random_walk", 0.75, 100, 1e-10).unwrap();

        let weights = Weighter::run(&a, &mode).unwrap();
        assert!(matches!(weights, Weights::Dense(_)));
        assert_eq!(weights.shape(), (3, 3));

        // every row of the PPMI graph is l1 normalized
        for row in weights.to_dense().rows() {
            let total = row.sum();
            assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);
        }

        let strength = Weighter::run(&a, &WeightingMode::Strength).unwrap();
        assert!(matches!(strength, Weights::Sparse(_)));
        assert_abs_diff_eq!(strength.to_dense()[[0, 1]], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn non_square_is_rejected() {
        let a = sparse(&array![[0.0, 1.0, 1.0], [1.0, 0.0, 0.0]]);
        assert!(Weighter::run(&a, &WeightingMode::Ppmi).is_err());
        assert!(Weighter::katz_walk(&a, 0.5, 10, 1e-6).is_err());
    }
}
