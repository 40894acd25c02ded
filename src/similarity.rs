use crate::adjacency::Vocabulary;
use crate::error::{ActivationError, Result};
use crate::weighting::Weights;

use log::debug;
use ndarray::prelude::*;
use ndarray::parallel::prelude::*;
use ndarray_stats::QuantileExt;
use rand::{thread_rng, seq::IteratorRandom};
use sprs::{CsMat, TriMat};
use std::fmt::Display;


/// Min, max and mean of the off diagonal similarities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilaritySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Display for SimilaritySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "min: {:.4}, max: {:.4}, mean: {:.4}", self.min, self.max, self.mean)
    }
}

/// All-pairs cosine similarity of a weighted graph, looked up by word.
pub struct Similarity {
    matrix: Array2<f64>,
    vocabulary: Vocabulary,
}

impl Similarity {

    pub fn new(matrix: Array2<f64>, vocabulary: Vocabulary) -> Result<Similarity> {

        let (rows, cols) = matrix.dim();
        if rows != vocabulary.len() || cols != vocabulary.len() {
            return Err(ActivationError::DimensionMismatch { expected: vocabulary.len(), rows, cols });
        }
        Ok(Self { matrix, vocabulary })
    }

    pub fn from_weights(weights: &Weights, vocabulary: Vocabulary) -> Result<Similarity> {
        let matrix = Similarity::cosine_matrix(weights)?;
        Similarity::new(matrix, vocabulary)
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn into_parts(self) -> (Array2<f64>, Vocabulary) {
        (self.matrix, self.vocabulary)
    }

    // each row divided by its l2 norm, zero rows stay zero
    fn l2_normalize_sparse(m: &CsMat<f64>) -> CsMat<f64> {

        let mut tri = TriMat::new((m.rows(), m.cols()));
        for (i, row) in m.outer_iterator().enumerate() {
            let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for (j, v) in row.iter() {
                tri.add_triplet(i, j, *v / norm);
            }
        }
        tri.to_csr()
    }

    fn l2_normalize_dense(m: &mut Array2<f64>) {
        m.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
            let norm = row.mapv(|a| a.powi(2)).sum().sqrt();
            if norm != 0.0 {
                row.mapv_inplace(|a| a / norm);
            }
        });
    }

    /// Cosine similarity between every pair of rows of the weighted graph.
    ///
    /// The result is square, symmetric and bounded by `[-1, 1]`; the diagonal is 1 for rows
    /// with at least one non zero weight and 0 for empty rows.
    pub fn cosine_matrix(weights: &Weights) -> Result<Array2<f64>> {

        let (rows, cols) = weights.shape();
        if rows != cols {
            return Err(ActivationError::DimensionMismatch { expected: rows, rows, cols });
        }

        let (mut sim, nonzero_rows): (Array2<f64>, Vec<bool>) = match weights {
            Weights::Sparse(m) => {
                let normed = Similarity::l2_normalize_sparse(m);
                let nonzero = normed.outer_iterator().map(|row| row.nnz() > 0).collect();
                // N * N^T, the transposed side is dense in standard layout
                let normed_t: Array2<f64> = normed.transpose_view().to_dense();
                (&normed * &normed_t, nonzero)
            },
            Weights::Dense(m) => {
                let mut normed = m.clone();
                Similarity::l2_normalize_dense(&mut normed);
                let nonzero = normed.rows().into_iter().map(|row| row.iter().any(|x| *x != 0.0)).collect();
                let mut sim: Array2<f64> = Array2::zeros((rows, rows));
                sim.axis_iter_mut(Axis(0)).into_par_iter().enumerate().for_each(|(i, mut row)| {
                    row.assign(&normed.dot(&normed.row(i)));
                });
                (sim, nonzero)
            }
        };

        // rounding can push |cos| slightly past one
        sim.par_mapv_inplace(|x| x.clamp(-1.0, 1.0));
        for (i, nonzero) in nonzero_rows.iter().enumerate() {
            sim[[i, i]] = if *nonzero { 1.0 } else { 0.0 };
        }

        debug!("built {}x{} cosine matrix", rows, rows);
        Ok(sim)
    }

    pub fn summary(&self) -> SimilaritySummary {

        let n = self.matrix.nrows();
        if n < 2 {
            return SimilaritySummary { min: 0.0, max: 0.0, mean: 0.0 };
        }

        // the diagonal is masked out with NaN, which the skipnan reductions ignore
        let mut off_diagonal = self.matrix.clone();
        off_diagonal.diag_mut().fill(f64::NAN);
        let min = *off_diagonal.min_skipnan();
        let max = *off_diagonal.max_skipnan();
        let mean = (self.matrix.sum() - self.matrix.diag().sum()) / (n * (n - 1)) as f64;

        SimilaritySummary { min, max, mean }
    }

    pub fn score(&self, a: &str, b: &str) -> Result<f64> {
        let i = self.word_index(a)?;
        let j = self.word_index(b)?;
        Ok(self.matrix[[i, j]])
    }

    fn word_index(&self, token: &str) -> Result<usize> {
        self.vocabulary.index(token).ok_or_else(|| ActivationError::UnknownWord(token.to_string()))
    }

    /// The `k` words closest to `token`, best first, the token itself excluded.
    pub fn find_k_most_similar(&self, token: &str, k: usize) -> Result<Vec<(String, f64)>> {

        let i = self.word_index(token)?;
        let mut indexed_scores: Vec<(usize, f64)> = self.matrix.row(i)
            .iter()
            .copied()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .collect();

        // sort by most similar in descending order
        indexed_scores.sort_by(|(_i, s), (_j, t)| t.total_cmp(s));
        indexed_scores.truncate(k);

        Ok(indexed_scores
            .into_iter()
            .filter_map(|(j, score)| self.vocabulary.word(j).map(|w| (w.to_string(), score)))
            .collect())
    }

    /// `k` distinct random words of the vocabulary, in vocabulary order.
    pub fn sample_words(&self, k: usize) -> Vec<String> {

        let mut rng = thread_rng();
        let mut random_indices = (0..self.vocabulary.len()).choose_multiple(&mut rng, k);
        random_indices.sort();

        random_indices
            .iter()
            .filter_map(|i| self.vocabulary.word(*i).map(|w| w.to_string()))
            .collect()
    }

}


#[cfg(test)]
mod tests {

    use crate::adjacency::Vocabulary;
    use crate::similarity::Similarity;
    use crate::weighting::Weights;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand_distr::Uniform;
    use sprs::TriMat;

    fn vocabulary(words: &[&str]) -> Vocabulary {
        Vocabulary::new(words.iter().map(|w| w.to_string()))
    }

    #[test]
    fn cosine_golden() {

        // rows: (1, 0, 0), (1, 1, 0), (0, 0, 0)
        let w = array![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let sim = Similarity::cosine_matrix(&Weights::Dense(w)).unwrap();

        let h = 1.0 / 2.0f64.sqrt();
        assert_abs_diff_eq!(sim, array![[1.0, h, 0.0], [h, 1.0, 0.0], [0.0, 0.0, 0.0]], epsilon = 1e-12);
    }

    #[test]
    fn sparse_and_dense_cosine_agree() {

        let dense: Array2<f64> = Array2::random((7, 7), Uniform::new(0.0, 1.0)).mapv(|x| if x < 0.5 { 0.0 } else { x });
        let mut tri = TriMat::new((7, 7));
        for ((i, j), v) in dense.indexed_iter() {
            if *v != 0.0 {
                tri.add_triplet(i, j, *v);
            }
        }

        let from_sparse = Similarity::cosine_matrix(&Weights::Sparse(tri.to_csr())).unwrap();
        let from_dense = Similarity::cosine_matrix(&Weights::Dense(dense)).unwrap();

        assert_abs_diff_eq!(from_sparse, from_dense, epsilon = 1e-12);
        assert_abs_diff_eq!(from_dense, from_dense.t(), epsilon = 1e-12);
        assert!(from_dense.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn non_square_weights_are_rejected() {
        let w = Array2::<f64>::zeros((2, 3));
        assert!(Similarity::cosine_matrix(&Weights::Dense(w)).is_err());
    }

    #[test]
    fn new_checks_vocabulary_size() {
        let m = Array2::<f64>::eye(3);
        assert!(Similarity::new(m.clone(), vocabulary(&["a", "b"])).is_err());
        assert!(Similarity::new(m, vocabulary(&["a", "b", "c"])).is_ok());
    }

    #[test]
    fn find_most_similar_words() {

        let m = array![
            [1.0, 0.9, 0.1, 0.5],
            [0.9, 1.0, 0.2, 0.3],
            [0.1, 0.2, 1.0, 0.0],
            [0.5, 0.3, 0.0, 1.0]
        ];
        let sim = Similarity::new(m, vocabulary(&["sun", "moon", "car", "star"])).unwrap();

        let similar = sim.find_k_most_similar("sun", 2).unwrap();
        assert_eq!(similar, vec![("moon".to_string(), 0.9), ("star".to_string(), 0.5)]);

        // asking for more than there is returns every other word
        assert_eq!(sim.find_k_most_similar("car", 10).unwrap().len(), 3);

        assert_eq!(sim.score("moon", "car").unwrap(), 0.2);
        assert!(sim.find_k_most_similar("sky", 2).is_err());

        let summary = sim.summary();
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 0.9);
        assert_abs_diff_eq!(summary.mean, 2.0 * 2.0 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn sampled_words_are_distinct() {

        let words: Vec<String> = (0..20).map(|i| format!("w{}", i)).collect();
        let sim = Similarity::new(Array2::eye(20), Vocabulary::new(words)).unwrap();

        let mut sample = sim.sample_words(5);
        assert_eq!(sample.len(), 5);
        sample.dedup();
        assert_eq!(sample.len(), 5);
        assert_eq!(sim.sample_words(50).len(), 20);
    }
}
