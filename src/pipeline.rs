
// imports
use crate::adjacency::{Adjacency, AgeBin, AssociationTable, Vocabulary};
use crate::config::files_handling::{self, CachedAdjacency, SimilarityCsv};
use crate::config::{Config, JsonTypes};
use crate::error::{ActivationError, Result};
use crate::similarity::Similarity;
use crate::weighting::Weighter;

use std::env;
use std::path::Path;
use std::time::Instant;
use log::{error, info};
use rayon::ThreadPoolBuilder;
use serde::Serialize;


/// What one age bin produced.
#[derive(Clone, Debug, Serialize)]
pub struct BinReport {
    pub bin: AgeBin,
    pub vocab_size: usize,
    pub associations: usize,
    pub edges: usize,
    pub weighted_nonzero: usize,
    pub min_similarity: f64,
    pub max_similarity: f64,
    pub mean_similarity: f64,
    pub seconds: f64,
}

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure -
    // -> configuration of arguments
    // -> vocabulary (and association table unless every adjacency is cached)
    // -> per age bin: adjacency, weighting, cosine similarity, saving

    pub fn run() -> Result<Vec<BinReport>> {

        info!("entering program...");
        let args: Vec<String> = env::args().collect();

        info!("building parameters...");
        let params = Config::new(&args)?.get_params();
        info!("{}", params);

        ThreadPoolBuilder::new().num_threads(params.num_threads).build_global()?;
        Pipeline::run_with(&params)
    }

    fn bin_dir(params: &JsonTypes, bin: &AgeBin) -> String {
        Path::new(&params.output_dir).join(&bin.label).display().to_string()
    }

    fn load_vocabulary(params: &JsonTypes, table: Option<&AssociationTable>) -> Result<Vocabulary> {

        let vocabulary = match (&params.vocabulary_file, table) {
            (Some(path), _) => Vocabulary::from_file(path, params.columns.lowercase)?,
            (None, Some(table)) => Vocabulary::from_cues(table),
            // cached adjacencies are indexed by the vocabulary saved with them
            (None, None) => files_handling::read_input::<Vocabulary>(&format!("{}/vocab", params.output_dir))?,
        };

        if vocabulary.is_empty() {
            return Err(ActivationError::Config("the vocabulary is empty".to_string()));
        }
        info!("using a vocabulary of {} words", vocabulary.len());
        Ok(vocabulary)
    }

    pub fn run_with(params: &JsonTypes) -> Result<Vec<BinReport>> {

        let timer = Instant::now();

        let table = if params.saved_adjacency {
            None
        } else {
            info!("reading associations...");
            Some(AssociationTable::read(&params.input_file, &params.columns)?)
        };

        let vocabulary = Pipeline::load_vocabulary(params, table.as_ref())?;
        files_handling::save_output(&params.output_dir, "vocab", &vocabulary)?;
        info!("loaded inputs, took {} seconds ...", timer.elapsed().as_secs());

        // bins are handled one after the other, a failing bin does not stop the others
        let mut reports = Vec::new();
        let mut last_error = None;
        for bin in &params.age_bins {
            match Pipeline::run_bin(params, table.as_ref(), &vocabulary, bin) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("bin {} failed: {}", bin.label, e);
                    last_error = Some(e);
                }
            }
        }

        if reports.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        files_handling::save_output(&params.output_dir, "report", &reports)?;
        info!("finished {} of {} bins, took {} seconds ...", reports.len(), params.age_bins.len(), timer.elapsed().as_secs());
        Ok(reports)
    }

    pub fn run_bin(params: &JsonTypes, table: Option<&AssociationTable>, vocabulary: &Vocabulary, bin: &AgeBin) -> Result<BinReport> {

        let timer = Instant::now();
        let output_dir = Pipeline::bin_dir(params, bin);
        info!("starting bin {}...", bin.label);

        // adjacency, cached or built from the table
        let adjacency = match table {
            Some(table) => {
                let adjacency = Adjacency::build(table, vocabulary, bin)?;
                files_handling::save_output(&output_dir, "adjacency", &CachedAdjacency::from_adjacency(&adjacency))?;
                adjacency
            },
            None => {
                let cached = files_handling::read_input::<CachedAdjacency>(&format!("{}/adjacency", output_dir))?;
                if cached.vocab_size != vocabulary.len() {
                    return Err(ActivationError::DimensionMismatch {
                        expected: vocabulary.len(),
                        rows: cached.vocab_size,
                        cols: cached.vocab_size,
                    });
                }
                info!("loaded cached adjacency of bin {}", bin.label);
                cached.into_adjacency()?
            }
        };

        // weighting
        let weights = Weighter::run(&adjacency.matrix, &params.weighting)?;
        if params.save_weights {
            files_handling::save_output(&output_dir, "weights", &weights.to_dense())?;
        }

        // similarity
        let similarity = Similarity::from_weights(&weights, vocabulary.clone())?;
        let summary = similarity.summary();
        info!("bin {} similarities: {}", bin.label, summary);

        files_handling::save_output(&output_dir, "similarity", similarity.matrix())?;
        files_handling::save_output(&output_dir, "vocab", similarity.vocabulary())?;
        if params.write_csv {
            files_handling::save_output(&output_dir, "similarity", &SimilarityCsv { similarity: &similarity, compress: params.compress })?;
        }

        info!("finished bin {}, took {} seconds ...", bin.label, timer.elapsed().as_secs());

        Ok(BinReport {
            bin: bin.clone(),
            vocab_size: vocabulary.len(),
            associations: adjacency.kept,
            edges: adjacency.matrix.nnz(),
            weighted_nonzero: weights.nnz(),
            min_similarity: summary.min,
            max_similarity: summary.max,
            mean_similarity: summary.mean,
            seconds: timer.elapsed().as_secs_f64(),
        })
    }

}
