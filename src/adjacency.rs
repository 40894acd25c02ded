
// imports
use crate::config::JsonColumns;
use crate::error::{ActivationError, Result};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use flate2::read::GzDecoder;
use log::{debug, info};
use ndarray::{Array1, Array2, array, s};
use serde::Serialize;
use sprs::{CsMat, TriMat};


/// Inclusive range of participant ages. The whole population is the bin `all`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgeBin {
    pub min: u32,
    pub max: u32,
    pub label: String,
}

impl AgeBin {

    pub fn new(min: u32, max: u32) -> Result<AgeBin> {
        if min > max {
            return Err(ActivationError::Config(format!("age bin [{}, {}] is inverted", min, max)));
        }
        Ok(Self { min, max, label: format!("{}-{}", min, max) })
    }

    pub fn all() -> AgeBin {
        Self { min: 0, max: u32::MAX, label: "all".to_string() }
    }

    pub fn is_all(&self) -> bool {
        self.label == "all"
    }

    /// rows without an age only belong to the `all` bin
    pub fn contains(&self, age: Option<u32>) -> bool {
        if self.is_all() {
            return true;
        }
        match age {
            Some(age) => self.min <= age && age <= self.max,
            None => false
        }
    }
}

/// The fixed, ordered word list every matrix of a run is indexed by.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vocabulary {
    words: Vec<String>,
    t2i: HashMap<String, usize>,
}

impl Vocabulary {

    /// Keeps the first occurrence of every word, in order.
    pub fn new<I: IntoIterator<Item = String>>(words: I) -> Vocabulary {

        let mut vocabulary = Vocabulary::default();
        for word in words {
            if vocabulary.t2i.contains_key(&word) {
                continue;
            }
            vocabulary.t2i.insert(word.to_owned(), vocabulary.words.len());
            vocabulary.words.push(word);
        }
        vocabulary
    }

    /// one word per line, blank lines are skipped
    pub fn from_file(file_path: &str, lowercase: bool) -> Result<Vocabulary> {

        let lines = BufReader::new(File::open(file_path)?).lines();
        let mut words = Vec::new();
        for line in lines {
            let word = normalize_token(&line?, lowercase);
            if !word.is_empty() {
                words.push(word);
            }
        }
        Ok(Vocabulary::new(words))
    }

    /// sorted distinct cues of the table
    pub fn from_cues(table: &AssociationTable) -> Vocabulary {
        let mut cues: Vec<String> = table.rows.iter().map(|row| row.cue.to_owned()).collect();
        cues.sort();
        cues.dedup();
        Vocabulary::new(cues)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn index(&self, word: &str) -> Option<usize> {
        self.t2i.get(word).copied()
    }

    pub fn word(&self, i: usize) -> Option<&str> {
        self.words.get(i).map(|w| w.as_str())
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// One produced response to a cue.
#[derive(Clone, Debug, PartialEq)]
pub struct Association {
    pub cue: String,
    pub response: String,
    pub age: Option<u32>,
    pub count: f64,
}

#[derive(Clone, Debug, Default)]
pub struct AssociationTable {
    pub rows: Vec<Association>,
}

// tokens are trimmed and optionally lower cased, the same way for table and vocabulary
fn normalize_token(token: &str, lowercase: bool) -> String {
    if lowercase {
        token.trim().to_lowercase()
    } else {
        token.trim().to_string()
    }
}

impl AssociationTable {

    /// Reads a csv table with a header row, gzip compressed when the path ends with `.gz`.
    pub fn read(file_path: &str, columns: &JsonColumns) -> Result<AssociationTable> {

        let f = BufReader::new(File::open(file_path)?);
        let table = if file_path.ends_with(".gz") {
            AssociationTable::from_reader(GzDecoder::new(f), columns, file_path)?
        } else {
            AssociationTable::from_reader(f, columns, file_path)?
        };

        info!("read {} associations from {}", table.rows.len(), file_path);
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, columns: &JsonColumns, source: &str) -> Result<AssociationTable> {

        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let headers = rdr.headers()?.clone();

        let find = |column: &str| -> Result<usize> {
            headers.iter().position(|h| h.trim() == column).ok_or_else(|| ActivationError::MissingColumn {
                column: column.to_string(),
                path: source.to_string(),
            })
        };

        let cue_i = find(columns.cue.as_str())?;
        let response_is = columns.responses.iter().map(|c| find(c.as_str())).collect::<Result<Vec<usize>>>()?;
        let count_i = columns.count.as_ref().map(|c| find(c.as_str())).transpose()?;
        let age_i = columns.age.as_ref().map(|c| find(c.as_str())).transpose()?;

        let is_missing = |value: &str| columns.missing_tokens.iter().any(|m| m == value);

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for record in rdr.records() {

            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let cell = |i: usize| record.get(i).unwrap_or("").trim();

            let cue = normalize_token(cell(cue_i), columns.lowercase);
            if is_missing(cue.as_str()) {
                skipped += 1;
                continue;
            }

            let age = match age_i {
                Some(i) if !is_missing(cell(i)) => Some(cell(i).parse::<u32>().map_err(|_| ActivationError::BadValue {
                    line,
                    column: headers.get(i).unwrap_or("").to_string(),
                    value: cell(i).to_string(),
                })?),
                _ => None
            };

            let count = match count_i {
                Some(i) => cell(i).parse::<f64>().map_err(|_| ActivationError::BadValue {
                    line,
                    column: headers.get(i).unwrap_or("").to_string(),
                    value: cell(i).to_string(),
                })?,
                None => 1.0
            };
            if !(count > 0.0) {
                skipped += 1;
                continue;
            }

            // a row can hold several responses to the same cue
            for i in &response_is {
                let response = normalize_token(cell(*i), columns.lowercase);
                if is_missing(response.as_str()) {
                    continue;
                }
                rows.push(Association { cue: cue.to_owned(), response, age, count });
            }
        }

        if skipped > 0 {
            debug!("skipped {} rows of {} with a missing cue or a non positive count", skipped, source);
        }

        Ok(Self { rows })
    }
}

/// Summed response frequencies, rows are cues and columns responses.
#[derive(Clone, Debug)]
pub struct Adjacency {
    pub matrix: CsMat<f64>,
    pub kept: usize,
    pub dropped: usize,
}

impl Adjacency {

    pub fn build(table: &AssociationTable, vocabulary: &Vocabulary, bin: &AgeBin) -> Result<Adjacency> {

        let n = vocabulary.len();
        let mut tri = TriMat::new((n, n));
        let mut kept = 0usize;
        let mut dropped = 0usize;

        for row in table.rows.iter().filter(|row| bin.contains(row.age)) {
            match (vocabulary.index(&row.cue), vocabulary.index(&row.response)) {
                (Some(i), Some(j)) => {
                    // duplicates are summed by to_csr
                    tri.add_triplet(i, j, row.count);
                    kept += 1;
                },
                _ => dropped += 1
            }
        }

        if kept == 0 {
            return Err(ActivationError::EmptyBin(bin.label.to_owned()));
        }

        let matrix: CsMat<f64> = tri.to_csr();
        info!("bin {}: kept {} associations, dropped {} outside the vocabulary, {} distinct edges",
            bin.label, kept, dropped, matrix.nnz());

        Ok(Self { matrix, kept, dropped })
    }

    pub fn vocab_size(&self) -> usize {
        self.matrix.rows()
    }

    /// `(nnz, 3)` rows of `[cue index, response index, weight]`
    pub fn to_triplets(&self) -> Array2<f64> {

        let mut triplets: Array2<f64> = Array2::zeros((self.matrix.nnz(), 3));
        let mut k = 0;
        for (i, row) in self.matrix.outer_iterator().enumerate() {
            for (j, v) in row.iter() {
                let line: Array1<f64> = array![i as f64, j as f64, *v];
                triplets.slice_mut(s![k, ..]).assign(&line);
                k += 1;
            }
        }
        triplets
    }

    pub fn from_triplets(triplets: &Array2<f64>, vocab_size: usize) -> Result<Adjacency> {

        if triplets.ncols() != 3 {
            return Err(ActivationError::Config(format!("cached adjacency should have 3 columns, found {}", triplets.ncols())));
        }

        let mut tri = TriMat::new((vocab_size, vocab_size));
        for line in triplets.rows() {
            let (i, j) = (line[0] as usize, line[1] as usize);
            if i >= vocab_size || j >= vocab_size {
                return Err(ActivationError::DimensionMismatch { expected: vocab_size, rows: i + 1, cols: j + 1 });
            }
            tri.add_triplet(i, j, line[2]);
        }

        Ok(Self { matrix: tri.to_csr(), kept: triplets.nrows(), dropped: 0 })
    }
}
