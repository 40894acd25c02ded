
pub mod files_handling;

use crate::adjacency::AgeBin;
use crate::error::{ActivationError, Result};
use crate::weighting::WeightingMode;

use serde_json::{Map, Value};
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;

/// Which columns of the association table hold what.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonColumns {
    pub cue: String,
    pub responses: Vec<String>,
    pub count: Option<String>,
    pub age: Option<String>,
    pub missing_tokens: Vec<String>,
    pub lowercase: bool,
}

impl Default for JsonColumns {
    fn default() -> Self {
        Self {
            cue: "cue".to_string(),
            responses: vec!["response".to_string()],
            count: None,
            age: None,
            missing_tokens: vec!["NA".to_string(), "".to_string()],
            lowercase: false,
        }
    }
}

impl Display for JsonColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table columns:
        cue: {},
        responses: {:?},
        count: {:?},
        age: {:?},
        missing_tokens: {:?},
        lowercase: {}",
        self.cue, self.responses, self.count, self.age, self.missing_tokens, self.lowercase
        )
    }
}

#[derive(Clone, Debug)]
pub struct JsonTypes {
    pub input_file: String,
    pub output_dir: String,
    pub vocabulary_file: Option<String>,
    pub age_bins: Vec<AgeBin>,
    pub weighting: WeightingMode,
    pub saved_adjacency: bool,
    pub save_weights: bool,
    pub write_csv: bool,
    pub compress: bool,
    pub num_threads: usize,
    pub columns: JsonColumns,
}

impl Display for JsonTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bins: Vec<String> = self.age_bins.iter().map(|b| b.label.to_owned()).collect();
        write!(f, "using parameters:
        input_file: {}
        output_dir: {}
        vocabulary_file: {:?}
        age_bins: {:?}
        weighting: {}
        saved_adjacency: {}
        save_weights: {}
        write_csv: {}
        compress: {}
        num_threads: {},
        Using {}",
        self.input_file, self.output_dir, self.vocabulary_file, bins, self.weighting,
        self.saved_adjacency, self.save_weights, self.write_csv, self.compress, self.num_threads, self.columns)
    }
}

pub struct Config {
    params: JsonTypes
}

impl Config {

    pub fn get_params(&self) -> JsonTypes {
        self.params.clone()
    }

    /// Builds the parameters from the command line, which must hold a single path to a json file.
    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(ActivationError::Config("input should be a path to json file only".to_string()));
        }

        let f = BufReader::new(File::open(&args[1])?);
        let json: Value = serde_json::from_reader(f)?;
        Config::from_json(&json)
    }

    pub fn from_json(json: &Value) -> Result<Config> {

        let json = json.as_object()
            .ok_or_else(|| ActivationError::Config("top level json should be an object".to_string()))?;

        // required paths
        let input_file = required_str(json, "input_file")?;
        let output_dir = required_str(json, "output_dir")?;
        let vocabulary_file = optional_str(json, "vocabulary_file")?;

        // table layout
        let defaults = JsonColumns::default();
        let columns = JsonColumns {
            cue: optional_str(json, "cue_column")?.unwrap_or(defaults.cue),
            responses: optional_str_list(json, "response_columns")?.unwrap_or(defaults.responses),
            count: optional_str(json, "count_column")?,
            age: optional_str(json, "age_column")?,
            missing_tokens: optional_str_list(json, "missing_tokens")?.unwrap_or(defaults.missing_tokens),
            lowercase: optional_bool(json, "lowercase")?.unwrap_or(defaults.lowercase),
        };
        if columns.responses.is_empty() {
            return Err(ActivationError::Config("response_columns cannot be empty".to_string()));
        }

        let age_bins = match json.get("age_bins") {
            Some(bins) => parse_bins(bins)?,
            None => vec![AgeBin::all()],
        };
        if age_bins.iter().any(|b| !b.is_all()) && columns.age.is_none() {
            return Err(ActivationError::Config("age_bins were given without an age_column".to_string()));
        }

        // handle default vs input parameters of the weighting stage
        let alpha = optional_f64(json, "alpha")?.unwrap_or(0.75);
        let max_terms = optional_usize(json, "max_terms")?.unwrap_or(100);
        let tolerance = optional_f64(json, "tolerance")?.unwrap_or(1e-8);
        let weighting_name = optional_str(json, "weighting")?.unwrap_or_else(|| "random_walk".to_string());
        let weighting = WeightingMode::parse(&weighting_name, alpha, max_terms, tolerance)?;

        let num_threads = optional_usize(json, "num_threads")?.unwrap_or(4);
        if num_threads == 0 {
            return Err(ActivationError::Config("num_threads should be positive".to_string()));
        }

        let params = JsonTypes {
            input_file,
            output_dir,
            vocabulary_file,
            age_bins,
            weighting,
            saved_adjacency: optional_bool(json, "saved_adjacency")?.unwrap_or(false),
            save_weights: optional_bool(json, "save_weights")?.unwrap_or(false),
            write_csv: optional_bool(json, "write_csv")?.unwrap_or(true),
            compress: optional_bool(json, "compress")?.unwrap_or(false),
            num_threads,
            columns,
        };

        Ok(Self { params })
    }

}

fn type_error(key: &str, expected: &str) -> ActivationError {
    ActivationError::Config(format!("given {} is not {}", key, expected))
}

fn required_str(json: &Map<String, Value>, key: &str) -> Result<String> {
    optional_str(json, key)?
        .ok_or_else(|| ActivationError::Config(format!("{} was not supplied through json", key)))
}

fn optional_str(json: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_owned())).ok_or_else(|| type_error(key, "a string")),
    }
}

fn optional_str_list(json: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.to_owned()).ok_or_else(|| type_error(key, "a list of strings")))
            .collect::<Result<Vec<String>>>()
            .map(Some),
        Some(_) => Err(type_error(key, "a list of strings")),
    }
}

fn optional_f64(json: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| type_error(key, "numeric")),
    }
}

fn optional_usize(json: &Map<String, Value>, key: &str) -> Result<Option<usize>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => v.as_u64().map(|x| Some(x as usize)).ok_or_else(|| type_error(key, "a non negative integer")),
    }
}

fn optional_bool(json: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match json.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| type_error(key, "boolean")),
    }
}

fn parse_bins(bins: &Value) -> Result<Vec<AgeBin>> {

    let bins = bins.as_array().ok_or_else(|| type_error("age_bins", "a list of [min, max] pairs"))?;
    if bins.is_empty() {
        return Err(ActivationError::Config("age_bins cannot be empty".to_string()));
    }

    bins.iter().map(|bin| {
        let pair = bin.as_array().filter(|p| p.len() == 2)
            .ok_or_else(|| type_error("age_bins", "a list of [min, max] pairs"))?;
        let min = pair[0].as_u64().ok_or_else(|| type_error("age_bins", "a list of integer pairs"))? as u32;
        let max = pair[1].as_u64().ok_or_else(|| type_error("age_bins", "a list of integer pairs"))? as u32;
        AgeBin::new(min, max)
    }).collect()
}
