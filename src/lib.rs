
mod error;
mod config;
mod adjacency;
mod weighting;
mod similarity;
mod pipeline;

pub use error::{ActivationError, Result};
pub use config::{files_handling, Config, JsonColumns, JsonTypes};
pub use adjacency::{Adjacency, AgeBin, Association, AssociationTable, Vocabulary};
pub use weighting::{KatzSeries, Weighter, WeightingMode, Weights};
pub use similarity::{Similarity, SimilaritySummary};
pub use pipeline::{BinReport, Pipeline};
