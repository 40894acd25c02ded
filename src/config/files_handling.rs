
use crate::adjacency::{Adjacency, Vocabulary};
use crate::error::{ActivationError, Result};
use crate::similarity::Similarity;

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;


pub fn read_input<R: ReadFile>(file_path: &str) -> Result<<R as ReadFile>::Item> {
    <R as ReadFile>::read_file(file_path)
}

pub fn save_output<S: SaveFile>(output_dir: &str, file_name: &str, item: &S) -> Result<()> {

    // create output folder
    fs::create_dir_all(output_dir)?;
    item.save_file(output_dir, file_name)
}

fn join(output_dir: &str, file_name: &str, extension: &str) -> String {
    Path::new(output_dir).join(format!("{}.{}", file_name, extension)).display().to_string()
}

/// Reads an artefact from a path given without its extension.
pub trait ReadFile {
    type Item;
    fn read_file(file_path: &str) -> Result<Self::Item>;
}

/// Writes an artefact as `output_dir/file_name.<extension>`.
pub trait SaveFile {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()>;
}

impl ReadFile for Array2<f64> {
    type Item = Self;
    fn read_file(file_path: &str) -> Result<Self::Item> {
        let in_file = file_path.to_string() + ".npy";
        Ok(read_npy(in_file)?)
    }
}

impl SaveFile for Array2<f64> {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
        write_npy(join(output_dir, file_name, "npy"), self)?;
        Ok(())
    }
}

impl ReadFile for Vocabulary {
    type Item = Self;
    fn read_file(file_path: &str) -> Result<Self::Item> {
        // saved words are already normalized
        Vocabulary::from_file(&(file_path.to_string() + ".txt"), false)
    }
}

impl SaveFile for Vocabulary {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
        let mut f = BufWriter::new(File::create(join(output_dir, file_name, "txt"))?);
        for word in self.words() {
            writeln!(f, "{}", word)?;
        }
        f.flush()?;
        Ok(())
    }
}

/// The adjacency of one bin as `[i, j, weight]` rows, kept to skip reading the table again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedAdjacency {
    pub vocab_size: usize,
    pub triplets: Array2<f64>,
}

impl CachedAdjacency {

    pub fn from_adjacency(adjacency: &Adjacency) -> CachedAdjacency {
        Self { vocab_size: adjacency.vocab_size(), triplets: adjacency.to_triplets() }
    }

    pub fn into_adjacency(self) -> Result<Adjacency> {
        Adjacency::from_triplets(&self.triplets, self.vocab_size)
    }
}

impl ReadFile for CachedAdjacency {
    type Item = Self;
    fn read_file(file_path: &str) -> Result<Self::Item> {
        let in_file = file_path.to_string() + ".gz";
        let reader = GzDecoder::new(BufReader::new(File::open(in_file)?));
        Ok(bincode::deserialize_from(reader)?)
    }
}

impl SaveFile for CachedAdjacency {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
        let f = BufWriter::new(File::create(join(output_dir, file_name, "gz"))?);
        let mut writer = GzEncoder::new(f, Compression::default());
        bincode::serialize_into(&mut writer, self)?;
        writer.finish()?.flush()?;
        Ok(())
    }
}

/// Similarity matrix as a csv table with a word column and one column per word.
pub struct SimilarityCsv<'a> {
    pub similarity: &'a Similarity,
    pub compress: bool,
}

impl SimilarityCsv<'_> {

    fn write_to<W: Write>(&self, sink: W) -> Result<W> {

        let words = self.similarity.vocabulary().words();
        let mut wrt = csv::WriterBuilder::new().from_writer(sink);

        let mut header = vec!["word".to_string()];
        header.extend(words.iter().cloned());
        wrt.write_record(&header)?;

        for (word, row) in words.iter().zip(self.similarity.matrix().rows()) {
            let mut record = vec![word.to_owned()];
            record.extend(row.iter().map(|x| x.to_string()));
            wrt.write_record(&record)?;
        }
        wrt.flush()?;
        wrt.into_inner().map_err(|e| ActivationError::Io(e.into_error()))
    }
}

impl SaveFile for SimilarityCsv<'_> {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {

        if self.compress {
            let f = BufWriter::new(File::create(join(output_dir, file_name, "csv.gz"))?);
            let encoder = self.write_to(GzEncoder::new(f, Compression::default()))?;
            encoder.finish()?.flush()?;
        } else {
            let f = BufWriter::new(File::create(join(output_dir, file_name, "csv"))?);
            self.write_to(f)?.flush()?;
        }
        Ok(())
    }
}

impl<T: Serialize> SaveFile for Vec<T> {
    fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
        let f = BufWriter::new(File::create(join(output_dir, file_name, "json"))?);
        serde_json::to_writer_pretty(f, self)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use super::{read_input, save_output, CachedAdjacency, SimilarityCsv};
    use crate::adjacency::{Adjacency, AgeBin, AssociationTable, Vocabulary};
    use crate::config::JsonColumns;
    use crate::similarity::Similarity;
    use flate2::read::GzDecoder;
    use ndarray::{array, Array2};
    use std::io::Read;

    #[test]
    fn vocabulary_and_npy_on_disk() {

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();

        let vocabulary = Vocabulary::new(vec!["sun".to_string(), "moon".to_string()]);
        save_output(out, "vocab", &vocabulary).unwrap();
        let restored = read_input::<Vocabulary>(&format!("{}/vocab", out)).unwrap();
        assert_eq!(restored, vocabulary);

        let m = array![[1.0, 0.25], [0.25, 1.0]];
        save_output(out, "similarity", &m).unwrap();
        let restored = read_input::<Array2<f64>>(&format!("{}/similarity", out)).unwrap();
        assert_eq!(restored, m);
    }

    #[test]
    fn cached_adjacency_is_gzip_bincode() {

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bin").display().to_string();

        let data = "cue,response\nsun,moon\nsun,moon\nmoon,sun\n";
        let table = AssociationTable::from_reader(data.as_bytes(), &JsonColumns::default(), "t").unwrap();
        let vocabulary = Vocabulary::from_cues(&table);
        let adjacency = Adjacency::build(&table, &vocabulary, &AgeBin::all()).unwrap();

        // the nested output folder is created on the way
        save_output(&out, "adjacency", &CachedAdjacency::from_adjacency(&adjacency)).unwrap();
        let cached = read_input::<CachedAdjacency>(&format!("{}/adjacency", out)).unwrap();

        assert_eq!(cached.vocab_size, 2);
        let restored = cached.into_adjacency().unwrap();
        assert_eq!(restored.matrix.to_dense(), adjacency.matrix.to_dense());
    }

    #[test]
    fn similarity_csv_layout() {

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();

        let vocabulary = Vocabulary::new(vec!["sun".to_string(), "moon".to_string()]);
        let similarity = Similarity::new(array![[1.0, 0.5], [0.5, 1.0]], vocabulary).unwrap();

        save_output(out, "similarity", &SimilarityCsv { similarity: &similarity, compress: false }).unwrap();
        let text = std::fs::read_to_string(dir.path().join("similarity.csv")).unwrap();
        assert_eq!(text, "word,sun,moon\nsun,1,0.5\nmoon,0.5,1\n");

        save_output(out, "similarity", &SimilarityCsv { similarity: &similarity, compress: true }).unwrap();
        let f = std::fs::File::open(dir.path().join("similarity.csv.gz")).unwrap();
        let mut unzipped = String::new();
        GzDecoder::new(f).read_to_string(&mut unzipped).unwrap();
        assert_eq!(unzipped, text);
    }
}
