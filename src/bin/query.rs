use std::{env, fs::File, io::{self, BufRead}, process};
use env_logger::Env;
use log::{error, warn};
use ndarray::Array2;
use swow_activation::{files_handling, Result, Similarity, Vocabulary};


// looks up the most similar words in a similarity matrix saved by the main pipeline.
// treated as binary executable so it can be ran independently from main
//
// arguments:
// path to similarity matrix (npy)
// path to vocabulary (txt)
// either a path to a file with one word per line, or "random:K" for K random words
// optionally the number of neighbours to print, 10 by default
// example: ... Output/16-24/similarity.npy Output/16-24/vocab.txt Input/words.txt 20

fn main() {

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 && args.len() != 5 {
        error!("usage: query <similarity.npy> <vocab.txt> <words.txt | random:K> [k]");
        process::exit(2);
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {

    let k = match args.get(4) {
        Some(k) => k.parse::<usize>().map_err(|_| swow_activation::ActivationError::Config(format!("k should be a positive integer, got {}", k)))?,
        None => 10
    };

    // read in the matrix and its vocabulary
    let matrix = files_handling::read_input::<Array2<f64>>(args[1].strip_suffix(".npy").unwrap_or(&args[1]))?;
    let vocabulary = files_handling::read_input::<Vocabulary>(args[2].strip_suffix(".txt").unwrap_or(&args[2]))?;
    let similarity = Similarity::new(matrix, vocabulary)?;

    let words = match args[3].strip_prefix("random:") {
        Some(n) => {
            let n = n.parse::<usize>().map_err(|_| swow_activation::ActivationError::Config(format!("could not parse random sample size {}", n)))?;
            similarity.sample_words(n)
        },
        None => {
            let lines = io::BufReader::new(File::open(&args[3])?).lines();
            let mut words = Vec::new();
            for line in lines {
                let word = line?.trim().to_string();
                if !word.is_empty() {
                    words.push(word);
                }
            }
            words
        }
    };

    run_similarity(&words, k, &similarity);
    Ok(())
}

fn run_similarity(inputs: &[String], k: usize, similarity: &Similarity) {

    // finding the k most similar words to each of the input words

    for token in inputs {

        match similarity.find_k_most_similar(token, k) {
            Ok(similarities) => {
                println!("searching {} most similar words to {}", k, token);
                for (i, (similar_token, score)) in similarities.iter().enumerate() {
                    println!("{} : {} ? {} = {:.4}", i, token, similar_token, score);
                }
                println!();
            },
            Err(e) => warn!("{}", e)
        }
    }
}
