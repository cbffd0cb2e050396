//! Word embedding lookup and corpus token frequencies used for article vectors.

use crate::vocab::TokenCounts;
use ndarray::{Array1, ArrayView1};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead};

/// Smoothing constant `a` in `a / (a + ln(1 + freq))`.
pub const SMOOTHING: f64 = 1e-3;
/// Frequency assumed for tokens missing from the corpus table.
pub const ABSENT_TOKEN_FREQUENCY: f64 = 10.0;

/// Token to fixed-width vector lookup.
pub trait EmbeddingLookup {
    /// Width of every vector.
    fn dim(&self) -> usize;

    /// Vector for one token, when known.
    fn token_vector(&self, token: &str) -> Option<ArrayView1<'_, f64>>;

    /// Mean of the vectors of the tokens that have one; zeros when none do.
    fn sentence_vector(&self, tokens: &[String]) -> Array1<f64> {
        let mut sum = Array1::<f64>::zeros(self.dim());
        let mut found = 0usize;
        for token in tokens {
            if let Some(vector) = self.token_vector(token) {
                sum += &vector;
                found += 1;
            }
        }
        if found > 0 {
            sum /= found as f64;
        }
        sum
    }
}

/// In-memory word vectors loaded from the word2vec/GloVe text format.
#[derive(Debug, Clone)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Array1<f64>>,
}

impl WordVectors {
    /// Creates an empty table of `dim`-wide vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
        }
    }

    /// Adds or replaces one vector.
    pub fn insert(
        &mut self,
        word: impl Into<String>,
        vector: Vec<f64>,
    ) -> Result<(), EmbeddingError> {
        let word = word.into();
        if vector.len() != self.dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dim,
                found: vector.len(),
                word,
            });
        }
        self.vectors.insert(word, Array1::from(vector));
        Ok(())
    }

    /// Loads `word v1 v2 ...` lines, with an optional `count dim` header.
    ///
    /// Every vector must be exactly `dim` wide.
    pub fn from_reader<R: BufRead>(reader: R, dim: usize) -> Result<Self, EmbeddingError> {
        let mut table = Self::new(dim);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(EmbeddingError::Io)?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if line_no == 0 && values.len() == 1 {
                let header = (word.parse::<usize>(), values[0].parse::<usize>());
                if let (Ok(_), Ok(header_dim)) = header {
                    if header_dim != dim {
                        return Err(EmbeddingError::DimensionMismatch {
                            expected: dim,
                            found: header_dim,
                            word: "<header>".into(),
                        });
                    }
                    continue;
                }
            }

            let vector = values
                .iter()
                .map(|value| value.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| EmbeddingError::Parse {
                    line: line_no + 1,
                    message: err.to_string(),
                })?;
            table.insert(word, vector)?;
        }
        log::info!("loaded {} word vectors (dim={dim})", table.len());
        Ok(table)
    }

    /// Number of words with a vector.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when no vector is loaded.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl EmbeddingLookup for WordVectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn token_vector(&self, token: &str) -> Option<ArrayView1<'_, f64>> {
        self.vectors
            .get(token)
            .or_else(|| self.vectors.get(&token.to_lowercase()))
            .map(|vector| vector.view())
    }
}

/// Corpus-wide lowercase token frequencies, built once before any weighting.
#[derive(Debug, Clone, Default)]
pub struct TokenFrequencies {
    counts: TokenCounts,
}

impl TokenFrequencies {
    /// Counts every whitespace-separated token of every sentence.
    pub fn from_sentences<'a, I>(sentences: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = TokenCounts::new();
        for sentence in sentences {
            for token in sentence.split_whitespace() {
                counts.add(&token.to_lowercase());
            }
        }
        Self { counts }
    }

    /// Occurrences of `token`, or the absent-token default.
    pub fn frequency(&self, token: &str) -> f64 {
        match self.counts.count(&token.to_lowercase()) {
            0 => ABSENT_TOKEN_FREQUENCY,
            n => n as f64,
        }
    }

    /// Smoothed inverse-log-frequency weight of `token`.
    pub fn weight(&self, token: &str) -> f64 {
        SMOOTHING / (SMOOTHING + (1.0 + self.frequency(token)).ln())
    }

    /// Number of distinct tokens counted.
    pub fn distinct(&self) -> usize {
        self.counts.distinct()
    }
}

/// Errors raised while loading embeddings or preparing weights.
#[derive(Debug)]
pub enum EmbeddingError {
    /// A vector did not have the configured width.
    DimensionMismatch {
        /// Configured width.
        expected: usize,
        /// Width found in the input.
        found: usize,
        /// Word the vector belongs to.
        word: String,
    },
    /// A vector component was not a number.
    Parse {
        /// One-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },
    /// Reading the vectors failed.
    Io(io::Error),
    /// Weighted pooling was requested without a frequency table.
    MissingFrequencies,
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                expected,
                found,
                word,
            } => write!(
                f,
                "embedding for {word:?} has dimension {found}, expected {expected}"
            ),
            Self::Parse { line, message } => {
                write!(f, "invalid embedding value on line {line}: {message}")
            }
            Self::Io(err) => write!(f, "failed to read embeddings: {err}"),
            Self::MissingFrequencies => {
                write!(f, "weighted pooling needs corpus token frequencies")
            }
        }
    }
}

impl std::error::Error for EmbeddingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_text_vectors_with_header() {
        let text = "2 3\ncat 1 0 0\nDog 0 1 0.5\n";
        let vectors = WordVectors::from_reader(text.as_bytes(), 3).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors.token_vector("cat").unwrap().to_vec(), vec![1.0, 0.0, 0.0]);
        assert!(vectors.token_vector("dog").is_none());
        assert!(vectors.token_vector("DOG").is_none());
        assert!(vectors.token_vector("Dog").is_some());
    }

    #[test]
    fn lowercase_fallback_applies_to_mixed_case_queries() {
        let mut vectors = WordVectors::new(2);
        vectors.insert("paris", vec![1.0, 2.0]).unwrap();
        assert_eq!(vectors.token_vector("Paris").unwrap().to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn wrong_width_is_fatal() {
        let err = WordVectors::from_reader("cat 1 0\n".as_bytes(), 3).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));

        let err = WordVectors::from_reader("10 50\ncat 1 0 0\n".as_bytes(), 3).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { found: 50, .. }));
    }

    #[test]
    fn sentence_vector_averages_known_tokens() {
        let mut vectors = WordVectors::new(2);
        vectors.insert("a", vec![1.0, 0.0]).unwrap();
        vectors.insert("b", vec![0.0, 3.0]).unwrap();
        let tokens: Vec<String> = ["a", "b", "zzz"].iter().map(|t| t.to_string()).collect();
        assert_eq!(vectors.sentence_vector(&tokens).to_vec(), vec![0.5, 1.5]);
        assert_eq!(
            vectors.sentence_vector(&["zzz".to_string()]).to_vec(),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn rare_tokens_weigh_more() {
        let freqs = TokenFrequencies::from_sentences(["the cat", "the dog", "The end"]);
        assert_eq!(freqs.frequency("the"), 3.0);
        assert_eq!(freqs.frequency("unseen"), ABSENT_TOKEN_FREQUENCY);
        assert!(freqs.weight("cat") > freqs.weight("the"));
        let expected = SMOOTHING / (SMOOTHING + 4f64.ln());
        assert!((freqs.weight("THE") - expected).abs() < 1e-12);
    }
}
