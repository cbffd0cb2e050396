//! Encoding and vectorization knobs shared across the dataset binaries.

use clap::{Args, ValueEnum};

/// Default inclusive count at or below which a word is mapped to `UNK`.
pub const DEFAULT_WORD_COUNT_THRESHOLD: usize = 4;
/// Default number of tokens kept per encoded caption.
pub const DEFAULT_MAX_LENGTH: usize = 31;
/// Default number of individually preserved sentence columns per article.
pub const DEFAULT_SEN_LEN: usize = 54;
/// Width of every word embedding in the corpus.
pub const DEFAULT_EMBEDDING_DIM: usize = 300;

/// Bounds applied while building the vocabulary and encoding captions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingControls {
    word_count_threshold: usize,
    max_length: usize,
}

impl EncodingControls {
    /// Constructs a new set of encoding controls.
    pub fn new(word_count_threshold: usize, max_length: usize) -> Self {
        Self {
            word_count_threshold,
            max_length,
        }
    }

    /// Words seen this many times or fewer are excluded from the vocabulary.
    pub fn word_count_threshold(&self) -> usize {
        self.word_count_threshold
    }

    /// Width of every encoded caption row.
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for EncodingControls {
    fn default() -> Self {
        Self {
            word_count_threshold: DEFAULT_WORD_COUNT_THRESHOLD,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// How token embeddings are pooled into a sentence vector.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Weighting {
    /// Plain mean of the token embeddings.
    #[default]
    #[value(alias = "avg")]
    Average,
    /// Inverse-log-frequency weighted mean of the token embeddings.
    #[value(alias = "wavg")]
    Weighted,
}

/// Knobs for turning article sentences into fixed-width matrices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorizeControls {
    sen_len: usize,
    embedding_dim: usize,
    weighting: Weighting,
    worker_threads: usize,
}

impl VectorizeControls {
    /// Constructs a new set of vectorization controls.
    pub fn new(
        sen_len: usize,
        embedding_dim: usize,
        weighting: Weighting,
        worker_threads: usize,
    ) -> Self {
        Self {
            sen_len,
            embedding_dim,
            weighting,
            worker_threads: worker_threads.max(1),
        }
    }

    /// Sentences kept as individual columns before the rest are aggregated.
    pub fn sen_len(&self) -> usize {
        self.sen_len
    }

    /// Expected embedding width.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Sentence pooling strategy.
    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Number of vectorization workers (at least one).
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }
}

impl Default for VectorizeControls {
    fn default() -> Self {
        Self {
            sen_len: DEFAULT_SEN_LEN,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            weighting: Weighting::Average,
            worker_threads: 1,
        }
    }
}

/// Command-line flags for vocabulary building and caption encoding.
#[derive(Args, Debug, Clone)]
pub struct EncodingArgs {
    /// Words occurring this many times or fewer become UNK
    #[arg(
        long,
        alias = "word_count_threshold",
        env = "NEWSCAP_WORD_COUNT_THRESHOLD",
        default_value_t = DEFAULT_WORD_COUNT_THRESHOLD
    )]
    pub word_count_threshold: usize,

    /// Max number of tokens kept per caption
    #[arg(
        long,
        alias = "max_length",
        env = "NEWSCAP_MAX_LENGTH",
        default_value_t = DEFAULT_MAX_LENGTH
    )]
    pub max_length: usize,
}

impl EncodingArgs {
    /// Converts the parsed flags into `EncodingControls`.
    pub fn build_controls(&self) -> EncodingControls {
        EncodingControls::new(self.word_count_threshold, self.max_length)
    }
}

/// Command-line flags for article vectorization.
#[derive(Args, Debug, Clone)]
pub struct VectorizeArgs {
    /// Sentences kept as individual columns; the rest are averaged into one
    #[arg(long, alias = "sen_len", env = "NEWSCAP_SEN_LEN", default_value_t = DEFAULT_SEN_LEN)]
    pub sen_len: usize,

    /// Expected word embedding width
    #[arg(long, env = "NEWSCAP_EMBEDDING_DIM", default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embedding_dim: usize,

    /// Sentence pooling strategy
    #[arg(long, value_enum, env = "NEWSCAP_WEIGHTING", default_value = "average")]
    pub weighting: Weighting,

    /// Number of vectorization worker threads
    #[arg(
        long = "vector-threads",
        env = "NEWSCAP_VECTOR_THREADS",
        default_value_t = 1,
        alias = "worker-threads"
    )]
    pub worker_threads: usize,
}

impl VectorizeArgs {
    /// Converts the parsed flags into `VectorizeControls`.
    pub fn build_controls(&self) -> VectorizeControls {
        VectorizeControls::new(
            self.sen_len,
            self.embedding_dim,
            self.weighting,
            self.worker_threads,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        encoding: EncodingArgs,
        #[command(flatten)]
        vectorize: VectorizeArgs,
    }

    #[test]
    fn defaults_match_controls_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        assert_eq!(cli.encoding.build_controls(), EncodingControls::default());
        assert_eq!(cli.vectorize.build_controls(), VectorizeControls::default());
    }

    #[test]
    fn accepts_underscore_aliases_and_short_weighting_names() {
        let cli = TestCli::try_parse_from([
            "test",
            "--word_count_threshold",
            "0",
            "--max_length",
            "16",
            "--sen_len",
            "5",
            "--weighting",
            "wavg",
            "--vector-threads",
            "0",
        ])
        .unwrap();

        let encoding = cli.encoding.build_controls();
        assert_eq!(encoding.word_count_threshold(), 0);
        assert_eq!(encoding.max_length(), 16);

        let vectorize = cli.vectorize.build_controls();
        assert_eq!(vectorize.sen_len(), 5);
        assert_eq!(vectorize.weighting(), Weighting::Weighted);
        assert_eq!(vectorize.worker_threads(), 1);
    }
}
