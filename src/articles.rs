//! Per-article sentence matrices.
//!
//! An article with `n` sentences becomes a `[dim, min(n, sen_len + 1)]`
//! matrix. The first `sen_len` columns hold one sentence each; when there are
//! more, the last column is the plain mean of the remaining sentence vectors.
//! That column is never frequency weighted, even under `Weighting::Weighted`.

use crate::controls::{VectorizeControls, Weighting};
use crate::document::ArticleRecord;
use crate::embeddings::{EmbeddingError, EmbeddingLookup, TokenFrequencies};
use crate::manifest::{BatchReport, Stage};
use crossbeam_channel::bounded;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fmt;
use std::thread;

const PROGRESS_EVERY: usize = 1000;

/// Turns sentence lists into fixed-height matrices.
pub struct ArticleVectorizer<'e, E: ?Sized> {
    embeddings: &'e E,
    frequencies: Option<&'e TokenFrequencies>,
    sen_len: usize,
    weighting: Weighting,
}

impl<'e, E: EmbeddingLookup + ?Sized> ArticleVectorizer<'e, E> {
    /// Checks the lookup against the configured width and weighting.
    pub fn new(
        embeddings: &'e E,
        controls: &VectorizeControls,
        frequencies: Option<&'e TokenFrequencies>,
    ) -> Result<Self, EmbeddingError> {
        if embeddings.dim() != controls.embedding_dim() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: controls.embedding_dim(),
                found: embeddings.dim(),
                word: "<lookup>".into(),
            });
        }
        if controls.weighting() == Weighting::Weighted && frequencies.is_none() {
            return Err(EmbeddingError::MissingFrequencies);
        }
        Ok(Self {
            embeddings,
            frequencies,
            sen_len: controls.sen_len(),
            weighting: controls.weighting(),
        })
    }

    /// Matrix height.
    pub fn dim(&self) -> usize {
        self.embeddings.dim()
    }

    /// Mean-pooled vector of a whitespace-tokenized sentence.
    pub fn plain_sentence_vector(&self, sentence: &str) -> Array1<f64> {
        let tokens: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
        self.embeddings.sentence_vector(&tokens)
    }

    /// Sentence vector under the configured weighting.
    pub fn sentence_vector(&self, sentence: &str) -> Array1<f64> {
        match (self.weighting, self.frequencies) {
            (Weighting::Weighted, Some(frequencies)) => self
                .weighted_sentence_vector(sentence, frequencies)
                .unwrap_or_else(|| self.plain_sentence_vector(sentence)),
            _ => self.plain_sentence_vector(sentence),
        }
    }

    // Tokens without a vector contribute neither vector nor weight.
    fn weighted_sentence_vector(
        &self,
        sentence: &str,
        frequencies: &TokenFrequencies,
    ) -> Option<Array1<f64>> {
        let mut sum = Array1::<f64>::zeros(self.dim());
        let mut total_weight = 0.0;
        for token in sentence.split_whitespace() {
            if let Some(vector) = self.embeddings.token_vector(token) {
                let weight = frequencies.weight(token);
                sum.scaled_add(weight, &vector);
                total_weight += weight;
            }
        }
        (total_weight > 0.0).then(|| sum / total_weight)
    }

    /// Builds the matrix of one article.
    ///
    /// Every sentence keeps its column, so a blank sentence yields the zero
    /// vector. Only an article with no sentence at all is rejected.
    pub fn vectorize(&self, sentences: &[String]) -> Result<Array2<f64>, ArticleError> {
        if sentences.is_empty() {
            return Err(ArticleError::NoSentences);
        }

        let kept = sentences.len().min(self.sen_len);
        let aggregate = sentences.len() > self.sen_len;
        let cols = kept + usize::from(aggregate);
        let mut matrix = Array2::<f64>::zeros((self.dim(), cols));

        for (col, sentence) in sentences.iter().take(kept).enumerate() {
            matrix.column_mut(col).assign(&self.sentence_vector(sentence));
        }
        if aggregate {
            let rest = &sentences[self.sen_len..];
            let mut mean = Array1::<f64>::zeros(self.dim());
            for sentence in rest {
                mean += &self.plain_sentence_vector(sentence);
            }
            mean /= rest.len() as f64;
            matrix.column_mut(kept).assign(&mean);
        }
        Ok(matrix)
    }
}

/// One vectorized article.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleMatrix {
    /// Article id.
    pub key: String,
    /// `[dim, cols]` sentence matrix.
    pub matrix: Array2<f64>,
}

/// Vectorizes every article on a worker pool, keeping input order.
///
/// Articles that cannot be vectorized are recorded in `report` and left out.
pub fn vectorize_articles<E>(
    articles: &[(String, ArticleRecord)],
    vectorizer: &ArticleVectorizer<'_, E>,
    worker_threads: usize,
    report: &mut BatchReport,
) -> Vec<ArticleMatrix>
where
    E: EmbeddingLookup + Sync + ?Sized,
{
    let worker_threads = worker_threads.max(1);
    log::info!(
        "vectorizing {} articles across {} worker(s)",
        articles.len(),
        worker_threads
    );
    let (task_tx, task_rx) = bounded::<(usize, &(String, ArticleRecord))>(worker_threads * 2);
    let (result_tx, result_rx) =
        bounded::<(usize, Result<Array2<f64>, ArticleError>)>(worker_threads * 2);

    let mut matrices = Vec::with_capacity(articles.len());
    thread::scope(|scope| {
        scope.spawn(move || {
            for task in articles.iter().enumerate() {
                if task_tx.send(task).is_err() {
                    break;
                }
            }
        });
        for worker_id in 0..worker_threads {
            let worker_rx = task_rx.clone();
            let worker_tx = result_tx.clone();
            scope.spawn(move || {
                for (ix, (key, record)) in worker_rx.iter() {
                    log::trace!("worker {worker_id} vectorizing {key}");
                    if worker_tx.send((ix, vectorizer.vectorize(&record.sentence))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut pending = BTreeMap::new();
        let mut next = 0usize;
        for (ix, result) in result_rx.iter() {
            pending.insert(ix, result);
            while let Some(result) = pending.remove(&next) {
                let key = &articles[next].0;
                if let Some(matrix) = report.record(key, Stage::Vectorize, result) {
                    matrices.push(ArticleMatrix {
                        key: key.clone(),
                        matrix,
                    });
                }
                next += 1;
                if next % PROGRESS_EVERY == 0 {
                    log::info!("vectorized {next}/{} articles", articles.len());
                }
            }
        }
    });
    matrices
}

/// Vectorizes an article set under `controls`.
///
/// Weighted pooling first counts token frequencies over every sentence of
/// every article, so all weights come from the same complete table.
pub fn vectorize_article_set<E>(
    articles: &[(String, ArticleRecord)],
    embeddings: &E,
    controls: &VectorizeControls,
    report: &mut BatchReport,
) -> Result<Vec<ArticleMatrix>, EmbeddingError>
where
    E: EmbeddingLookup + Sync + ?Sized,
{
    let frequencies = match controls.weighting() {
        Weighting::Weighted => {
            let sentences = articles
                .iter()
                .flat_map(|(_, record)| record.sentence.iter().map(String::as_str));
            let frequencies = TokenFrequencies::from_sentences(sentences);
            log::info!("counted {} distinct article tokens", frequencies.distinct());
            Some(frequencies)
        }
        Weighting::Average => None,
    };
    let vectorizer = ArticleVectorizer::new(embeddings, controls, frequencies.as_ref())?;
    Ok(vectorize_articles(
        articles,
        &vectorizer,
        controls.worker_threads(),
        report,
    ))
}

/// Per-article vectorization failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleError {
    /// The article's sentence list was empty.
    NoSentences,
}

impl fmt::Display for ArticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSentences => write!(f, "article has no sentences"),
        }
    }
}

impl std::error::Error for ArticleError {}
