//! Frequency-thresholded vocabulary over normalized captions.
//!
//! Words are indexed `1..=V` in the order they were first seen; index 0 is
//! never assigned and serves as row padding in the label table.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sentinel standing in for every excluded word.
pub const UNK_TOKEN: &str = "UNK";

const TOP_WORDS: usize = 20;

/// Token frequency table that remembers first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TokenCounts {
    order: Vec<String>,
    counts: HashMap<String, usize>,
    total: usize,
}

impl TokenCounts {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one token occurrence.
    pub fn add(&mut self, token: &str) {
        self.total += 1;
        match self.counts.get_mut(token) {
            Some(count) => *count += 1,
            None => {
                self.order.push(token.to_string());
                self.counts.insert(token.to_string(), 1);
            }
        }
    }

    /// Counts every token of a sequence.
    pub fn extend<'a, I: IntoIterator<Item = &'a String>>(&mut self, tokens: I) {
        for token in tokens {
            self.add(token);
        }
    }

    /// Occurrences of `token`.
    pub fn count(&self, token: &str) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Total occurrences counted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct tokens.
    pub fn distinct(&self) -> usize {
        self.order.len()
    }

    /// Distinct tokens with their counts, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.order
            .iter()
            .map(|token| (token.as_str(), self.counts[token]))
    }

    /// The `n` most frequent tokens; ties keep first-seen order.
    pub fn most_common(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .iter()
            .map(|(token, count)| (token.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

/// Bijection between retained words and dense indices starting at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Indexes `words` in the given order. Duplicates keep their first index.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self {
            words: Vec::new(),
            index: HashMap::new(),
        };
        for word in words {
            let word = word.into();
            if vocab.index.contains_key(&word) {
                continue;
            }
            vocab.words.push(word.clone());
            vocab.index.insert(word, vocab.words.len() as u32);
        }
        vocab
    }

    /// Rebuilds a vocabulary from its `{"1": word, ...}` JSON form.
    pub fn from_ix_to_word(map: &Map<String, Value>) -> Result<Self, VocabError> {
        let mut by_index = BTreeMap::new();
        for (key, value) in map {
            let ix: u32 = key
                .parse()
                .map_err(|_| VocabError::InvalidIndex(key.clone()))?;
            let Value::String(word) = value else {
                return Err(VocabError::InvalidIndex(key.clone()));
            };
            by_index.insert(ix, word.clone());
        }
        let dense = by_index
            .keys()
            .copied()
            .eq(1..=by_index.len() as u32);
        if !dense {
            return Err(VocabError::InvalidIndex(
                "indices must run 1..=V without gaps".into(),
            ));
        }
        Ok(Self::from_words(by_index.into_values()))
    }

    /// Index of `word`, if retained.
    pub fn index(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    /// Word stored at `index`.
    pub fn word(&self, index: u32) -> Option<&str> {
        let slot = (index as usize).checked_sub(1)?;
        self.words.get(slot).map(String::as_str)
    }

    /// Index of the `UNK` sentinel, if any word was excluded.
    pub fn unk_index(&self) -> Option<u32> {
        self.index(UNK_TOKEN)
    }

    /// Number of indexed words, `UNK` included.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in index order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// The `{"1": word, ...}` map written to the dataset record.
    pub fn ix_to_word(&self) -> Map<String, Value> {
        self.words
            .iter()
            .enumerate()
            .map(|(slot, word)| ((slot + 1).to_string(), Value::String(word.clone())))
            .collect()
    }
}

/// Corpus statistics gathered while building the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabStats {
    /// Token occurrences across every caption.
    pub total_words: usize,
    /// Distinct tokens before thresholding.
    pub distinct_words: usize,
    /// Distinct tokens at or below the threshold.
    pub excluded_words: usize,
    /// Occurrences replaced by `UNK`.
    pub unk_occurrences: usize,
    /// Most frequent tokens with their counts.
    pub top_words: Vec<(String, usize)>,
    /// Caption length mapped to the number of captions of that length.
    pub length_histogram: BTreeMap<usize, usize>,
}

impl VocabStats {
    /// Largest caption length seen.
    pub fn max_caption_length(&self) -> usize {
        self.length_histogram.keys().next_back().copied().unwrap_or(0)
    }

    /// Emits the statistics through `log`.
    pub fn log_summary(&self) {
        log::info!(
            "vocab: total_words={} distinct={} excluded={} unk_occurrences={}",
            self.total_words,
            self.distinct_words,
            self.excluded_words,
            self.unk_occurrences
        );
        if self.distinct_words > 0 {
            log::info!(
                "vocab: excluded {:.2}% of distinct words, UNK covers {:.2}% of tokens",
                self.excluded_words as f64 * 100.0 / self.distinct_words as f64,
                self.unk_occurrences as f64 * 100.0 / self.total_words.max(1) as f64
            );
        }
        log::info!("vocab: max caption length {}", self.max_caption_length());
        for (word, count) in &self.top_words {
            log::debug!("top word {word}: {count}");
        }
        let captions: usize = self.length_histogram.values().sum();
        for (length, n) in &self.length_histogram {
            log::debug!(
                "caption length {length:>3}: {n:>8} ({:.2}%)",
                *n as f64 * 100.0 / captions.max(1) as f64
            );
        }
    }
}

/// Vocabulary plus the captions rewritten against it.
#[derive(Debug, Clone)]
pub struct VocabularyBuild {
    /// The retained words.
    pub vocab: Vocabulary,
    /// Per image, per caption token sequences with excluded words replaced by `UNK`.
    pub final_captions: Vec<Vec<Vec<String>>>,
    /// Corpus statistics.
    pub stats: VocabStats,
}

/// Builds the vocabulary from every caption of every image.
///
/// Words counted `threshold` times or fewer are excluded and `UNK` is
/// appended when at least one word was.
pub fn build_vocab(
    captions: &[Vec<Vec<String>>],
    threshold: usize,
) -> Result<VocabularyBuild, VocabError> {
    let mut counts = TokenCounts::new();
    let mut length_histogram = BTreeMap::new();
    for caption in captions.iter().flatten() {
        counts.extend(caption);
        *length_histogram.entry(caption.len()).or_insert(0) += 1;
    }
    if counts.total() == 0 {
        return Err(VocabError::EmptyCorpus);
    }

    let mut retained = Vec::new();
    let mut excluded_words = 0;
    let mut unk_occurrences = 0;
    for (token, count) in counts.iter() {
        if count > threshold {
            retained.push(token.to_string());
        } else {
            excluded_words += 1;
            unk_occurrences += count;
        }
    }
    if excluded_words > 0 {
        retained.push(UNK_TOKEN.to_string());
    }
    let vocab = Vocabulary::from_words(retained);

    let final_captions = captions
        .iter()
        .map(|image| {
            image
                .iter()
                .map(|caption| {
                    caption
                        .iter()
                        .map(|token| {
                            if counts.count(token) > threshold {
                                token.clone()
                            } else {
                                UNK_TOKEN.to_string()
                            }
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    let stats = VocabStats {
        total_words: counts.total(),
        distinct_words: counts.distinct(),
        excluded_words,
        unk_occurrences,
        top_words: counts.most_common(TOP_WORDS),
        length_histogram,
    };

    Ok(VocabularyBuild {
        vocab,
        final_captions,
        stats,
    })
}

/// Errors raised while building or loading a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    /// No caption contained a single token.
    EmptyCorpus,
    /// A serialized vocabulary had a malformed index.
    InvalidIndex(String),
}

impl fmt::Display for VocabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(f, "cannot build a vocabulary from an empty corpus"),
            Self::InvalidIndex(key) => write!(f, "invalid vocabulary index: {key}"),
        }
    }
}

impl std::error::Error for VocabError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn corpus(images: &[&[&str]]) -> Vec<Vec<Vec<String>>> {
        images
            .iter()
            .map(|captions| {
                captions
                    .iter()
                    .map(|caption| caption.split_whitespace().map(str::to_string).collect())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn zero_threshold_keeps_every_word_in_first_seen_order() {
        let build = build_vocab(&corpus(&[&["a cat sat"], &["a cat ran"]]), 0).unwrap();
        assert_eq!(build.vocab.words(), &["a", "cat", "sat", "ran"]);
        assert_eq!(build.vocab.index("a"), Some(1));
        assert_eq!(build.vocab.index("ran"), Some(4));
        assert_eq!(build.vocab.unk_index(), None);
        assert_eq!(build.stats.unk_occurrences, 0);
    }

    #[test]
    fn threshold_replaces_rare_words_with_unk() {
        let build = build_vocab(&corpus(&[&["a cat sat"], &["a cat ran"]]), 1).unwrap();
        assert_eq!(build.vocab.words(), &["a", "cat", "UNK"]);
        assert_eq!(build.vocab.unk_index(), Some(3));
        assert_eq!(
            build.final_captions,
            corpus(&[&["a cat UNK"], &["a cat UNK"]])
        );
        assert_eq!(build.stats.excluded_words, 2);
        assert_eq!(build.stats.unk_occurrences, 2);
        assert_eq!(build.stats.max_caption_length(), 3);
    }

    #[test]
    fn indices_are_stable_across_runs() {
        let captions = corpus(&[&["x y z", "z z y"], &["w x"]]);
        let first = build_vocab(&captions, 0).unwrap();
        let second = build_vocab(&captions, 0).unwrap();
        assert_eq!(first.vocab, second.vocab);
    }

    #[test]
    fn empty_corpus_is_fatal() {
        assert_eq!(
            build_vocab(&corpus(&[&[""]]), 0).unwrap_err(),
            VocabError::EmptyCorpus
        );
        assert_eq!(build_vocab(&[], 0).unwrap_err(), VocabError::EmptyCorpus);
    }

    #[test]
    fn ix_to_word_round_trips() {
        let vocab = Vocabulary::from_words(["a", "cat", UNK_TOKEN]);
        let map = vocab.ix_to_word();
        assert_eq!(map["1"], "a");
        assert_eq!(map["3"], "UNK");
        assert_eq!(Vocabulary::from_ix_to_word(&map).unwrap(), vocab);
    }

    #[test]
    fn most_common_breaks_ties_by_first_seen() {
        let mut counts = TokenCounts::new();
        for token in ["b", "a", "a", "b", "c"] {
            counts.add(token);
        }
        assert_eq!(
            counts.most_common(2),
            vec![("b".to_string(), 2), ("a".to_string(), 2)]
        );
    }
}
