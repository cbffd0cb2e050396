//! Named-entity tagging and placeholder collapsing.

use caption_text::normalize_sentence;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Assigns an optional entity label to every token of a sequence.
pub trait EntityTagger {
    /// Returns exactly one entry per input token.
    fn tag<'a>(&'a self, tokens: &[String]) -> Vec<Option<&'a str>>;
}

/// A run of consecutive tokens sharing one entity label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    /// Tokens of the span joined with single spaces.
    pub text: String,
    /// Entity label, e.g. `PERSON`.
    pub label: String,
}

/// Placeholder token standing in for an entity of the given label.
pub fn placeholder(label: &str) -> String {
    format!("{label}_")
}

/// Replaces each run of same-label entity tokens with one placeholder.
///
/// Non-entity tokens pass through unchanged.
pub fn collapse_entities(tokens: &[String], labels: &[Option<&str>]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut previous: Option<&str> = None;
    for (token, label) in tokens.iter().zip(labels) {
        match label {
            Some(label) => {
                if previous != Some(*label) {
                    out.push(placeholder(label));
                }
            }
            None => out.push(token.clone()),
        }
        previous = *label;
    }
    out
}

/// Groups consecutive same-label tokens into spans.
pub fn entity_spans(tokens: &[String], labels: &[Option<&str>]) -> Vec<EntitySpan> {
    let mut spans: Vec<EntitySpan> = Vec::new();
    let mut previous: Option<&str> = None;
    for (token, label) in tokens.iter().zip(labels) {
        if let Some(label) = label {
            match spans.last_mut() {
                Some(span) if previous == Some(*label) => {
                    span.text.push(' ');
                    span.text.push_str(token);
                }
                _ => spans.push(EntitySpan {
                    text: token.clone(),
                    label: (*label).to_string(),
                }),
            }
        }
        previous = *label;
    }
    spans
}

/// Gazetteer tagger matching known phrases, longest first, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct LexiconTagger {
    phrases: HashMap<Vec<String>, String>,
    longest: usize,
}

impl LexiconTagger {
    /// Creates an empty lexicon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a phrase under a label. Phrases are normalized the same way
    /// captions are, so punctuation and accents do not affect matching.
    pub fn insert(&mut self, label: &str, phrase: &str) {
        let key: Vec<String> = normalize_sentence(phrase)
            .into_iter()
            .map(|token| token.to_lowercase())
            .collect();
        if key.is_empty() {
            return;
        }
        self.longest = self.longest.max(key.len());
        self.phrases.insert(key, label.to_string());
    }

    /// Loads `LABEL<TAB>phrase` lines; blank lines and `#` comments are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LexiconError> {
        let mut tagger = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(LexiconError::Io)?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((label, phrase)) = trimmed.split_once('\t') else {
                return Err(LexiconError::Malformed { line: line_no + 1 });
            };
            let label = label.trim();
            if label.is_empty() || phrase.trim().is_empty() {
                return Err(LexiconError::Malformed { line: line_no + 1 });
            }
            tagger.insert(label, phrase);
        }
        Ok(tagger)
    }

    /// Loads a gazetteer file.
    pub fn open(path: &Path) -> Result<Self, LexiconError> {
        let file = File::open(path).map_err(LexiconError::Io)?;
        let tagger = Self::from_reader(BufReader::new(file))?;
        log::info!("loaded {} entity phrases from {}", tagger.len(), path.display());
        Ok(tagger)
    }

    /// Number of registered phrases.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// True when no phrase is registered.
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

impl EntityTagger for LexiconTagger {
    fn tag<'a>(&'a self, tokens: &[String]) -> Vec<Option<&'a str>> {
        let lowered: Vec<String> = tokens.iter().map(|token| token.to_lowercase()).collect();
        let mut labels = vec![None; tokens.len()];
        let mut start = 0;
        while start < lowered.len() {
            let max_len = self.longest.min(lowered.len() - start);
            let matched = (1..=max_len).rev().find_map(|len| {
                self.phrases
                    .get(&lowered[start..start + len])
                    .map(|label| (len, label.as_str()))
            });
            match matched {
                Some((len, label)) => {
                    labels[start..start + len].fill(Some(label));
                    start += len;
                }
                None => start += 1,
            }
        }
        labels
    }
}

/// Errors raised while loading a gazetteer.
#[derive(Debug)]
pub enum LexiconError {
    /// Reading the file failed.
    Io(io::Error),
    /// A line did not have the `LABEL<TAB>phrase` shape.
    Malformed {
        /// One-based line number.
        line: usize,
    },
}

impl fmt::Display for LexiconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read entity lexicon: {err}"),
            Self::Malformed { line } => {
                write!(f, "entity lexicon line {line} is not LABEL<TAB>phrase")
            }
        }
    }
}

impl std::error::Error for LexiconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Malformed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn lexicon() -> LexiconTagger {
        let source =
            "# people\nPERSON\tAngela Merkel\nPERSON\tMerkel\nGPE\tNew York\nGPE\tBerlin\n";
        LexiconTagger::from_reader(source.as_bytes()).unwrap()
    }

    #[test]
    fn tags_longest_phrase_case_insensitively() {
        let tagger = lexicon();
        let words = tokens("angela Merkel visits New York");
        assert_eq!(
            tagger.tag(&words),
            vec![
                Some("PERSON"),
                Some("PERSON"),
                None,
                Some("GPE"),
                Some("GPE")
            ]
        );
    }

    #[test]
    fn collapses_runs_into_single_placeholders() {
        let tagger = lexicon();
        let words = tokens("Angela Merkel and Merkel in Berlin New York today");
        let labels = tagger.tag(&words);
        assert_eq!(
            collapse_entities(&words, &labels),
            tokens("PERSON_ and PERSON_ in GPE_ today")
        );
    }

    #[test]
    fn spans_keep_surface_text() {
        let tagger = lexicon();
        let words = tokens("Angela Merkel in Berlin");
        let labels = tagger.tag(&words);
        assert_eq!(
            entity_spans(&words, &labels),
            vec![
                EntitySpan {
                    text: "Angela Merkel".into(),
                    label: "PERSON".into()
                },
                EntitySpan {
                    text: "Berlin".into(),
                    label: "GPE".into()
                },
            ]
        );
    }

    #[test]
    fn rejects_lines_without_tab() {
        let err = LexiconTagger::from_reader("PERSON Merkel\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LexiconError::Malformed { line: 1 }));
    }
}
