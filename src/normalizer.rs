//! Caption and sentence normalization for the dataset pipeline.

use crate::entities::{collapse_entities, entity_spans, EntitySpan, EntityTagger};
use caption_text::normalize_sentence;
use std::fmt;
use std::sync::Arc;

/// Normalization tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationConfig {
    /// Lowercase every non-placeholder token.
    pub lowercase: bool,
    /// Replace entity runs with `LABEL_` placeholders in the template output.
    /// Has no effect without a tagger.
    pub collapse_entities: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            collapse_entities: true,
        }
    }
}

/// Errors surfaced while normalizing a caption or sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Nothing but whitespace, markup or punctuation was left.
    Empty,
}

impl fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no tokens left after normalization"),
        }
    }
}

impl std::error::Error for NormalizationError {}

/// Parallel token sequences produced for one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Tokens with entity runs collapsed to placeholders.
    pub template: Vec<String>,
    /// Every token, without placeholders.
    pub full: Vec<String>,
    /// Entities recognized in the text, in order.
    pub entities: Vec<EntitySpan>,
}

impl NormalizedText {
    /// True when at least one entity was recognized.
    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }
}

/// Stateless text normalization service.
#[derive(Clone, Default)]
pub struct Normalizer {
    config: NormalizationConfig,
    tagger: Option<Arc<dyn EntityTagger + Send + Sync>>,
}

impl Normalizer {
    /// Builds a normalizer without entity recognition.
    pub fn new(config: NormalizationConfig) -> Self {
        Self {
            config,
            tagger: None,
        }
    }

    /// Attaches an entity tagger.
    pub fn with_tagger(mut self, tagger: Arc<dyn EntityTagger + Send + Sync>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Returns the underlying config reference.
    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Normalizes raw text into template and full token sequences.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedText, NormalizationError> {
        let tokens = normalize_sentence(raw);
        if tokens.is_empty() {
            return Err(NormalizationError::Empty);
        }

        let (template, entities) = match &self.tagger {
            Some(tagger) => {
                let labels = tagger.tag(&tokens);
                let entities = entity_spans(&tokens, &labels);
                let template = if self.config.collapse_entities {
                    collapse_entities(&tokens, &labels)
                } else {
                    tokens.clone()
                };
                let placeholders: Vec<bool> = if self.config.collapse_entities {
                    template
                        .iter()
                        .map(|token| is_placeholder(token, &entities))
                        .collect()
                } else {
                    vec![false; template.len()]
                };
                (self.fold_case(template, &placeholders), entities)
            }
            None => {
                let flags = vec![false; tokens.len()];
                (self.fold_case(tokens.clone(), &flags), Vec::new())
            }
        };

        let full_flags = vec![false; tokens.len()];
        let full = self.fold_case(tokens, &full_flags);
        Ok(NormalizedText {
            template,
            full,
            entities,
        })
    }

    fn fold_case(&self, tokens: Vec<String>, keep: &[bool]) -> Vec<String> {
        if !self.config.lowercase {
            return tokens;
        }
        tokens
            .into_iter()
            .zip(keep)
            .map(|(token, keep)| if *keep { token } else { token.to_lowercase() })
            .collect()
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.config)
            .field("tagger", &self.tagger.is_some())
            .finish()
    }
}

fn is_placeholder(token: &str, entities: &[EntitySpan]) -> bool {
    token
        .strip_suffix('_')
        .is_some_and(|label| entities.iter().any(|entity| entity.label == label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::LexiconTagger;
    use pretty_assertions::assert_eq;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn tagged() -> Normalizer {
        let mut lexicon = LexiconTagger::new();
        lexicon.insert("PERSON", "Angela Merkel");
        lexicon.insert("GPE", "Berlin");
        Normalizer::new(NormalizationConfig::default()).with_tagger(Arc::new(lexicon))
    }

    #[test]
    fn lowercases_and_drops_punctuation() {
        let normalizer = Normalizer::default();
        let out = normalizer.normalize("  The <i>Mayor</i>, speaking!  ").unwrap();
        assert_eq!(out.template, words("the mayor speaking"));
        assert_eq!(out.full, out.template);
        assert!(!out.has_entities());
    }

    #[test]
    fn collapses_entities_but_keeps_full_sequence() {
        let out = tagged()
            .normalize("Angela Merkel arrives in Berlin.")
            .unwrap();
        assert_eq!(out.template, words("PERSON_ arrives in GPE_"));
        assert_eq!(out.full, words("angela merkel arrives in berlin"));
        assert_eq!(out.entities.len(), 2);
    }

    #[test]
    fn collapse_can_be_disabled() {
        let mut lexicon = LexiconTagger::new();
        lexicon.insert("GPE", "Berlin");
        let normalizer = Normalizer::new(NormalizationConfig {
            lowercase: true,
            collapse_entities: false,
        })
        .with_tagger(Arc::new(lexicon));
        let out = normalizer.normalize("Rain in Berlin").unwrap();
        assert_eq!(out.template, words("rain in berlin"));
        assert!(out.has_entities());
    }

    #[test]
    fn empty_text_is_an_error() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize(" <br/> ... [photo] ").unwrap_err(),
            NormalizationError::Empty
        );
    }
}
