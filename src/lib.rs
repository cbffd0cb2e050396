#![warn(missing_docs)]
//! Core library entry points for the newscap dataset pipeline.
//!
//! Stages run in this order: `clean` (raw documents to the news dataset),
//! `article_set` (article sentence lists), `dataset` (vocabulary, encoded
//! captions and the dataset record) and `articles` (per-article sentence
//! matrices). Every stage processes its input in file order.

pub mod article_set;
pub mod articles;
pub mod clean;
pub mod components;
pub mod controls;
pub mod dataset;
pub mod document;
pub mod embeddings;
pub mod encoder;
pub mod entities;
pub mod manifest;
pub mod normalizer;
pub mod split;
pub mod tables;
pub mod vocab;

pub use article_set::{article_ids, article_record, build_article_set};
pub use articles::{
    vectorize_article_set, vectorize_articles, ArticleError, ArticleMatrix, ArticleVectorizer,
};
pub use clean::{clean_captions, CleanOutput, DEFAULT_IMAGE_DIR};
pub use components::CommonComponents;
pub use controls::{EncodingArgs, EncodingControls, VectorizeArgs, VectorizeControls, Weighting};
pub use dataset::{assemble_labels, DatasetError, DatasetRecord, ImageMeta, LabelAssembly};
pub use document::{
    parse_documents, ArticleRecord, ArticleSet, CaptionSentence, Document, DocumentError,
    ImageRecord, Split,
};
pub use embeddings::{EmbeddingError, EmbeddingLookup, TokenFrequencies, WordVectors};
pub use encoder::{encode_captions, EncodeError, LabelTable};
pub use entities::{EntityTagger, LexiconError, LexiconTagger};
pub use manifest::{BatchReport, SkipRecord, Stage};
pub use normalizer::{NormalizationConfig, NormalizationError, NormalizedText, Normalizer};
pub use split::{SplitAssigner, DEFAULT_SPLIT_SEED};
pub use vocab::{build_vocab, VocabError, VocabStats, Vocabulary, UNK_TOKEN};
