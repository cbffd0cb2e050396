//! Article set: sentence lists for every article that kept an image.

use crate::document::{ArticleRecord, ArticleSet, Document, ImageRecord};
use crate::manifest::{BatchReport, SkipRecord, Stage};
use crate::normalizer::{NormalizationError, Normalizer};
use caption_text::split_sentences;
use std::collections::{HashMap, HashSet};

const PROGRESS_EVERY: usize = 1000;

/// Distinct article ids of `images`, in first-seen order.
pub fn article_ids(images: &[ImageRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .iter()
        .map(ImageRecord::article_id)
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Splits and normalizes one article body.
///
/// Sentences that normalize to nothing are dropped.
pub fn article_record(text: &str, normalizer: &Normalizer) -> ArticleRecord {
    let mut record = ArticleRecord::default();
    for sentence in split_sentences(text) {
        let normalized = match normalizer.normalize(&sentence) {
            Ok(normalized) => normalized,
            Err(NormalizationError::Empty) => continue,
        };
        let joined = normalized.full.join(" ");
        if normalized.has_entities() {
            record.sentence_ner.push(joined.clone());
            for entity in normalized.entities {
                record.ner.insert(entity.text, entity.label);
            }
        }
        record.sentence.push(joined);
    }
    record
}

/// Builds the article set for the articles referenced by `images`.
///
/// Articles missing from `documents`, without a body, or without a single
/// usable sentence are recorded in `report` and left out.
pub fn build_article_set(
    images: &[ImageRecord],
    documents: &[Document],
    normalizer: &Normalizer,
    report: &mut BatchReport,
) -> ArticleSet {
    let by_id: HashMap<&str, &Document> = documents
        .iter()
        .map(|document| (document.id.as_str(), document))
        .collect();
    let ids = article_ids(images);
    log::info!(
        "building article set for {} articles ({} documents, {} images)",
        ids.len(),
        documents.len(),
        images.len()
    );

    let mut articles = Vec::with_capacity(ids.len());
    for (n, id) in ids.into_iter().enumerate() {
        let Some(document) = by_id.get(id.as_str()) else {
            report.skip(SkipRecord::new(id, Stage::Parse, "not in the captioning dataset"));
            continue;
        };
        let Some(text) = document.article.as_deref() else {
            report.skip(SkipRecord::new(id, Stage::Parse, "document has no article text"));
            continue;
        };
        let record = article_record(text, normalizer);
        let outcome = if record.sentence.is_empty() {
            Err("article has no usable sentences")
        } else {
            Ok(record)
        };
        if let Some(record) = report.record(&id, Stage::Normalize, outcome) {
            articles.push((id, record));
        }
        if (n + 1) % PROGRESS_EVERY == 0 {
            log::info!("processed {} articles", n + 1);
        }
    }
    articles
}
