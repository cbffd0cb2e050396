//! Caption cleaning: raw documents to the news dataset.

use crate::document::{CaptionSentence, Document, DocumentError, ImageRecord, Split};
use crate::manifest::{BatchReport, SkipRecord, Stage};
use crate::normalizer::Normalizer;
use crate::split::SplitAssigner;

/// Directory name recorded as every image's `filepath` by default.
pub const DEFAULT_IMAGE_DIR: &str = "resized";

const PROGRESS_EVERY: usize = 5000;

/// Cleaned images plus the outcome of every caption.
#[derive(Debug, Clone, Default)]
pub struct CleanOutput {
    /// Images that kept a caption, in input order.
    pub images: Vec<ImageRecord>,
    /// Processed and skipped captions.
    pub report: BatchReport,
}

impl CleanOutput {
    /// Images assigned to `split`, in input order.
    pub fn subset(&self, split: Split) -> Vec<&ImageRecord> {
        self.images
            .iter()
            .filter(|image| image.split == split)
            .collect()
    }
}

/// Normalizes every caption of every document and assigns splits.
///
/// A split is drawn for every caption visited, before normalization, so
/// assignments depend only on input order and seed.
pub fn clean_captions(
    documents: Vec<Result<Document, DocumentError>>,
    normalizer: &Normalizer,
    splits: &mut SplitAssigner,
    filepath: &str,
) -> CleanOutput {
    let mut output = CleanOutput::default();
    let total = documents.len();
    for (doc_no, document) in documents.into_iter().enumerate() {
        let document = match document {
            Ok(document) => document,
            Err(err) => {
                let id = err.id().unwrap_or("<dataset>").to_string();
                output.report.skip(SkipRecord::new(id, Stage::Parse, err));
                continue;
            }
        };

        for caption in &document.captions {
            let split = splits.assign();
            let imgid = document.image_id(caption);
            let outcome = normalizer.normalize(&caption.text);
            let Some(text) = output.report.record(&imgid, Stage::Normalize, outcome) else {
                continue;
            };
            let cocoid = output.images.len() as u64;
            output.images.push(ImageRecord {
                filename: Some(format!("{imgid}.jpg")),
                filepath: Some(filepath.to_string()),
                cocoid: Some(cocoid),
                imgid,
                sentences: vec![CaptionSentence::new(cocoid, text.template)],
                sentences_full: vec![CaptionSentence::new(cocoid, text.full)],
                split,
            });
        }

        if (doc_no + 1) % PROGRESS_EVERY == 0 {
            log::info!(
                "cleaned {}/{total} documents ({} images kept)",
                doc_no + 1,
                output.images.len()
            );
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_documents;
    use crate::entities::LexiconTagger;
    use crate::normalizer::NormalizationConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const RAW: &str = r#"{
        "d1": {"article": "Body.", "images": {"0": "Angela Merkel in <b>Berlin</b>.", "3": "..."}},
        "d2": "not an object",
        "d3": {"images": {"1": "A crowd gathers [Reuters]"}}
    }"#;

    fn normalizer() -> Normalizer {
        let mut lexicon = LexiconTagger::new();
        lexicon.insert("PERSON", "Angela Merkel");
        lexicon.insert("GPE", "Berlin");
        Normalizer::new(NormalizationConfig::default()).with_tagger(Arc::new(lexicon))
    }

    #[test]
    fn builds_records_and_reports_skips() {
        let documents = parse_documents(RAW.as_bytes()).unwrap();
        let output = clean_captions(
            documents,
            &normalizer(),
            &mut SplitAssigner::new(42),
            DEFAULT_IMAGE_DIR,
        );

        assert_eq!(output.images.len(), 2);
        let first = &output.images[0];
        assert_eq!(first.imgid, "d1_0");
        assert_eq!(first.filename.as_deref(), Some("d1_0.jpg"));
        assert_eq!(first.cocoid, Some(0));
        assert_eq!(first.sentences[0].raw, "PERSON_ in GPE_");
        assert_eq!(first.sentences_full[0].raw, "angela merkel in berlin");

        let second = &output.images[1];
        assert_eq!(second.imgid, "d3_1");
        assert_eq!(second.cocoid, Some(1));
        assert_eq!(second.sentences[0].imgid, 1);
        assert_eq!(second.sentences[0].raw, "a crowd gathers");

        let skipped: Vec<(&str, Stage)> = output
            .report
            .skipped()
            .iter()
            .map(|record| (record.id.as_str(), record.stage))
            .collect();
        assert_eq!(skipped, vec![("d1_3", Stage::Normalize), ("d2", Stage::Parse)]);
        assert_eq!(output.report.processed(), 2);
    }

    #[test]
    fn splits_are_drawn_for_skipped_captions_too() {
        let documents = parse_documents(RAW.as_bytes()).unwrap();
        let output = clean_captions(
            documents,
            &normalizer(),
            &mut SplitAssigner::new(9),
            DEFAULT_IMAGE_DIR,
        );

        let mut expected = SplitAssigner::new(9);
        let first = expected.assign();
        let _skipped = expected.assign();
        let third = expected.assign();
        assert_eq!(output.images[0].split, first);
        assert_eq!(output.images[1].split, third);

        let val = output.subset(Split::Val).len();
        let test = output.subset(Split::Test).len();
        let train = output.subset(Split::Train).len();
        assert_eq!(val + test + train, 2);
    }
}
