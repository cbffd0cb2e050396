//! Label assembly: vocabulary, encoded captions and the dataset record.

use crate::controls::EncodingControls;
use crate::document::{ImageRecord, Split};
use crate::encoder::{encode_captions, EncodeError, LabelTable};
use crate::vocab::{build_vocab, VocabError, VocabStats, Vocabulary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Read, Write};

/// Per-image metadata written next to the label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Assigned partition.
    pub split: Split,
    /// Relative image path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Dense numeric image id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl From<&ImageRecord> for ImageMeta {
    fn from(image: &ImageRecord) -> Self {
        Self {
            split: image.split,
            file_path: image.file_path(),
            id: image.cocoid,
        }
    }
}

/// The JSON record consumed by the training data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// `{"1": word, ...}` vocabulary.
    pub ix_to_word: Map<String, Value>,
    /// One entry per label-table image, in the same order.
    pub images: Vec<ImageMeta>,
}

impl DatasetRecord {
    /// Rebuilds the vocabulary stored in the record.
    pub fn vocabulary(&self) -> Result<Vocabulary, VocabError> {
        Vocabulary::from_ix_to_word(&self.ix_to_word)
    }
}

/// Everything `assemble_labels` produces.
#[derive(Debug, Clone)]
pub struct LabelAssembly {
    /// Vocabulary and image metadata.
    pub record: DatasetRecord,
    /// Encoded captions and pointers.
    pub table: LabelTable,
    /// Vocabulary statistics.
    pub stats: VocabStats,
}

/// Reads the news dataset written by the cleaning stage.
pub fn read_image_records<R: Read>(reader: R) -> Result<Vec<ImageRecord>, DatasetError> {
    serde_json::from_reader(reader).map_err(DatasetError::Json)
}

/// Writes the dataset record as compact JSON.
pub fn write_dataset_record<W: Write>(
    writer: W,
    record: &DatasetRecord,
) -> serde_json::Result<()> {
    serde_json::to_writer(writer, record)
}

/// Builds the vocabulary and encodes every caption, in image order.
pub fn assemble_labels(
    images: &[ImageRecord],
    controls: &EncodingControls,
) -> Result<LabelAssembly, DatasetError> {
    if let Some(image) = images.iter().find(|image| image.sentences.is_empty()) {
        return Err(DatasetError::NoCaptions(image.imgid.clone()));
    }
    let captions: Vec<Vec<Vec<String>>> =
        images.iter().map(ImageRecord::caption_tokens).collect();

    let build = build_vocab(&captions, controls.word_count_threshold())?;
    let table = encode_captions(&build.final_captions, &build.vocab, controls.max_length())?;
    log::info!(
        "encoded {} captions of {} images into a {}x{} table",
        table.n_captions(),
        table.n_images(),
        table.n_captions(),
        table.max_length()
    );

    let record = DatasetRecord {
        ix_to_word: build.vocab.ix_to_word(),
        images: images.iter().map(ImageMeta::from).collect(),
    };
    Ok(LabelAssembly {
        record,
        table,
        stats: build.stats,
    })
}

/// Fatal label assembly failures.
#[derive(Debug)]
pub enum DatasetError {
    /// The news dataset could not be decoded.
    Json(serde_json::Error),
    /// An image carried no caption.
    NoCaptions(String),
    /// Vocabulary construction failed.
    Vocab(VocabError),
    /// Caption encoding failed.
    Encode(EncodeError),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid news dataset: {err}"),
            Self::NoCaptions(imgid) => write!(f, "image {imgid} has no captions"),
            Self::Vocab(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::NoCaptions(_) => None,
            Self::Vocab(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<VocabError> for DatasetError {
    fn from(err: VocabError) -> Self {
        Self::Vocab(err)
    }
}

impl From<EncodeError> for DatasetError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CaptionSentence;
    use pretty_assertions::assert_eq;

    fn image(imgid: &str, cocoid: u64, captions: &[&str], split: Split) -> ImageRecord {
        ImageRecord {
            filename: Some(format!("{imgid}.jpg")),
            filepath: Some("resized".into()),
            cocoid: Some(cocoid),
            imgid: imgid.into(),
            sentences: captions
                .iter()
                .map(|caption| {
                    CaptionSentence::new(
                        cocoid,
                        caption.split_whitespace().map(str::to_string).collect(),
                    )
                })
                .collect(),
            sentences_full: Vec::new(),
            split,
        }
    }

    #[test]
    fn assembles_record_and_table_in_image_order() {
        let images = vec![
            image("d1_0", 0, &["a cat sat"], Split::Train),
            image("d1_1", 1, &["a cat ran", "a dog"], Split::Test),
        ];
        let assembly = assemble_labels(&images, &EncodingControls::new(1, 4)).unwrap();

        assert_eq!(assembly.record.ix_to_word["1"], "a");
        assert_eq!(assembly.record.ix_to_word["3"], "UNK");
        assert_eq!(
            assembly.record.images[1],
            ImageMeta {
                split: Split::Test,
                file_path: Some("resized/d1_1.jpg".into()),
                id: Some(1),
            }
        );
        assert_eq!(assembly.table.label_start_ix, vec![1, 2]);
        assert_eq!(assembly.table.label_end_ix, vec![1, 3]);
        assert_eq!(assembly.table.labels.row(2).to_vec(), vec![1, 3, 0, 0]);

        let json = serde_json::to_value(&assembly.record).unwrap();
        assert_eq!(json["images"][0]["split"], "train");
        let vocab = assembly.record.vocabulary().unwrap();
        assert_eq!(vocab.unk_index(), Some(3));
    }

    #[test]
    fn image_without_captions_is_fatal() {
        let images = vec![image("d1_0", 0, &[], Split::Train)];
        let err = assemble_labels(&images, &EncodingControls::default()).unwrap_err();
        assert!(matches!(err, DatasetError::NoCaptions(id) if id == "d1_0"));
    }
}
