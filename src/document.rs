//! Dataset records exchanged between pipeline stages.
//!
//! Raw documents come from the captioning dataset produced by the fetch stage
//! (`{id: {"article": ..., "images": {index: caption}}}`). They are validated
//! once, here, and every later stage works with the typed records. Object key
//! order is preserved end to end: documents, images and articles are always
//! processed in the order they appear in their input file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

/// Partition an image is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training set.
    Train,
    /// Validation set.
    Val,
    /// Held-out test set.
    Test,
}

impl Split {
    /// Label used in the JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caption attached to an image of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCaption {
    /// Image index within the document (the key in the `images` object).
    pub index: String,
    /// Raw caption text.
    pub text: String,
}

/// One news item from the raw captioning dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Raw article body, when the fetch stage captured one.
    pub article: Option<String>,
    /// Image captions in input order.
    pub captions: Vec<ImageCaption>,
}

impl Document {
    /// Validates one raw dataset entry.
    ///
    /// A missing `images` object means the document has no images; any other
    /// shape mismatch is reported as a `DocumentError`.
    pub fn from_value(id: &str, value: &Value) -> Result<Self, DocumentError> {
        let Value::Object(fields) = value else {
            return Err(DocumentError::NotAnObject { id: id.to_string() });
        };

        let article = match fields.get("article") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(_) => return Err(DocumentError::InvalidArticle { id: id.to_string() }),
        };

        let captions = match fields.get("images") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(images)) => images
                .iter()
                .map(|(index, caption)| match caption {
                    Value::String(text) => Ok(ImageCaption {
                        index: index.clone(),
                        text: text.clone(),
                    }),
                    _ => Err(DocumentError::InvalidCaption {
                        id: id.to_string(),
                        index: index.clone(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(DocumentError::InvalidImages { id: id.to_string() }),
        };

        Ok(Self {
            id: id.to_string(),
            article,
            captions,
        })
    }

    /// Image identifier (`{document}_{index}`) for one of this document's captions.
    pub fn image_id(&self, caption: &ImageCaption) -> String {
        format!("{}_{}", self.id, caption.index)
    }
}

/// Parses the raw captioning dataset, validating each entry independently.
///
/// The outer error is fatal (unreadable JSON or a non-object root); inner
/// errors concern a single document and are left to the caller to report.
pub fn parse_documents<R: Read>(
    reader: R,
) -> Result<Vec<Result<Document, DocumentError>>, DocumentError> {
    let root: Value = serde_json::from_reader(reader).map_err(DocumentError::Json)?;
    let Value::Object(entries) = root else {
        return Err(DocumentError::RootNotAnObject);
    };
    Ok(entries
        .iter()
        .map(|(id, value)| Document::from_value(id, value))
        .collect())
}

/// Errors raised while validating dataset records.
#[derive(Debug)]
pub enum DocumentError {
    /// The input was not valid JSON.
    Json(serde_json::Error),
    /// The dataset root was not a JSON object keyed by document id.
    RootNotAnObject,
    /// A dataset entry was not a JSON object.
    NotAnObject {
        /// Offending document id.
        id: String,
    },
    /// The `article` field was present but not a string.
    InvalidArticle {
        /// Offending document id.
        id: String,
    },
    /// The `images` field was present but not an object.
    InvalidImages {
        /// Offending document id.
        id: String,
    },
    /// A caption was not a string.
    InvalidCaption {
        /// Offending document id.
        id: String,
        /// Image index of the bad caption.
        index: String,
    },
    /// An article record did not match the expected shape.
    InvalidArticleRecord {
        /// Offending article key.
        id: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

impl DocumentError {
    /// Document id the error concerns, when it concerns a single document.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Json(_) | Self::RootNotAnObject => None,
            Self::NotAnObject { id }
            | Self::InvalidArticle { id }
            | Self::InvalidImages { id }
            | Self::InvalidCaption { id, .. }
            | Self::InvalidArticleRecord { id, .. } => Some(id),
        }
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid dataset JSON: {err}"),
            Self::RootNotAnObject => write!(f, "dataset root must be an object keyed by id"),
            Self::NotAnObject { id } => write!(f, "entry {id} is not an object"),
            Self::InvalidArticle { id } => write!(f, "entry {id} has a non-string article"),
            Self::InvalidImages { id } => write!(f, "entry {id} has a non-object images field"),
            Self::InvalidCaption { id, index } => {
                write!(f, "entry {id} image {index} has a non-string caption")
            }
            Self::InvalidArticleRecord { id, source } => {
                write!(f, "article {id} is malformed: {source}")
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) | Self::InvalidArticleRecord { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

/// A normalized caption as stored in the news dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSentence {
    /// Numeric id of the owning image.
    pub imgid: u64,
    /// Tokens joined with single spaces.
    pub raw: String,
    /// Normalized tokens.
    pub tokens: Vec<String>,
}

impl CaptionSentence {
    /// Builds a sentence record from its tokens.
    pub fn new(imgid: u64, tokens: Vec<String>) -> Self {
        Self {
            imgid,
            raw: tokens.join(" "),
            tokens,
        }
    }
}

/// One captioned image of the news dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Image file name (`{imgid}.jpg`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Directory holding the image file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    /// Dense numeric image id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cocoid: Option<u64>,
    /// `{document}_{index}` identifier.
    pub imgid: String,
    /// Captions used to build the vocabulary (entity placeholders applied).
    pub sentences: Vec<CaptionSentence>,
    /// The same captions without entity placeholders.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentences_full: Vec<CaptionSentence>,
    /// Assigned partition.
    pub split: Split,
}

impl ImageRecord {
    /// Relative image path, when the record names a file.
    pub fn file_path(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        match self.filepath.as_deref() {
            Some(dir) if !dir.is_empty() => {
                Some(format!("{}/{}", dir.trim_end_matches('/'), filename))
            }
            _ => Some(filename.to_string()),
        }
    }

    /// Id of the document this image belongs to.
    pub fn article_id(&self) -> &str {
        self.imgid
            .rsplit_once('_')
            .map_or(self.imgid.as_str(), |(article, _)| article)
    }

    /// Token sequences of every caption, in order.
    pub fn caption_tokens(&self) -> Vec<Vec<String>> {
        self.sentences
            .iter()
            .map(|sentence| sentence.tokens.clone())
            .collect()
    }
}

/// Sentences extracted from one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Normalized, lowercased sentences in article order.
    pub sentence: Vec<String>,
    /// The subset of `sentence` that mentions a named entity.
    #[serde(default)]
    pub sentence_ner: Vec<String>,
    /// Entity surface text mapped to its label.
    #[serde(default)]
    pub ner: BTreeMap<String, String>,
}

/// Articles keyed by document id, in file order.
pub type ArticleSet = Vec<(String, ArticleRecord)>;

/// Reads an article set, keeping the file's key order.
pub fn read_article_set<R: Read>(reader: R) -> Result<ArticleSet, DocumentError> {
    let root: Map<String, Value> = serde_json::from_reader(reader).map_err(DocumentError::Json)?;
    root.into_iter()
        .map(|(id, value)| match serde_json::from_value::<ArticleRecord>(value) {
            Ok(record) => Ok((id, record)),
            Err(source) => Err(DocumentError::InvalidArticleRecord { id, source }),
        })
        .collect()
}

/// Writes an article set as a JSON object, keeping the given key order.
pub fn write_article_set<W: Write>(
    writer: W,
    articles: &[(String, ArticleRecord)],
) -> serde_json::Result<()> {
    let mut root = Map::with_capacity(articles.len());
    for (id, record) in articles {
        root.insert(id.clone(), serde_json::to_value(record)?);
    }
    serde_json::to_writer_pretty(writer, &root)
}
