//! Fixed-width caption encoding and the per-image pointer table.

use crate::vocab::Vocabulary;
use ndarray::{Array2, ArrayView1};
use std::fmt;
use std::ops::RangeInclusive;

/// Encoded captions for the whole dataset.
///
/// Row `r` of `labels` holds one caption; image `i` owns rows
/// `label_start_ix[i]..=label_end_ix[i]`, counted from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    /// `M × max_length` word indices, zero padded on the right.
    pub labels: Array2<u32>,
    /// First row of every image, 1-indexed.
    pub label_start_ix: Vec<u32>,
    /// Last row of every image, 1-indexed and inclusive.
    pub label_end_ix: Vec<u32>,
    /// Unpadded length of every row.
    pub label_length: Vec<u32>,
}

impl LabelTable {
    /// Number of images.
    pub fn n_images(&self) -> usize {
        self.label_start_ix.len()
    }

    /// Number of encoded captions.
    pub fn n_captions(&self) -> usize {
        self.labels.nrows()
    }

    /// Row width.
    pub fn max_length(&self) -> usize {
        self.labels.ncols()
    }

    /// The 1-indexed inclusive row range of `image`.
    pub fn caption_range(&self, image: usize) -> Option<RangeInclusive<u32>> {
        let start = *self.label_start_ix.get(image)?;
        let end = *self.label_end_ix.get(image)?;
        Some(start..=end)
    }

    /// Encoded rows belonging to `image`.
    pub fn captions_for(&self, image: usize) -> Option<Vec<ArrayView1<'_, u32>>> {
        let range = self.caption_range(image)?;
        range
            .map(|row| {
                let row = (row as usize).checked_sub(1)?;
                (row < self.n_captions()).then(|| self.labels.row(row))
            })
            .collect()
    }

    /// Decodes row `row` (0-indexed) back into words, stopping at its length.
    pub fn decode_row(&self, row: usize, vocab: &Vocabulary) -> Option<Vec<String>> {
        let length = *self.label_length.get(row)? as usize;
        self.labels
            .row(row)
            .iter()
            .take(length)
            .map(|&ix| vocab.word(ix).map(str::to_string))
            .collect()
    }
}

/// Encodes every caption of every image against `vocab`.
///
/// Captions longer than `max_length` are truncated. Every image must carry at
/// least one caption and every caption at least one token.
pub fn encode_captions(
    final_captions: &[Vec<Vec<String>>],
    vocab: &Vocabulary,
    max_length: usize,
) -> Result<LabelTable, EncodeError> {
    if max_length == 0 {
        return Err(EncodeError::ZeroMaxLength);
    }

    let n_captions: usize = final_captions.iter().map(Vec::len).sum();
    if u32::try_from(n_captions).is_err() {
        return Err(EncodeError::TooManyCaptions(n_captions));
    }

    let mut labels = Array2::<u32>::zeros((n_captions, max_length));
    let mut label_start_ix = Vec::with_capacity(final_captions.len());
    let mut label_end_ix = Vec::with_capacity(final_captions.len());
    let mut label_length = Vec::with_capacity(n_captions);

    let mut counter: u32 = 1;
    for (image, captions) in final_captions.iter().enumerate() {
        if captions.is_empty() {
            return Err(EncodeError::NoCaptions { image });
        }
        label_start_ix.push(counter);
        for (caption_ix, caption) in captions.iter().enumerate() {
            if caption.is_empty() {
                return Err(EncodeError::EmptyCaption {
                    image,
                    caption: caption_ix,
                });
            }
            let row = (counter - 1) as usize;
            let kept = caption.len().min(max_length);
            for (col, token) in caption.iter().take(kept).enumerate() {
                let ix = vocab
                    .index(token)
                    .or_else(|| vocab.unk_index())
                    .ok_or_else(|| EncodeError::UnknownToken(token.clone()))?;
                labels[[row, col]] = ix;
            }
            label_length.push(kept as u32);
            counter += 1;
        }
        label_end_ix.push(counter - 1);
    }

    Ok(LabelTable {
        labels,
        label_start_ix,
        label_end_ix,
        label_length,
    })
}

/// Fatal encoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// `max_length` was zero.
    ZeroMaxLength,
    /// An image had no captions; such images must be filtered upstream.
    NoCaptions {
        /// Position of the image in iteration order.
        image: usize,
    },
    /// A caption had no tokens.
    EmptyCaption {
        /// Position of the image in iteration order.
        image: usize,
        /// Position of the caption within the image.
        caption: usize,
    },
    /// A token was neither in the vocabulary nor replaceable by `UNK`.
    UnknownToken(String),
    /// More captions than a u32 pointer can address.
    TooManyCaptions(usize),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMaxLength => write!(f, "max_length must be at least 1"),
            Self::NoCaptions { image } => write!(f, "image #{image} has no captions"),
            Self::EmptyCaption { image, caption } => {
                write!(f, "caption #{caption} of image #{image} has no tokens")
            }
            Self::UnknownToken(token) => {
                write!(f, "token {token:?} is not in the vocabulary and there is no UNK")
            }
            Self::TooManyCaptions(n) => write!(f, "{n} captions exceed the u32 pointer range"),
        }
    }
}

impl std::error::Error for EncodeError {}
