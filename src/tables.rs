//! Flat binary tables for encoded captions and article matrices.
//!
//! Both formats share the same framing:
//! ```text
//! [magic: 4 bytes][version: 1 byte][header: u32 LE...][payload][crc32: 4 bytes LE]
//! ```
//! The checksum covers every byte before it. All integers are little endian.
//!
//! Label table (`NCLB`): header `n_images, n_captions, max_length`, then
//! `labels` row-major, `label_start_ix`, `label_end_ix`, `label_length`, all u32.
//!
//! Article table (`NCAV`): header `dim, n_rows`, then per row a u32 column
//! count followed by `dim * cols` f64 values in row-major `[dim, cols]` order.
//! Row keys live in a sibling JSON array.

use crate::articles::ArticleMatrix;
use crate::encoder::LabelTable;
use crc32fast::Hasher;
use ndarray::Array2;
use std::io::{self, ErrorKind, Read, Write};

/// Magic bytes of the label table.
pub const LABEL_MAGIC: [u8; 4] = *b"NCLB";
/// Magic bytes of the article table.
pub const ARTICLE_MAGIC: [u8; 4] = *b"NCAV";
const TABLE_VERSION: u8 = 1;

// Largest element count a header may announce.
const MAX_ELEMENTS: usize = 1 << 34;
// Upfront allocation cap; vectors grow past it only as data actually arrives.
const PREALLOCATE: usize = 1 << 20;

/// Writes the encoded caption table.
pub fn write_label_table<W: Write>(writer: W, table: &LabelTable) -> io::Result<()> {
    let mut out = ChecksumWriter::new(writer);
    out.write_all(&LABEL_MAGIC)?;
    out.write_all(&[TABLE_VERSION])?;
    out.write_u32(to_u32(table.n_images())?)?;
    out.write_u32(to_u32(table.n_captions())?)?;
    out.write_u32(to_u32(table.max_length())?)?;
    for &ix in table.labels.iter() {
        out.write_u32(ix)?;
    }
    for column in [
        &table.label_start_ix,
        &table.label_end_ix,
        &table.label_length,
    ] {
        for &value in column.iter() {
            out.write_u32(value)?;
        }
    }
    out.finish()
}

/// Reads and verifies an encoded caption table.
pub fn read_label_table<R: Read>(reader: R) -> io::Result<LabelTable> {
    let mut input = ChecksumReader::new(reader);
    input.expect_header(LABEL_MAGIC)?;
    let n_images = input.read_u32()? as usize;
    let n_captions = input.read_u32()? as usize;
    let max_length = input.read_u32()? as usize;

    let cells = checked_elements(n_captions, max_length)?;
    let labels = input.read_u32_vec(cells)?;
    let labels = Array2::from_shape_vec((n_captions, max_length), labels)
        .map_err(|err| invalid(format!("label shape: {err}")))?;
    let label_start_ix = input.read_u32_vec(n_images)?;
    let label_end_ix = input.read_u32_vec(n_images)?;
    let label_length = input.read_u32_vec(n_captions)?;
    input.verify()?;

    Ok(LabelTable {
        labels,
        label_start_ix,
        label_end_ix,
        label_length,
    })
}

/// Article matrices read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleTable {
    /// Height shared by every matrix.
    pub dim: usize,
    /// One `[dim, cols]` matrix per row, in key order.
    pub rows: Vec<Array2<f64>>,
}

/// Writes article matrices of height `dim`.
pub fn write_article_table<W: Write>(
    writer: W,
    dim: usize,
    articles: &[ArticleMatrix],
) -> io::Result<()> {
    let mut out = ChecksumWriter::new(writer);
    out.write_all(&ARTICLE_MAGIC)?;
    out.write_all(&[TABLE_VERSION])?;
    out.write_u32(to_u32(dim)?)?;
    out.write_u32(to_u32(articles.len())?)?;
    for article in articles {
        if article.matrix.nrows() != dim {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "article {} has {} rows, expected {dim}",
                    article.key,
                    article.matrix.nrows()
                ),
            ));
        }
        out.write_u32(to_u32(article.matrix.ncols())?)?;
        for &value in article.matrix.iter() {
            out.write_all(&value.to_le_bytes())?;
        }
    }
    out.finish()
}

/// Reads and verifies an article table.
pub fn read_article_table<R: Read>(reader: R) -> io::Result<ArticleTable> {
    let mut input = ChecksumReader::new(reader);
    input.expect_header(ARTICLE_MAGIC)?;
    let dim = input.read_u32()? as usize;
    let n_rows = input.read_u32()? as usize;

    let mut rows = Vec::new();
    for _ in 0..n_rows {
        let cols = input.read_u32()? as usize;
        let len = checked_elements(dim, cols)?;
        let mut values = Vec::with_capacity(len.min(PREALLOCATE));
        for _ in 0..len {
            let mut buf = [0u8; 8];
            input.read_exact(&mut buf)?;
            values.push(f64::from_le_bytes(buf));
        }
        let matrix = Array2::from_shape_vec((dim, cols), values)
            .map_err(|err| invalid(format!("article shape: {err}")))?;
        rows.push(matrix);
    }
    input.verify()?;
    Ok(ArticleTable { dim, rows })
}

/// Writes the row keys of an article table as a JSON array.
pub fn write_article_keys<W: Write>(writer: W, articles: &[ArticleMatrix]) -> io::Result<()> {
    let keys: Vec<&str> = articles.iter().map(|article| article.key.as_str()).collect();
    serde_json::to_writer(writer, &keys)?;
    Ok(())
}

/// Reads the row keys of an article table.
pub fn read_article_keys<R: Read>(reader: R) -> io::Result<Vec<String>> {
    Ok(serde_json::from_reader(reader)?)
}

fn to_u32(value: usize) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| invalid(format!("{value} does not fit in a u32 field")))
}

fn checked_elements(rows: usize, cols: usize) -> io::Result<usize> {
    rows.checked_mul(cols)
        .filter(|&n| n <= MAX_ELEMENTS)
        .ok_or_else(|| invalid(format!("table of {rows}x{cols} elements is too large")))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, message)
}

struct ChecksumWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn finish(mut self) -> io::Result<()> {
        let crc = self.hasher.clone().finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct ChecksumReader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> ChecksumReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    fn expect_header(&mut self, magic: [u8; 4]) -> io::Result<()> {
        let mut found = [0u8; 4];
        self.read_exact(&mut found)?;
        if found != magic {
            return Err(invalid(format!(
                "invalid magic bytes: expected {magic:?}, got {found:?}"
            )));
        }
        let mut version = [0u8; 1];
        self.read_exact(&mut version)?;
        if version[0] != TABLE_VERSION {
            return Err(invalid(format!(
                "unsupported table version: {} (expected {TABLE_VERSION})",
                version[0]
            )));
        }
        Ok(())
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u32_vec(&mut self, len: usize) -> io::Result<Vec<u32>> {
        let mut values = Vec::with_capacity(len.min(PREALLOCATE));
        for _ in 0..len {
            values.push(self.read_u32()?);
        }
        Ok(values)
    }

    fn verify(mut self) -> io::Result<()> {
        let computed = self.hasher.clone().finalize();
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        let stored = u32::from_le_bytes(buf);
        if stored != computed {
            return Err(invalid(format!(
                "CRC mismatch: stored={stored:08x}, computed={computed:08x} (data corrupted)"
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_captions;
    use crate::vocab::build_vocab;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn sample_table() -> LabelTable {
        let captions: Vec<Vec<Vec<String>>> = vec![
            vec![vec!["a".into(), "cat".into()], vec!["a".into()]],
            vec![vec!["cat".into(), "sat".into(), "down".into()]],
        ];
        let build = build_vocab(&captions, 0).unwrap();
        encode_captions(&build.final_captions, &build.vocab, 2).unwrap()
    }

    #[test]
    fn label_table_survives_disk_format() {
        let table = sample_table();
        let mut buf = Vec::new();
        write_label_table(&mut buf, &table).unwrap();
        assert_eq!(&buf[..4], b"NCLB");
        assert_eq!(read_label_table(buf.as_slice()).unwrap(), table);
    }

    #[test]
    fn corrupted_label_table_is_rejected() {
        let mut buf = Vec::new();
        write_label_table(&mut buf, &sample_table()).unwrap();
        buf[20] ^= 0xff;
        let err = read_label_table(buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("CRC mismatch"));

        let mut wrong_magic = buf.clone();
        wrong_magic[0] = b'X';
        let err = read_label_table(wrong_magic.as_slice()).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn article_table_keeps_variable_widths() {
        let articles = vec![
            ArticleMatrix {
                key: "b".into(),
                matrix: array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            },
            ArticleMatrix {
                key: "a".into(),
                matrix: array![[0.5], [-0.5]],
            },
        ];
        let mut table = Vec::new();
        write_article_table(&mut table, 2, &articles).unwrap();
        let back = read_article_table(table.as_slice()).unwrap();
        assert_eq!(back.dim, 2);
        assert_eq!(back.rows[0], articles[0].matrix);
        assert_eq!(back.rows[1].dim(), (2, 1));

        let mut keys = Vec::new();
        write_article_keys(&mut keys, &articles).unwrap();
        assert_eq!(String::from_utf8(keys.clone()).unwrap(), r#"["b","a"]"#);
        assert_eq!(read_article_keys(keys.as_slice()).unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn article_height_must_match() {
        let articles = vec![ArticleMatrix {
            key: "x".into(),
            matrix: array![[1.0]],
        }];
        let err = write_article_table(Vec::new(), 3, &articles).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn truncated_table_fails() {
        let mut buf = Vec::new();
        write_label_table(&mut buf, &sample_table()).unwrap();
        buf.truncate(buf.len() - 6);
        assert!(read_label_table(buf.as_slice()).is_err());
    }
}
