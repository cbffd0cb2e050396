//! Per-document outcome records ("leftovers") collected by every stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Pipeline step a document was dropped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw record validation.
    Parse,
    /// Text normalization.
    Normalize,
    /// Article vectorization.
    Vectorize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Normalize => "normalize",
            Self::Vectorize => "vectorize",
        })
    }
}

/// One document or image excluded from the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    /// Identifier of the excluded item.
    pub id: String,
    /// Stage that rejected it.
    pub stage: Stage,
    /// Human-readable reason.
    pub reason: String,
}

impl SkipRecord {
    /// Creates a skip record from the provided components.
    pub fn new(id: impl Into<String>, stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            id: id.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Running tally of processed and skipped items for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    processed: usize,
    skipped: Vec<SkipRecord>,
}

impl BatchReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outcome, returning the value when it succeeded.
    pub fn record<T, E: fmt::Display>(
        &mut self,
        id: &str,
        stage: Stage,
        outcome: Result<T, E>,
    ) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.processed += 1;
                Some(value)
            }
            Err(err) => {
                self.skip(SkipRecord::new(id, stage, err));
                None
            }
        }
    }

    /// Records an exclusion decided by the caller.
    pub fn skip(&mut self, record: SkipRecord) {
        log::warn!("skipping {} at {}: {}", record.id, record.stage, record.reason);
        self.skipped.push(record);
    }

    /// Number of successful outcomes.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Excluded items in the order they were rejected.
    pub fn skipped(&self) -> &[SkipRecord] {
        &self.skipped
    }

    /// Writes one JSON object per skipped item.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for record in &self.skipped {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }

    /// Creates (or truncates) `path` and writes the leftovers there.
    pub fn write_leftovers(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        self.write_jsonl(BufWriter::new(file))?;
        log::info!("wrote {} leftovers to {}", self.skipped.len(), path.display());
        Ok(())
    }

    /// Logs a one-line summary for the named batch.
    pub fn log_summary(&self, label: &str) {
        log::info!(
            "{label}: processed={} skipped={}",
            self.processed,
            self.skipped.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn records_successes_and_failures() {
        let mut report = BatchReport::new();
        assert_eq!(report.record::<_, String>("a", Stage::Parse, Ok(3)), Some(3));
        assert_eq!(
            report.record::<u8, _>("b", Stage::Normalize, Err("empty caption")),
            None
        );
        assert_eq!(report.processed(), 1);
        assert_eq!(
            report.skipped(),
            &[SkipRecord::new("b", Stage::Normalize, "empty caption")]
        );
    }

    #[test]
    fn writes_leftovers_as_json_lines() {
        let mut report = BatchReport::new();
        report.skip(SkipRecord::new("x_1", Stage::Vectorize, "no sentences"));
        report.skip(SkipRecord::new("y", Stage::Parse, "not an object"));

        let mut buf = Vec::new();
        report.write_jsonl(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"id":"x_1","stage":"vectorize","reason":"no sentences"}"#,
                r#"{"id":"y","stage":"parse","reason":"not an object"}"#,
            ]
        );
    }

    #[test]
    fn leftovers_file_is_replaced_on_each_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftovers.jsonl");
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();

        let mut report = BatchReport::new();
        report.skip(SkipRecord::new("a1", Stage::Vectorize, "article has no sentences"));
        report.write_leftovers(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\"id\":\"a1\",\"stage\":\"vectorize\",\"reason\":\"article has no sentences\"}\n"
        );

        BatchReport::new().write_leftovers(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
