use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{RagError, Result};

/// One vulnerability report as produced by the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub id: String,
    pub description: String,
    pub severity: String,
    pub published: String,
    pub source: String,
}

/// Corpus line as written on disk. Older dumps use `cve_id` instead of `id`.
/// Only `description` may be absent.
#[derive(Deserialize)]
struct RawRecord {
    id: Option<String>,
    cve_id: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    published: Option<String>,
    source: Option<String>,
}

impl TryFrom<RawRecord> for VulnerabilityRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> std::result::Result<Self, Self::Error> {
        let id = non_empty(raw.id)
            .or_else(|| non_empty(raw.cve_id))
            .ok_or_else(|| "missing required field 'id'".to_string())?;

        Ok(VulnerabilityRecord {
            id,
            description: raw.description.unwrap_or_default(),
            severity: required(raw.severity, "severity")?,
            published: required(raw.published, "published")?,
            source: required(raw.source, "source")?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &str) -> std::result::Result<String, String> {
    value.ok_or_else(|| format!("missing required field '{}'", field))
}

pub fn parse_record(line: &str) -> std::result::Result<VulnerabilityRecord, String> {
    let raw: RawRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;
    VulnerabilityRecord::try_from(raw)
}

/// Records loaded from a corpus, plus the lines that had to be skipped.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<VulnerabilityRecord>,
    pub rejected: Vec<RagError>,
}

/// Reads a line-delimited JSON corpus. Malformed lines are logged and skipped;
/// only failing to open or read the file aborts.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<IngestReport> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RagError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut report = IngestReport::default();
    for (i, line_result) in BufReader::new(file).lines().enumerate() {
        let line_no = i + 1;
        let line = match line_result {
            Ok(line) => line,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                reject(&mut report, path, line_no, e.to_string());
                continue;
            }
            Err(source) => {
                return Err(RagError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_record(&line) {
            Ok(record) => report.records.push(record),
            Err(reason) => reject(&mut report, path, line_no, reason),
        }
    }

    info!(
        "Loaded {} records from {} ({} rejected)",
        report.records.len(),
        path.display(),
        report.rejected.len()
    );
    Ok(report)
}

fn reject(report: &mut IngestReport, path: &Path, line: usize, reason: String) {
    warn!("Skipping corpus line {}: {}", line, reason);
    report.rejected.push(RagError::Ingestion {
        path: path.to_path_buf(),
        line,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_record_with_all_fields() {
        let record = parse_record(
            r#"{"id":"CVE-2024-0001","description":"text","severity":"HIGH","published":"2024-01-10","source":"NVD"}"#,
        )
        .unwrap();
        assert_eq!(record.id, "CVE-2024-0001");
        assert_eq!(record.severity, "HIGH");
        assert_eq!(record.source, "NVD");
    }

    #[test]
    fn test_parse_record_accepts_cve_id_and_missing_description() {
        let record = parse_record(
            r#"{"cve_id":"CVE-2024-0002","severity":"UNKNOWN","published":"2024-02-01","source":"NVD"}"#,
        )
        .unwrap();
        assert_eq!(record.id, "CVE-2024-0002");
        assert_eq!(record.description, "");
        assert_eq!(record.severity, "UNKNOWN");
        assert_eq!(record.published, "2024-02-01");
    }

    #[test]
    fn test_parse_record_falls_back_to_cve_id_when_id_is_empty() {
        let record = parse_record(
            r#"{"id":"  ","cve_id":"CVE-2024-0003","severity":"LOW","published":"2024-02-02","source":"NVD"}"#,
        )
        .unwrap();
        assert_eq!(record.id, "CVE-2024-0003");
    }

    #[test]
    fn test_parse_record_requires_id() {
        let err = parse_record(
            r#"{"description":"no id here","severity":"LOW","published":"2024-02-02","source":"NVD"}"#,
        )
        .unwrap_err();
        assert!(err.contains("id"));
    }

    #[test]
    fn test_parse_record_requires_provenance_fields() {
        let err = parse_record(r#"{"id":"CVE-9","description":"x"}"#).unwrap_err();
        assert!(err.contains("severity"), "{}", err);

        let err = parse_record(r#"{"id":"CVE-9","severity":"HIGH","source":"NVD"}"#).unwrap_err();
        assert!(err.contains("published"), "{}", err);

        let err =
            parse_record(r#"{"id":"CVE-9","severity":"HIGH","published":"2024-01-10"}"#).unwrap_err();
        assert!(err.contains("source"), "{}", err);

        let err = parse_record(
            r#"{"id":"CVE-9","severity":null,"published":"2024-01-10","source":"NVD"}"#,
        )
        .unwrap_err();
        assert!(err.contains("severity"), "{}", err);

        assert!(parse_record(
            r#"{"id":"CVE-9","severity":7.5,"published":"2024-01-10","source":"NVD"}"#
        )
        .is_err());
    }

    #[test]
    fn test_load_corpus_skips_bad_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id":"CVE-1","description":"first","severity":"HIGH","published":"2024-01-10","source":"NVD"}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"severity":"LOW","published":"2024-01-11","source":"NVD"}}"#).unwrap();
        writeln!(file, r#"{{"id":"CVE-3","description":"no provenance"}}"#).unwrap();
        writeln!(
            file,
            r#"{{"id":"CVE-2","description":"second","severity":"LOW","published":"2024-01-12","source":"NVD"}}"#
        )
        .unwrap();

        let report = load_corpus(file.path()).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].id, "CVE-1");
        assert_eq!(report.records[1].id, "CVE-2");
        assert_eq!(report.rejected.len(), 3);

        let lines: Vec<usize> = report
            .rejected
            .iter()
            .map(|e| match e {
                RagError::Ingestion { line, .. } => *line,
                other => panic!("unexpected error: {:?}", other),
            })
            .collect();
        assert_eq!(lines, vec![2, 4, 5]);
    }

    #[test]
    fn test_load_corpus_missing_file() {
        let err = load_corpus("/definitely/not/here.jsonl").unwrap_err();
        assert!(matches!(err, RagError::Io { .. }));
    }
}
