//! Description cleanup and fixed-width chunking.

use tracing::debug;

use crate::metadata::MetadataEntry;
use crate::record::VulnerabilityRecord;

/// Collapses every run of whitespace into a single space and trims both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into consecutive windows of `size` characters; the last
/// window holds the remainder. Empty input yields no chunks.
///
/// Panics if `size` is 0.
pub fn chunk(text: &str, size: usize) -> Vec<String> {
    assert!(size > 0, "chunk size must be greater than 0");

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            chunks.push(text[start..offset].to_string());
            start = offset;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        chunks.push(text[start..].to_string());
    }

    chunks
}

/// Normalizes and chunks every record description, pairing each chunk with
/// its provenance. Output order is record order, then chunk order.
pub fn prepare_chunks(
    records: &[VulnerabilityRecord],
    chunk_size: usize,
) -> Vec<(String, MetadataEntry)> {
    let mut prepared = Vec::new();
    for record in records {
        let description = normalize(&record.description);
        let chunks = chunk(&description, chunk_size);
        debug!("Record {} produced {} chunks", record.id, chunks.len());

        prepared.extend(chunks.into_iter().map(|text| {
            let entry = MetadataEntry::for_chunk(record, &text);
            (text, entry)
        }));
    }
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{distributions::Alphanumeric, Rng};

    fn record(id: &str, description: &str) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: id.to_string(),
            description: description.to_string(),
            severity: "HIGH".to_string(),
            published: "2024-01-10".to_string(),
            source: "NVD".to_string(),
        }
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  a\t\tb \n\n c  "), "a b c");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize("nowhitespace"), "nowhitespace");
    }

    #[test]
    fn test_chunk_empty_input() {
        assert!(chunk("", 500).is_empty());
    }

    #[test]
    fn test_chunk_short_text_is_single_chunk() {
        assert_eq!(chunk("abc", 500), vec!["abc".to_string()]);
        assert_eq!(chunk("abc", 3), vec!["abc".to_string()]);
    }

    #[test]
    fn test_chunk_exact_windows_and_remainder() {
        assert_eq!(chunk("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk("abcdef", 2), vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn test_chunk_counts_characters_not_bytes() {
        let chunks = chunk("ééééé", 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_chunk_reconstruction_and_count() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let len = rng.gen_range(1..2000);
            let text: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect();
            let size = rng.gen_range(1..600);
            let chunks = chunk(&text, size);

            assert_eq!(chunks.concat(), text);
            assert_eq!(chunks.len(), (len + size - 1) / size);
            assert!(chunks.iter().all(|c| c.chars().count() <= size));
            assert!(chunks[..chunks.len() - 1]
                .iter()
                .all(|c| c.chars().count() == size));
        }
    }

    #[test]
    #[should_panic]
    fn test_chunk_zero_size_panics() {
        chunk("abc", 0);
    }

    #[test]
    fn test_prepare_chunks_keeps_order_and_provenance() {
        let records = vec![
            record("CVE-1", "aaaa  bbbb\ncccc"),
            record("CVE-2", "   "),
            record("CVE-3", "xyz"),
        ];
        let prepared = prepare_chunks(&records, 5);

        let texts: Vec<&str> = prepared.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["aaaa ", "bbbb ", "cccc", "xyz"]);
        assert!(prepared[..3].iter().all(|(_, m)| m.record_id == "CVE-1"));
        assert_eq!(prepared[3].1.record_id, "CVE-3");
        assert!(prepared.iter().all(|(t, m)| *t == m.chunk_text));
    }
}
