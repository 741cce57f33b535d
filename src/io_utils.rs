//! CSV reader construction, encoding resolution and delimiter detection.
//!
//! Every table read (sampling and the full typed pass) opens its reader here
//! so both passes agree on delimiter, quoting and encoding.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const SNIFF_CANDIDATES: &[u8] = &[b',', b'\t', b'|', b';'];

/// Reader settings shared by every table in a run.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub quoting: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
            quoting: true,
        }
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Picks the delimiter for `path`: an explicit override wins, then the
/// candidate occurring most often in the header line, then the extension.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> Result<u8> {
    if let Some(delimiter) = provided {
        return Ok(delimiter);
    }
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut header = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut header)
        .with_context(|| format!("Reading header line of {path:?}"))?;
    Ok(sniff_delimiter(&header).unwrap_or_else(|| extension_delimiter(path)))
}

fn extension_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

pub fn sniff_delimiter(header_line: &[u8]) -> Option<u8> {
    let mut in_quotes = false;
    let mut counts = [0usize; SNIFF_CANDIDATES.len()];
    for byte in header_line {
        if *byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = SNIFF_CANDIDATES.iter().position(|c| c == byte) {
            counts[idx] += 1;
        }
    }
    // Ties resolve to the earlier candidate, so comma wins over tab.
    let (best, count) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |acc, (idx, count)| if *count > acc.1 { (idx, *count) } else { acc });
    (count > 0).then_some(SNIFF_CANDIDATES[best])
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, quoting: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .quoting(quoting)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    quoting: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    Ok(open_csv_reader(reader, delimiter, quoting))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    if encoding == UTF_8 {
        return std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|err| anyhow!("Invalid UTF-8 text: {err}"));
    }
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let mut decoded = decode_record(&headers, encoding)?;
    if let Some(first) = decoded.first_mut() {
        // Strip a UTF-8 byte order mark left on the first header.
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn sniff_prefers_most_frequent_candidate() {
        assert_eq!(sniff_delimiter(b"concept_id\tconcept_name\tdomain_id\n"), Some(b'\t'));
        assert_eq!(sniff_delimiter(b"Id,BIRTHDATE,DEATHDATE\n"), Some(b','));
        assert_eq!(sniff_delimiter(b"a|b|c;d\n"), Some(b'|'));
        assert_eq!(sniff_delimiter(b"single\n"), None);
    }

    #[test]
    fn sniff_ignores_quoted_delimiters() {
        assert_eq!(sniff_delimiter(b"\"a,b,c\"\t\"d\"\n"), Some(b'\t'));
    }

    #[test]
    fn single_column_files_fall_back_to_extension_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("domain.tsv");
        let csv = dir.path().join("domain.csv");
        for path in [&tsv, &csv] {
            std::fs::write(path, "domain_id\nGender\n").unwrap();
        }
        assert_eq!(resolve_input_delimiter(&tsv, None).unwrap(), b'\t');
        assert_eq!(resolve_input_delimiter(&csv, None).unwrap(), b',');
        assert_eq!(resolve_input_delimiter(&tsv, Some(b'|')).unwrap(), b'|');
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(resolve_encoding(Some("windows-1252")).unwrap(), WINDOWS_1252);
        assert!(resolve_encoding(Some("not-an-encoding")).is_err());
    }

    #[test]
    fn reader_headers_strip_byte_order_mark() {
        let data = "\u{feff}Id,NAME\n1,x\n";
        let mut reader = open_csv_reader(data.as_bytes(), b',', true);
        let headers = reader_headers(&mut reader, UTF_8).unwrap();
        assert_eq!(headers, vec!["Id".to_string(), "NAME".to_string()]);
    }

    #[test]
    fn decode_bytes_transcodes_legacy_encodings() {
        let (encoded, _, _) = WINDOWS_1252.encode("Caf\u{e9}");
        assert_eq!(decode_bytes(&encoded, WINDOWS_1252).unwrap(), "Caf\u{e9}");
        assert!(decode_bytes(&encoded, UTF_8).is_err());
    }
}
